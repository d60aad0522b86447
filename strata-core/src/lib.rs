//! Strata Core
//!
//! Shared building blocks for the Strata state tooling: attribute values,
//! configuration schemas and user-facing diagnostics

pub mod diagnostics;
pub mod resource;
pub mod schema;
