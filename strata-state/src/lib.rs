//! Strata State Management
//!
//! Remote state backends for the Strata infrastructure tooling. The S3
//! backend stores state objects in a bucket and, when a DynamoDB table is
//! configured, locks them and records their digests in that table.
//!
//! # Overview
//!
//! - **BackendConfig**: raw backend attributes as the user wrote them
//! - **StateBackend**: workspace-aware storage with locking
//! - **Diagnostics**: validation problems, reported together instead of one error at a time
//! - **Environment**: where fallbacks such as `AWS_REGION` are read from
//!
//! # Example
//!
//! ```ignore
//! use strata_state::{create_backend, BackendConfig, ProcessEnvironment};
//!
//! let config = BackendConfig::new("s3")
//!     .with_attribute("bucket", "my-state-bucket")
//!     .with_attribute("key", "infra/prod/terraform.tfstate")
//!     .with_attribute("region", "eu-west-1")
//!     .with_attribute("dynamodb_table", "state-locks");
//!
//! let (backend, warnings) = create_backend(&config, &ProcessEnvironment).await?;
//!
//! let lock = backend.acquire_lock("default", "apply").await?;
//! let mut state = backend.read_state("default").await?.unwrap_or_default();
//! state.increment_serial();
//! backend.write_state("default", &state).await?;
//! backend.release_lock("default", &lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod env;
pub mod lock;
pub mod state;

pub use backend::{BackendConfig, BackendError, BackendResult, DEFAULT_WORKSPACE, StateBackend};
pub use backends::{backend_schema, create_backend, validate_backend};
pub use env::{Environment, ProcessEnvironment};
pub use lock::LockInfo;
pub use state::StateFile;
