//! Backend implementations for state storage

pub mod s3;

pub use s3::S3Backend;

use strata_core::diagnostics::Diagnostics;
use strata_core::schema::BlockSchema;

use crate::backend::{BackendConfig, BackendError, BackendResult, StateBackend};
use crate::env::Environment;

/// Configuration schema of a backend type
pub fn backend_schema(backend_type: &str) -> BackendResult<BlockSchema> {
    match backend_type {
        "s3" => Ok(S3Backend::config_schema()),
        other => Err(BackendError::unsupported_backend(other)),
    }
}

/// Validate a backend configuration without contacting any service
///
/// Runs the same checks as [`create_backend`] up to, but not including, the
/// construction of clients.
pub fn validate_backend(
    config: &BackendConfig,
    env: &dyn Environment,
) -> BackendResult<Diagnostics> {
    match config.backend_type.as_str() {
        "s3" => {
            let mut diags = S3Backend::prepare_config(config, env);
            if !diags.has_errors() {
                diags.extend(s3::S3BackendConfig::from_attributes(config, env).1);
            }
            Ok(diags)
        }
        other => Err(BackendError::unsupported_backend(other)),
    }
}

/// Create a backend from configuration
///
/// Dispatches on `backend_type`. Warning diagnostics produced while
/// configuring are returned with the backend.
pub async fn create_backend(
    config: &BackendConfig,
    env: &dyn Environment,
) -> BackendResult<(Box<dyn StateBackend>, Diagnostics)> {
    match config.backend_type.as_str() {
        "s3" => {
            let (backend, diags) = S3Backend::configure(config, env).await?;
            Ok((Box::new(backend), diags))
        }
        other => Err(BackendError::unsupported_backend(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_unsupported_backend() {
        let config = BackendConfig::new("unsupported");
        let env: HashMap<String, String> = HashMap::new();

        let result = create_backend(&config, &env).await;
        if let Err(BackendError::UnsupportedBackend(name)) = result {
            assert_eq!(name, "unsupported");
        } else {
            panic!("Expected UnsupportedBackend error");
        }

        assert!(matches!(
            backend_schema("gcs"),
            Err(BackendError::UnsupportedBackend(_))
        ));
        assert!(validate_backend(&config, &env).is_err());
    }

    #[test]
    fn test_validate_backend_reports_typed_errors() {
        let env: HashMap<String, String> = HashMap::new();
        let config = BackendConfig::new("s3")
            .with_attribute("bucket", "tf-state")
            .with_attribute("key", "terraform.tfstate")
            .with_attribute("region", "us-west-2")
            .with_attribute("sse_customer_key", "too-short");

        let diags = validate_backend(&config, &env).unwrap();
        assert!(diags.find("Invalid sse_customer_key value").is_some());
    }

    #[test]
    fn test_validate_backend_accepts_minimal_config() {
        let env: HashMap<String, String> = HashMap::new();
        let config = BackendConfig::new("s3")
            .with_attribute("bucket", "tf-state")
            .with_attribute("key", "terraform.tfstate")
            .with_attribute("region", "us-west-2");

        assert!(validate_backend(&config, &env).unwrap().is_empty());
    }
}
