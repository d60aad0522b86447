//! State backend trait and error types

use std::collections::HashMap;

use async_trait::async_trait;
use strata_core::diagnostics::Diagnostics;
use strata_core::resource::Value;
use thiserror::Error;

use crate::lock::LockInfo;
use crate::state::StateFile;

/// Name of the workspace that always exists
pub const DEFAULT_WORKSPACE: &str = "default";

/// Errors that can occur when interacting with a state backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// The state is locked by another process
    #[error("State is locked by {who} (lock ID: {lock_id}, operation: {operation})")]
    Locked {
        lock_id: String,
        who: String,
        operation: String,
    },

    /// The lock was not found (for release/force-unlock operations)
    #[error("Lock not found: {0}")]
    LockNotFound(String),

    /// Lock ID mismatch when trying to release
    #[error("Lock ID mismatch: expected {expected}, got {actual}")]
    LockMismatch { expected: String, actual: String },

    /// The backend type is not supported
    #[error("Unsupported backend type: {0}")]
    UnsupportedBackend(String),

    /// Configuration error
    #[error("Backend configuration error: {0}")]
    Configuration(String),

    /// Configuration failed validation
    #[error("Invalid backend configuration:\n{0}")]
    InvalidConfiguration(Diagnostics),

    /// The workspace does not exist or cannot be removed
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// State file is corrupted or invalid
    #[error("Invalid state file: {0}")]
    InvalidState(String),

    /// Stored state does not match the digest recorded alongside the lock table
    #[error(
        "State data in S3 does not have the expected content (calculated checksum: {actual}, stored checksum: {expected})"
    )]
    ChecksumMismatch { expected: String, actual: String },

    /// Network or I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// AWS SDK error
    #[error("AWS error: {0}")]
    Aws(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BackendError {
    /// Create a Locked error from a LockInfo
    pub fn locked(lock: &LockInfo) -> Self {
        Self::Locked {
            lock_id: lock.id.clone(),
            who: lock.who.clone(),
            operation: lock.operation.clone(),
        }
    }

    /// Create an unsupported backend error
    pub fn unsupported_backend(backend_type: impl Into<String>) -> Self {
        Self::UnsupportedBackend(backend_type.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Trait for state storage backends
///
/// State is kept per workspace. Every backend has the [`DEFAULT_WORKSPACE`];
/// other workspaces come into existence when state is first written to them.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// List the workspaces that have stored state, default first
    async fn workspaces(&self) -> BackendResult<Vec<String>>;

    /// Remove a workspace's state (the default workspace cannot be deleted)
    async fn delete_workspace(&self, workspace: &str) -> BackendResult<()>;

    /// Read the current state of a workspace
    ///
    /// Returns `None` if no state exists (first-time use)
    async fn read_state(&self, workspace: &str) -> BackendResult<Option<StateFile>>;

    /// Write the state of a workspace
    ///
    /// The state's serial number should be incremented before calling this
    async fn write_state(&self, workspace: &str, state: &StateFile) -> BackendResult<()>;

    /// Acquire a lock on a workspace for the given operation
    ///
    /// This should fail if a lock is already held by another process
    async fn acquire_lock(&self, workspace: &str, operation: &str) -> BackendResult<LockInfo>;

    /// Release a previously acquired lock
    ///
    /// This should verify that the lock being released matches the provided lock info
    async fn release_lock(&self, workspace: &str, lock: &LockInfo) -> BackendResult<()>;

    /// Force release a lock by its ID
    ///
    /// This is an administrative operation that should be used with caution
    async fn force_unlock(&self, workspace: &str, lock_id: &str) -> BackendResult<()>;
}

/// Configuration for a state backend
#[derive(Debug, Clone, Default)]
pub struct BackendConfig {
    /// Backend type (e.g., "s3")
    pub backend_type: String,
    /// Backend-specific attributes; unset attributes are absent
    pub attributes: HashMap<String, Value>,
}

impl BackendConfig {
    pub fn new(backend_type: impl Into<String>) -> Self {
        Self {
            backend_type: backend_type.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Build a configuration from a JSON object of attributes
    pub fn from_json(
        backend_type: impl Into<String>,
        attributes: serde_json::Map<String, serde_json::Value>,
    ) -> BackendResult<Self> {
        let mut config = Self::new(backend_type);
        for (key, json) in attributes {
            let value = Value::from_json(json)
                .map_err(|e| BackendError::configuration(format!("{}: {}", key, e)))?;
            if let Some(value) = value {
                config.attributes.insert(key, value);
            }
        }
        Ok(config)
    }

    /// Check whether an attribute is set
    pub fn is_set(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Get a string attribute value
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Get a boolean attribute value
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.attributes.get(key).and_then(Value::as_bool)
    }

    /// Get a boolean attribute with a default value
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// Get an integer attribute value
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.attributes.get(key).and_then(Value::as_int)
    }

    /// Get a list-of-strings attribute value
    pub fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        self.attributes.get(key).and_then(string_list)
    }

    /// Get a set-of-strings attribute value, duplicates removed
    pub fn get_string_set(&self, key: &str) -> Option<Vec<String>> {
        self.attributes.get(key).and_then(string_set)
    }

    /// Get a map-of-strings attribute value
    pub fn get_string_map(&self, key: &str) -> Option<HashMap<String, String>> {
        self.attributes.get(key).and_then(string_map)
    }

    /// Get a nested object attribute
    pub fn get_object(&self, key: &str) -> Option<&HashMap<String, Value>> {
        self.attributes.get(key).and_then(Value::as_map)
    }
}

/// Convert a list value whose items are all strings
pub(crate) fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_list()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// Convert a list value to a set of strings, keeping first occurrences in order
pub(crate) fn string_set(value: &Value) -> Option<Vec<String>> {
    let mut items = string_list(value)?;
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
    Some(items)
}

/// Convert a map value whose values are all strings
pub(crate) fn string_map(value: &Value) -> Option<HashMap<String, String>> {
    value
        .as_map()?
        .iter()
        .map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LockInfo;
    use serde_json::json;

    #[test]
    fn test_backend_error_locked() {
        let lock = LockInfo::new("apply");
        let error = BackendError::locked(&lock);

        match error {
            BackendError::Locked {
                lock_id,
                who,
                operation,
            } => {
                assert_eq!(lock_id, lock.id);
                assert_eq!(who, lock.who);
                assert_eq!(operation, "apply");
            }
            _ => panic!("Expected Locked error"),
        }
    }

    #[test]
    fn test_backend_error_display() {
        let error = BackendError::unsupported_backend("azure");
        assert_eq!(error.to_string(), "Unsupported backend type: azure");

        let error = BackendError::Workspace("cannot delete default".to_string());
        assert_eq!(error.to_string(), "Workspace error: cannot delete default");
    }

    #[test]
    fn test_config_from_json() {
        let attrs = json!({
            "bucket": "tf-state",
            "encrypt": true,
            "max_retries": 3,
            "kms_key_id": null,
            "allowed_account_ids": ["111111111111"],
            "assume_role": {"role_arn": "arn:aws:iam::111111111111:role/deploy"}
        });
        let serde_json::Value::Object(attrs) = attrs else {
            unreachable!()
        };
        let config = BackendConfig::from_json("s3", attrs).unwrap();

        assert_eq!(config.get_string("bucket"), Some("tf-state"));
        assert!(config.get_bool_or("encrypt", false));
        assert_eq!(config.get_int("max_retries"), Some(3));
        assert!(!config.is_set("kms_key_id"));
        assert_eq!(
            config.get_string_list("allowed_account_ids"),
            Some(vec!["111111111111".to_string()])
        );
        assert!(config.get_object("assume_role").is_some());
    }

    #[test]
    fn test_string_set_drops_duplicates() {
        let config = BackendConfig::new("s3").with_attribute(
            "allowed_account_ids",
            Value::List(vec![
                Value::from("222222222222"),
                Value::from("111111111111"),
                Value::from("222222222222"),
            ]),
        );
        assert_eq!(
            config.get_string_set("allowed_account_ids"),
            Some(vec!["222222222222".to_string(), "111111111111".to_string()])
        );
        assert_eq!(
            config.get_string_list("allowed_account_ids").map(|l| l.len()),
            Some(3)
        );
    }

    #[test]
    fn test_typed_getters_ignore_mismatched_types() {
        let config = BackendConfig::new("s3")
            .with_attribute("bucket", 1_i64)
            .with_attribute("encrypt", "yes");
        assert_eq!(config.get_string("bucket"), None);
        assert_eq!(config.get_bool("encrypt"), None);
        assert!(config.get_bool_or("encrypt", true));
    }
}
