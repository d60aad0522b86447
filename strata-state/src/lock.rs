//! Lock information for state backend locking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Information about a state lock
///
/// Serialized as JSON into the lock table so that other processes can report
/// who holds the lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LockInfo {
    /// Unique identifier for this lock
    #[serde(rename = "ID")]
    pub id: String,
    /// The operation being performed (e.g., "apply", "destroy", "plan")
    pub operation: String,
    /// Free-form extra information about the lock holder
    #[serde(default)]
    pub info: String,
    /// Who acquired the lock (username@hostname)
    pub who: String,
    /// Version of the tool that acquired the lock
    pub version: String,
    /// When the lock was created
    pub created: DateTime<Utc>,
    /// Path of the locked state object (e.g., "bucket/key")
    #[serde(default)]
    pub path: String,
}

impl LockInfo {
    /// Create a new lock for an operation
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            info: String::new(),
            who: get_lock_owner(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created: Utc::now(),
            path: String::new(),
        }
    }

    /// Set the path of the locked state
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set extra information about the lock holder
    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Get the lock owner string (username@hostname)
fn get_lock_owner() -> String {
    let username = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    format!("{}@{}", username, hostname)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_info_new() {
        let lock = LockInfo::new("apply");
        assert_eq!(lock.operation, "apply");
        assert!(!lock.id.is_empty());
        assert!(!lock.who.is_empty());
        assert!(lock.path.is_empty());
    }

    #[test]
    fn test_lock_ids_are_unique() {
        assert_ne!(LockInfo::new("plan").id, LockInfo::new("plan").id);
    }

    #[test]
    fn test_lock_owner_format() {
        let who = get_lock_owner();
        assert!(who.contains('@'));
    }

    #[test]
    fn test_lock_info_serialization() {
        let lock = LockInfo::new("apply")
            .with_path("tf-state/env:/dev/network.tfstate")
            .with_info("ci run 42");
        let json = lock.to_json().unwrap();
        assert!(json.contains("\"ID\""));
        assert!(json.contains("\"Operation\":\"apply\""));

        let deserialized = LockInfo::from_json(&json).unwrap();
        assert_eq!(deserialized, lock);
    }
}
