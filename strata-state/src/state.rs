//! State file structures for persisting infrastructure state

use serde::{Deserialize, Serialize};

/// The state document persisted to the backend
///
/// Backends treat resources and outputs as opaque JSON; only the header
/// fields (version, serial, lineage) carry meaning here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Version of the tool that last modified this state
    #[serde(rename = "terraform_version")]
    pub tool_version: String,
    /// Monotonically increasing number for each state modification
    pub serial: u64,
    /// Unique identifier for this state lineage (prevents accidental overwrites)
    pub lineage: String,
    /// Root module outputs
    #[serde(default)]
    pub outputs: serde_json::Map<String, serde_json::Value>,
    /// All managed resources
    #[serde(default)]
    pub resources: Vec<serde_json::Value>,
    /// Fields this crate does not interpret, preserved on rewrite
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StateFile {
    /// Current state file format version
    pub const CURRENT_VERSION: u32 = 4;

    /// Create a new empty state file
    pub fn new() -> Self {
        Self::with_lineage(uuid::Uuid::new_v4().to_string())
    }

    /// Create a new state file with a specific lineage (for initialization)
    pub fn with_lineage(lineage: String) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            serial: 0,
            lineage,
            outputs: serde_json::Map::new(),
            resources: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Increment serial and update the tool version for a new state write
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.tool_version = env!("CARGO_PKG_VERSION").to_string();
    }

    /// Serialize to the bytes stored in the backend
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Parse bytes read from the backend
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}
