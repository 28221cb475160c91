//! Shared metadata block stamped into every artifact.

use std::time::{SystemTime, UNIX_EPOCH};

use ek_core::Result;
use serde::Serialize;

/// Provenance header carried by every artifact.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactMeta {
    /// Producing tool.
    pub tool: String,
    /// Tool version.
    pub tool_version: String,
    /// Creation time (unix milliseconds).
    pub created_unix_ms: u128,
}

impl ArtifactMeta {
    /// Stamp a new metadata block.
    pub fn new() -> Result<Self> {
        let d = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ek_core::Error::Computation(format!("system time error: {e}")))?;
        Ok(Self {
            tool: "epikit".to_string(),
            tool_version: ek_core::VERSION.to_string(),
            created_unix_ms: d.as_millis(),
        })
    }
}
