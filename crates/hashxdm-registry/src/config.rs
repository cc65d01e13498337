use serde::{Deserialize, Serialize};

/// Controls registry capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of channels with a live entry.
    pub max_channels: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_channels: 64 }
    }
}
