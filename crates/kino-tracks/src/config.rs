//! Dispatcher configuration

use crate::error::{Error, Result};
use crate::types::SwitchingMode;
use serde::{Deserialize, Serialize};

/// Configuration shared by track dispatchers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Switching mode published when no lock restricts the choice
    pub unlocked_switching_mode: SwitchingMode,
    /// Flag an adaptation as unsupported when none of its
    /// representations is playable anymore
    pub mark_unsupported_adaptations: bool,
    /// Honor trick-mode alternate adaptations when a track setting asks for them
    pub trick_mode_tracks: bool,
    /// Log every committed choice at info level
    pub log_decisions: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            unlocked_switching_mode: SwitchingMode::Lazy,
            mark_unsupported_adaptations: true,
            trick_mode_tracks: true,
            log_decisions: true,
        }
    }
}

impl DispatcherConfig {
    /// Parse and validate a JSON configuration. Missing fields keep their default.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Relaxing a lock never requires evicting buffered content, so the
    /// unlocked mode must be one that keeps it.
    pub fn validate(&self) -> Result<()> {
        match self.unlocked_switching_mode {
            SwitchingMode::Lazy | SwitchingMode::Seamless => Ok(()),
            other => Err(Error::InvalidConfig(format!(
                "unlocked_switching_mode cannot be \"{}\"",
                other
            ))),
        }
    }
}
