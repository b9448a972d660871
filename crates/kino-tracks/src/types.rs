//! Core types for Kino Tracks

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a track dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DispatcherId(pub Uuid);

impl DispatcherId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DispatcherId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DispatcherId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Media type of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Audio,
    Video,
    Text,
}

impl TrackType {
    pub const ALL: [TrackType; 3] = [TrackType::Audio, TrackType::Video, TrackType::Text];
}

impl std::fmt::Display for TrackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackType::Audio => write!(f, "audio"),
            TrackType::Video => write!(f, "video"),
            TrackType::Text => write!(f, "text"),
        }
    }
}

/// How abruptly a track or representation change takes effect relative to
/// content that is already buffered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchingMode {
    /// Keep buffered content, switch on the next segments
    Seamless,
    /// Keep buffered content and only switch once it runs out
    #[default]
    Lazy,
    /// Evict buffered content of the previous choice right away
    Direct,
    /// Reload the media element to apply the change
    Reload,
}

impl std::fmt::Display for SwitchingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitchingMode::Seamless => write!(f, "seamless"),
            SwitchingMode::Lazy => write!(f, "lazy"),
            SwitchingMode::Direct => write!(f, "direct"),
            SwitchingMode::Reload => write!(f, "reload"),
        }
    }
}

/// Lifecycle state of a track dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatcherState {
    /// Never started, or the last committed preference was "no track"
    Idle,
    /// A track is committed and its representation choice is live
    Active,
    /// Terminal
    Disposed,
}

impl std::fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatcherState::Idle => write!(f, "idle"),
            DispatcherState::Active => write!(f, "active"),
            DispatcherState::Disposed => write!(f, "disposed"),
        }
    }
}
