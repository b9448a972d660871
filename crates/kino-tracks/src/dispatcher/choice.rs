//! Track settings (input) and choices (output) of a dispatcher

use crate::error::Result;
use crate::manifest::{Adaptation, Representation};
use crate::reference::ReadOnlyReference;
use crate::types::SwitchingMode;
use std::rc::Rc;

/// Restriction of the playable set to an explicit subset
#[derive(Debug, Clone)]
pub struct LockedRepresentations {
    pub representations: Vec<Rc<Representation>>,
    pub switching_mode: SwitchingMode,
}

impl LockedRepresentations {
    pub fn new(representations: Vec<Rc<Representation>>, switching_mode: SwitchingMode) -> Self {
        Self {
            representations,
            switching_mode,
        }
    }

    /// Lock the representations of `adaptation` named by `ids`
    pub fn from_ids(
        adaptation: &Adaptation,
        ids: &[&str],
        switching_mode: SwitchingMode,
    ) -> Result<Self> {
        Ok(Self::new(adaptation.require_representations(ids)?, switching_mode))
    }
}

/// Track preference pushed into a dispatcher
#[derive(Debug, Clone)]
pub struct TrackSetting {
    pub adaptation: Rc<Adaptation>,
    pub switching_mode: SwitchingMode,
    /// `None` means every playable representation may be used
    pub locked_representations: ReadOnlyReference<Option<LockedRepresentations>>,
    /// Opaque, forwarded as-is to the outward choice
    pub relative_resuming_position: Option<f64>,
    /// Play the adaptation's first trick-mode track instead, if it has one
    pub trick_mode_enabled: bool,
}

impl TrackSetting {
    /// Unlocked setting for `adaptation`
    pub fn new(adaptation: Rc<Adaptation>, switching_mode: SwitchingMode) -> Self {
        Self {
            adaptation,
            switching_mode,
            locked_representations: ReadOnlyReference::constant(None),
            relative_resuming_position: None,
            trick_mode_enabled: false,
        }
    }

    pub fn with_locked_representations(
        mut self,
        locked: ReadOnlyReference<Option<LockedRepresentations>>,
    ) -> Self {
        self.locked_representations = locked;
        self
    }

    pub fn with_relative_resuming_position(mut self, position: f64) -> Self {
        self.relative_resuming_position = Some(position);
        self
    }

    pub fn with_trick_mode(mut self, enabled: bool) -> Self {
        self.trick_mode_enabled = enabled;
        self
    }
}

/// Representations the stream pipeline may currently build buffers for
#[derive(Debug, Clone)]
pub struct RepresentationsChoice {
    /// Ascending bitrate
    pub representations: Vec<Rc<Representation>>,
    pub switching_mode: SwitchingMode,
}

impl RepresentationsChoice {
    pub fn ids(&self) -> Vec<&str> {
        self.representations.iter().map(|r| r.id()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.representations.is_empty()
    }
}

impl Default for RepresentationsChoice {
    fn default() -> Self {
        Self {
            representations: Vec::new(),
            switching_mode: SwitchingMode::Lazy,
        }
    }
}

/// Committed track of a dispatcher
#[derive(Debug, Clone)]
pub struct AdaptationChoice {
    pub adaptation: Rc<Adaptation>,
    pub switching_mode: SwitchingMode,
    pub representations: ReadOnlyReference<RepresentationsChoice>,
    pub relative_resuming_position: Option<f64>,
    /// Representations come from a trick-mode alternate of `adaptation`
    pub is_trick_mode_track: bool,
}

/// Value of a dispatcher's outward reference
#[derive(Debug, Clone, Default)]
pub enum TrackChoice {
    /// Nothing decided yet
    #[default]
    Undecided,
    /// No track of this type is wanted
    NoTrack,
    Track(AdaptationChoice),
}

impl TrackChoice {
    pub fn is_undecided(&self) -> bool {
        matches!(self, TrackChoice::Undecided)
    }

    pub fn as_track(&self) -> Option<&AdaptationChoice> {
        match self {
            TrackChoice::Track(choice) => Some(choice),
            _ => None,
        }
    }

    /// Id of the chosen adaptation, if any
    pub fn adaptation_id(&self) -> Option<&str> {
        self.as_track().map(|choice| choice.adaptation.id())
    }
}
