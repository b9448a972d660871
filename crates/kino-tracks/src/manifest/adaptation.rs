//! Adaptation - a switchable group of representations

use super::Representation;
use crate::error::{Error, Result};
use crate::types::TrackType;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Mutually-exclusive representations of one track type
#[derive(Debug)]
pub struct Adaptation {
    id: String,
    track_type: TrackType,
    language: Option<String>,
    representations: RefCell<Vec<Rc<Representation>>>,
    /// Cleared when none of the representations is playable anymore
    is_supported: Cell<bool>,
    trick_mode_tracks: Vec<Rc<Adaptation>>,
}

impl Adaptation {
    pub fn new(
        id: impl Into<String>,
        track_type: TrackType,
        representations: Vec<Representation>,
    ) -> Self {
        Self {
            id: id.into(),
            track_type,
            language: None,
            representations: RefCell::new(representations.into_iter().map(Rc::new).collect()),
            is_supported: Cell::new(true),
            trick_mode_tracks: Vec::new(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_trick_mode_tracks(mut self, tracks: Vec<Adaptation>) -> Self {
        self.trick_mode_tracks = tracks.into_iter().map(Rc::new).collect();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn track_type(&self) -> TrackType {
        self.track_type
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// All representations, in manifest order
    pub fn representations(&self) -> Vec<Rc<Representation>> {
        self.representations.borrow().clone()
    }

    /// Representations the client can currently play, in manifest order
    pub fn playable_representations(&self) -> Vec<Rc<Representation>> {
        self.representations
            .borrow()
            .iter()
            .filter(|r| r.is_playable())
            .cloned()
            .collect()
    }

    pub fn get_representation(&self, id: &str) -> Option<Rc<Representation>> {
        self.representations
            .borrow()
            .iter()
            .find(|r| r.id() == id)
            .cloned()
    }

    /// Resolve representation ids, in the order given.
    pub fn require_representations(&self, ids: &[&str]) -> Result<Vec<Rc<Representation>>> {
        ids.iter()
            .map(|id| {
                self.get_representation(id).ok_or_else(|| {
                    Error::UnknownRepresentation(format!("{} in adaptation {}", id, self.id))
                })
            })
            .collect()
    }

    pub fn is_supported(&self) -> bool {
        self.is_supported.get()
    }

    pub fn set_supported(&self, supported: bool) {
        self.is_supported.set(supported);
    }

    /// Alternate adaptations meant for fast-forward / rewind playback
    pub fn trick_mode_tracks(&self) -> &[Rc<Adaptation>] {
        &self.trick_mode_tracks
    }

    /// Swap in a refreshed representation list.
    ///
    /// Representations whose id was already known keep their existing
    /// object, so references held elsewhere (locks, choices) stay valid.
    /// Returns the ids of added and removed representations.
    pub(crate) fn merge_representations(
        &self,
        refreshed: Vec<Rc<Representation>>,
    ) -> (Vec<String>, Vec<String>) {
        let mut current = self.representations.borrow_mut();
        let mut added = Vec::new();
        let merged: Vec<Rc<Representation>> = refreshed
            .into_iter()
            .map(|repr| match current.iter().find(|r| r.id() == repr.id()) {
                Some(existing) => existing.clone(),
                None => {
                    added.push(repr.id().to_string());
                    repr
                }
            })
            .collect();
        let removed = current
            .iter()
            .filter(|r| !merged.iter().any(|m| m.id() == r.id()))
            .map(|r| r.id().to_string())
            .collect();
        *current = merged;
        (added, removed)
    }
}
