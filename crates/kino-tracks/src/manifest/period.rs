//! Period - a contiguous time range of the presentation

use super::{Adaptation, Representation};
use crate::error::{Error, Result};
use crate::types::TrackType;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug)]
pub struct Period {
    id: String,
    /// Start time in seconds
    start: f64,
    /// End time in seconds, `None` while unknown (live)
    end: Option<f64>,
    adaptations: RefCell<Vec<Rc<Adaptation>>>,
}

impl Period {
    pub fn new(
        id: impl Into<String>,
        start: f64,
        end: Option<f64>,
        adaptations: Vec<Adaptation>,
    ) -> Self {
        Self {
            id: id.into(),
            start,
            end,
            adaptations: RefCell::new(adaptations.into_iter().map(Rc::new).collect()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> Option<f64> {
        self.end
    }

    pub fn adaptations(&self) -> Vec<Rc<Adaptation>> {
        self.adaptations.borrow().clone()
    }

    pub fn adaptations_for(&self, track_type: TrackType) -> Vec<Rc<Adaptation>> {
        self.adaptations
            .borrow()
            .iter()
            .filter(|a| a.track_type() == track_type)
            .cloned()
            .collect()
    }

    pub fn get_adaptation(&self, id: &str) -> Option<Rc<Adaptation>> {
        self.adaptations.borrow().iter().find(|a| a.id() == id).cloned()
    }

    pub fn require_adaptation(&self, id: &str) -> Result<Rc<Adaptation>> {
        self.get_adaptation(id)
            .ok_or_else(|| Error::UnknownAdaptation(format!("{} in period {}", id, self.id)))
    }

    /// Look up a representation anywhere in this period
    pub fn get_representation(
        &self,
        adaptation_id: &str,
        representation_id: &str,
    ) -> Option<Rc<Representation>> {
        self.get_adaptation(adaptation_id)?.get_representation(representation_id)
    }

    /// Merge a refreshed version of this period in place.
    ///
    /// Known adaptations keep their object and get their representation list
    /// merged; new ones are appended; missing ones are dropped.
    ///
    /// Returns the ids of the representations added to and removed from
    /// known adaptations.
    pub(crate) fn merge(&self, refreshed: &Period) -> (Vec<String>, Vec<String>) {
        let mut current = self.adaptations.borrow_mut();
        let mut added = Vec::new();
        let mut removed = Vec::new();
        let merged: Vec<Rc<Adaptation>> = refreshed
            .adaptations()
            .into_iter()
            .map(|adaptation| match current.iter().find(|a| a.id() == adaptation.id()) {
                Some(existing) => {
                    let (new_ids, gone_ids) =
                        existing.merge_representations(adaptation.representations());
                    added.extend(new_ids);
                    removed.extend(gone_ids);
                    existing.clone()
                }
                None => adaptation,
            })
            .collect();
        *current = merged;
        (added, removed)
    }
}
