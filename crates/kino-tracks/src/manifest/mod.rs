//! Manifest tree and its event surface
//!
//! The tree (periods, adaptations, representations) is produced by a parser
//! and refreshed by a manifest-refresh collaborator, neither of which live in
//! this crate. What lives here is the shape every dispatcher reads plus the
//! two notifications they react to:
//!
//! - `manifestUpdate`: the tree was refreshed ([`Manifest::update`])
//! - `decipherabilityUpdate`: some representations changed decipherability
//!   ([`Manifest::update_representations_decipherability`])
//!
//! Both are emitted only after the mutation is fully applied.

mod adaptation;
mod description;
mod period;
mod representation;

pub use adaptation::Adaptation;
pub use description::{
    AdaptationDescription, ManifestDescription, PeriodDescription, RepresentationDescription,
};
pub use period::Period;
pub use representation::Representation;

use crate::events::{EventListeners, ListenerId};
use crate::Result;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// Payload of `manifestUpdate`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestUpdate {
    pub updated_periods: Vec<String>,
    pub added_periods: Vec<String>,
    pub removed_periods: Vec<String>,
}

/// One entry of a `decipherabilityUpdate` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecipherabilityUpdate {
    pub period_id: String,
    pub adaptation_id: String,
    pub representation_id: String,
    pub decipherable: Option<bool>,
}

/// Parsed manifest shared by every dispatcher of a content
pub struct Manifest {
    periods: RefCell<Vec<Rc<Period>>>,
    manifest_update: EventListeners<ManifestUpdate>,
    decipherability_update: EventListeners<[DecipherabilityUpdate]>,
}

impl Manifest {
    pub fn new(periods: Vec<Period>) -> Self {
        let mut periods: Vec<Rc<Period>> = periods.into_iter().map(Rc::new).collect();
        periods.sort_by(|a, b| a.start().total_cmp(&b.start()));
        Self {
            periods: RefCell::new(periods),
            manifest_update: EventListeners::new(),
            decipherability_update: EventListeners::new(),
        }
    }

    /// Build a manifest from a serde description
    pub fn from_description(description: ManifestDescription) -> Result<Self> {
        Ok(Self::new(description.into_periods()?))
    }

    /// Build a manifest from its JSON description
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_description(serde_json::from_str(json)?)
    }

    /// Periods in chronological order
    pub fn periods(&self) -> Vec<Rc<Period>> {
        self.periods.borrow().clone()
    }

    pub fn get_period(&self, id: &str) -> Option<Rc<Period>> {
        self.periods.borrow().iter().find(|p| p.id() == id).cloned()
    }

    /// Period containing `time` (seconds)
    pub fn get_period_for_time(&self, time: f64) -> Option<Rc<Period>> {
        self.periods
            .borrow()
            .iter()
            .find(|p| p.start() <= time && p.end().map_or(true, |end| time < end))
            .cloned()
    }

    pub fn on_manifest_update(&self, listener: impl Fn(&ManifestUpdate) + 'static) -> ListenerId {
        self.manifest_update.add(listener)
    }

    pub fn on_decipherability_update(
        &self,
        listener: impl Fn(&[DecipherabilityUpdate]) + 'static,
    ) -> ListenerId {
        self.decipherability_update.add(listener)
    }

    /// Remove a listener added with either `on_*` method
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.manifest_update.remove(id) || self.decipherability_update.remove(id)
    }

    /// Total number of registered listeners, both events included
    pub fn listener_count(&self) -> usize {
        self.manifest_update.len() + self.decipherability_update.len()
    }

    /// Re-evaluate decipherability of every representation.
    ///
    /// `decide` returns the new state for a representation. Changed entries
    /// are collected and, if there are any, emitted as one
    /// `decipherabilityUpdate` once every change is applied.
    pub fn update_representations_decipherability(
        &self,
        decide: impl Fn(&Representation) -> Option<bool>,
    ) -> Vec<DecipherabilityUpdate> {
        let mut updates = Vec::new();
        for period in self.periods() {
            for adaptation in period.adaptations() {
                let trick_tracks = adaptation.trick_mode_tracks().to_vec();
                for track in std::iter::once(adaptation).chain(trick_tracks) {
                    for repr in track.representations() {
                        let decipherable = decide(&repr);
                        if decipherable != repr.decipherable() {
                            repr.set_decipherable(decipherable);
                            updates.push(DecipherabilityUpdate {
                                period_id: period.id().to_string(),
                                adaptation_id: track.id().to_string(),
                                representation_id: repr.id().to_string(),
                                decipherable,
                            });
                        }
                    }
                }
            }
        }

        if !updates.is_empty() {
            debug!(changed = updates.len(), "Representations decipherability updated");
            self.decipherability_update.emit(&updates);
        }
        updates
    }

    /// Merge a refreshed list of periods into this manifest.
    ///
    /// Periods, adaptations and representations whose id is already known
    /// keep their object. `manifestUpdate` is emitted after the merge.
    pub fn update(&self, refreshed: Vec<Period>) -> ManifestUpdate {
        let result = {
            let mut current = self.periods.borrow_mut();
            let mut result = ManifestUpdate::default();
            let mut next: Vec<Rc<Period>> = Vec::with_capacity(refreshed.len());

            for period in refreshed {
                match current.iter().find(|p| p.id() == period.id()) {
                    Some(existing) => {
                        let (added, removed) = existing.merge(&period);
                        if !added.is_empty() || !removed.is_empty() {
                            debug!(
                                period = period.id(),
                                added = ?added,
                                removed = ?removed,
                                "Representations merged"
                            );
                        }
                        result.updated_periods.push(period.id().to_string());
                        next.push(existing.clone());
                    }
                    None => {
                        result.added_periods.push(period.id().to_string());
                        next.push(Rc::new(period));
                    }
                }
            }
            result.removed_periods = current
                .iter()
                .filter(|p| !next.iter().any(|n| n.id() == p.id()))
                .map(|p| p.id().to_string())
                .collect();

            next.sort_by(|a, b| a.start().total_cmp(&b.start()));
            *current = next;
            result
        };

        debug!(
            updated = result.updated_periods.len(),
            added = result.added_periods.len(),
            removed = result.removed_periods.len(),
            "Manifest updated"
        );
        self.manifest_update.emit(&result);
        result
    }
}

impl std::fmt::Debug for Manifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manifest")
            .field("periods", &self.periods.borrow().len())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrackType;
    use std::cell::Cell;

    fn sample_period(id: &str, start: f64, representations: Vec<Representation>) -> Period {
        Period::new(
            id,
            start,
            Some(start + 30.0),
            vec![Adaptation::new("video", TrackType::Video, representations)],
        )
    }

    #[test]
    fn test_periods_sorted_by_start() {
        let manifest = Manifest::new(vec![
            sample_period("late", 30.0, vec![]),
            sample_period("early", 0.0, vec![]),
        ]);
        let ids: Vec<_> = manifest.periods().iter().map(|p| p.id().to_string()).collect();
        assert_eq!(ids, vec!["early", "late"]);
        assert_eq!(manifest.get_period_for_time(45.0).unwrap().id(), "late");
        assert!(manifest.get_period_for_time(75.0).is_none());
    }

    #[test]
    fn test_decipherability_update_emits_changes_only() {
        let manifest = Manifest::new(vec![sample_period(
            "p1",
            0.0,
            vec![Representation::new("v1", 1_000), Representation::new("v2", 2_000)],
        )]);
        let received = Rc::new(Cell::new(0));
        let count = received.clone();
        manifest.on_decipherability_update(move |updates| count.set(count.get() + updates.len()));

        let updates = manifest.update_representations_decipherability(|r| {
            if r.id() == "v1" {
                Some(false)
            } else {
                r.decipherable()
            }
        });
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].representation_id, "v1");
        assert_eq!(received.get(), 1);

        // Nothing changes the second time: no event.
        manifest.update_representations_decipherability(|r| r.decipherable());
        assert_eq!(received.get(), 1);
    }

    #[test]
    fn test_mutation_visible_before_event() {
        let manifest = Rc::new(Manifest::new(vec![sample_period(
            "p1",
            0.0,
            vec![Representation::new("v1", 1_000)],
        )]));
        let seen_playable = Rc::new(Cell::new(None));
        let observer = manifest.clone();
        let seen = seen_playable.clone();
        manifest.on_decipherability_update(move |_| {
            let repr = observer
                .get_period("p1")
                .unwrap()
                .get_representation("video", "v1")
                .unwrap();
            seen.set(Some(repr.is_playable()));
        });

        manifest.update_representations_decipherability(|_| Some(false));

        assert_eq!(seen_playable.get(), Some(false));
    }

    #[test]
    fn test_update_reports_period_changes() {
        let manifest = Manifest::new(vec![
            sample_period("p1", 0.0, vec![Representation::new("v1", 1_000)]),
            sample_period("p2", 30.0, vec![]),
        ]);
        let last = Rc::new(RefCell::new(None));
        let sink = last.clone();
        manifest.on_manifest_update(move |update| *sink.borrow_mut() = Some(update.clone()));

        let result = manifest.update(vec![
            sample_period(
                "p1",
                0.0,
                vec![Representation::new("v1", 1_000), Representation::new("v2", 2_000)],
            ),
            sample_period("p3", 60.0, vec![]),
        ]);

        assert_eq!(result.updated_periods, vec!["p1"]);
        assert_eq!(result.added_periods, vec!["p3"]);
        assert_eq!(result.removed_periods, vec!["p2"]);
        assert_eq!(last.borrow().as_ref(), Some(&result));
        let video = manifest.get_period("p1").unwrap().get_adaptation("video").unwrap();
        assert_eq!(video.representations().len(), 2);
    }

    #[test]
    fn test_remove_listener() {
        let manifest = Manifest::new(vec![]);
        let a = manifest.on_manifest_update(|_| {});
        let b = manifest.on_decipherability_update(|_| {});
        assert_eq!(manifest.listener_count(), 2);

        assert!(manifest.remove_listener(a));
        assert!(manifest.remove_listener(b));
        assert!(!manifest.remove_listener(a));
        assert_eq!(manifest.listener_count(), 0);
    }
}
