//! Track Dispatcher - per-period, per-type track reconciliation
//!
//! One [`TrackDispatcher`] exists per (Period, track type). It receives track
//! preferences ([`TrackSetting`]) and turns them, together with manifest
//! refreshes and decipherability changes, into the single value the stream
//! pipeline follows: a [`TrackChoice`] on the outward reference.
//!
//! # Re-entrancy
//!
//! Committing a choice runs user code (event listeners, reference
//! subscribers) synchronously. That code may call back into the dispatcher
//! before the first call returned. Every `start` / `update_track` call takes
//! a new generation number when it begins and only commits if it is still
//! the latest one at commit time, so within a re-entrant chain only the last
//! call to start publishes and no stale choice ever reaches the outward
//! reference.
//!
//! ```text
//!  update_track(A) ──► build A's representations ──► event listener
//!        │                                                │
//!        │                                   update_track(B) ──► commit B
//!        ▼
//!  generation moved on: A is not committed
//! ```
//!
//! The same holds when an outward subscriber reacts to choice A by asking
//! for B. Delivery is depth-first, so B reaches every subscriber while A is
//! still being delivered. Subscribers registered after the one that asked
//! for B then receive A last, after B. The reference value is B either way:
//! read it with `get_value()` rather than trusting the last delivery.

mod choice;
mod selection;

pub use choice::{
    AdaptationChoice, LockedRepresentations, RepresentationsChoice, TrackChoice, TrackSetting,
};
pub use selection::{has_same_representations, playable_subset, sort_by_bitrate};

use crate::cancellation::{CancellationError, CancellationSignal, TaskCanceller};
use crate::config::DispatcherConfig;
use crate::error::{Error, Result};
use crate::events::{EventListeners, ListenerId};
use crate::manifest::{Adaptation, Manifest};
use crate::reference::{ReadOnlyReference, SharedReference, UpdateOptions};
use crate::types::{DispatcherId, DispatcherState, SwitchingMode};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, error, info, instrument, trace, warn};

/// What was last pushed on the outward reference
enum LastEmitted {
    Nothing,
    NoTrack,
    Track {
        adaptation: Rc<Adaptation>,
        switching_mode: SwitchingMode,
        locked_representations: Option<LockedRepresentations>,
    },
}

impl LastEmitted {
    fn describe(&self) -> String {
        match self {
            LastEmitted::Nothing => "nothing".to_string(),
            LastEmitted::NoTrack => "no track".to_string(),
            LastEmitted::Track {
                adaptation,
                switching_mode,
                locked_representations,
            } => format!(
                "{} ({}, {})",
                adaptation.id(),
                switching_mode,
                match locked_representations {
                    Some(lock) => format!("{} locked", lock.representations.len()),
                    None => "unlocked".to_string(),
                }
            ),
        }
    }
}

#[derive(Default)]
struct DispatcherEvents {
    no_playable_locked_representation: EventListeners<()>,
    no_playable_representation: EventListeners<()>,
}

struct Inner {
    id: DispatcherId,
    manifest: Rc<Manifest>,
    outward: SharedReference<TrackChoice>,
    config: DispatcherConfig,
    /// Owns every listener installed for the current choice
    canceller: RefCell<TaskCanceller>,
    /// Bumped by every `start`, `update_track` and `dispose` call
    generation: Cell<u64>,
    last_emitted: RefCell<LastEmitted>,
    disposed: Cell<bool>,
    events: Rc<DispatcherEvents>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.canceller.get_mut().cancel();
    }
}

/// Track reconciler for one (Period, track type) pair
///
/// Cloning gives another handle to the same dispatcher. See the module docs
/// for the delivery order seen by outward subscribers when a subscriber
/// re-enters.
#[derive(Clone)]
pub struct TrackDispatcher {
    inner: Rc<Inner>,
}

impl TrackDispatcher {
    /// Create a dispatcher publishing on `outward`
    pub fn new(manifest: Rc<Manifest>, outward: SharedReference<TrackChoice>) -> Self {
        Self::with_config(manifest, outward, DispatcherConfig::default())
    }

    pub fn with_config(
        manifest: Rc<Manifest>,
        outward: SharedReference<TrackChoice>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                id: DispatcherId::new(),
                manifest,
                outward,
                config,
                canceller: RefCell::new(TaskCanceller::new()),
                generation: Cell::new(0),
                last_emitted: RefCell::new(LastEmitted::Nothing),
                disposed: Cell::new(false),
                events: Rc::new(DispatcherEvents::default()),
            }),
        }
    }

    pub fn id(&self) -> DispatcherId {
        self.inner.id
    }

    pub fn state(&self) -> DispatcherState {
        if self.inner.disposed.get() {
            return DispatcherState::Disposed;
        }
        match *self.inner.last_emitted.borrow() {
            LastEmitted::Track { .. } => DispatcherState::Active,
            LastEmitted::Nothing | LastEmitted::NoTrack => DispatcherState::Idle,
        }
    }

    /// Current value of the outward reference
    pub fn current_choice(&self) -> TrackChoice {
        self.inner.outward.get_value()
    }

    /// Called when every locked representation became unplayable. The
    /// previous choice is kept.
    pub fn on_no_playable_locked_representation(
        &self,
        listener: impl Fn() + 'static,
    ) -> ListenerId {
        self.inner
            .events
            .no_playable_locked_representation
            .add(move |_| listener())
    }

    /// Called when the chosen adaptation has no playable representation
    /// left. The previous choice is kept.
    pub fn on_no_playable_representation(&self, listener: impl Fn() + 'static) -> ListenerId {
        self.inner
            .events
            .no_playable_representation
            .add(move |_| listener())
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let events = &self.inner.events;
        events.no_playable_locked_representation.remove(id)
            || events.no_playable_representation.remove(id)
    }

    /// First commit. `None` publishes "no track".
    #[instrument(skip_all, fields(dispatcher = %self.inner.id))]
    pub fn start(&self, setting: Option<TrackSetting>) -> Result<()> {
        self.ensure_live()?;
        // The initial choice has no resuming position to forward.
        self.commit(setting, None)
    }

    /// Replace the current track preference.
    ///
    /// Listeners installed for the previous choice are detached before
    /// anything else happens. Disabling an already disabled track is a no-op.
    #[instrument(skip_all, fields(dispatcher = %self.inner.id))]
    pub fn update_track(&self, setting: Option<TrackSetting>) -> Result<()> {
        self.ensure_live()?;
        if setting.is_none() && matches!(*self.inner.last_emitted.borrow(), LastEmitted::NoTrack) {
            trace!("Track already disabled");
            return Ok(());
        }
        let position = setting.as_ref().and_then(|s| s.relative_resuming_position);
        self.commit(setting, position)
    }

    /// Stop for good: detach every listener and finish the outward reference.
    pub fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.replace(true) {
            return;
        }
        inner.generation.set(inner.generation.get() + 1);
        let canceller = inner.canceller.replace(TaskCanceller::new());
        canceller.cancel_with(CancellationError::new("dispatcher disposed"));
        inner.events.no_playable_locked_representation.clear();
        inner.events.no_playable_representation.clear();
        inner.outward.finish();
        debug!(dispatcher = %inner.id, "Track dispatcher disposed");
    }

    fn ensure_live(&self) -> Result<()> {
        if self.inner.disposed.get() {
            let err = Error::DispatcherDisposed;
            error!(
                dispatcher = %self.inner.id,
                code = err.error_code(),
                "Track dispatcher used after dispose"
            );
            return Err(err);
        }
        Ok(())
    }

    fn is_latest(&self, generation: u64) -> bool {
        !self.inner.disposed.get() && self.inner.generation.get() == generation
    }

    fn commit(
        &self,
        setting: Option<TrackSetting>,
        relative_resuming_position: Option<f64>,
    ) -> Result<()> {
        let inner = &self.inner;
        let generation = inner.generation.get() + 1;
        inner.generation.set(generation);

        let canceller = TaskCanceller::new();
        let signal = canceller.signal();
        let previous = inner.canceller.replace(canceller);
        previous.cancel_with(CancellationError::new("track updated"));

        let Some(setting) = setting else {
            if !self.is_latest(generation) {
                return Ok(());
            }
            let previous =
                std::mem::replace(&mut *inner.last_emitted.borrow_mut(), LastEmitted::NoTrack);
            if inner.config.log_decisions {
                info!(previous = %previous.describe(), "Track disabled");
            }
            inner.outward.set_value(TrackChoice::NoTrack);
            return Ok(());
        };

        let (representations, is_trick_mode_track) =
            self.build_representations_choice(&setting, &signal);
        if !self.is_latest(generation) {
            debug!(
                adaptation = setting.adaptation.id(),
                "Superseded by a re-entrant update, not committing"
            );
            return Ok(());
        }

        let snapshot = LastEmitted::Track {
            adaptation: setting.adaptation.clone(),
            switching_mode: setting.switching_mode,
            locked_representations: setting.locked_representations.get_value(),
        };
        let previous = std::mem::replace(&mut *inner.last_emitted.borrow_mut(), snapshot);
        if inner.config.log_decisions {
            let chosen = representations.get_value();
            let chosen = chosen.ids();
            info!(
                previous = %previous.describe(),
                adaptation = setting.adaptation.id(),
                switching_mode = %setting.switching_mode,
                representations = ?chosen,
                trick_mode = is_trick_mode_track,
                "Track committed"
            );
        }
        inner.outward.set_value(TrackChoice::Track(AdaptationChoice {
            adaptation: setting.adaptation,
            switching_mode: setting.switching_mode,
            representations,
            relative_resuming_position,
            is_trick_mode_track,
        }));
        Ok(())
    }

    /// Build the representations reference of `setting` and keep it up to
    /// date until `signal` is cancelled.
    fn build_representations_choice(
        &self,
        setting: &TrackSetting,
        signal: &CancellationSignal,
    ) -> (ReadOnlyReference<RepresentationsChoice>, bool) {
        let inner = &self.inner;
        let trick_mode_track = if setting.trick_mode_enabled && inner.config.trick_mode_tracks {
            setting.adaptation.trick_mode_tracks().first().cloned()
        } else {
            None
        };
        let is_trick_mode_track = trick_mode_track.is_some();
        // Locks name representations of the main adaptation, they cannot
        // apply to its trick-mode alternate.
        let locked = if is_trick_mode_track {
            ReadOnlyReference::constant(None)
        } else {
            setting.locked_representations.clone()
        };
        let source = trick_mode_track.unwrap_or_else(|| setting.adaptation.clone());

        let reference =
            SharedReference::with_finish_signal(RepresentationsChoice::default(), signal);
        let recompute: Rc<dyn Fn()> = {
            let reference = reference.clone();
            let locked = locked.clone();
            let events = inner.events.clone();
            let config = inner.config.clone();
            Rc::new(move || {
                update_representations_choice(&reference, &source, &locked, &events, &config)
            })
        };

        let manifest = &inner.manifest;
        let on_decipherability = {
            let recompute = recompute.clone();
            manifest.on_decipherability_update(move |_| recompute())
        };
        let on_manifest = {
            let recompute = recompute.clone();
            manifest.on_manifest_update(move |_| recompute())
        };
        let weak_manifest = Rc::downgrade(manifest);
        signal.register(move || {
            if let Some(manifest) = weak_manifest.upgrade() {
                manifest.remove_listener(on_decipherability);
                manifest.remove_listener(on_manifest);
            }
        });
        {
            let recompute = recompute.clone();
            locked.on_update(move |_| recompute(), UpdateOptions::default().clear_signal(signal));
        }

        recompute();
        (reference.read_only(), is_trick_mode_track)
    }
}

/// Recompute the representations choice of `adaptation`, publishing only
/// when the selected ids changed.
fn update_representations_choice(
    reference: &SharedReference<RepresentationsChoice>,
    adaptation: &Adaptation,
    locked: &ReadOnlyReference<Option<LockedRepresentations>>,
    events: &DispatcherEvents,
    config: &DispatcherConfig,
) {
    if reference.is_finished() {
        return;
    }

    let (candidates, switching_mode) = match locked.get_value() {
        // Relaxing a lock never requires evicting what is buffered.
        None => (adaptation.playable_representations(), config.unlocked_switching_mode),
        Some(lock) => {
            let playable = playable_subset(&lock.representations);
            if playable.is_empty() {
                warn!(
                    adaptation = adaptation.id(),
                    locked = lock.representations.len(),
                    "No playable locked representation, keeping previous choice"
                );
                events.no_playable_locked_representation.emit(&());
                return;
            }
            (playable, lock.switching_mode)
        }
    };

    if candidates.is_empty() {
        if config.mark_unsupported_adaptations {
            adaptation.set_supported(false);
        }
        warn!(
            adaptation = adaptation.id(),
            "No playable representation, keeping previous choice"
        );
        events.no_playable_representation.emit(&());
        return;
    }

    let sorted = sort_by_bitrate(candidates);
    if reference.with_value(|current| has_same_representations(&current.representations, &sorted)) {
        trace!(adaptation = adaptation.id(), "Representations unchanged");
        return;
    }

    let ids: Vec<&str> = sorted.iter().map(|r| r.id()).collect();
    debug!(
        adaptation = adaptation.id(),
        representations = ?ids,
        switching_mode = %switching_mode,
        "Representations choice updated"
    );
    reference.set_value(RepresentationsChoice {
        representations: sorted,
        switching_mode,
    });
}

impl std::fmt::Debug for TrackDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackDispatcher")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("last_emitted", &self.inner.last_emitted.borrow().describe())
            .finish()
    }
}
