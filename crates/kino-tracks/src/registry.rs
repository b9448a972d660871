//! Dispatcher registry - one dispatcher per (Period, track type)
//!
//! The registry creates dispatchers on demand, routes track updates to them
//! and disposes them when their period goes away, either explicitly or
//! because a manifest refresh removed it.

use crate::config::DispatcherConfig;
use crate::dispatcher::{TrackChoice, TrackDispatcher, TrackSetting};
use crate::error::{Error, Result};
use crate::events::ListenerId;
use crate::manifest::Manifest;
use crate::reference::{ReadOnlyReference, SharedReference};
use crate::types::{SwitchingMode, TrackType};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, info};

type Key = (String, TrackType);

struct Entry {
    dispatcher: TrackDispatcher,
    choice: ReadOnlyReference<TrackChoice>,
}

type Entries = Rc<RefCell<HashMap<Key, Entry>>>;

pub struct DispatcherRegistry {
    manifest: Rc<Manifest>,
    config: DispatcherConfig,
    entries: Entries,
    manifest_listener: ListenerId,
}

impl DispatcherRegistry {
    pub fn new(manifest: Rc<Manifest>, config: DispatcherConfig) -> Self {
        let entries: Entries = Rc::new(RefCell::new(HashMap::new()));
        let weak_entries = Rc::downgrade(&entries);
        let manifest_listener = manifest.on_manifest_update(move |update| {
            let Some(entries) = weak_entries.upgrade() else {
                return;
            };
            for period_id in &update.removed_periods {
                let disposed = dispose_period(&entries, period_id);
                if disposed > 0 {
                    info!(period = %period_id, disposed, "Period removed from manifest");
                }
            }
        });

        Self {
            manifest,
            config,
            entries,
            manifest_listener,
        }
    }

    /// Outward reference of the dispatcher for `(period_id, track_type)`,
    /// creating the dispatcher if needed.
    ///
    /// A new reference starts as [`TrackChoice::Undecided`].
    pub fn get_or_create(
        &self,
        period_id: &str,
        track_type: TrackType,
    ) -> Result<ReadOnlyReference<TrackChoice>> {
        if self.manifest.get_period(period_id).is_none() {
            return Err(Error::UnknownPeriod(period_id.to_string()));
        }
        let key = (period_id.to_string(), track_type);
        if let Some(entry) = self.entries.borrow().get(&key) {
            return Ok(entry.choice.clone());
        }

        let outward = SharedReference::new(TrackChoice::Undecided);
        let dispatcher = TrackDispatcher::with_config(
            self.manifest.clone(),
            outward.clone(),
            self.config.clone(),
        );
        debug!(
            period = period_id,
            track_type = %track_type,
            dispatcher = %dispatcher.id(),
            "Dispatcher created"
        );
        let choice = outward.read_only();
        self.entries.borrow_mut().insert(
            key,
            Entry {
                dispatcher,
                choice: choice.clone(),
            },
        );
        Ok(choice)
    }

    pub fn dispatcher(&self, period_id: &str, track_type: TrackType) -> Option<TrackDispatcher> {
        self.entries
            .borrow()
            .get(&(period_id.to_string(), track_type))
            .map(|entry| entry.dispatcher.clone())
    }

    /// Unlocked setting for an adaptation named by id
    pub fn track_setting(
        &self,
        period_id: &str,
        adaptation_id: &str,
        switching_mode: SwitchingMode,
    ) -> Result<TrackSetting> {
        let period = self
            .manifest
            .get_period(period_id)
            .ok_or_else(|| Error::UnknownPeriod(period_id.to_string()))?;
        let adaptation = period.require_adaptation(adaptation_id)?;
        Ok(TrackSetting::new(adaptation, switching_mode))
    }

    pub fn start(
        &self,
        period_id: &str,
        track_type: TrackType,
        setting: Option<TrackSetting>,
    ) -> Result<()> {
        self.require(period_id, track_type)?.start(setting)
    }

    pub fn update_track(
        &self,
        period_id: &str,
        track_type: TrackType,
        setting: Option<TrackSetting>,
    ) -> Result<()> {
        self.require(period_id, track_type)?.update_track(setting)
    }

    /// Dispose every dispatcher of `period_id`. Returns how many there were.
    pub fn remove_period(&self, period_id: &str) -> usize {
        dispose_period(&self.entries, period_id)
    }

    pub fn dispose_all(&self) {
        let removed: Vec<Entry> = self
            .entries
            .borrow_mut()
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        for entry in removed {
            entry.dispatcher.dispose();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    // The dispatcher is cloned out so no borrow is held while it runs.
    fn require(&self, period_id: &str, track_type: TrackType) -> Result<TrackDispatcher> {
        self.dispatcher(period_id, track_type)
            .ok_or_else(|| Error::UnknownDispatcher {
                period_id: period_id.to_string(),
                track_type: track_type.to_string(),
            })
    }
}

impl Drop for DispatcherRegistry {
    fn drop(&mut self) {
        self.manifest.remove_listener(self.manifest_listener);
        self.dispose_all();
    }
}

fn dispose_period(entries: &Entries, period_id: &str) -> usize {
    let removed: Vec<Entry> = {
        let mut entries = entries.borrow_mut();
        let keys: Vec<Key> = entries
            .keys()
            .filter(|(id, _)| id == period_id)
            .cloned()
            .collect();
        keys.iter().filter_map(|key| entries.remove(key)).collect()
    };
    for entry in &removed {
        entry.dispatcher.dispose();
    }
    removed.len()
}
