//! Kino Tracks - Track reconciliation core for Kino
//!
//! This crate decides, for every period and track type of a content, which
//! adaptation and which of its representations the stream pipeline may play:
//! - Cooperative cancellation signals
//! - Shared references (single-value reactive channels)
//! - Manifest tree with update / decipherability events
//! - Per-period, per-type track dispatchers
//! - A registry owning those dispatchers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Kino Tracks                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  manifestUpdate     ┌──────────────┐          │
//! │  │   Manifest   │  decipherability ──►│    Track     │          │
//! │  │     Tree     │                     │  Dispatcher  │◄── TrackSetting
//! │  └──────────────┘                     └──────┬───────┘          │
//! │                                              │                  │
//! │                                       ┌──────┴───────┐          │
//! │                                       │   Outward    │          │
//! │                                       │  Reference   │──► stream pipeline
//! │                                       └──────────────┘          │
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │ Cancellation │  │    Shared    │  │  Dispatcher  │           │
//! │  │    Signal    │  │  Reference   │  │   Registry   │           │
//! │  └──────────────┘  └──────────────┘  └──────────────┘           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is single-threaded: values are shared through `Rc` and
//! every notification is delivered synchronously.

pub mod cancellation;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod manifest;
pub mod reference;
pub mod registry;
pub mod types;

pub use cancellation::{CancellationError, CancellationSignal, TaskCanceller};
pub use config::DispatcherConfig;
pub use dispatcher::{
    AdaptationChoice, LockedRepresentations, RepresentationsChoice, TrackChoice, TrackDispatcher,
    TrackSetting,
};
pub use error::{Error, Result};
pub use events::ListenerId;
pub use manifest::{Adaptation, Manifest, Period, Representation};
pub use reference::{ReadOnlyReference, SharedReference, Subscription, UpdateOptions};
pub use registry::DispatcherRegistry;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "Kino Tracks initialized");
}
