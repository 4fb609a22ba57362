//! Virtual playlist: a lazily-materialized view over an ordered track store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Consumer (UI / list model)                     │
//! │   get / get_range / ensure_loaded / preload_range  (never block) │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ schedule chunk
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Load task (Tokio, one at a time)               │
//! │   fetch(limit, offset) → write slots + merge ranges under lock   │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ PlaylistEvent callbacks
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Observers (range loaded, progress, ...)        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The shuffle permutation lives beside the cache under its own lock so
//! navigation queries never wait on loading.

mod cache;
mod events;
mod ranges;
mod shuffle;
mod source;

pub use cache::VirtualPlaylist;
pub use events::{PlaylistEvent, SubscriptionId};
pub use ranges::RangeTracker;
pub use shuffle::ShuffleOrder;
pub use source::{SqliteTrackSource, TrackSource};
