//! Location-triggered playback scheduling for geotagged audio memories.
//!
//! Location samples flow through the [`area::AreaOutputDriver`], which asks a
//! [`area::MemoryStore`] for nearby memories, keeps the ones inside their
//! geofence, and offers them to the [`scheduler::Scheduler`]. The scheduler
//! owns the priority queue, the cooldown ledger, and the single playback slot
//! backed by a [`playback::PlaybackController`].

pub mod area;
pub mod clock;
pub mod config;
pub mod cooldown;
pub mod geo;
pub mod geofence;
mod lock;
pub mod memory;
pub mod playback;
pub mod scheduler;
pub mod scoring;
pub mod telemetry;

pub(crate) use lock::lock_or_recover;

pub use area::{AreaOutputDriver, AreaOutputReport, InMemoryStore, MemoryStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, SchedulerSettings};
pub use memory::{Memory, Relationship, UserLocation};
pub use playback::{AudioOutput, PlaybackController, PlaybackState};
pub use scheduler::{Admission, AudioQueueItem, Scheduler};
