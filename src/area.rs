//! Area output: fetch memories around the listener, filter them, and feed the scheduler.

use std::collections::HashSet;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::geo::BoundingBox;
use crate::geofence::filter_inside;
use crate::memory::{Memory, UserLocation};
use crate::scheduler::Scheduler;
use crate::scoring::best_nearby;

pub const NO_AUDIO_ERROR: &str = "No memories with audio found";

/// External memory store. `fetch_memories_near` may over-return; exact
/// radius filtering happens here.
pub trait MemoryStore {
    fn fetch_memories_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_m: f64,
    ) -> Result<Vec<Memory>>;

    /// Owner ids whose memories count as a friend's for `user_id`.
    fn friends_of(&self, _user_id: &str) -> Result<HashSet<String>> {
        Ok(HashSet::new())
    }
}

/// Vector-backed store answering with a bounding-box query.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    memories: Vec<Memory>,
    friendships: Vec<(String, String)>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new(memories: Vec<Memory>) -> Self {
        Self {
            memories,
            friendships: Vec::new(),
        }
    }

    /// Records that `user_id` counts `friend_id` as a friend.
    #[must_use]
    pub fn with_friend(mut self, user_id: &str, friend_id: &str) -> Self {
        self.friendships
            .push((user_id.to_string(), friend_id.to_string()));
        self
    }

    pub fn insert(&mut self, memory: Memory) {
        self.memories.push(memory);
    }
}

impl MemoryStore for InMemoryStore {
    fn fetch_memories_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_m: f64,
    ) -> Result<Vec<Memory>> {
        let center = crate::geo::Coordinates::checked(latitude, longitude)
            .ok_or_else(|| anyhow::anyhow!("invalid query center ({latitude}, {longitude})"))?;
        let bbox = BoundingBox::around(center, radius_m);
        Ok(self
            .memories
            .iter()
            // Malformed rows are passed through; the geofence drops them.
            .filter(|memory| memory.coordinates().is_none_or(|point| bbox.contains(point)))
            .cloned()
            .collect())
    }

    fn friends_of(&self, user_id: &str) -> Result<HashSet<String>> {
        Ok(self
            .friendships
            .iter()
            .filter(|(user, _)| user == user_id)
            .map(|(_, friend)| friend.clone())
            .collect())
    }
}

/// Diagnostics returned by [`AreaOutputDriver::start_area_output_playback`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AreaOutputReport {
    pub success: bool,
    /// Memories inside their own trigger radius.
    pub memories_found: usize,
    pub memories_with_audio: usize,
    pub queued: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AreaOutputReport {
    fn failure(memories_found: usize, memories_with_audio: usize, error: String) -> Self {
        Self {
            success: false,
            memories_found,
            memories_with_audio,
            queued: 0,
            error: Some(error),
        }
    }
}

struct AreaCandidates {
    found: usize,
    playable: Vec<Memory>,
    friends: HashSet<String>,
}

/// Periodic orchestrator between the location stream, the store, and the scheduler.
#[derive(Debug)]
pub struct AreaOutputDriver<S> {
    store: S,
}

impl<S: MemoryStore> AreaOutputDriver<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replaces the queue with the memories around `location` and unmutes.
    ///
    /// On any failure the scheduler is left untouched, including an item that
    /// is already playing.
    pub fn start_area_output_playback(
        &self,
        scheduler: &mut Scheduler,
        location: &UserLocation,
        user_id: Option<&str>,
        radius_m: f64,
    ) -> AreaOutputReport {
        let candidates = match self.collect(location, user_id, radius_m) {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(error = %err, "area fetch failed");
                return AreaOutputReport::failure(0, 0, format!("{err:#}"));
            }
        };
        let with_audio = candidates.playable.len();
        if with_audio == 0 {
            info!(found = candidates.found, "no playable memories in area");
            return AreaOutputReport::failure(candidates.found, 0, NO_AUDIO_ERROR.to_string());
        }

        scheduler.clear_queue();
        let queued = admit_all(scheduler, &candidates, location, user_id);
        scheduler.unmute();
        info!(
            found = candidates.found,
            with_audio, queued, "area output started"
        );
        AreaOutputReport {
            success: true,
            memories_found: candidates.found,
            memories_with_audio: with_audio,
            queued,
            error: None,
        }
    }

    /// Adds or updates queue entries for the current area. Never stops the
    /// current item. Returns how many memories were queued.
    pub fn refresh_area_output_memories(
        &self,
        scheduler: &mut Scheduler,
        location: &UserLocation,
        user_id: Option<&str>,
        radius_m: f64,
    ) -> usize {
        let now = scheduler.now_ms();
        scheduler.maybe_sweep(now);
        match self.collect(location, user_id, radius_m) {
            Ok(candidates) => {
                let queued = admit_all(scheduler, &candidates, location, user_id);
                debug!(found = candidates.found, queued, "area refresh");
                queued
            }
            Err(err) => {
                warn!(error = %err, "area refresh fetch failed");
                0
            }
        }
    }

    /// Single best memory around `location` by proximity and affect.
    pub fn best_nearby_memory(
        &self,
        location: &UserLocation,
        radius_m: f64,
    ) -> Result<Option<(Memory, f64)>> {
        let fetched =
            self.store
                .fetch_memories_near(location.latitude, location.longitude, radius_m)?;
        Ok(best_nearby(&fetched, location).map(|(memory, score)| (memory.clone(), score)))
    }

    fn collect(
        &self,
        location: &UserLocation,
        user_id: Option<&str>,
        radius_m: f64,
    ) -> Result<AreaCandidates> {
        let fetched =
            self.store
                .fetch_memories_near(location.latitude, location.longitude, radius_m)?;
        let inside = filter_inside(&fetched, location);
        let found = inside.len();
        let playable: Vec<Memory> = inside
            .into_iter()
            .filter(|memory| memory.playable_audio().is_some())
            .cloned()
            .collect();
        let friends = match user_id {
            Some(user) => self.store.friends_of(user)?,
            None => HashSet::new(),
        };
        debug!(
            fetched = fetched.len(),
            found,
            with_audio = playable.len(),
            "area candidates collected"
        );
        Ok(AreaCandidates {
            found,
            playable,
            friends,
        })
    }
}

fn admit_all(
    scheduler: &mut Scheduler,
    candidates: &AreaCandidates,
    location: &UserLocation,
    user_id: Option<&str>,
) -> usize {
    let batch = candidates.playable.iter().map(|memory| {
        let is_owner = user_id.is_some_and(|user| memory.owner_id == user);
        let is_friend = candidates.friends.contains(&memory.owner_id);
        (memory, is_owner, is_friend)
    });
    scheduler.enqueue_batch(location, batch)
}
