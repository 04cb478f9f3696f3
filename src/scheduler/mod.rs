//! Admission queue and the single "currently playing" slot.
//!
//! One `Scheduler` exists per listening session and is passed by reference to
//! whoever drives it. All mutations go through `&mut self`, so callers that
//! share it across threads wrap it in a mutex.

mod queue;

pub use queue::AudioQueueItem;

use std::sync::Arc;

use crossbeam_channel::Receiver;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::SchedulerSettings;
use crate::cooldown::CooldownLedger;
use crate::geo::haversine_distance_m;
use crate::memory::{Memory, Relationship, UserLocation};
use crate::playback::{
    AudioOutput, PlaybackController, PlaybackEvent, PlaybackOutcome, PlaybackState, PlaybackTicket,
};
use crate::scoring::admission_priority;
use queue::PlaybackQueue;

/// Result of offering a memory to the queue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Queued { priority: f64, replaced: bool },
    /// Missing coordinates or radius.
    Malformed,
    NoAudio,
    OutOfRange { distance_m: f64 },
    CoolingDown,
}

impl Admission {
    #[must_use]
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }
}

/// The item occupying the playback slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NowPlaying {
    pub item: AudioQueueItem,
    pub ticket: PlaybackTicket,
    pub started_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerSnapshot {
    pub now_playing: Option<NowPlaying>,
    pub queue: Vec<AudioQueueItem>,
    pub muted: bool,
    pub playback_state: PlaybackState,
    pub cooldown_ms: u64,
    pub cooldown_entries: usize,
}

pub struct Scheduler {
    settings: SchedulerSettings,
    queue: PlaybackQueue,
    current: Option<NowPlaying>,
    muted: bool,
    ledger: CooldownLedger,
    playback: PlaybackController,
    clock: Arc<dyn Clock>,
    last_sweep_ms: u64,
    /// Set while a batch is admitted so playback starts with the best item.
    batching: bool,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("settings", &self.settings)
            .field("queue_len", &self.queue.len())
            .field("current", &self.current.as_ref().map(|c| c.item.memory_id()))
            .field("muted", &self.muted)
            .field("playback", &self.playback)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    #[must_use = "scheduler must be retained to drive playback"]
    pub fn new(
        settings: SchedulerSettings,
        output: Box<dyn AudioOutput>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let last_sweep_ms = clock.now_ms();
        Self {
            settings,
            queue: PlaybackQueue::default(),
            current: None,
            muted: false,
            ledger: CooldownLedger::new(),
            playback: PlaybackController::new(output),
            clock,
            last_sweep_ms,
            batching: false,
        }
    }

    /// Offers one memory on behalf of an external caller.
    pub fn add_memory(
        &mut self,
        memory: &Memory,
        location: &UserLocation,
        is_owner: bool,
        is_friend: bool,
    ) -> Admission {
        self.enqueue_candidate(memory, location, is_owner, is_friend)
    }

    /// Geofence + cooldown admission. Starts playback when the slot is free.
    pub fn enqueue_candidate(
        &mut self,
        memory: &Memory,
        location: &UserLocation,
        is_owner: bool,
        is_friend: bool,
    ) -> Admission {
        let now = self.clock.now_ms();
        self.maybe_sweep(now);

        let (Some(center), Some(radius_m)) = (memory.coordinates(), memory.trigger_radius_m())
        else {
            debug!(memory_id = %memory.id, "rejecting malformed memory");
            return Admission::Malformed;
        };
        if memory.playable_audio().is_none() {
            debug!(memory_id = %memory.id, "rejecting memory without audio");
            return Admission::NoAudio;
        }

        let distance_m = haversine_distance_m(location.coordinates(), center);
        if distance_m > radius_m {
            debug!(memory_id = %memory.id, distance_m, radius_m, "memory out of range");
            return Admission::OutOfRange { distance_m };
        }
        if !self.ledger.admit(&memory.id, now, self.settings.cooldown_ms) {
            debug!(memory_id = %memory.id, "memory cooling down");
            return Admission::CoolingDown;
        }

        let relationship = Relationship::from_flags(is_owner, is_friend);
        let priority = admission_priority(
            radius_m,
            distance_m,
            relationship,
            memory.created_at_ms,
            now,
            &self.settings.weights,
        );
        let replaced = self.queue.upsert(AudioQueueItem {
            memory: memory.clone(),
            relationship,
            priority,
            distance_m,
            enqueued_at_ms: now,
            seq: 0,
        });
        debug!(
            memory_id = %memory.id,
            priority,
            distance_m,
            relationship = relationship.as_str(),
            replaced,
            "memory queued"
        );

        if self.current.is_none() && !self.muted && !self.batching {
            self.dequeue_and_play();
        }
        Admission::Queued { priority, replaced }
    }

    /// Admits `(memory, is_owner, is_friend)` candidates as one batch, then
    /// fills a free slot once. Returns how many were queued.
    pub fn enqueue_batch<'a, I>(&mut self, location: &UserLocation, candidates: I) -> usize
    where
        I: IntoIterator<Item = (&'a Memory, bool, bool)>,
    {
        self.batching = true;
        let mut queued = 0;
        for (memory, is_owner, is_friend) in candidates {
            if self
                .enqueue_candidate(memory, location, is_owner, is_friend)
                .is_queued()
            {
                queued += 1;
            }
        }
        self.batching = false;
        self.dequeue_and_play();
        queued
    }

    /// Moves the queue head into the playback slot. Items whose start is
    /// rejected are consumed and the next one is tried.
    pub fn dequeue_and_play(&mut self) {
        if self.current.is_some() || self.muted {
            return;
        }
        while let Some(item) = self.queue.pop_front() {
            let now = self.clock.now_ms();
            self.ledger.record(item.memory_id(), now);

            let Some(audio_ref) = item.memory.playable_audio().map(str::to_owned) else {
                warn!(memory_id = item.memory_id(), "queued memory lost its audio; skipping");
                continue;
            };
            match self.playback.start(&audio_ref) {
                Ok(ticket) => {
                    info!(
                        memory_id = item.memory_id(),
                        ticket = ticket.0,
                        priority = item.priority,
                        "starting playback"
                    );
                    self.current = Some(NowPlaying {
                        item,
                        ticket,
                        started_at_ms: now,
                    });
                    return;
                }
                Err(err) => {
                    warn!(memory_id = item.memory_id(), error = %err, "playback start failed; advancing");
                }
            }
        }
    }

    /// Applies one playback event and advances the queue on completion or failure.
    pub fn handle_playback_event(&mut self, event: PlaybackEvent) -> Option<PlaybackOutcome> {
        let outcome = self.playback.handle_event(event)?;
        match &outcome {
            PlaybackOutcome::Started(ticket) => {
                debug!(ticket = ticket.0, "playback ready");
            }
            PlaybackOutcome::Finished(ticket) => {
                if let Some(done) = self.take_current(*ticket) {
                    info!(memory_id = done.item.memory_id(), ticket = ticket.0, "playback finished");
                }
                self.dequeue_and_play();
            }
            PlaybackOutcome::Failed { ticket, reason } => {
                if let Some(failed) = self.take_current(*ticket) {
                    warn!(
                        memory_id = failed.item.memory_id(),
                        ticket = ticket.0,
                        reason = %reason,
                        "playback failed; item discarded"
                    );
                }
                self.dequeue_and_play();
            }
        }
        Some(outcome)
    }

    /// Drains every pending playback event without blocking.
    pub fn pump_playback_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.playback.try_next_event() {
            let _ = self.handle_playback_event(event);
            handled += 1;
        }
        handled
    }

    /// Stops the current item and moves on to the next one.
    pub fn skip(&mut self) {
        self.playback.stop();
        if let Some(skipped) = self.current.take() {
            info!(memory_id = skipped.item.memory_id(), "playback skipped");
        }
        self.dequeue_and_play();
    }

    /// Pauses output; the queue is kept.
    pub fn mute(&mut self) {
        self.muted = true;
        self.playback.pause();
    }

    /// Resumes a paused item, or restarts the dequeue cycle when the slot is free.
    pub fn unmute(&mut self) {
        self.muted = false;
        if self.current.is_some() {
            self.playback.resume();
        } else {
            self.dequeue_and_play();
        }
    }

    /// Empties the queue and stops playback. Cooldowns are kept.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.playback.stop();
        self.current = None;
    }

    /// Empties the queue but leaves the current item playing.
    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    #[must_use]
    pub fn currently_playing(&self) -> Option<&AudioQueueItem> {
        self.current.as_ref().map(|current| &current.item)
    }

    #[must_use]
    pub fn now_playing(&self) -> Option<&NowPlaying> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn queue(&self) -> &[AudioQueueItem] {
        self.queue.as_slice()
    }

    /// Any value is accepted. The sweep never drops an entry younger than
    /// the cooldown, so a long cooldown also outlives `sweep_max_age_ms`.
    pub fn set_cooldown(&mut self, cooldown_ms: u64) {
        self.settings.cooldown_ms = cooldown_ms;
    }

    #[must_use]
    pub fn cooldown_ms(&self) -> u64 {
        self.settings.cooldown_ms
    }

    #[must_use]
    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    #[must_use]
    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    #[must_use]
    pub fn cooldowns(&self) -> &CooldownLedger {
        &self.ledger
    }

    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Receiver for event loops that block on playback events.
    #[must_use = "receiver is required to consume playback events"]
    pub fn playback_events(&self) -> Receiver<PlaybackEvent> {
        self.playback.receiver()
    }

    /// Runs the periodic cooldown sweep when its interval has elapsed.
    /// Entries still inside the cooldown window are always kept.
    pub fn maybe_sweep(&mut self, now_ms: u64) -> usize {
        if now_ms.saturating_sub(self.last_sweep_ms) < self.settings.sweep_interval_ms {
            return 0;
        }
        self.last_sweep_ms = now_ms;
        let max_age_ms = self
            .settings
            .sweep_max_age_ms
            .max(self.settings.cooldown_ms);
        let removed = self.ledger.sweep(now_ms, max_age_ms);
        if removed > 0 {
            debug!(removed, remaining = self.ledger.len(), "cooldown ledger swept");
        }
        removed
    }

    #[must_use]
    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            now_playing: self.current.clone(),
            queue: self.queue.as_slice().to_vec(),
            muted: self.muted,
            playback_state: self.playback.state(),
            cooldown_ms: self.settings.cooldown_ms,
            cooldown_entries: self.ledger.len(),
        }
    }

    fn take_current(&mut self, ticket: PlaybackTicket) -> Option<NowPlaying> {
        if self.current.as_ref().is_some_and(|c| c.ticket == ticket) {
            self.current.take()
        } else {
            None
        }
    }
}
