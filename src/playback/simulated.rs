//! Virtual-time output used by the scenario runner and tests.
//!
//! Clips are known by duration only. A start on a known clip reports ready at
//! once; the transport reports the natural end when the clock passes it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crossbeam_channel::Sender;

use super::{AudioOutput, PlaybackError, PlaybackEvent, PlaybackTicket};
use crate::clock::Clock;
use crate::lock_or_recover;

struct LoadedClip {
    ticket: PlaybackTicket,
    audio_ref: String,
    remaining_ms: u64,
    /// `None` while paused.
    resumed_at_ms: Option<u64>,
    events: Sender<PlaybackEvent>,
}

#[derive(Default)]
struct TransportState {
    clips: HashMap<String, u64>,
    loaded: Option<LoadedClip>,
    offline: bool,
}

/// Handle the driving loop keeps to advance simulated playback.
#[derive(Clone)]
pub struct SimulatedTransport {
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<TransportState>>,
}

impl std::fmt::Debug for SimulatedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedTransport")
            .field("now_ms", &self.clock.now_ms())
            .field("loaded", &self.loaded_audio())
            .finish()
    }
}

impl SimulatedTransport {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, clips: HashMap<String, u64>) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(TransportState {
                clips,
                ..TransportState::default()
            })),
        }
    }

    /// Output half handed to the playback controller.
    #[must_use]
    pub fn output(&self) -> SimulatedOutput {
        SimulatedOutput {
            transport: self.clone(),
        }
    }

    /// When set, every start is rejected as if no device were present.
    pub fn set_offline(&self, offline: bool) {
        lock_or_recover(&self.state, "simulated transport").offline = offline;
    }

    /// Emits `Ended` for the loaded clip once its time has run out.
    /// Returns true when an end was reported.
    pub fn advance(&self) -> bool {
        let now = self.clock.now_ms();
        let mut state = lock_or_recover(&self.state, "simulated transport");
        let finished = state
            .loaded
            .as_ref()
            .is_some_and(|clip| match clip.resumed_at_ms {
                Some(resumed) => now.saturating_sub(resumed) >= clip.remaining_ms,
                None => false,
            });
        if !finished {
            return false;
        }
        if let Some(clip) = state.loaded.take() {
            let _ = clip.events.send(PlaybackEvent::ended(clip.ticket));
        }
        true
    }

    /// Virtual time at which the loaded clip will end, unless paused.
    #[must_use]
    pub fn ends_at_ms(&self) -> Option<u64> {
        let state = lock_or_recover(&self.state, "simulated transport");
        let clip = state.loaded.as_ref()?;
        clip.resumed_at_ms
            .map(|resumed| resumed.saturating_add(clip.remaining_ms))
    }

    #[must_use]
    pub fn loaded_audio(&self) -> Option<String> {
        lock_or_recover(&self.state, "simulated transport")
            .loaded
            .as_ref()
            .map(|clip| clip.audio_ref.clone())
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        lock_or_recover(&self.state, "simulated transport")
            .loaded
            .as_ref()
            .is_some_and(|clip| clip.resumed_at_ms.is_none())
    }
}

pub struct SimulatedOutput {
    transport: SimulatedTransport,
}

impl AudioOutput for SimulatedOutput {
    fn start(
        &mut self,
        ticket: PlaybackTicket,
        audio_ref: &str,
        events: Sender<PlaybackEvent>,
    ) -> Result<(), PlaybackError> {
        let now = self.transport.clock.now_ms();
        let mut state = lock_or_recover(&self.transport.state, "simulated output");
        if state.offline {
            return Err(PlaybackError::DeviceUnavailable("simulated".to_string()));
        }
        state.loaded = None;

        let Some(&duration_ms) = state.clips.get(audio_ref) else {
            let _ = events.send(PlaybackEvent::failed(
                ticket,
                format!("unknown clip '{audio_ref}'"),
            ));
            return Ok(());
        };
        let _ = events.send(PlaybackEvent::ready(ticket));
        state.loaded = Some(LoadedClip {
            ticket,
            audio_ref: audio_ref.to_string(),
            remaining_ms: duration_ms,
            resumed_at_ms: Some(now),
            events,
        });
        Ok(())
    }

    fn stop(&mut self) {
        lock_or_recover(&self.transport.state, "simulated output").loaded = None;
    }

    fn pause(&mut self) {
        let now = self.transport.clock.now_ms();
        let mut state = lock_or_recover(&self.transport.state, "simulated output");
        if let Some(clip) = state.loaded.as_mut() {
            if let Some(resumed) = clip.resumed_at_ms.take() {
                let played = now.saturating_sub(resumed);
                clip.remaining_ms = clip.remaining_ms.saturating_sub(played);
            }
        }
    }

    fn resume(&mut self) {
        let now = self.transport.clock.now_ms();
        let mut state = lock_or_recover(&self.transport.state, "simulated output");
        if let Some(clip) = state.loaded.as_mut() {
            if clip.resumed_at_ms.is_none() {
                clip.resumed_at_ms = Some(now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::playback::PlaybackEventKind;
    use crossbeam_channel::unbounded;

    fn transport(clock: &Arc<ManualClock>) -> SimulatedTransport {
        let clips = HashMap::from([("a.m4a".to_string(), 10_000_u64)]);
        SimulatedTransport::new(Arc::clone(clock) as Arc<dyn Clock>, clips)
    }

    #[test]
    fn known_clip_is_ready_then_ends_after_duration() {
        let clock = Arc::new(ManualClock::new(0));
        let transport = transport(&clock);
        let mut output = transport.output();
        let (tx, rx) = unbounded();

        output.start(PlaybackTicket(1), "a.m4a", tx).expect("start");
        assert_eq!(rx.try_recv().expect("ready").kind, PlaybackEventKind::Ready);
        assert_eq!(transport.ends_at_ms(), Some(10_000));

        clock.set(9_999);
        assert!(!transport.advance());
        clock.set(10_000);
        assert!(transport.advance());
        assert_eq!(rx.try_recv().expect("ended").kind, PlaybackEventKind::Ended);
        assert!(transport.loaded_audio().is_none());
    }

    #[test]
    fn unknown_clip_fails_asynchronously() {
        let clock = Arc::new(ManualClock::new(0));
        let transport = transport(&clock);
        let mut output = transport.output();
        let (tx, rx) = unbounded();

        output.start(PlaybackTicket(7), "missing.m4a", tx).expect("start accepted");
        let event = rx.try_recv().expect("failure event");
        assert_eq!(event.ticket, PlaybackTicket(7));
        assert!(matches!(event.kind, PlaybackEventKind::Failed(_)));
    }

    #[test]
    fn paused_time_does_not_count_towards_clip_end() {
        let clock = Arc::new(ManualClock::new(0));
        let transport = transport(&clock);
        let mut output = transport.output();
        let (tx, _rx) = unbounded();
        output.start(PlaybackTicket(1), "a.m4a", tx).expect("start");

        clock.set(4_000);
        output.pause();
        assert!(transport.is_paused());
        clock.set(60_000);
        assert!(!transport.advance());
        output.resume();
        assert_eq!(transport.ends_at_ms(), Some(66_000));
    }

    #[test]
    fn transport_keeps_playing_after_its_lock_is_poisoned() {
        let clock = Arc::new(ManualClock::new(0));
        let transport = transport(&clock);
        let mut output = transport.output();
        let (tx, rx) = unbounded();
        output.start(PlaybackTicket(3), "a.m4a", tx).expect("start");
        let _ = rx.try_recv();

        let state = Arc::clone(&transport.state);
        let poisoner = std::thread::spawn(move || {
            let _guard = state.lock();
            panic!("driver thread died mid-update");
        });
        assert!(poisoner.join().is_err());
        assert!(transport.state.is_poisoned());

        assert_eq!(transport.loaded_audio().as_deref(), Some("a.m4a"));
        clock.set(10_000);
        assert!(transport.advance());
        assert_eq!(rx.try_recv().expect("ended").ticket, PlaybackTicket(3));
    }

    #[test]
    fn offline_transport_rejects_start() {
        let clock = Arc::new(ManualClock::new(0));
        let transport = transport(&clock);
        transport.set_offline(true);
        let (tx, _rx) = unbounded();
        assert!(transport.output().start(PlaybackTicket(1), "a.m4a", tx).is_err());
    }
}
