use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use tracing::{debug, warn};

use super::{
    AudioOutput, PlaybackError, PlaybackEvent, PlaybackEventKind, PlaybackOutcome, PlaybackState,
    PlaybackTicket,
};

/// Runtime owner for the playback output and its state machine.
///
/// Exactly one ticket is active at a time. Starting a new item tears down the
/// previous one first, and events for any other ticket are dropped.
pub struct PlaybackController {
    output: Box<dyn AudioOutput>,
    state: PlaybackState,
    active: Option<PlaybackTicket>,
    next_ticket: u64,
    pause_on_ready: bool,
    events_tx: Sender<PlaybackEvent>,
    events_rx: Receiver<PlaybackEvent>,
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("state", &self.state)
            .field("active", &self.active)
            .field("next_ticket", &self.next_ticket)
            .field("pause_on_ready", &self.pause_on_ready)
            .finish_non_exhaustive()
    }
}

impl PlaybackController {
    #[must_use = "controller must be retained for playback events to flow"]
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            output,
            state: PlaybackState::Idle,
            active: None,
            next_ticket: 1,
            pause_on_ready: false,
            events_tx,
            events_rx,
        }
    }

    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    #[must_use]
    pub fn active_ticket(&self) -> Option<PlaybackTicket> {
        self.active
    }

    /// Cloneable receiver so an event loop can `select!` on playback events.
    #[must_use = "receiver is required to consume playback events"]
    pub fn receiver(&self) -> Receiver<PlaybackEvent> {
        self.events_rx.clone()
    }

    /// Non-blocking poll for the next pending event.
    pub fn try_next_event(&self) -> Option<PlaybackEvent> {
        match self.events_rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            // The controller holds a sender, so this only happens mid-drop.
            Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Idle/Paused/Playing/Error -> Loading. The previous item is stopped first.
    pub fn start(&mut self, audio_ref: &str) -> Result<PlaybackTicket, PlaybackError> {
        self.teardown();

        let ticket = PlaybackTicket(self.next_ticket);
        self.next_ticket += 1;
        self.active = Some(ticket);
        self.state = PlaybackState::Loading;
        debug!(ticket = ticket.0, audio_ref, "playback loading");

        if let Err(err) = self.output.start(ticket, audio_ref, self.events_tx.clone()) {
            warn!(ticket = ticket.0, error = %err, "playback start rejected");
            self.active = None;
            self.state = PlaybackState::Error;
            return Err(err);
        }
        Ok(ticket)
    }

    /// Forced teardown: any state -> Idle. Pending events become stale.
    pub fn stop(&mut self) {
        self.teardown();
        self.state = PlaybackState::Idle;
    }

    /// Playing -> Paused. While loading, the pause is applied once ready.
    pub fn pause(&mut self) {
        match self.state {
            PlaybackState::Playing => {
                self.output.pause();
                self.state = PlaybackState::Paused;
            }
            PlaybackState::Loading => self.pause_on_ready = true,
            _ => {}
        }
    }

    /// Paused -> Playing. While loading, cancels a deferred pause.
    pub fn resume(&mut self) {
        match self.state {
            PlaybackState::Paused => {
                self.output.resume();
                self.state = PlaybackState::Playing;
            }
            PlaybackState::Loading => self.pause_on_ready = false,
            _ => {}
        }
    }

    /// Applies an output event. Returns `None` for stale or redundant events.
    pub fn handle_event(&mut self, event: PlaybackEvent) -> Option<PlaybackOutcome> {
        if self.active != Some(event.ticket) {
            debug!(
                ticket = event.ticket.0,
                active = self.active.map(|t| t.0),
                "dropping stale playback event"
            );
            return None;
        }

        match event.kind {
            PlaybackEventKind::Ready => {
                if self.state != PlaybackState::Loading {
                    return None;
                }
                if self.pause_on_ready {
                    self.pause_on_ready = false;
                    self.output.pause();
                    self.state = PlaybackState::Paused;
                } else {
                    self.state = PlaybackState::Playing;
                }
                Some(PlaybackOutcome::Started(event.ticket))
            }
            // Also accepted while loading: an output may report a clip that
            // ended before its ready event was applied, and the slot must not
            // stay occupied waiting for a ready that will never matter.
            PlaybackEventKind::Ended => {
                self.active = None;
                self.pause_on_ready = false;
                self.state = PlaybackState::Idle;
                Some(PlaybackOutcome::Finished(event.ticket))
            }
            PlaybackEventKind::Failed(reason) => {
                self.output.stop();
                self.active = None;
                self.pause_on_ready = false;
                self.state = PlaybackState::Error;
                Some(PlaybackOutcome::Failed {
                    ticket: event.ticket,
                    reason,
                })
            }
        }
    }

    fn teardown(&mut self) {
        if self.active.take().is_some()
            || matches!(self.state, PlaybackState::Playing | PlaybackState::Paused)
        {
            self.output.stop();
        }
        self.pause_on_ready = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct CallLog {
        calls: Vec<String>,
        fail_start: bool,
    }

    struct RecordingOutput(Arc<Mutex<CallLog>>);

    impl AudioOutput for RecordingOutput {
        fn start(
            &mut self,
            ticket: PlaybackTicket,
            audio_ref: &str,
            _events: Sender<PlaybackEvent>,
        ) -> Result<(), PlaybackError> {
            let mut log = self.0.lock().expect("call log");
            log.calls.push(format!("start:{}:{audio_ref}", ticket.0));
            if log.fail_start {
                return Err(PlaybackError::DeviceUnavailable("test".to_string()));
            }
            Ok(())
        }

        fn stop(&mut self) {
            self.0.lock().expect("call log").calls.push("stop".to_string());
        }

        fn pause(&mut self) {
            self.0.lock().expect("call log").calls.push("pause".to_string());
        }

        fn resume(&mut self) {
            self.0.lock().expect("call log").calls.push("resume".to_string());
        }
    }

    fn controller() -> (PlaybackController, Arc<Mutex<CallLog>>) {
        let log = Arc::new(Mutex::new(CallLog::default()));
        let controller = PlaybackController::new(Box::new(RecordingOutput(Arc::clone(&log))));
        (controller, log)
    }

    fn calls(log: &Arc<Mutex<CallLog>>) -> Vec<String> {
        log.lock().expect("call log").calls.clone()
    }

    #[test]
    fn start_ready_end_walks_idle_loading_playing_idle() {
        let (mut controller, _log) = controller();
        let ticket = controller.start("a.m4a").expect("start");
        assert_eq!(controller.state(), PlaybackState::Loading);

        let outcome = controller.handle_event(PlaybackEvent::ready(ticket));
        assert_eq!(outcome, Some(PlaybackOutcome::Started(ticket)));
        assert_eq!(controller.state(), PlaybackState::Playing);

        let outcome = controller.handle_event(PlaybackEvent::ended(ticket));
        assert_eq!(outcome, Some(PlaybackOutcome::Finished(ticket)));
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert!(controller.active_ticket().is_none());
    }

    #[test]
    fn starting_again_stops_previous_item_first() {
        let (mut controller, log) = controller();
        let first = controller.start("a.m4a").expect("start a");
        let _ = controller.handle_event(PlaybackEvent::ready(first));
        let second = controller.start("b.m4a").expect("start b");
        assert_ne!(first, second);
        assert_eq!(calls(&log), vec!["start:1:a.m4a", "stop", "start:2:b.m4a"]);
    }

    #[test]
    fn events_for_cancelled_ticket_are_ignored() {
        let (mut controller, _log) = controller();
        let ticket = controller.start("a.m4a").expect("start");
        controller.stop();
        assert_eq!(controller.handle_event(PlaybackEvent::ready(ticket)), None);
        assert_eq!(controller.handle_event(PlaybackEvent::ended(ticket)), None);
        assert_eq!(controller.state(), PlaybackState::Idle);
    }

    #[test]
    fn failure_while_loading_moves_to_error() {
        let (mut controller, _log) = controller();
        let ticket = controller.start("bad.m4a").expect("start");
        let outcome = controller.handle_event(PlaybackEvent::failed(ticket, "decode error"));
        assert_eq!(
            outcome,
            Some(PlaybackOutcome::Failed {
                ticket,
                reason: "decode error".to_string()
            })
        );
        assert_eq!(controller.state(), PlaybackState::Error);
    }

    #[test]
    fn rejected_start_reports_error_without_active_ticket() {
        let (mut controller, log) = controller();
        log.lock().expect("call log").fail_start = true;
        assert!(controller.start("a.m4a").is_err());
        assert_eq!(controller.state(), PlaybackState::Error);
        assert!(controller.active_ticket().is_none());
    }

    #[test]
    fn pause_requested_while_loading_applies_on_ready() {
        let (mut controller, log) = controller();
        let ticket = controller.start("a.m4a").expect("start");
        controller.pause();
        assert_eq!(controller.state(), PlaybackState::Loading);
        let _ = controller.handle_event(PlaybackEvent::ready(ticket));
        assert_eq!(controller.state(), PlaybackState::Paused);
        controller.resume();
        assert_eq!(controller.state(), PlaybackState::Playing);
        assert_eq!(calls(&log), vec!["start:1:a.m4a", "pause", "resume"]);
    }

    #[test]
    fn end_reported_while_loading_frees_the_slot() {
        let (mut controller, _log) = controller();
        let ticket = controller.start("short.m4a").expect("start");
        assert_eq!(
            controller.handle_event(PlaybackEvent::ended(ticket)),
            Some(PlaybackOutcome::Finished(ticket))
        );
        assert_eq!(controller.state(), PlaybackState::Idle);
        // The late ready is stale once the ticket is retired.
        assert_eq!(controller.handle_event(PlaybackEvent::ready(ticket)), None);
    }

    #[test]
    fn pause_and_resume_are_noops_when_idle() {
        let (mut controller, log) = controller();
        controller.pause();
        controller.resume();
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert!(calls(&log).is_empty());
    }
}
