//! Replays a scenario on virtual time and records a playback timeline.
//!
//! The clock only moves forward. Between two track samples it stops at every
//! clip end and scripted control so the scheduler sees them in order.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use tracing::{debug, info};

use echotrail::area::{AreaOutputDriver, InMemoryStore};
use echotrail::clock::{Clock, ManualClock};
use echotrail::config::SchedulerSettings;
use echotrail::memory::UserLocation;
use echotrail::playback::{PlaybackEvent, PlaybackOutcome, PlaybackTicket, SimulatedTransport};
use echotrail::scheduler::{Scheduler, SchedulerSnapshot};

use crate::scenario::{ControlAction, Scenario, ScriptedControl};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RunCounters {
    pub(crate) started: usize,
    pub(crate) finished: usize,
    pub(crate) failed: usize,
}

#[derive(Debug)]
pub(crate) struct RunReport {
    pub(crate) lines: Vec<String>,
    pub(crate) counters: RunCounters,
    pub(crate) snapshot: SchedulerSnapshot,
}

impl RunReport {
    pub(crate) fn summary(&self) -> String {
        format!(
            "summary: started={} finished={} failed={} queued={}",
            self.counters.started,
            self.counters.finished,
            self.counters.failed,
            self.snapshot.queue.len()
        )
    }
}

struct Runner {
    clock: Arc<ManualClock>,
    transport: SimulatedTransport,
    scheduler: Scheduler,
    events: Receiver<PlaybackEvent>,
    driver: AreaOutputDriver<InMemoryStore>,
    user_id: Option<String>,
    radius_m: f64,
    controls: Vec<ScriptedControl>,
    next_control: usize,
    area_started: bool,
    last_ticket: Option<PlaybackTicket>,
    lines: Vec<String>,
    counters: RunCounters,
}

pub(crate) fn run(scenario: &Scenario, settings: SchedulerSettings, drain: bool) -> RunReport {
    let mut runner = Runner::new(scenario, settings);
    info!(
        samples = scenario.track.len(),
        memories = scenario.memories.len(),
        radius_m = runner.radius_m,
        "scenario run started"
    );
    for sample in &scenario.track {
        runner.step_to(sample.timestamp_ms);
        runner.on_sample(sample);
    }
    if drain {
        runner.drain_remaining();
    }
    runner.finish()
}

impl Runner {
    fn new(scenario: &Scenario, settings: SchedulerSettings) -> Self {
        let start_ms = scenario
            .track
            .first()
            .map_or(0, |sample| sample.timestamp_ms);
        let clock = Arc::new(ManualClock::new(start_ms));
        let shared: Arc<dyn Clock> = clock.clone();
        let transport = SimulatedTransport::new(Arc::clone(&shared), scenario.clips.clone());
        let scheduler = Scheduler::new(settings, Box::new(transport.output()), shared);
        let events = scheduler.playback_events();
        Self {
            clock,
            transport,
            scheduler,
            events,
            driver: AreaOutputDriver::new(scenario.store()),
            user_id: scenario.user_id.clone(),
            radius_m: scenario.radius_m.unwrap_or(settings.area_radius_m),
            controls: scenario.controls.clone(),
            next_control: 0,
            area_started: false,
            last_ticket: None,
            lines: Vec::new(),
            counters: RunCounters::default(),
        }
    }

    /// Walks the clock to `target_ms`, stopping at clip ends and controls on the way.
    fn step_to(&mut self, target_ms: u64) {
        loop {
            let clip_end = self.transport.ends_at_ms().filter(|end| *end <= target_ms);
            let control_at = self
                .controls
                .get(self.next_control)
                .map(|control| control.at_ms)
                .filter(|at| *at <= target_ms);
            match (clip_end, control_at) {
                (Some(end), Some(at)) if at < end => self.apply_control(at),
                (Some(end), _) => self.end_clip(end),
                (None, Some(at)) => self.apply_control(at),
                (None, None) => break,
            }
        }
        if target_ms > self.clock.now_ms() {
            self.clock.set(target_ms);
        }
    }

    /// Plays out everything left after the last sample.
    fn drain_remaining(&mut self) {
        loop {
            let clip_end = self.transport.ends_at_ms();
            let control_at = self
                .controls
                .get(self.next_control)
                .map(|control| control.at_ms);
            let next = match (clip_end, control_at) {
                (Some(end), Some(at)) => end.min(at),
                (Some(end), None) => end,
                (None, Some(at)) => at,
                (None, None) => break,
            };
            self.step_to(next);
        }
    }

    fn end_clip(&mut self, end_ms: u64) {
        self.set_clock(end_ms);
        if self.transport.advance() {
            self.drain_events();
        }
    }

    fn apply_control(&mut self, at_ms: u64) {
        let Some(control) = self.controls.get(self.next_control).cloned() else {
            return;
        };
        self.next_control += 1;
        self.set_clock(at_ms);
        match control.action {
            ControlAction::Skip => {
                let skipped = self
                    .scheduler
                    .currently_playing()
                    .map(|item| item.memory_id().to_string());
                self.scheduler.skip();
                // The slot's ticket was retired by the skip.
                self.last_ticket = None;
                match skipped {
                    Some(id) => self.log(format!("skip {id}")),
                    None => self.log("skip (idle)".to_string()),
                }
            }
            ControlAction::Mute => {
                self.scheduler.mute();
                self.log(control.action.label().to_string());
            }
            ControlAction::Unmute => {
                self.scheduler.unmute();
                self.log(control.action.label().to_string());
            }
            ControlAction::Clear => {
                self.scheduler.clear();
                self.last_ticket = None;
                self.log(control.action.label().to_string());
            }
        }
        self.note_started();
        self.drain_events();
    }

    fn on_sample(&mut self, sample: &UserLocation) {
        let user_id = self.user_id.clone();
        if self.area_started {
            let queued = self.driver.refresh_area_output_memories(
                &mut self.scheduler,
                sample,
                user_id.as_deref(),
                self.radius_m,
            );
            self.log(format!("refresh queued={queued}"));
        } else {
            let report = self.driver.start_area_output_playback(
                &mut self.scheduler,
                sample,
                user_id.as_deref(),
                self.radius_m,
            );
            if report.success {
                self.area_started = true;
                self.log(format!(
                    "area start: found={} with_audio={} queued={}",
                    report.memories_found, report.memories_with_audio, report.queued
                ));
            } else {
                self.log(format!(
                    "area start failed: {} (found={} with_audio={})",
                    report.error.as_deref().unwrap_or("unknown error"),
                    report.memories_found,
                    report.memories_with_audio
                ));
            }
        }
        self.note_started();
        self.drain_events();
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            let playing = self
                .scheduler
                .now_playing()
                .map(|now| (now.ticket, now.item.memory_id().to_string()));
            let outcome = self.scheduler.handle_playback_event(event);
            match (outcome, playing) {
                (Some(PlaybackOutcome::Finished(ticket)), Some((current, id))) if ticket == current => {
                    self.counters.finished += 1;
                    self.log(format!("done {id}"));
                }
                (Some(PlaybackOutcome::Failed { ticket, reason }), Some((current, id)))
                    if ticket == current =>
                {
                    self.counters.failed += 1;
                    self.log(format!("fail {id}: {reason}"));
                }
                (Some(outcome), _) => debug!(?outcome, "playback outcome"),
                (None, _) => {}
            }
            self.note_started();
        }
    }

    /// Logs a start line whenever a new ticket occupies the slot.
    fn note_started(&mut self) {
        let Some((ticket, id)) = self
            .scheduler
            .now_playing()
            .map(|now| (now.ticket, now.item.memory_id().to_string()))
        else {
            self.last_ticket = None;
            return;
        };
        if self.last_ticket != Some(ticket) {
            self.last_ticket = Some(ticket);
            self.counters.started += 1;
            self.log(format!("start {id}"));
        }
    }

    fn set_clock(&self, now_ms: u64) {
        if now_ms > self.clock.now_ms() {
            self.clock.set(now_ms);
        }
    }

    fn log(&mut self, line: String) {
        self.lines.push(format!("[t={}] {line}", self.clock.now_ms()));
    }

    fn finish(self) -> RunReport {
        let snapshot = self.scheduler.snapshot();
        info!(
            started = self.counters.started,
            finished = self.counters.finished,
            failed = self.counters.failed,
            queued = snapshot.queue.len(),
            "scenario run finished"
        );
        RunReport {
            lines: self.lines,
            counters: self.counters,
            snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WALK: &str = r#"
user_id: alice
friends: [bob]
memories:
  - { id: bench, latitude: 52.52, longitude: 13.405, radius_m: 30, audio_ref: bench.m4a, owner_id: alice }
  - { id: fountain, latitude: 52.5200899, longitude: 13.405, radius_m: 40, audio_ref: fountain.m4a, owner_id: bob }
  - { id: mural, latitude: 52.52, longitude: 13.405, radius_m: 25, audio_ref: mural.m4a, owner_id: carol }
clips:
  bench.m4a: 20000
  fountain.m4a: 15000
track:
  - { latitude: 52.52, longitude: 13.405, timestamp_ms: 0 }
  - { latitude: 52.52, longitude: 13.405, timestamp_ms: 5000 }
  - { latitude: 52.52, longitude: 13.405, timestamp_ms: 60000 }
"#;

    fn scenario(yaml: &str) -> Scenario {
        Scenario::from_yaml(yaml).expect("scenario")
    }

    #[test]
    fn walk_plays_by_role_and_advances_on_end_and_failure() {
        let report = run(&scenario(WALK), SchedulerSettings::default(), false);
        assert_eq!(
            report.lines,
            vec![
                "[t=0] area start: found=3 with_audio=3 queued=3",
                "[t=0] start bench",
                "[t=5000] refresh queued=2",
                "[t=20000] done bench",
                "[t=20000] start fountain",
                "[t=35000] done fountain",
                "[t=35000] start mural",
                "[t=35000] fail mural: unknown clip 'mural.m4a'",
                "[t=60000] refresh queued=0",
            ]
        );
        assert_eq!(
            report.counters,
            RunCounters {
                started: 3,
                finished: 2,
                failed: 1
            }
        );
        assert!(report.snapshot.queue.is_empty());
    }

    #[test]
    fn skip_control_moves_to_next_item() {
        let yaml = format!("{WALK}controls:\n  - {{ at_ms: 1000, action: skip }}\n");
        let report = run(&scenario(&yaml), SchedulerSettings::default(), false);
        assert!(report.lines.contains(&"[t=1000] skip bench".to_string()));
        assert!(report.lines.contains(&"[t=1000] start fountain".to_string()));
        assert!(report.lines.contains(&"[t=16000] done fountain".to_string()));
    }

    #[test]
    fn mute_holds_the_clip_until_unmute() {
        let yaml = format!(
            "{WALK}controls:\n  - {{ at_ms: 10000, action: mute }}\n  - {{ at_ms: 40000, action: unmute }}\n"
        );
        let report = run(&scenario(&yaml), SchedulerSettings::default(), false);
        // bench played 10 s before the mute and needs 10 s more after unmute.
        assert!(report.lines.contains(&"[t=50000] done bench".to_string()));
        assert!(report.lines.contains(&"[t=50000] start fountain".to_string()));
    }

    #[test]
    fn drain_plays_out_the_queue() {
        let yaml = r#"
memories:
  - { id: a, latitude: 1.0, longitude: 1.0, radius_m: 50, audio_ref: a.m4a, owner_id: x }
  - { id: b, latitude: 1.0, longitude: 1.0, radius_m: 40, audio_ref: b.m4a, owner_id: x }
clips:
  a.m4a: 1000
  b.m4a: 2000
track:
  - { latitude: 1.0, longitude: 1.0, timestamp_ms: 0 }
"#;
        let report = run(&scenario(yaml), SchedulerSettings::default(), true);
        assert_eq!(report.lines.last().map(String::as_str), Some("[t=3000] done b"));
        assert_eq!(report.counters.finished, 2);
        assert_eq!(report.summary(), "summary: started=2 finished=2 failed=0 queued=0");
    }

    #[test]
    fn start_is_retried_until_audio_is_in_range() {
        let yaml = r#"
memories:
  - { id: a, latitude: 1.0, longitude: 1.0, radius_m: 20, audio_ref: a.m4a, owner_id: x }
clips:
  a.m4a: 1000
track:
  - { latitude: 1.01, longitude: 1.0, timestamp_ms: 0 }
  - { latitude: 1.0, longitude: 1.0, timestamp_ms: 1000 }
"#;
        let report = run(&scenario(yaml), SchedulerSettings::default(), false);
        assert_eq!(
            report.lines[0],
            "[t=0] area start failed: No memories with audio found (found=0 with_audio=0)"
        );
        assert_eq!(report.lines[1], "[t=1000] area start: found=1 with_audio=1 queued=1");
        assert_eq!(report.lines[2], "[t=1000] start a");
    }
}
