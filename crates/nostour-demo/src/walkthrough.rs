#![forbid(unsafe_code)]

//! Headless walkthrough driver.
//!
//! [`Walkthrough`] plays the host: it owns the page, the simulator and the
//! tour session, advances time in fixed ticks, and feeds simulator output
//! (re-renders, command acks, user actions) back into the session. The
//! [`autopilot`](Walkthrough::autopilot) plays the user, clicking Next or
//! performing whatever action the current step waits for.
//!
//! Each tick runs:
//!
//! ```text
//! advance_time ─▶ session.step ─▶ simulator.render ─▶ queue acks / actions / mutations
//! ```

use std::sync::Arc;
use std::time::Duration;

use nostour_core::event::KeyEvent;
use nostour_runtime::bridge::SimulatorCommand;
use nostour_runtime::locator::LocateStatus;
use nostour_runtime::progress::ProgressStore;
use nostour_runtime::scheduler::TimerKind;
use nostour_web::{
    ControlAction, HostEvent, MemoryDom, Mutation, SessionConfig, StepResult, TourSession,
};
use serde::Serialize;

use crate::simulator::{ClientSimulator, View};
use crate::tours::DemoTour;

/// Default tick, one 60Hz frame.
pub const DEFAULT_TICK: Duration = Duration::from_millis(16);

/// One line of the walkthrough log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub at_ms: u64,
    pub view: View,
    /// Rendered overlay, `None` while no tour is shown.
    pub frame: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatched: Option<SimulatorCommand>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
}

/// How an autopilot run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Skipped,
    /// The tour never started (already settled or gated off).
    NotStarted,
    /// The tick budget ran out with the tour still active.
    TimedOut,
}

/// A page, a simulator, and a tour session, driven together.
#[derive(Debug)]
pub struct Walkthrough {
    dom: MemoryDom,
    sim: ClientSimulator,
    session: TourSession,
    tick: Duration,
    transcript: Vec<TranscriptEntry>,
    last_frame: Option<String>,
}

impl Walkthrough {
    /// Mount `tour` on a fresh page of the given size.
    pub fn new(
        tour: DemoTour,
        store: Arc<ProgressStore>,
        config: SessionConfig,
        width: f64,
        height: f64,
    ) -> Self {
        let mut dom = MemoryDom::new(width, height);
        let mut sim = ClientSimulator::new(tour.client);
        sim.render(&mut dom);
        let mut session = TourSession::new(tour.config, store, config).with_script(tour.script);
        session.mount(&dom);
        Self {
            dom,
            sim,
            session,
            tick: DEFAULT_TICK,
            transcript: Vec::new(),
            last_frame: None,
        }
    }

    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    pub fn session(&self) -> &TourSession {
        &self.session
    }

    pub fn simulator(&self) -> &ClientSimulator {
        &self.sim
    }

    pub fn dom(&self) -> &MemoryDom {
        &self.dom
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Act on the simulator as the user, then let the page catch up.
    pub fn user(&mut self, f: impl FnOnce(&mut ClientSimulator)) {
        f(&mut self.sim);
        self.pump_simulator();
    }

    /// Press a key (DOM `KeyboardEvent.key` name).
    pub fn press(&mut self, key: &str) {
        self.session
            .push_event(HostEvent::Key(KeyEvent::from_dom_key(key)));
    }

    /// Click an overlay control.
    pub fn click(&mut self, action: ControlAction) {
        self.session.push_event(HostEvent::Control(action));
    }

    /// Click the primary button as currently rendered.
    pub fn click_next(&mut self) {
        let step = self.session.handle().state().current_step;
        self.click(ControlAction::Next { step });
    }

    /// Advance one tick and run one session step.
    pub fn tick(&mut self) -> StepResult {
        self.session.advance_time(&mut self.dom, self.tick);
        let result = self.session.step(&mut self.dom, &mut self.sim);
        self.pump_simulator();
        self.record(&result);
        result
    }

    /// Tick until `done` holds or `max_ticks` pass. Returns whether `done` held.
    pub fn run_until(&mut self, max_ticks: u32, mut done: impl FnMut(&Self) -> bool) -> bool {
        for _ in 0..max_ticks {
            if done(self) {
                return true;
            }
            self.tick();
        }
        done(self)
    }

    /// Play the tour to the end the way an attentive user would.
    pub fn autopilot(&mut self, max_ticks: u32) -> Outcome {
        let mut started = false;
        for _ in 0..max_ticks {
            self.tick();
            let state = self.session.handle().state();
            if !state.is_active {
                if state.is_completed {
                    return Outcome::Completed;
                }
                if state.is_skipped {
                    return Outcome::Skipped;
                }
                if started || !self.session.scheduler().has_pending(TimerKind::AutoStart) {
                    return Outcome::NotStarted;
                }
                continue;
            }
            started = true;
            if !self.settled() {
                continue;
            }
            match state.expected_action.as_deref() {
                Some(action) => self.perform(action),
                None => self.click_next(),
            }
        }
        tracing::warn!(max_ticks, "autopilot ran out of ticks");
        Outcome::TimedOut
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    /// Nothing is in flight: the bridge is idle and the target lookup is over.
    fn settled(&self) -> bool {
        let bridge_idle = self
            .session
            .bridge()
            .is_none_or(|b| b.pending().is_none() && b.queued() == 0);
        let lookup_done = !matches!(self.session.locator().status(), LocateStatus::Searching { .. });
        bridge_idle && lookup_done && !self.sim.needs_render()
    }

    fn perform(&mut self, action: &str) {
        tracing::debug!(action, "autopilot performing action");
        match action {
            "login" => self.user(ClientSimulator::click_login),
            "select-chat" => self.user(|sim| sim.open_chat("alice")),
            "send-message" => self.user(|sim| sim.send_message("gm")),
            "like-note" => self.user(|sim| sim.like_note(0)),
            other => match other.strip_prefix("open-") {
                Some(tab) => self.user(|sim| sim.click_tab(tab)),
                None => {
                    tracing::warn!(action = other, "autopilot cannot perform action; skipping tour");
                    self.click(ControlAction::Skip);
                }
            },
        }
    }

    fn pump_simulator(&mut self) {
        if self.sim.render(&mut self.dom) {
            self.session
                .push_event(HostEvent::Mutation(Mutation::ChildList));
        }
        for ack in self.sim.take_acks() {
            self.session.push_event(HostEvent::CommandHandled(ack));
        }
        for action in self.sim.take_actions() {
            self.session.push_event(HostEvent::SimulatorAction(action));
        }
    }

    fn record(&mut self, result: &StepResult) {
        let frame = result.frame.as_ref().map(ToString::to_string);
        if result.events.is_empty() && result.dispatched.is_none() && frame == self.last_frame {
            return;
        }
        self.last_frame.clone_from(&frame);
        let at_ms = u64::try_from(self.session.now().as_millis()).unwrap_or(u64::MAX);
        self.transcript.push(TranscriptEntry {
            at_ms,
            view: self.sim.view().clone(),
            frame,
            dispatched: result.dispatched.clone(),
            events: result.events.iter().map(|e| format!("{e:?}")).collect(),
        });
    }
}
