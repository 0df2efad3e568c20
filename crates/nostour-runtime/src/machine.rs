#![forbid(unsafe_code)]

//! The tour state machine.
//!
//! Holds the active [`TourConfig`] and the live [`TourState`]. Every
//! transition is a plain synchronous update; listeners registered with
//! [`TourMachine::subscribe`] run after the new state is committed, so they
//! always observe the state the transition produced.
//!
//! # Invariants
//!
//! 1. While active, `current_step < total_steps`.
//! 2. `waiting_for_action` implies the current step is action-triggered and
//!    `expected_action` names its action type. Retreating clears the wait
//!    without re-arming it.
//! 3. `is_completed` and `is_skipped` are never both true, and both are false
//!    while active.
//! 4. Completion and skip are persisted exactly once per run.
//! 5. A forward jump past the furthest reached step never skips an
//!    action-triggered step.
//!
//! # Failure Modes
//!
//! Calls without an active tour, mismatched actions, and refused jumps are
//! silent no-ops that return `None`.

use std::fmt;
use std::sync::Arc;

use crate::config::{TourConfig, TourStep};
use crate::progress::ProgressStore;

/// The machine's live state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TourState {
    pub is_active: bool,
    pub current_step: usize,
    pub total_steps: usize,
    pub is_completed: bool,
    pub is_skipped: bool,
    pub waiting_for_action: bool,
    pub expected_action: Option<String>,
}

/// Why the step changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TourAdvanceReason {
    Next,
    Back,
    Jump,
    Action,
}

/// A committed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TourEvent {
    Started {
        tour_id: String,
    },
    StepChanged {
        from: usize,
        to: usize,
        reason: TourAdvanceReason,
    },
    Completed {
        tour_id: String,
    },
    Skipped {
        tour_id: String,
        step: usize,
    },
}

/// Handle returned by [`TourMachine::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

type Listener = Box<dyn FnMut(&TourState, &TourEvent)>;

/// The tour state machine.
pub struct TourMachine {
    store: Option<Arc<ProgressStore>>,
    config: Option<TourConfig>,
    state: TourState,
    furthest: usize,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl Default for TourMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl TourMachine {
    /// A machine that persists nothing.
    pub fn new() -> Self {
        Self {
            store: None,
            config: None,
            state: TourState::default(),
            furthest: 0,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    /// A machine that records completion and skips in `store`.
    pub fn with_store(store: Arc<ProgressStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new()
        }
    }

    pub fn state(&self) -> &TourState {
        &self.state
    }

    /// The last started config, kept after the tour ends.
    pub fn config(&self) -> Option<&TourConfig> {
        self.config.as_ref()
    }

    pub fn store(&self) -> Option<&Arc<ProgressStore>> {
        self.store.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active
    }

    /// The step being shown, `None` unless active.
    pub fn current_step(&self) -> Option<&TourStep> {
        if !self.state.is_active {
            return None;
        }
        self.config.as_ref()?.step(self.state.current_step)
    }

    /// Highest step index reached in this run.
    pub fn furthest_reached(&self) -> usize {
        self.furthest
    }

    /// Whether [`jump_to`](Self::jump_to) would accept `index` right now.
    pub fn can_jump_to(&self, index: usize) -> bool {
        let Some(config) = self.active_config() else {
            return false;
        };
        let target = index.min(config.len() - 1);
        if target <= self.furthest {
            return true;
        }
        !self.state.waiting_for_action
            && !config.steps()[self.furthest..target]
                .iter()
                .any(|s| s.trigger.is_action())
    }

    /// Register a listener. It runs after each committed transition, while
    /// the caller still holds the machine.
    ///
    /// To react to transitions by reading or driving the tour, subscribe
    /// through [`TourHandle::subscribe`](crate::context::TourHandle::subscribe)
    /// instead; those listeners run after the machine is released.
    pub fn subscribe(&mut self, listener: impl FnMut(&TourState, &TourEvent) + 'static) -> ListenerId {
        self.next_listener += 1;
        let id = ListenerId::from_raw(self.next_listener);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────

    /// Begin `config` at step 0. Nothing is persisted.
    pub fn start(&mut self, config: TourConfig) -> Option<TourEvent> {
        let tour_id = config.id().to_string();
        self.state = TourState {
            is_active: true,
            current_step: 0,
            total_steps: config.len(),
            ..TourState::default()
        };
        self.furthest = 0;
        self.config = Some(config);
        self.arm_current();
        tracing::debug!(tour = %tour_id, steps = self.state.total_steps, "tour started");
        self.commit(TourEvent::Started { tour_id })
    }

    /// Clear stored progress for the last config and start it again.
    pub fn restart(&mut self) -> Option<TourEvent> {
        let config = self.config.clone()?;
        if let Some(store) = &self.store {
            store.reset(config.id());
        }
        self.start(config)
    }

    /// Manual advance. Blocked while waiting for an action or while the
    /// step's validator fails.
    pub fn advance(&mut self) -> Option<TourEvent> {
        let (config, index) = self.advance_target()?;
        if !config.step(index)?.is_valid() {
            tracing::trace!(step = index, "advance blocked by validator");
            return None;
        }
        self.accept_advance(index)
    }

    /// Advance only if the tour is still on `step`.
    ///
    /// Controls pass the step they were rendered for, so a second click that
    /// lands after the first one committed does nothing.
    pub fn advance_from(&mut self, step: usize) -> Option<TourEvent> {
        if !self.is_on_step(step) {
            return None;
        }
        self.advance()
    }

    /// Go back one step (floored at 0). Always clears the action wait.
    pub fn retreat(&mut self) -> Option<TourEvent> {
        if !self.state.is_active {
            return None;
        }
        let from = self.state.current_step;
        if from == 0 && !self.state.waiting_for_action {
            return None;
        }
        self.state.current_step = from.saturating_sub(1);
        self.state.waiting_for_action = false;
        self.state.expected_action = None;
        self.commit(TourEvent::StepChanged {
            from,
            to: self.state.current_step,
            reason: TourAdvanceReason::Back,
        })
    }

    /// Jump to `index`, clamped into bounds.
    ///
    /// Refused when the target lies beyond the furthest reached step and
    /// either an action is pending or an unreached action step lies in
    /// between. Entering a step arms its action wait.
    pub fn jump_to(&mut self, index: usize) -> Option<TourEvent> {
        let total = self.active_config()?.len();
        let target = index.min(total - 1);
        let from = self.state.current_step;
        if target == from {
            return None;
        }
        if !self.can_jump_to(target) {
            tracing::debug!(from, target, furthest = self.furthest, "forward jump refused");
            return None;
        }
        self.state.current_step = target;
        self.furthest = self.furthest.max(target);
        self.arm_current();
        self.commit(TourEvent::StepChanged {
            from,
            to: target,
            reason: TourAdvanceReason::Jump,
        })
    }

    /// End the tour, recording a skip at the current step or a completion.
    pub fn end(&mut self, skip: bool) -> Option<TourEvent> {
        let tour_id = self.active_config()?.id().to_string();
        let step = self.state.current_step;
        if skip {
            self.deactivate(false, true);
            if let Some(store) = &self.store {
                store.mark_skipped(&tour_id, step);
            }
            tracing::debug!(tour = %tour_id, step, "tour skipped");
            self.commit(TourEvent::Skipped { tour_id, step })
        } else {
            self.complete(tour_id)
        }
    }

    /// Report a simulator action.
    ///
    /// Ignored unless active, waiting, and `action_type` equals the expected
    /// action exactly. On a match the step's callback runs, then its
    /// validator; a failing validator keeps the wait armed.
    pub fn register_action(
        &mut self,
        action_type: &str,
        data: Option<&serde_json::Value>,
    ) -> Option<TourEvent> {
        let (config, index) = self.action_target(action_type)?;
        let step = config.step(index)?;
        step.fire_on_action(action_type, data);
        if !step.is_valid() {
            tracing::trace!(step = %step.id, "action matched but validator failed");
            return None;
        }
        self.accept_action(index, action_type)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Split transitions
    //
    // Validators and action callbacks are user code. `TourHandle` runs them
    // between the lookup and the accept half with the machine released, so
    // the accept half re-checks that the tour has not moved meanwhile.
    // ─────────────────────────────────────────────────────────────────────

    pub(crate) fn is_on_step(&self, step: usize) -> bool {
        let on_step = self.state.is_active && self.state.current_step == step;
        if !on_step {
            tracing::trace!(step, current = self.state.current_step, "stale advance ignored");
        }
        on_step
    }

    /// The config and step index a manual advance would leave.
    pub(crate) fn advance_target(&self) -> Option<(TourConfig, usize)> {
        let config = self.active_config()?.clone();
        if self.state.waiting_for_action {
            tracing::trace!(
                expected = ?self.state.expected_action,
                "advance blocked while waiting for action"
            );
            return None;
        }
        Some((config, self.state.current_step))
    }

    pub(crate) fn accept_advance(&mut self, index: usize) -> Option<TourEvent> {
        if !self.state.is_active || self.state.current_step != index || self.state.waiting_for_action
        {
            tracing::trace!(step = index, "tour moved while the validator ran");
            return None;
        }
        self.finish_or_next(TourAdvanceReason::Next)
    }

    /// The config and step index `action_type` would satisfy.
    pub(crate) fn action_target(&self, action_type: &str) -> Option<(TourConfig, usize)> {
        if !self.expects(action_type) {
            tracing::trace!(
                action = action_type,
                expected = ?self.state.expected_action,
                "action ignored"
            );
            return None;
        }
        let config = self.active_config()?.clone();
        Some((config, self.state.current_step))
    }

    pub(crate) fn accept_action(&mut self, index: usize, action_type: &str) -> Option<TourEvent> {
        if self.state.current_step != index || !self.expects(action_type) {
            tracing::trace!(step = index, "tour moved while the action callback ran");
            return None;
        }
        self.state.waiting_for_action = false;
        self.state.expected_action = None;
        self.finish_or_next(TourAdvanceReason::Action)
    }

    fn expects(&self, action_type: &str) -> bool {
        self.state.is_active
            && self.state.waiting_for_action
            && self.state.expected_action.as_deref() == Some(action_type)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn active_config(&self) -> Option<&TourConfig> {
        if self.state.is_active {
            self.config.as_ref()
        } else {
            None
        }
    }

    fn arm_current(&mut self) {
        let expected = self
            .config
            .as_ref()
            .and_then(|c| c.step(self.state.current_step))
            .and_then(|s| s.trigger.action_type())
            .map(str::to_string);
        self.state.waiting_for_action = expected.is_some();
        self.state.expected_action = expected;
    }

    fn finish_or_next(&mut self, reason: TourAdvanceReason) -> Option<TourEvent> {
        let from = self.state.current_step;
        if from + 1 >= self.state.total_steps {
            let tour_id = self.active_config()?.id().to_string();
            return self.complete(tour_id);
        }
        self.state.current_step = from + 1;
        self.furthest = self.furthest.max(from + 1);
        self.arm_current();
        self.commit(TourEvent::StepChanged {
            from,
            to: from + 1,
            reason,
        })
    }

    fn complete(&mut self, tour_id: String) -> Option<TourEvent> {
        self.deactivate(true, false);
        if let Some(store) = &self.store {
            store.mark_completed(&tour_id);
        }
        tracing::debug!(tour = %tour_id, "tour completed");
        self.commit(TourEvent::Completed { tour_id })
    }

    fn deactivate(&mut self, completed: bool, skipped: bool) {
        self.state.is_active = false;
        self.state.is_completed = completed;
        self.state.is_skipped = skipped;
        self.state.waiting_for_action = false;
        self.state.expected_action = None;
    }

    fn commit(&mut self, event: TourEvent) -> Option<TourEvent> {
        for (_, listener) in &mut self.listeners {
            listener(&self.state, &event);
        }
        Some(event)
    }
}

impl fmt::Debug for TourMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TourMachine")
            .field("tour", &self.config.as_ref().map(TourConfig::id))
            .field("state", &self.state)
            .field("furthest", &self.furthest)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
