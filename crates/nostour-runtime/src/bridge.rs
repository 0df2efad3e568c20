#![forbid(unsafe_code)]

//! Command bridge: tour steps to simulator commands.
//!
//! A [`CommandScript`] maps step indices to ordered command lists. When the
//! tour lands on a step, the bridge replaces its queue with that step's list
//! and hands the simulator one command at a time. Each command carries a
//! [`CommandAck`] token; the next command is released only after the token
//! comes back and a short settle delay has passed.
//!
//! # Invariants
//!
//! 1. At most one command is pending, across step changes too.
//! 2. Repeated notifications for the same step are ignored.
//! 3. An ack that does not match the pending command is ignored.
//! 4. An unacknowledged command blocks the queue. The optional stall watchdog
//!    only reports; it never skips a command.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scheduler::{FiredTimer, Scheduler, TimerGuard, TimerKind};

/// An imperative instruction for a simulator.
///
/// Serialized as `{"type": "...", "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum SimulatorCommand {
    Login,
    Navigate(String),
    SelectItem(String),
    Back,
}

impl fmt::Display for SimulatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulatorCommand::Login => f.write_str("login"),
            SimulatorCommand::Navigate(view) => write!(f, "navigate({view})"),
            SimulatorCommand::SelectItem(id) => write!(f, "selectItem({id})"),
            SimulatorCommand::Back => f.write_str("back"),
        }
    }
}

/// A user action reported by a simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorAction {
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl SimulatorAction {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// One-shot acknowledgement for a dispatched command.
///
/// Hand it back through the session once the simulator's view reflects the
/// command. It cannot be cloned, so each command is acknowledged at most once.
#[must_use = "a command that is never acknowledged blocks the bridge"]
#[derive(Debug, PartialEq, Eq)]
pub struct CommandAck {
    seq: u64,
}

impl CommandAck {
    /// Sequence number of the command this acknowledges.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// A simulator the bridge can drive.
pub trait Simulator {
    /// Apply `command`. The simulator owns `ack` until it has caught up and
    /// then returns it through the session exactly once.
    fn execute(&mut self, command: &SimulatorCommand, ack: CommandAck);
}

/// Static step → commands mapping for one tour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandScript {
    steps: BTreeMap<usize, Vec<SimulatorCommand>>,
}

impl CommandScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands to run when the tour reaches `step`.
    #[must_use]
    pub fn on_step(mut self, step: usize, commands: impl IntoIterator<Item = SimulatorCommand>) -> Self {
        self.steps.insert(step, commands.into_iter().collect());
        self
    }

    /// The command list for `step`, empty if none.
    pub fn commands_for(&self, step: usize) -> &[SimulatorCommand] {
        self.steps.get(&step).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Bridge timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Pause between an ack and the next dispatch.
    pub settle_delay: Duration,
    /// Warn when a command stays unacknowledged this long. Off by default.
    pub stall_warning: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(30),
            stall_warning: None,
        }
    }
}

impl BridgeConfig {
    #[must_use]
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    #[must_use]
    pub fn stall_warning(mut self, after: Duration) -> Self {
        self.stall_warning = Some(after);
        self
    }
}

/// A command ready for the simulator.
#[derive(Debug)]
pub struct Dispatch {
    pub command: SimulatorCommand,
    pub ack: CommandAck,
}

/// Per-simulator command queue.
#[derive(Debug)]
pub struct CommandBridge {
    script: CommandScript,
    config: BridgeConfig,
    scheduler: Scheduler,
    last_step: Option<usize>,
    queue: VecDeque<SimulatorCommand>,
    pending: Option<(u64, SimulatorCommand)>,
    ready: bool,
    settle: Option<TimerGuard>,
    watchdog: Option<TimerGuard>,
    stalled: bool,
    next_seq: u64,
    batches: u64,
}

impl CommandBridge {
    pub fn new(script: CommandScript, scheduler: Scheduler, config: BridgeConfig) -> Self {
        Self {
            script,
            config,
            scheduler,
            last_step: None,
            queue: VecDeque::new(),
            pending: None,
            ready: false,
            settle: None,
            watchdog: None,
            stalled: false,
            next_seq: 0,
            batches: 0,
        }
    }

    pub fn script(&self) -> &CommandScript {
        &self.script
    }

    /// The tour moved to `step`. Returns false for a repeated notification.
    ///
    /// Replaces whatever was queued. A command still pending for the previous
    /// step keeps the queue blocked until its ack arrives and the settle
    /// delay passes; a settle delay already running is kept.
    pub fn on_step_change(&mut self, step: usize) -> bool {
        if self.last_step == Some(step) {
            tracing::trace!(step, "duplicate step notification ignored");
            return false;
        }
        self.last_step = Some(step);
        self.queue = self.script.commands_for(step).iter().cloned().collect();
        if let Some((seq, command)) = &self.pending {
            tracing::debug!(seq, %command, "step changed while a command is pending");
        } else if self.settle.is_none() {
            self.ready = true;
        }
        self.batches += 1;
        tracing::debug!(step, queued = self.queue.len(), "bridge queue replaced");
        true
    }

    /// Hand out the next command if nothing is pending and the settle delay
    /// has passed.
    pub fn take_command(&mut self) -> Option<Dispatch> {
        if self.pending.is_some() || !self.ready {
            return None;
        }
        let command = self.queue.pop_front()?;
        self.next_seq += 1;
        let seq = self.next_seq;
        self.pending = Some((seq, command.clone()));
        if let Some(after) = self.config.stall_warning {
            self.watchdog = Some(self.scheduler.schedule(TimerKind::BridgeStall, after));
        }
        tracing::debug!(seq, %command, remaining = self.queue.len(), "command dispatched");
        Some(Dispatch {
            command,
            ack: CommandAck { seq },
        })
    }

    /// The simulator finished a command. Returns false for a stale ack.
    pub fn on_command_handled(&mut self, ack: CommandAck) -> bool {
        match &self.pending {
            Some((seq, _)) if *seq == ack.seq => {}
            _ => {
                tracing::trace!(seq = ack.seq, "stale command ack ignored");
                return false;
            }
        }
        self.pending = None;
        self.watchdog = None;
        self.stalled = false;
        if self.queue.is_empty() {
            self.ready = true;
        } else {
            self.ready = false;
            self.settle = Some(
                self.scheduler
                    .schedule(TimerKind::BridgeSettle, self.config.settle_delay),
            );
        }
        true
    }

    /// Route a fired timer. Returns false if it was not this bridge's.
    pub fn on_timer(&mut self, fired: &FiredTimer) -> bool {
        if self.settle.as_ref().is_some_and(|t| t.matches(fired)) {
            self.settle = None;
            self.ready = true;
            return true;
        }
        if self.watchdog.as_ref().is_some_and(|t| t.matches(fired)) {
            self.watchdog = None;
            self.stalled = true;
            if let Some((seq, command)) = &self.pending {
                tracing::warn!(
                    seq,
                    %command,
                    "simulator has not acknowledged command; restart or skip the tour to recover"
                );
            }
            return true;
        }
        false
    }

    /// Forget the queue, the pending command and the last-step guard.
    pub fn reset(&mut self) {
        self.last_step = None;
        self.queue.clear();
        self.pending = None;
        self.ready = false;
        self.settle = None;
        self.watchdog = None;
        self.stalled = false;
    }

    pub fn pending(&self) -> Option<&SimulatorCommand> {
        self.pending.as_ref().map(|(_, c)| c)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn last_step(&self) -> Option<usize> {
        self.last_step
    }

    /// Whether the stall watchdog has fired for the pending command.
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// How many step notifications replaced the queue.
    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Whether a command could be taken right now.
    pub fn has_ready_command(&self) -> bool {
        self.ready && self.pending.is_none() && !self.queue.is_empty()
    }
}
