#![forbid(unsafe_code)]

//! Host-driven tour session.
//!
//! [`TourSession`] is the provider for one tour on one page. It owns the
//! machine handle, the element locator, the optional command bridge, and
//! every scoped host resource (keydown listener, scroll lock, locator
//! watchers, timers). The host drives it:
//!
//! ```text
//! host                                   TourSession
//! ────                                   ───────────
//! mount(host)                  ───────▶  schedule auto-start
//! push_event(HostEvent)        ───────▶  queue
//! advance_time(host, dt)       ───────▶  fire due timers
//! step(host, simulator)        ───────▶  drain queue, sync, dispatch, compose
//!                              ◀───────  StepResult { frame, events, dispatched }
//! ```
//!
//! # Invariants
//!
//! 1. The keydown binding and the scroll lock are held exactly while the
//!    tour is active.
//! 2. Locator watchers and retry timers belong to the current step's target
//!    and are released when the step, the tour, or the session goes away.
//! 3. Layout signals and keys are acted on only while the matching binding
//!    is held.
//! 4. The bridge sees each step once per run; a restart clears its guard.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use nostour_core::dom::{Binding, BindingGuard, DomHost, OBSERVED_ATTRIBUTES};
use nostour_core::event::KeyEvent;
use nostour_overlay::keys::{KeyBindings, TourIntent};
use nostour_overlay::overlay::{self, OverlayFrame};
use nostour_overlay::placement::OverlayConfig;
use nostour_runtime::bridge::{
    BridgeConfig, CommandAck, CommandBridge, CommandScript, Simulator, SimulatorAction,
    SimulatorCommand,
};
use nostour_runtime::config::TourConfig;
use nostour_runtime::context::{self, ProviderGuard, TourHandle};
use nostour_runtime::locator::{ElementLocator, LocateStatus, LocatorConfig};
use nostour_runtime::machine::{TourEvent, TourMachine};
use nostour_runtime::progress::ProgressStore;
use nostour_runtime::scheduler::{FiredTimer, Scheduler, TimerGuard, TimerKind};

/// Session knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub locator: LocatorConfig,
    pub bridge: BridgeConfig,
    pub overlay: OverlayConfig,
    pub keys: KeyBindings,
    /// Start on mount when the store allows it.
    pub auto_start: bool,
    /// Delay between mount and auto-start.
    pub auto_start_delay: Duration,
    /// Scroll each located target into view once per step.
    pub scroll_into_view: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            locator: LocatorConfig::default(),
            bridge: BridgeConfig::default(),
            overlay: OverlayConfig::default(),
            keys: KeyBindings::default(),
            auto_start: true,
            auto_start_delay: Duration::from_millis(500),
            scroll_into_view: true,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn locator(mut self, locator: LocatorConfig) -> Self {
        self.locator = locator;
        self
    }

    #[must_use]
    pub fn bridge(mut self, bridge: BridgeConfig) -> Self {
        self.bridge = bridge;
        self
    }

    #[must_use]
    pub fn overlay(mut self, overlay: OverlayConfig) -> Self {
        self.overlay = overlay;
        self
    }

    #[must_use]
    pub fn keys(mut self, keys: KeyBindings) -> Self {
        self.keys = keys;
        self
    }

    #[must_use]
    pub fn auto_start(mut self, enabled: bool) -> Self {
        self.auto_start = enabled;
        self
    }

    #[must_use]
    pub fn auto_start_delay(mut self, delay: Duration) -> Self {
        self.auto_start_delay = delay;
        self
    }

    #[must_use]
    pub fn scroll_into_view(mut self, enabled: bool) -> Self {
        self.scroll_into_view = enabled;
        self
    }
}

/// A click on one of the overlay's controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    /// Start the tour by hand (allowed even with the tours gate off).
    Start,
    /// Reset stored progress and start again.
    Restart,
    /// Next, carrying the step the button was rendered for.
    Next { step: usize },
    Back,
    Skip,
    /// Progress dot click.
    JumpTo(usize),
}

/// What changed in the DOM, as reported by the body mutation observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    ChildList,
    Attribute(String),
    CharacterData,
}

impl Mutation {
    /// Whether this mutation can move or resize elements.
    pub fn affects_layout(&self) -> bool {
        match self {
            Mutation::ChildList => true,
            Mutation::Attribute(name) => OBSERVED_ATTRIBUTES.contains(&name.as_str()),
            Mutation::CharacterData => false,
        }
    }
}

/// Input pushed by the host.
#[derive(Debug)]
pub enum HostEvent {
    Key(KeyEvent),
    Control(ControlAction),
    Mutation(Mutation),
    ElementResized(String),
    WindowScrolled,
    WindowResized,
    SimulatorAction(SimulatorAction),
    CommandHandled(CommandAck),
}

/// Outcome of one [`TourSession::step`].
#[derive(Debug, Default)]
pub struct StepResult {
    /// The overlay to paint, `None` while no tour is active.
    pub frame: Option<OverlayFrame>,
    /// Transitions committed since the previous step, in order. Includes an
    /// auto-start fired by [`TourSession::advance_time`].
    pub events: Vec<TourEvent>,
    /// Command handed to the simulator during this step.
    pub dispatched: Option<SimulatorCommand>,
    pub events_processed: u32,
}

/// The provider for one tour.
#[derive(Debug)]
pub struct TourSession {
    config: SessionConfig,
    tour: TourConfig,
    store: Arc<ProgressStore>,
    scheduler: Scheduler,
    handle: TourHandle,
    locator: ElementLocator,
    bridge: Option<CommandBridge>,
    queue: VecDeque<HostEvent>,
    timer_events: Vec<TourEvent>,
    mounted: bool,
    synced_step: Option<usize>,
    scrolled_step: Option<usize>,
    keydown: Option<BindingGuard>,
    scroll_lock: Option<BindingGuard>,
    auto_start: Option<TimerGuard>,
}

impl TourSession {
    pub fn new(tour: TourConfig, store: Arc<ProgressStore>, config: SessionConfig) -> Self {
        let scheduler = Scheduler::new();
        let handle = TourHandle::new(TourMachine::with_store(Arc::clone(&store)));
        let locator = ElementLocator::new(scheduler.clone(), config.locator);
        Self {
            config,
            tour,
            store,
            scheduler,
            handle,
            locator,
            bridge: None,
            queue: VecDeque::new(),
            timer_events: Vec::new(),
            mounted: false,
            synced_step: None,
            scrolled_step: None,
            keydown: None,
            scroll_lock: None,
            auto_start: None,
        }
    }

    /// Drive a simulator through `script` as the tour moves.
    #[must_use]
    pub fn with_script(mut self, script: CommandScript) -> Self {
        self.bridge = Some(CommandBridge::new(
            script,
            self.scheduler.clone(),
            self.config.bridge,
        ));
        self
    }

    pub fn handle(&self) -> TourHandle {
        self.handle.clone()
    }

    /// Install this session's handle as the thread's tour context.
    pub fn provide(&self) -> ProviderGuard {
        context::provide(self.handle.clone())
    }

    pub fn tour(&self) -> &TourConfig {
        &self.tour
    }

    pub fn store(&self) -> &Arc<ProgressStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn locator(&self) -> &ElementLocator {
        &self.locator
    }

    pub fn bridge(&self) -> Option<&CommandBridge> {
        self.bridge.as_ref()
    }

    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    /// Attach to the page. Schedules the auto-start when enabled and the
    /// store says the tour has not been seen.
    ///
    /// Must be called exactly once before [`step`](Self::step).
    pub fn mount<H: DomHost + ?Sized>(&mut self, _host: &H) {
        assert!(!self.mounted, "TourSession::mount() called twice");
        self.mounted = true;
        if self.config.auto_start && self.store.should_auto_start(self.tour.id()) {
            tracing::debug!(tour = self.tour.id(), delay = ?self.config.auto_start_delay, "auto-start scheduled");
            self.auto_start = Some(
                self.scheduler
                    .schedule(TimerKind::AutoStart, self.config.auto_start_delay),
            );
        }
    }

    /// Queue a host event for the next [`step`](Self::step).
    pub fn push_event(&mut self, event: HostEvent) {
        self.queue.push_back(event);
    }

    /// Advance the clock by `dt`, firing due timers in order.
    pub fn advance_time<H: DomHost + ?Sized>(&mut self, host: &mut H, dt: Duration) {
        let deadline = self.scheduler.now().saturating_add(dt);
        while let Some(fired) = self.scheduler.pop_due(deadline) {
            self.on_timer(host, &fired);
        }
        self.scheduler.set_now(deadline);
    }

    /// Process queued events, resync resources, hand the simulator its next
    /// command, and compose the overlay.
    pub fn step<H, S>(&mut self, host: &mut H, simulator: &mut S) -> StepResult
    where
        H: DomHost + ?Sized,
        S: Simulator + ?Sized,
    {
        assert!(self.mounted, "TourSession::step() called before mount()");
        let mut result = StepResult {
            events: std::mem::take(&mut self.timer_events),
            ..StepResult::default()
        };

        // 1. Process queued events.
        let first_new = result.events.len();
        while let Some(event) = self.queue.pop_front() {
            result.events_processed += 1;
            if let Some(ev) = self.handle_event(host, event) {
                result.events.push(ev);
            }
        }

        // 2. Bring bindings, locator and bridge in line with the machine.
        self.sync(host, &result.events[first_new..]);

        // 3. Hand the simulator its next command.
        if let Some(dispatch) = self.bridge.as_mut().and_then(CommandBridge::take_command) {
            result.dispatched = Some(dispatch.command.clone());
            simulator.execute(&dispatch.command, dispatch.ack);
        }

        // 4. Compose.
        result.frame = self.frame(host);
        result
    }

    /// Compose the overlay for the current state without processing events.
    pub fn frame<H: DomHost + ?Sized>(&self, host: &H) -> Option<OverlayFrame> {
        let viewport = host.viewport();
        self.handle.with(|machine| {
            overlay::compose(machine, self.locator.rect(), &viewport, &self.config.overlay)
        })
    }

    /// Whether the keydown listener is installed.
    pub fn listens_for_keys(&self) -> bool {
        self.keydown.is_some()
    }

    /// Whether the document scroll is locked.
    pub fn scroll_locked(&self) -> bool {
        self.scroll_lock.is_some()
    }

    /// Release every host resource. The machine keeps its state and nothing
    /// is persisted.
    pub fn unmount(&mut self) {
        self.auto_start = None;
        self.release_step_resources();
        self.keydown = None;
        self.scroll_lock = None;
        self.mounted = false;
        self.queue.clear();
        self.timer_events.clear();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn handle_event<H: DomHost + ?Sized>(
        &mut self,
        host: &mut H,
        event: HostEvent,
    ) -> Option<TourEvent> {
        match event {
            HostEvent::Key(key) => {
                if !host.bindings().is_bound(&Binding::Keydown) {
                    return None;
                }
                let intent = self.config.keys.resolve(&key, &self.handle.state())?;
                match intent {
                    TourIntent::Next => self.handle.advance(),
                    TourIntent::Back => self.handle.retreat(),
                    TourIntent::Skip => self.handle.end(true),
                }
            }
            HostEvent::Control(action) => self.control(action),
            HostEvent::Mutation(mutation) => {
                if mutation.affects_layout() && host.bindings().is_bound(&Binding::BodyMutations) {
                    self.refresh_target(host);
                }
                None
            }
            HostEvent::ElementResized(selector) => {
                if host.bindings().observes_resize_of(&selector) {
                    self.refresh_target(host);
                }
                None
            }
            HostEvent::WindowScrolled => {
                if host.bindings().is_bound(&Binding::WindowScroll) {
                    self.refresh_target(host);
                }
                None
            }
            HostEvent::WindowResized => {
                if host.bindings().is_bound(&Binding::WindowResize) {
                    self.refresh_target(host);
                }
                None
            }
            HostEvent::SimulatorAction(action) => self
                .handle
                .register_action(&action.action_type, action.data.as_ref()),
            HostEvent::CommandHandled(ack) => {
                if let Some(bridge) = self.bridge.as_mut() {
                    bridge.on_command_handled(ack);
                }
                None
            }
        }
    }

    fn control(&mut self, action: ControlAction) -> Option<TourEvent> {
        match action {
            ControlAction::Start => {
                self.auto_start = None;
                self.handle.start(self.tour.clone())
            }
            ControlAction::Restart => {
                self.auto_start = None;
                self.store.reset(self.tour.id());
                self.handle.start(self.tour.clone())
            }
            ControlAction::Next { step } => self.handle.advance_from(step),
            ControlAction::Back => self.handle.retreat(),
            ControlAction::Skip => self.handle.end(true),
            ControlAction::JumpTo(index) => self.handle.jump_to(index),
        }
    }

    fn on_timer<H: DomHost + ?Sized>(&mut self, host: &mut H, fired: &FiredTimer) {
        if self.auto_start.as_ref().is_some_and(|t| t.matches(fired)) {
            self.auto_start = None;
            // Progress may have changed while the timer was pending.
            if !self.handle.is_active() && self.store.should_auto_start(self.tour.id()) {
                tracing::info!(tour = self.tour.id(), "auto-starting tour");
                if let Some(event) = self.handle.start(self.tour.clone()) {
                    self.sync(host, std::slice::from_ref(&event));
                    self.timer_events.push(event);
                }
            }
            return;
        }
        if self.locator.on_timer(host, fired) {
            self.scroll_if_found(host);
            return;
        }
        if let Some(bridge) = self.bridge.as_mut()
            && bridge.on_timer(fired)
        {
            return;
        }
        tracing::trace!(id = ?fired.id, kind = ?fired.kind, "unrouted timer");
    }

    /// Bring bindings, locator and bridge in line with the machine.
    fn sync<H: DomHost + ?Sized>(&mut self, host: &mut H, events: &[TourEvent]) {
        let state = self.handle.state();
        if !state.is_active {
            if self.keydown.is_some() || self.synced_step.is_some() {
                tracing::debug!(
                    completed = state.is_completed,
                    skipped = state.is_skipped,
                    "tour inactive, releasing resources"
                );
            }
            self.keydown = None;
            self.scroll_lock = None;
            self.release_step_resources();
            return;
        }

        if self.keydown.is_none() {
            self.keydown = Some(host.bindings().bind(Binding::Keydown));
            self.scroll_lock = Some(host.bindings().bind(Binding::ScrollLock));
        }

        let restarted = events
            .iter()
            .any(|e| matches!(e, TourEvent::Started { .. }));
        if restarted {
            self.release_step_resources();
        }
        if self.synced_step == Some(state.current_step) {
            return;
        }
        self.synced_step = Some(state.current_step);

        let target = self
            .handle
            .with(|m| m.current_step().map(|s| s.target.clone()))
            .unwrap_or_default();
        let status = if self.locator.selector() == Some(target.as_str()) {
            self.locator.recalculate(host)
        } else {
            self.locator.set_selector(host, &target)
        };
        tracing::debug!(step = state.current_step, target = %target, ?status, "step synced");
        self.scroll_if_found(host);

        if let Some(bridge) = self.bridge.as_mut() {
            bridge.on_step_change(state.current_step);
        }
    }

    fn refresh_target<H: DomHost + ?Sized>(&mut self, host: &H) {
        self.locator.on_layout_signal(host);
    }

    fn scroll_if_found<H: DomHost + ?Sized>(&mut self, host: &mut H) {
        if !self.config.scroll_into_view || self.scrolled_step == self.synced_step {
            return;
        }
        if matches!(self.locator.status(), LocateStatus::Found(_)) {
            self.scrolled_step = self.synced_step;
            if self.locator.scroll_into_view(host) {
                self.locator.on_layout_signal(host);
            }
        }
    }

    fn release_step_resources(&mut self) {
        self.locator.release();
        self.synced_step = None;
        self.scrolled_step = None;
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.reset();
        }
    }
}
