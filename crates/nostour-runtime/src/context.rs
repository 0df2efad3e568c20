#![forbid(unsafe_code)]

//! Tour context: a shared handle to the machine and a scoped provider.
//!
//! Consumers (overlay controls, simulators reporting actions, the bridge
//! driver) receive a [`TourHandle`] explicitly where they can. Code that is
//! deep inside a view tree can instead look up the handle installed by the
//! nearest [`provide`] guard on this thread.
//!
//! Looking the context up with no provider installed is a wiring mistake:
//! [`try_current`] reports it as [`TourError::NoProvider`] and [`current`]
//! panics.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::config::TourConfig;
use crate::machine::{ListenerId, TourEvent, TourMachine, TourState};

/// Errors from the tour context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TourError {
    /// The tour context was used outside of a provider.
    NoProvider,
}

impl fmt::Display for TourError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TourError::NoProvider => f.write_str("tour context used outside of a tour provider"),
        }
    }
}

impl std::error::Error for TourError {}

type SharedListener = Rc<RefCell<dyn FnMut(&TourState, &TourEvent)>>;

#[derive(Default)]
struct Listeners {
    next: u64,
    entries: Vec<(ListenerId, SharedListener)>,
}

/// Shared handle to a [`TourMachine`].
///
/// Cloning is cheap and yields a handle to the same machine.
///
/// Step validators, action callbacks and listeners subscribed here run while
/// the machine is not borrowed, so they may read the tour through any handle
/// (or [`current`]) and may drive it. A transition started from a listener
/// notifies every listener before the outer notification continues; a
/// listener is never re-entered.
#[derive(Clone, Default)]
pub struct TourHandle {
    machine: Rc<RefCell<TourMachine>>,
    listeners: Rc<RefCell<Listeners>>,
}

impl TourHandle {
    pub fn new(machine: TourMachine) -> Self {
        Self {
            machine: Rc::new(RefCell::new(machine)),
            listeners: Rc::default(),
        }
    }

    /// Snapshot of the live state.
    pub fn state(&self) -> TourState {
        self.machine.borrow().state().clone()
    }

    pub fn is_active(&self) -> bool {
        self.machine.borrow().is_active()
    }

    pub fn start(&self, config: TourConfig) -> Option<TourEvent> {
        let event = self.machine.borrow_mut().start(config);
        self.notify(event)
    }

    pub fn restart(&self) -> Option<TourEvent> {
        let event = self.machine.borrow_mut().restart();
        self.notify(event)
    }

    pub fn advance(&self) -> Option<TourEvent> {
        let (config, index) = self.machine.borrow().advance_target()?;
        if !config.step(index)?.is_valid() {
            tracing::trace!(step = index, "advance blocked by validator");
            return None;
        }
        let event = self.machine.borrow_mut().accept_advance(index);
        self.notify(event)
    }

    pub fn advance_from(&self, step: usize) -> Option<TourEvent> {
        if !self.machine.borrow().is_on_step(step) {
            return None;
        }
        self.advance()
    }

    pub fn retreat(&self) -> Option<TourEvent> {
        let event = self.machine.borrow_mut().retreat();
        self.notify(event)
    }

    pub fn jump_to(&self, index: usize) -> Option<TourEvent> {
        let event = self.machine.borrow_mut().jump_to(index);
        self.notify(event)
    }

    pub fn end(&self, skip: bool) -> Option<TourEvent> {
        let event = self.machine.borrow_mut().end(skip);
        self.notify(event)
    }

    pub fn register_action(
        &self,
        action_type: &str,
        data: Option<&serde_json::Value>,
    ) -> Option<TourEvent> {
        let (config, index) = self.machine.borrow().action_target(action_type)?;
        let step = config.step(index)?;
        step.fire_on_action(action_type, data);
        if !step.is_valid() {
            tracing::trace!(step = %step.id, "action matched but validator failed");
            return None;
        }
        let event = self.machine.borrow_mut().accept_action(index, action_type);
        self.notify(event)
    }

    /// Register a listener that runs after each committed transition.
    pub fn subscribe(&self, listener: impl FnMut(&TourState, &TourEvent) + 'static) -> ListenerId {
        let listener: SharedListener = Rc::new(RefCell::new(listener));
        let mut listeners = self.listeners.borrow_mut();
        listeners.next += 1;
        let id = ListenerId::from_raw(listeners.next);
        listeners.entries.push((id, listener));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.entries.len();
        listeners.entries.retain(|(lid, _)| *lid != id);
        listeners.entries.len() != before
    }

    /// Read the machine. `f` must not drive the tour through a handle.
    pub fn with<R>(&self, f: impl FnOnce(&TourMachine) -> R) -> R {
        f(&self.machine.borrow())
    }

    /// Whether two handles share a machine.
    pub fn ptr_eq(&self, other: &TourHandle) -> bool {
        Rc::ptr_eq(&self.machine, &other.machine)
    }

    fn notify(&self, event: Option<TourEvent>) -> Option<TourEvent> {
        let event = event?;
        let snapshot: Vec<SharedListener> = self
            .listeners
            .borrow()
            .entries
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        if snapshot.is_empty() {
            return Some(event);
        }
        let state = self.state();
        for listener in snapshot {
            match listener.try_borrow_mut() {
                Ok(mut listener) => (&mut *listener)(&state, &event),
                Err(_) => tracing::trace!(?event, "listener already running; skipped"),
            }
        }
        Some(event)
    }
}

impl fmt::Debug for TourHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.machine.try_borrow() {
            Ok(machine) => f
                .debug_struct("TourHandle")
                .field("machine", &*machine)
                .field(
                    "listeners",
                    &self.listeners.try_borrow().map_or(0, |l| l.entries.len()),
                )
                .finish(),
            Err(_) => f.write_str("TourHandle(<borrowed>)"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────────────────────────────────────

thread_local! {
    static PROVIDERS: Rc<RefCell<Vec<TourHandle>>> = Rc::new(RefCell::new(Vec::new()));
}

/// RAII guard returned by [`provide`]. Dropping it uninstalls the handle.
#[must_use = "dropping the guard uninstalls the provider immediately"]
pub struct ProviderGuard {
    stack: Rc<RefCell<Vec<TourHandle>>>,
    handle: TourHandle,
}

impl fmt::Debug for ProviderGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderGuard").finish_non_exhaustive()
    }
}

impl Drop for ProviderGuard {
    fn drop(&mut self) {
        let popped = self.stack.borrow_mut().pop();
        if let Some(popped) = popped {
            debug_assert!(popped.ptr_eq(&self.handle));
        }
    }
}

/// Install `handle` as the current tour context for this thread.
///
/// Providers nest; the innermost one wins until its guard drops.
pub fn provide(handle: TourHandle) -> ProviderGuard {
    let stack = PROVIDERS.with(Rc::clone);
    stack.borrow_mut().push(handle.clone());
    ProviderGuard { stack, handle }
}

/// The innermost installed handle.
pub fn try_current() -> Result<TourHandle, TourError> {
    PROVIDERS.with(|stack| stack.borrow().last().cloned().ok_or(TourError::NoProvider))
}

/// The innermost installed handle.
///
/// # Panics
///
/// Panics when no provider is installed.
pub fn current() -> TourHandle {
    match try_current() {
        Ok(handle) => handle,
        Err(err) => panic!("{err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TourStep;
    use std::cell::Cell;

    fn config() -> TourConfig {
        TourConfig::builder("ctx")
            .step(TourStep::new("a", "#a", "A", ""))
            .step(TourStep::new("b", "#b", "B", ""))
            .build()
            .unwrap()
    }

    #[test]
    fn no_provider_is_an_error() {
        assert_eq!(try_current().unwrap_err(), TourError::NoProvider);
    }

    #[test]
    #[should_panic(expected = "outside of a tour provider")]
    fn current_panics_without_provider() {
        let _ = current();
    }

    #[test]
    fn provider_scopes_nest() {
        let outer = TourHandle::default();
        let inner = TourHandle::default();
        let g1 = provide(outer.clone());
        {
            let _g2 = provide(inner.clone());
            assert!(current().ptr_eq(&inner));
        }
        assert!(current().ptr_eq(&outer));
        drop(g1);
        assert!(try_current().is_err());
    }

    #[test]
    fn handles_share_machine() {
        let handle = TourHandle::default();
        let _guard = provide(handle.clone());
        current().start(config());
        assert!(handle.is_active());
        handle.advance();
        assert_eq!(current().state().current_step, 1);
        assert_eq!(handle.with(|m| m.furthest_reached()), 1);
    }

    #[test]
    fn action_callback_reads_context_state() {
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        let config = TourConfig::builder("ctx-action")
            .step(
                TourStep::new("login", "#login", "Log in", "").on_action_type("login").on_action(
                    move |_, _| {
                        *sink.borrow_mut() = Some(current().state());
                    },
                ),
            )
            .step(TourStep::new("feed", "#feed", "Feed", ""))
            .build()
            .unwrap();
        let handle = TourHandle::default();
        let _guard = provide(handle.clone());
        handle.start(config);

        let event = handle.register_action("login", None);

        assert_eq!(
            event,
            Some(TourEvent::StepChanged {
                from: 0,
                to: 1,
                reason: crate::machine::TourAdvanceReason::Action,
            })
        );
        let during = seen.borrow().clone().expect("callback ran");
        assert!(during.waiting_for_action);
        assert_eq!(during.current_step, 0);
    }

    #[test]
    fn validator_reads_handle_state() {
        let handle = TourHandle::default();
        let reader = handle.clone();
        let config = TourConfig::builder("ctx-validate")
            .step(TourStep::new("a", "#a", "A", "").validate(move || reader.is_active()))
            .step(TourStep::new("b", "#b", "B", ""))
            .build()
            .unwrap();
        handle.start(config);
        assert!(handle.advance().is_some());
        assert_eq!(handle.state().current_step, 1);
    }

    #[test]
    fn listener_reads_handle_after_commit() {
        let handle = TourHandle::default();
        let reader = handle.clone();
        let observed = Rc::new(Cell::new(None));
        let sink = Rc::clone(&observed);
        handle.subscribe(move |state, _| {
            sink.set(Some((reader.is_active(), state.current_step)));
        });

        handle.start(config());

        assert_eq!(observed.get(), Some((true, 0)));
    }

    #[test]
    fn listener_may_drive_the_tour() {
        let handle = TourHandle::default();
        let driver = handle.clone();
        let calls = Rc::new(Cell::new(0));
        let count = Rc::clone(&calls);
        handle.subscribe(move |_, event| {
            count.set(count.get() + 1);
            if matches!(event, TourEvent::Started { .. }) {
                driver.advance();
            }
        });

        handle.start(config());

        assert_eq!(handle.state().current_step, 1);
        // The nested StepChanged hits the listener while it is still running
        // for Started, so it is skipped rather than re-entered.
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn unsubscribed_listener_stops_firing() {
        let handle = TourHandle::default();
        let calls = Rc::new(Cell::new(0));
        let count = Rc::clone(&calls);
        let id = handle.subscribe(move |_, _| count.set(count.get() + 1));
        handle.start(config());
        assert!(handle.unsubscribe(id));
        assert!(!handle.unsubscribe(id));
        handle.advance();
        assert_eq!(calls.get(), 1);
    }
}
