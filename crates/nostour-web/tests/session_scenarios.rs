//! Host-driven session scenarios against the in-memory DOM.

use std::sync::Arc;
use std::time::Duration;

use nostour_core::dom::{Binding, DomHost};
use nostour_core::event::KeyEvent;
use nostour_core::geometry::Rect;
use nostour_runtime::{
    CommandAck, CommandScript, LocateStatus, ProgressStore, Simulator, SimulatorAction,
    SimulatorCommand, TourConfig, TourEvent, TourStep,
};
use nostour_web::{ControlAction, HostEvent, MemoryDom, Mutation, SessionConfig, TourSession};
use pretty_assertions::assert_eq;

/// Simulator that records commands and holds acks until the test returns them.
#[derive(Default)]
struct RecordingSim {
    executed: Vec<SimulatorCommand>,
    acks: Vec<CommandAck>,
}

impl Simulator for RecordingSim {
    fn execute(&mut self, command: &SimulatorCommand, ack: CommandAck) {
        self.executed.push(command.clone());
        self.acks.push(ack);
    }
}

fn tour() -> TourConfig {
    TourConfig::builder("session-tour")
        .step(TourStep::new("welcome", "#welcome", "Welcome", "Hello."))
        .step(TourStep::new("login", "#login", "Log in", "Press it.").on_action_type("login"))
        .step(TourStep::new("feed", "#feed", "Feed", "Notes."))
        .build()
        .expect("valid tour")
}

fn page() -> MemoryDom {
    let mut dom = MemoryDom::new(1280.0, 800.0);
    dom.insert("#welcome", Rect::new(100.0, 100.0, 200.0, 60.0));
    dom.insert("#login", Rect::new(500.0, 300.0, 120.0, 40.0));
    dom.insert("#feed", Rect::new(0.0, 200.0, 600.0, 400.0));
    dom
}

fn mounted(store: Arc<ProgressStore>, config: SessionConfig) -> (TourSession, MemoryDom) {
    let dom = page();
    let mut session = TourSession::new(tour(), store, config);
    session.mount(&dom);
    (session, dom)
}

#[test]
fn auto_starts_after_delay() {
    let store = Arc::new(ProgressStore::in_memory());
    let (mut session, mut dom) = mounted(store, SessionConfig::default());
    let mut sim = RecordingSim::default();

    session.advance_time(&mut dom, Duration::from_millis(499));
    assert!(!session.handle().is_active());

    session.advance_time(&mut dom, Duration::from_millis(1));
    assert!(session.handle().is_active());

    let out = session.step(&mut dom, &mut sim);
    assert_eq!(
        out.events,
        vec![TourEvent::Started {
            tour_id: "session-tour".into()
        }]
    );
    let frame = out.frame.expect("frame while active");
    assert_eq!(frame.controls.counter(), "1 / 3");
    assert!(frame.tooltip.is_some());
    assert!(dom.bindings().is_bound(&Binding::Keydown));
    assert!(dom.bindings().is_bound(&Binding::ScrollLock));
    assert!(dom.bindings().is_bound(&Binding::BodyMutations));
    assert_eq!(dom.scroll_requests(), ["#welcome".to_string()]);
}

#[test]
fn settled_tour_does_not_auto_start() {
    let store = Arc::new(ProgressStore::in_memory());
    store.mark_completed("session-tour");
    let (mut session, mut dom) = mounted(store, SessionConfig::default());
    assert_eq!(session.scheduler().pending(), 0);
    session.advance_time(&mut dom, Duration::from_secs(5));
    assert!(!session.handle().is_active());
}

#[test]
fn tours_gate_blocks_auto_start_but_not_manual_start() {
    let store = Arc::new(ProgressStore::in_memory());
    store.set_tours_enabled(false);
    let (mut session, mut dom) = mounted(store, SessionConfig::default());
    let mut sim = RecordingSim::default();
    session.advance_time(&mut dom, Duration::from_secs(1));
    assert!(!session.handle().is_active());

    session.push_event(HostEvent::Control(ControlAction::Start));
    let out = session.step(&mut dom, &mut sim);
    assert!(out.frame.is_some());
}

#[test]
fn keys_drive_tour_and_skip_releases_everything() {
    let store = Arc::new(ProgressStore::in_memory());
    let config = SessionConfig::default().auto_start(false);
    let (mut session, mut dom) = mounted(Arc::clone(&store), config);
    let mut sim = RecordingSim::default();

    session.push_event(HostEvent::Control(ControlAction::Start));
    session.step(&mut dom, &mut sim);

    session.push_event(HostEvent::Key(KeyEvent::from_dom_key("ArrowRight")));
    let out = session.step(&mut dom, &mut sim);
    assert_eq!(session.handle().state().current_step, 1);
    assert!(!out.frame.expect("active").controls.next_enabled);

    // Next is suppressed while the login step waits.
    session.push_event(HostEvent::Key(KeyEvent::from_dom_key("Enter")));
    session.step(&mut dom, &mut sim);
    assert_eq!(session.handle().state().current_step, 1);

    session.push_event(HostEvent::Key(KeyEvent::from_dom_key("Escape")));
    let out = session.step(&mut dom, &mut sim);
    assert!(out.frame.is_none());
    assert!(dom.bindings().is_empty());
    assert!(!session.listens_for_keys());
    assert!(!session.scroll_locked());

    let progress = store.get_progress("session-tour").expect("recorded");
    assert!(progress.skipped);
    assert_eq!(progress.last_step, 1);
    assert!(!store.should_auto_start("session-tour"));
}

#[test]
fn keys_ignored_when_no_tour_is_active() {
    let store = Arc::new(ProgressStore::in_memory());
    let (mut session, mut dom) = mounted(store, SessionConfig::default().auto_start(false));
    let mut sim = RecordingSim::default();
    session.push_event(HostEvent::Key(KeyEvent::from_dom_key("ArrowRight")));
    let out = session.step(&mut dom, &mut sim);
    assert_eq!(out.events_processed, 1);
    assert!(out.events.is_empty());
    assert!(out.frame.is_none());
}

#[test]
fn simulator_action_advances_waiting_step() {
    let store = Arc::new(ProgressStore::in_memory());
    let (mut session, mut dom) = mounted(store, SessionConfig::default().auto_start(false));
    let mut sim = RecordingSim::default();

    session.push_event(HostEvent::Control(ControlAction::Start));
    session.push_event(HostEvent::Control(ControlAction::Next { step: 0 }));
    session.step(&mut dom, &mut sim);
    assert!(session.handle().state().waiting_for_action);

    session.push_event(HostEvent::SimulatorAction(SimulatorAction::new("logout")));
    session.step(&mut dom, &mut sim);
    assert_eq!(session.handle().state().current_step, 1);

    session.push_event(HostEvent::SimulatorAction(
        SimulatorAction::new("login").with_data(serde_json::json!({ "npub": "npub1test" })),
    ));
    let out = session.step(&mut dom, &mut sim);
    assert_eq!(session.handle().state().current_step, 2);
    assert_eq!(out.frame.expect("active").controls.next_label.as_str(), "Finish");
}

#[test]
fn stale_next_click_is_ignored() {
    let store = Arc::new(ProgressStore::in_memory());
    let (mut session, mut dom) = mounted(store, SessionConfig::default().auto_start(false));
    let mut sim = RecordingSim::default();
    session.push_event(HostEvent::Control(ControlAction::Start));
    session.push_event(HostEvent::Control(ControlAction::Next { step: 0 }));
    session.push_event(HostEvent::Control(ControlAction::Next { step: 0 }));
    session.step(&mut dom, &mut sim);
    assert_eq!(session.handle().state().current_step, 1);
}

#[test]
fn missing_target_gives_up_after_retries() {
    let store = Arc::new(ProgressStore::in_memory());
    let (mut session, mut dom) = mounted(store, SessionConfig::default().auto_start(false));
    let mut sim = RecordingSim::default();
    dom.remove("#welcome");

    session.push_event(HostEvent::Control(ControlAction::Start));
    let out = session.step(&mut dom, &mut sim);
    assert_eq!(session.locator().status(), LocateStatus::Searching { attempt: 1 });
    let frame = out.frame.expect("frame without target");
    assert!(frame.tooltip.is_none());
    assert!(frame.controls.next_enabled);
    assert!(!dom.bindings().is_bound(&Binding::BodyMutations));

    session.advance_time(&mut dom, Duration::from_millis(2749));
    assert_eq!(session.locator().status(), LocateStatus::Searching { attempt: 10 });
    session.advance_time(&mut dom, Duration::from_millis(1));
    assert_eq!(session.locator().status(), LocateStatus::NotFound);
    assert_eq!(session.scheduler().pending(), 0);

    // The tour stays navigable.
    session.push_event(HostEvent::Control(ControlAction::Next { step: 0 }));
    let out = session.step(&mut dom, &mut sim);
    assert!(out.frame.expect("active").tooltip.is_some());
}

#[test]
fn late_target_is_found_by_retry() {
    let store = Arc::new(ProgressStore::in_memory());
    let (mut session, mut dom) = mounted(store, SessionConfig::default().auto_start(false));
    let mut sim = RecordingSim::default();
    dom.remove("#welcome");
    session.push_event(HostEvent::Control(ControlAction::Start));
    session.step(&mut dom, &mut sim);

    dom.insert("#welcome", Rect::new(10.0, 10.0, 50.0, 50.0));
    session.advance_time(&mut dom, Duration::from_millis(50));
    assert!(matches!(session.locator().status(), LocateStatus::Found(_)));
    assert!(dom.bindings().is_bound(&Binding::ElementResize("#welcome".into())));
}

#[test]
fn layout_signals_refresh_target_rect() {
    let store = Arc::new(ProgressStore::in_memory());
    let config = SessionConfig::default().auto_start(false).scroll_into_view(false);
    let (mut session, mut dom) = mounted(store, config);
    let mut sim = RecordingSim::default();
    session.push_event(HostEvent::Control(ControlAction::Start));
    session.step(&mut dom, &mut sim);
    assert_eq!(session.locator().rect(), Some(Rect::new(100.0, 100.0, 200.0, 60.0)));

    dom.insert("#welcome", Rect::new(100.0, 180.0, 200.0, 60.0));
    // Text edits do not move anything.
    session.push_event(HostEvent::Mutation(Mutation::CharacterData));
    session.step(&mut dom, &mut sim);
    assert_eq!(session.locator().rect(), Some(Rect::new(100.0, 100.0, 200.0, 60.0)));

    session.push_event(HostEvent::Mutation(Mutation::Attribute("class".into())));
    session.step(&mut dom, &mut sim);
    assert_eq!(session.locator().rect(), Some(Rect::new(100.0, 180.0, 200.0, 60.0)));

    dom.scroll_to(0.0, 100.0);
    session.push_event(HostEvent::WindowScrolled);
    session.step(&mut dom, &mut sim);
    assert_eq!(session.locator().rect(), Some(Rect::new(100.0, 80.0, 200.0, 60.0)));
}

#[test]
fn bridge_dispatches_script_one_command_at_a_time() {
    let store = Arc::new(ProgressStore::in_memory());
    let script = CommandScript::new()
        .on_step(0, [SimulatorCommand::Login, SimulatorCommand::Navigate("feed".into())])
        .on_step(2, [SimulatorCommand::Back]);
    let config = SessionConfig::default().auto_start(false);
    let mut dom = page();
    let mut session = TourSession::new(tour(), store, config).with_script(script);
    session.mount(&dom);
    let mut sim = RecordingSim::default();

    session.push_event(HostEvent::Control(ControlAction::Start));
    let out = session.step(&mut dom, &mut sim);
    assert_eq!(out.dispatched, Some(SimulatorCommand::Login));

    // Nothing more until the simulator acknowledges and the settle delay passes.
    let out = session.step(&mut dom, &mut sim);
    assert_eq!(out.dispatched, None);
    let ack = sim.acks.remove(0);
    session.push_event(HostEvent::CommandHandled(ack));
    let out = session.step(&mut dom, &mut sim);
    assert_eq!(out.dispatched, None);

    session.advance_time(&mut dom, Duration::from_millis(30));
    let out = session.step(&mut dom, &mut sim);
    assert_eq!(out.dispatched, Some(SimulatorCommand::Navigate("feed".into())));
    assert_eq!(
        sim.executed,
        vec![SimulatorCommand::Login, SimulatorCommand::Navigate("feed".into())]
    );
}

#[test]
fn restart_replays_first_step_commands() {
    let store = Arc::new(ProgressStore::in_memory());
    let script = CommandScript::new().on_step(0, [SimulatorCommand::Login]);
    let mut dom = page();
    let mut session =
        TourSession::new(tour(), Arc::clone(&store), SessionConfig::default().auto_start(false))
            .with_script(script);
    session.mount(&dom);
    let mut sim = RecordingSim::default();

    session.push_event(HostEvent::Control(ControlAction::Start));
    session.step(&mut dom, &mut sim);
    session.push_event(HostEvent::Control(ControlAction::Skip));
    session.step(&mut dom, &mut sim);
    assert!(!store.should_auto_start("session-tour"));

    session.push_event(HostEvent::Control(ControlAction::Restart));
    let out = session.step(&mut dom, &mut sim);
    assert_eq!(out.dispatched, Some(SimulatorCommand::Login));
    assert_eq!(sim.executed.len(), 2);
    assert!(store.get_progress("session-tour").is_none());
}

#[test]
fn unmount_releases_bindings_and_timers() {
    let store = Arc::new(ProgressStore::in_memory());
    let (mut session, mut dom) = mounted(store, SessionConfig::default().auto_start(false));
    let mut sim = RecordingSim::default();
    dom.remove("#welcome");
    session.push_event(HostEvent::Control(ControlAction::Start));
    session.step(&mut dom, &mut sim);
    assert!(session.scheduler().pending() > 0);
    assert!(!dom.bindings().is_empty());

    session.unmount();
    assert_eq!(session.scheduler().pending(), 0);
    assert!(dom.bindings().is_empty());
}

#[test]
fn provider_exposes_session_handle() {
    let store = Arc::new(ProgressStore::in_memory());
    let (session, _dom) = mounted(store, SessionConfig::default());
    let guard = session.provide();
    let handle = nostour_runtime::context::current();
    assert!(handle.ptr_eq(&session.handle()));
    drop(guard);
    assert!(nostour_runtime::context::try_current().is_err());
}
