//! End-to-end walkthroughs: page, simulator, bridge and session together.

use std::sync::Arc;
use std::time::Duration;

use nostour_core::dom::DomHost;
use nostour_demo::simulator::{ClientSimulator, View};
use nostour_demo::tours::{self, DemoTour};
use nostour_demo::walkthrough::{Outcome, Walkthrough};
use nostour_runtime::bridge::{CommandScript, SimulatorCommand};
use nostour_runtime::config::{TourConfig, TourStep};
use nostour_runtime::locator::{LocateStatus, LocatorConfig};
use nostour_runtime::progress::{FileStorage, ProgressStore};
use nostour_web::{ControlAction, SessionConfig};
use pretty_assertions::assert_eq;

fn manual_session() -> SessionConfig {
    SessionConfig::default().auto_start(false)
}

fn login_tour() -> DemoTour {
    DemoTour {
        config: TourConfig::builder("login-basics")
            .step(TourStep::new("welcome", "#app-header", "Welcome", "Hi."))
            .step(
                TourStep::new("login", "#login-button", "Log in", "Generate keys.")
                    .on_action_type("login"),
            )
            .step(TourStep::new("feed", "#feed", "Feed", "Notes."))
            .build()
            .expect("valid tour"),
        script: CommandScript::new(),
        client: "Amethyst",
    }
}

#[test]
fn amethyst_chat_tour_completes() {
    let store = Arc::new(ProgressStore::in_memory());
    let tour = tours::amethyst_chat().expect("valid tour");
    let mut w = Walkthrough::new(tour, Arc::clone(&store), SessionConfig::default(), 1280.0, 800.0);

    assert_eq!(w.autopilot(5000), Outcome::Completed);
    assert!(store.get_progress("amethyst-chat").expect("recorded").completed);
    assert!(!store.should_auto_start("amethyst-chat"));

    assert_eq!(*w.simulator().view(), View::Chat("alice".into()));
    assert_eq!(
        w.simulator().conversation("alice").map(|c| c.messages.len()),
        Some(2)
    );
    assert!(w.dom().bindings().is_empty());
    assert_eq!(w.session().scheduler().pending(), 0);

    let dispatched: Vec<_> = w
        .transcript()
        .iter()
        .filter_map(|e| e.dispatched.clone())
        .collect();
    assert_eq!(
        dispatched,
        vec![
            SimulatorCommand::Login,
            SimulatorCommand::Navigate("feed".into()),
            SimulatorCommand::Navigate("chats".into()),
            SimulatorCommand::SelectItem("alice".into()),
        ]
    );
}

#[test]
fn primal_feed_tour_navigates_to_profile() {
    let store = Arc::new(ProgressStore::in_memory());
    let tour = tours::primal_feed().expect("valid tour");
    let mut w = Walkthrough::new(tour, store, SessionConfig::default(), 1024.0, 768.0);
    assert_eq!(w.autopilot(5000), Outcome::Completed);
    assert_eq!(*w.simulator().view(), View::Profile);
    assert!(w.simulator().notes()[0].liked);
}

#[test]
fn login_step_waits_for_the_simulator() {
    let store = Arc::new(ProgressStore::in_memory());
    let mut w = Walkthrough::new(login_tour(), Arc::clone(&store), manual_session(), 1280.0, 800.0);
    w.click(ControlAction::Start);
    w.tick();

    w.press("ArrowRight");
    let out = w.tick();
    let state = w.session().handle().state();
    assert_eq!(state.current_step, 1);
    assert!(state.waiting_for_action);
    assert_eq!(state.expected_action.as_deref(), Some("login"));
    assert_eq!(
        out.frame.expect("active").to_string(),
        "[2 / 3] ●◉○ Log in (waiting for login) | Waiting…"
    );

    w.press("Enter");
    w.tick();
    assert_eq!(w.session().handle().state().current_step, 1);

    w.user(ClientSimulator::click_login);
    w.tick();
    let state = w.session().handle().state();
    assert_eq!(state.current_step, 2);
    assert!(!state.waiting_for_action);
    // The feed rendered with the login, so the new target is found right away.
    assert!(matches!(w.session().locator().status(), LocateStatus::Found(_)));

    w.press("Enter");
    w.tick();
    let state = w.session().handle().state();
    assert!(state.is_completed);
    assert!(!state.is_active);
    assert!(store.get_progress("login-basics").expect("recorded").completed);
}

#[test]
fn never_existing_target_gives_up_after_backoff() {
    let store = Arc::new(ProgressStore::in_memory());
    let tour = DemoTour {
        config: TourConfig::builder("ghost")
            .step(TourStep::new("ghost", ".never-exists", "Ghost", "Not here."))
            .build()
            .expect("valid tour"),
        script: CommandScript::new(),
        client: "Amethyst",
    };
    let mut w = Walkthrough::new(tour, store, manual_session(), 1280.0, 800.0)
        .with_tick(Duration::from_millis(50));
    w.click(ControlAction::Start);
    w.tick();
    let started_at = w.session().now();
    assert_eq!(w.session().locator().status(), LocateStatus::Searching { attempt: 1 });

    let gave_up = w.run_until(200, |w| w.session().locator().status() == LocateStatus::NotFound);
    assert!(gave_up);
    assert_eq!(w.session().locator().attempts(), 10);
    let backoff = LocatorConfig::default().total_backoff();
    assert_eq!(backoff, Duration::from_millis(2750));
    assert_eq!(w.session().now() - started_at, backoff);

    // The overlay still renders controls so the user can move on.
    let frame = w.session().frame(w.dom()).expect("active");
    assert!(frame.tooltip.is_none());
    assert!(frame.controls.show_skip);
}

#[test]
fn skip_and_reset_drive_auto_start_across_sessions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("progress.json");
    let open = || Arc::new(ProgressStore::new(Box::new(FileStorage::new(&path))));

    let store = open();
    let mut w = Walkthrough::new(
        tours::primal_feed().expect("valid tour"),
        Arc::clone(&store),
        SessionConfig::default(),
        1280.0,
        800.0,
    );
    assert!(w.run_until(100, |w| w.session().handle().is_active()));
    w.press("Escape");
    w.tick();
    assert!(w.session().handle().state().is_skipped);
    assert!(w.dom().bindings().is_empty());

    let reopened = open();
    let progress = reopened.get_progress("primal-feed").expect("persisted");
    assert!(progress.skipped);
    assert_eq!(progress.last_step, 0);
    assert!(!reopened.should_auto_start("primal-feed"));

    // A fresh page does not start the tour again.
    let mut w = Walkthrough::new(
        tours::primal_feed().expect("valid tour"),
        Arc::clone(&reopened),
        SessionConfig::default(),
        1280.0,
        800.0,
    );
    assert_eq!(w.autopilot(100), Outcome::NotStarted);

    reopened.reset("primal-feed");
    assert!(open().should_auto_start("primal-feed"));
    let mut w = Walkthrough::new(
        tours::primal_feed().expect("valid tour"),
        open(),
        SessionConfig::default(),
        1280.0,
        800.0,
    );
    assert_eq!(w.autopilot(5000), Outcome::Completed);
}

#[test]
fn restart_clears_progress_and_replays_commands() {
    let store = Arc::new(ProgressStore::in_memory());
    let mut w = Walkthrough::new(
        tours::amethyst_chat().expect("valid tour"),
        Arc::clone(&store),
        manual_session(),
        1280.0,
        800.0,
    );
    w.click(ControlAction::Start);
    w.tick();
    w.click(ControlAction::Skip);
    w.tick();
    assert!(!store.should_auto_start("amethyst-chat"));

    w.click(ControlAction::Restart);
    let out = w.tick();
    assert_eq!(out.events.len(), 1);
    assert!(store.get_progress("amethyst-chat").is_none());
    assert!(w.session().handle().is_active());
    assert!(w.dom().bindings().is_bound(&nostour_core::dom::Binding::Keydown));
}

#[test]
fn transcript_serializes_to_json() {
    let store = Arc::new(ProgressStore::in_memory());
    let mut w = Walkthrough::new(login_tour(), store, manual_session(), 1280.0, 800.0);
    w.click(ControlAction::Start);
    w.tick();
    let json = serde_json::to_value(w.transcript()).expect("serializable");
    let first = &json[0];
    assert_eq!(first["view"], serde_json::json!({ "view": "login" }));
    assert_eq!(first["frame"], "[1 / 3] ◉○○ Welcome | Next");
    assert!(first["atMs"].is_u64());
}
