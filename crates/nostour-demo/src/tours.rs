#![forbid(unsafe_code)]

//! Tour scripts for the demo client.
//!
//! Each tour pairs its step list with the commands that put the simulator
//! into the right screen when a step is reached by navigation rather than
//! by the user's own clicks.

use nostour_core::geometry::Placement;
use nostour_runtime::bridge::{CommandScript, SimulatorCommand};
use nostour_runtime::config::{ConfigError, TourConfig, TourStep};

/// A tour plus the simulator it drives.
#[derive(Debug, Clone)]
pub struct DemoTour {
    pub config: TourConfig,
    pub script: CommandScript,
    /// Display name of the simulated client.
    pub client: &'static str,
}

/// Ids of every demo tour, in menu order.
pub const TOUR_IDS: &[&str] = &["amethyst-chat", "primal-feed"];

/// Look a tour up by id.
pub fn by_id(id: &str) -> Option<Result<DemoTour, ConfigError>> {
    match id {
        "amethyst-chat" => Some(amethyst_chat()),
        "primal-feed" => Some(primal_feed()),
        _ => None,
    }
}

/// Encrypted direct messages in an Amethyst-style client.
pub fn amethyst_chat() -> Result<DemoTour, ConfigError> {
    let config = TourConfig::builder("amethyst-chat")
        .step(
            TourStep::new(
                "welcome",
                "#app-header",
                "Welcome to Amethyst",
                "This simulator behaves like a real Nostr client, minus the relays.",
            )
            .placement(Placement::Bottom),
        )
        .step(
            TourStep::new(
                "login",
                "#login-button",
                "Create your keys",
                "Nostr accounts are key pairs. Press the button to generate one.",
            )
            .on_action_type("login"),
        )
        .step(
            TourStep::new(
                "feed",
                "#feed",
                "Your home feed",
                "Notes from the people you follow, fetched from your relays.",
            )
            .placement(Placement::Center)
            .padding(0.0),
        )
        .step(
            TourStep::new(
                "chats-tab",
                "#nav-chats",
                "Direct messages",
                "Open the chats tab.",
            )
            .placement(Placement::Top)
            .on_action_type("open-chats"),
        )
        .step(TourStep::new(
            "chat-list",
            "#chat-list",
            "Conversations",
            "Each conversation is a stream of encrypted events between two keys.",
        ))
        .step(
            TourStep::new(
                "open-chat",
                "#chat-item-alice",
                "Open a conversation",
                "Tap Alice to read the thread.",
            )
            .on_action_type("select-chat"),
        )
        .step(
            TourStep::new(
                "composer",
                "#message-input",
                "Say hello",
                "Type a message and send it. Only Alice can decrypt it.",
            )
            .placement(Placement::Top)
            .on_action_type("send-message"),
        )
        .step(
            TourStep::new(
                "encryption",
                "#encryption-badge",
                "End-to-end encrypted",
                "Relays store the message but cannot read it.",
            )
            .placement(Placement::Left),
        )
        .build()?;

    let script = CommandScript::new()
        .on_step(2, [SimulatorCommand::Login, SimulatorCommand::Navigate("feed".into())])
        .on_step(4, [SimulatorCommand::Navigate("chats".into())])
        .on_step(7, [SimulatorCommand::SelectItem("alice".into())]);

    Ok(DemoTour {
        config,
        script,
        client: "Amethyst",
    })
}

/// Reading and reacting to notes in a Primal-style client.
pub fn primal_feed() -> Result<DemoTour, ConfigError> {
    let config = TourConfig::builder("primal-feed")
        .step(
            TourStep::new(
                "login",
                "#login-button",
                "Sign in",
                "Generate a key pair to start reading.",
            )
            .on_action_type("login"),
        )
        .step(
            TourStep::new(
                "first-note",
                "#note-0",
                "A note",
                "Notes are signed events. Anyone can verify who wrote them.",
            )
            .padding(4.0),
        )
        .step(
            TourStep::new(
                "like",
                "#like-button-0",
                "React",
                "A like is just another event that references the note.",
            )
            .placement(Placement::Left)
            .on_action_type("like-note"),
        )
        .step(
            TourStep::new(
                "profile",
                "#npub-field",
                "Your public key",
                "Share your npub so others can find you.",
            )
            .placement(Placement::Bottom),
        )
        .build()?;

    let script = CommandScript::new()
        .on_step(1, [SimulatorCommand::Login, SimulatorCommand::Navigate("feed".into())])
        .on_step(3, [SimulatorCommand::Navigate("profile".into())]);

    Ok(DemoTour {
        config,
        script,
        client: "Primal",
    })
}
