#![forbid(unsafe_code)]

//! A small simulated Nostr client.
//!
//! The simulator keeps a view stack (login, feed, chats, chat detail,
//! profile), renders its elements into a [`MemoryDom`], and reports user
//! actions. Commands from the tour bridge are applied immediately; their
//! acks are held until the next [`render`](ClientSimulator::render), which is
//! the point at which the page reflects the command.

use std::fmt;

use nostour_core::dom::DomHost;
use nostour_core::geometry::Rect;
use nostour_runtime::bridge::{CommandAck, Simulator, SimulatorAction, SimulatorCommand};
use nostour_web::MemoryDom;
use serde::Serialize;
use serde_json::json;

/// One screen of the simulated client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", content = "id", rename_all = "camelCase")]
pub enum View {
    Login,
    Feed,
    Chats,
    Chat(String),
    Profile,
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Login => f.write_str("login"),
            View::Feed => f.write_str("feed"),
            View::Chats => f.write_str("chats"),
            View::Chat(id) => write!(f, "chat({id})"),
            View::Profile => f.write_str("profile"),
        }
    }
}

/// A direct-message conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub name: String,
    pub messages: Vec<String>,
}

/// A note in the home feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub author: String,
    pub content: String,
    pub liked: bool,
}

const HEADER_HEIGHT: f64 = 56.0;
const NAV_HEIGHT: f64 = 64.0;
const ROW_HEIGHT: f64 = 72.0;

static ROOT_VIEW: View = View::Login;

/// Simulated client state.
#[derive(Debug)]
pub struct ClientSimulator {
    name: String,
    npub: Option<String>,
    stack: Vec<View>,
    notes: Vec<Note>,
    conversations: Vec<Conversation>,
    acks: Vec<CommandAck>,
    actions: Vec<SimulatorAction>,
    rendered: Option<View>,
}

impl ClientSimulator {
    /// A logged-out client with a seeded feed and inbox.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            npub: None,
            stack: vec![View::Login],
            notes: vec![
                Note {
                    author: "fiatjaf".into(),
                    content: "relays are just dumb servers".into(),
                    liked: false,
                },
                Note {
                    author: "jb55".into(),
                    content: "gm nostr".into(),
                    liked: false,
                },
                Note {
                    author: "jack".into(),
                    content: "zap the world".into(),
                    liked: false,
                },
            ],
            conversations: vec![
                Conversation {
                    id: "alice".into(),
                    name: "Alice".into(),
                    messages: vec!["hey, did you get my zap?".into()],
                },
                Conversation {
                    id: "bob".into(),
                    name: "Bob".into(),
                    messages: vec!["which relay are you on?".into()],
                },
            ],
            acks: Vec::new(),
            actions: Vec::new(),
            rendered: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn view(&self) -> &View {
        self.stack.last().unwrap_or(&ROOT_VIEW)
    }

    pub fn is_logged_in(&self) -> bool {
        self.npub.is_some()
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Acks for commands the page now reflects. Empty while a render is
    /// outstanding.
    pub fn take_acks(&mut self) -> Vec<CommandAck> {
        if self.needs_render() {
            return Vec::new();
        }
        std::mem::take(&mut self.acks)
    }

    /// User actions since the last call.
    pub fn take_actions(&mut self) -> Vec<SimulatorAction> {
        std::mem::take(&mut self.actions)
    }

    /// Whether the page is out of date with the view.
    pub fn needs_render(&self) -> bool {
        self.rendered.as_ref() != Some(self.view())
    }

    // ─────────────────────────────────────────────────────────────────────
    // User interactions
    // ─────────────────────────────────────────────────────────────────────

    /// Press "Generate keys".
    pub fn click_login(&mut self) {
        if self.log_in() {
            let npub = self.npub.clone().unwrap_or_default();
            self.report(SimulatorAction::new("login").with_data(json!({ "npub": npub })));
        }
    }

    /// Press a bottom navigation tab.
    pub fn click_tab(&mut self, tab: &str) {
        if !self.is_logged_in() {
            return;
        }
        if let Some(view) = tab_view(tab) {
            self.stack = vec![view];
            self.report(SimulatorAction::new(format!("open-{tab}")));
        }
    }

    /// Open a conversation from the chat list.
    pub fn open_chat(&mut self, id: &str) {
        if *self.view() != View::Chats || self.conversation(id).is_none() {
            return;
        }
        self.stack.push(View::Chat(id.to_string()));
        self.report(SimulatorAction::new("select-chat").with_data(json!({ "chatId": id })));
    }

    /// Send a message in the open conversation.
    pub fn send_message(&mut self, text: &str) {
        let View::Chat(id) = self.view().clone() else {
            return;
        };
        if let Some(conversation) = self.conversations.iter_mut().find(|c| c.id == id) {
            conversation.messages.push(text.to_string());
            self.rendered = None;
            self.report(
                SimulatorAction::new("send-message").with_data(json!({ "chatId": id, "text": text })),
            );
        }
    }

    /// Like the note at `index` in the feed.
    pub fn like_note(&mut self, index: usize) {
        if *self.view() != View::Feed {
            return;
        }
        if let Some(note) = self.notes.get_mut(index) {
            note.liked = true;
            self.rendered = None;
            self.report(SimulatorAction::new("like-note").with_data(json!({ "index": index })));
        }
    }

    /// Press the back arrow.
    pub fn click_back(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Rendering
    // ─────────────────────────────────────────────────────────────────────

    /// Lay the current view out into `dom`.
    ///
    /// Returns whether the page changed.
    pub fn render(&mut self, dom: &mut MemoryDom) -> bool {
        let changed = self.needs_render();
        if changed {
            let viewport = dom.viewport();
            let (width, height) = (viewport.width, viewport.height);
            dom.clear();
            dom.insert("#app-header", Rect::new(0.0, 0.0, width, HEADER_HEIGHT));
            let body = Rect::new(0.0, HEADER_HEIGHT, width, height - HEADER_HEIGHT - NAV_HEIGHT);

            match self.view().clone() {
                View::Login => {
                    dom.insert("#login-card", Rect::new(width / 2.0 - 180.0, 160.0, 360.0, 240.0));
                    dom.insert("#login-button", Rect::new(width / 2.0 - 100.0, 320.0, 200.0, 44.0));
                }
                View::Feed => {
                    dom.insert("#feed", body);
                    for i in 0..self.notes.len() {
                        let y = body.y + i as f64 * ROW_HEIGHT;
                        dom.insert(format!("#note-{i}"), Rect::new(0.0, y, width, ROW_HEIGHT));
                        dom.insert(
                            format!("#like-button-{i}"),
                            Rect::new(width - 56.0, y + 20.0, 32.0, 32.0),
                        );
                    }
                }
                View::Chats => {
                    dom.insert("#chat-list", body);
                    for (i, c) in self.conversations.iter().enumerate() {
                        let y = body.y + i as f64 * ROW_HEIGHT;
                        dom.insert(format!("#chat-item-{}", c.id), Rect::new(0.0, y, width, ROW_HEIGHT));
                    }
                }
                View::Chat(id) => {
                    let count = self.conversation(&id).map_or(0, |c| c.messages.len());
                    dom.insert("#encryption-badge", Rect::new(width - 120.0, 12.0, 104.0, 32.0));
                    dom.insert(
                        "#message-list",
                        Rect::new(0.0, body.y, width, count as f64 * 48.0),
                    );
                    dom.insert(
                        "#message-input",
                        Rect::new(16.0, body.bottom() - 56.0, width - 32.0, 44.0),
                    );
                }
                View::Profile => {
                    dom.insert("#profile-card", Rect::new(16.0, body.y + 16.0, width - 32.0, 200.0));
                    dom.insert("#npub-field", Rect::new(32.0, body.y + 140.0, width - 64.0, 32.0));
                }
            }

            if self.is_logged_in() {
                let tab_width = width / 3.0;
                let y = height - NAV_HEIGHT;
                for (i, tab) in ["feed", "chats", "profile"].iter().enumerate() {
                    dom.insert(
                        format!("#nav-{tab}"),
                        Rect::new(i as f64 * tab_width, y, tab_width, NAV_HEIGHT),
                    );
                }
            }
            self.rendered = Some(self.view().clone());
            tracing::debug!(simulator = %self.name, view = %self.view(), "rendered");
        }
        changed
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn log_in(&mut self) -> bool {
        if self.is_logged_in() {
            return false;
        }
        self.npub = Some(format!("npub1{}demo", self.name.to_lowercase()));
        self.stack = vec![View::Feed];
        true
    }

    fn report(&mut self, action: SimulatorAction) {
        tracing::debug!(simulator = %self.name, action = %action.action_type, "user action");
        self.actions.push(action);
    }
}

fn tab_view(tab: &str) -> Option<View> {
    match tab {
        "feed" => Some(View::Feed),
        "chats" => Some(View::Chats),
        "profile" => Some(View::Profile),
        _ => None,
    }
}

impl Simulator for ClientSimulator {
    fn execute(&mut self, command: &SimulatorCommand, ack: CommandAck) {
        match command {
            SimulatorCommand::Login => {
                self.log_in();
            }
            SimulatorCommand::Navigate(tab) => match tab_view(tab) {
                Some(view) if self.is_logged_in() => self.stack = vec![view],
                _ => tracing::warn!(simulator = %self.name, %command, "navigation refused"),
            },
            SimulatorCommand::SelectItem(id) => {
                if self.conversation(id).is_some() && self.is_logged_in() {
                    self.stack = vec![View::Chats, View::Chat(id.clone())];
                } else {
                    tracing::warn!(simulator = %self.name, %command, "unknown item");
                }
            }
            SimulatorCommand::Back => self.click_back(),
        }
        // Commands never report user actions; only the ack goes back.
        self.acks.push(ack);
    }
}
