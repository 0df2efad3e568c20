#![forbid(unsafe_code)]

//! Keyboard navigation for an active tour.

use nostour_core::event::{KeyCode, KeyEvent, KeyEventKind};
use nostour_runtime::machine::TourState;

/// What a key asks the tour to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TourIntent {
    Next,
    Back,
    Skip,
}

/// Key to intent mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindings {
    pub next: Vec<KeyCode>,
    pub back: Vec<KeyCode>,
    pub skip: Vec<KeyCode>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            next: vec![KeyCode::Right, KeyCode::Enter],
            back: vec![KeyCode::Left],
            skip: vec![KeyCode::Escape],
        }
    }
}

impl KeyBindings {
    /// Map a key press to an intent for the given state.
    ///
    /// Releases, keys with Ctrl/Alt/Super held, and everything while no
    /// tour is active map to nothing. Next is suppressed while the step
    /// waits for an action.
    pub fn resolve(&self, key: &KeyEvent, state: &TourState) -> Option<TourIntent> {
        if !state.is_active || key.kind == KeyEventKind::Release || key.has_command_modifier() {
            return None;
        }
        if self.next.contains(&key.code) {
            return (!state.waiting_for_action).then_some(TourIntent::Next);
        }
        if self.back.contains(&key.code) {
            return Some(TourIntent::Back);
        }
        if self.skip.contains(&key.code) {
            return Some(TourIntent::Skip);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostour_core::event::Modifiers;

    fn active() -> TourState {
        TourState {
            is_active: true,
            total_steps: 3,
            ..TourState::default()
        }
    }

    #[test]
    fn default_keys() {
        let keys = KeyBindings::default();
        let state = active();
        let intent = |k: &str| keys.resolve(&KeyEvent::from_dom_key(k), &state);
        assert_eq!(intent("ArrowRight"), Some(TourIntent::Next));
        assert_eq!(intent("Enter"), Some(TourIntent::Next));
        assert_eq!(intent("ArrowLeft"), Some(TourIntent::Back));
        assert_eq!(intent("Escape"), Some(TourIntent::Skip));
        assert_eq!(intent("a"), None);
    }

    #[test]
    fn next_suppressed_while_waiting() {
        let keys = KeyBindings::default();
        let state = TourState {
            waiting_for_action: true,
            expected_action: Some("login".into()),
            ..active()
        };
        assert_eq!(keys.resolve(&KeyEvent::from_dom_key("Enter"), &state), None);
        assert_eq!(
            keys.resolve(&KeyEvent::from_dom_key("ArrowLeft"), &state),
            Some(TourIntent::Back)
        );
    }

    #[test]
    fn inactive_or_modified_keys_ignored() {
        let keys = KeyBindings::default();
        let right = KeyEvent::from_dom_key("ArrowRight");
        assert_eq!(keys.resolve(&right, &TourState::default()), None);
        let ctrl = right.clone().with_modifiers(Modifiers::CTRL);
        assert_eq!(keys.resolve(&ctrl, &active()), None);
        let release = right.with_kind(KeyEventKind::Release);
        assert_eq!(keys.resolve(&release, &active()), None);
    }
}
