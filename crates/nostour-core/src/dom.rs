#![forbid(unsafe_code)]

//! The host boundary: DOM queries and scoped bindings.
//!
//! # Invariants
//!
//! 1. Every observer, listener and scroll lock the engine asks for is a
//!    [`BindingGuard`]. Dropping the guard releases the binding, so release
//!    happens on every exit path (selector change, tour end, teardown).
//! 2. The host consults [`BindingRegistry::is_bound`] before delivering a
//!    signal. An unbound signal is never delivered.
//! 3. Bindings are reference counted per kind: two guards for the same
//!    [`Binding`] keep it alive until both are dropped.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::geometry::{Rect, Viewport};

/// Attributes that count as layout-affecting for the body mutation observer.
pub const OBSERVED_ATTRIBUTES: &[&str] = &["class", "style"];

/// The embedding environment, seen from the engine.
///
/// Implemented by the JS shim in the browser and by the in-memory mock DOM
/// in the demo and tests.
pub trait DomHost {
    /// Resolve a CSS selector to the first matching element's bounding rect
    /// (viewport coordinates). `None` if nothing matches right now.
    fn query_rect(&self, selector: &str) -> Option<Rect>;

    /// Current viewport size and scroll offsets.
    fn viewport(&self) -> Viewport;

    /// Smooth-scroll the element into the center of the viewport.
    ///
    /// Returns `false` if the element is not present.
    fn scroll_into_view(&mut self, selector: &str) -> bool;

    /// The registry through which bindings are requested.
    fn bindings(&self) -> &BindingRegistry;
}

/// A host-side resource the engine can hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Binding {
    /// Mutation observer on `document.body`: childList, subtree, and the
    /// [`OBSERVED_ATTRIBUTES`].
    BodyMutations,
    /// Resize observer on the element matching the selector.
    ElementResize(String),
    /// `scroll` listener on the window.
    WindowScroll,
    /// `resize` listener on the window.
    WindowResize,
    /// `keydown` listener on the window.
    Keydown,
    /// `overflow: hidden` on the document body.
    ScrollLock,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: u64,
    entries: Vec<(u64, Binding)>,
}

/// Shared registry of active bindings.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Clone, Default)]
pub struct BindingRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

impl BindingRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a binding. The binding is held until the guard drops.
    #[must_use = "dropping the guard releases the binding immediately"]
    pub fn bind(&self, binding: Binding) -> BindingGuard {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = inner.next_id;
        crate::trace!(id, binding = ?binding, "binding acquired");
        inner.entries.push((id, binding.clone()));
        BindingGuard {
            registry: Rc::clone(&self.inner),
            id,
            binding,
        }
    }

    /// Whether at least one guard holds `binding`.
    #[must_use]
    pub fn is_bound(&self, binding: &Binding) -> bool {
        self.inner.borrow().entries.iter().any(|(_, b)| b == binding)
    }

    /// Whether any element resize observer is active.
    #[must_use]
    pub fn observes_resize_of(&self, selector: &str) -> bool {
        self.inner
            .borrow()
            .entries
            .iter()
            .any(|(_, b)| matches!(b, Binding::ElementResize(s) if s == selector))
    }

    /// Snapshot of active bindings, in acquisition order.
    #[must_use]
    pub fn active(&self) -> Vec<Binding> {
        self.inner
            .borrow()
            .entries
            .iter()
            .map(|(_, b)| b.clone())
            .collect()
    }

    /// Number of live guards.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// Whether no guard is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for BindingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingRegistry")
            .field("active", &self.len())
            .finish()
    }
}

/// RAII guard for one acquired binding.
#[must_use = "dropping the guard releases the binding immediately"]
pub struct BindingGuard {
    registry: Rc<RefCell<RegistryInner>>,
    id: u64,
    binding: Binding,
}

impl BindingGuard {
    /// The binding this guard holds.
    pub fn binding(&self) -> &Binding {
        &self.binding
    }
}

impl fmt::Debug for BindingGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingGuard")
            .field("id", &self.id)
            .field("binding", &self.binding)
            .finish()
    }
}

impl Drop for BindingGuard {
    fn drop(&mut self) {
        let mut inner = self.registry.borrow_mut();
        inner.entries.retain(|(id, _)| *id != self.id);
        crate::trace!(id = self.id, "binding released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_drop_releases_binding() {
        let registry = BindingRegistry::new();
        let guard = registry.bind(Binding::Keydown);
        assert!(registry.is_bound(&Binding::Keydown));
        assert_eq!(guard.binding(), &Binding::Keydown);
        drop(guard);
        assert!(!registry.is_bound(&Binding::Keydown));
        assert!(registry.is_empty());
    }

    #[test]
    fn bindings_are_reference_counted() {
        let registry = BindingRegistry::new();
        let a = registry.bind(Binding::ScrollLock);
        let b = registry.bind(Binding::ScrollLock);
        drop(a);
        assert!(registry.is_bound(&Binding::ScrollLock));
        drop(b);
        assert!(!registry.is_bound(&Binding::ScrollLock));
    }

    #[test]
    fn resize_observer_matches_selector() {
        let registry = BindingRegistry::new();
        let _g = registry.bind(Binding::ElementResize("#feed".into()));
        assert!(registry.observes_resize_of("#feed"));
        assert!(!registry.observes_resize_of("#chats"));
    }

    #[test]
    fn clones_share_state() {
        let registry = BindingRegistry::new();
        let clone = registry.clone();
        let _g = clone.bind(Binding::WindowScroll);
        assert_eq!(registry.active(), vec![Binding::WindowScroll]);
    }
}
