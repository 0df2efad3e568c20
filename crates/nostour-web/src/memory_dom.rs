#![forbid(unsafe_code)]

//! In-memory [`DomHost`] for headless runs and tests.
//!
//! Elements are stored by selector with document-space rectangles; queries
//! return viewport-space rectangles, the way `getBoundingClientRect` does.

use std::collections::BTreeMap;

use nostour_core::dom::{BindingRegistry, DomHost};
use nostour_core::geometry::{Rect, Viewport};

/// Host-controlled page model.
#[derive(Debug, Clone)]
pub struct MemoryDom {
    elements: BTreeMap<String, Rect>,
    viewport: Viewport,
    bindings: BindingRegistry,
    scroll_requests: Vec<String>,
}

impl MemoryDom {
    /// Create an empty, unscrolled page.
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            elements: BTreeMap::new(),
            viewport: Viewport::new(width, height),
            bindings: BindingRegistry::new(),
            scroll_requests: Vec::new(),
        }
    }

    /// Insert or move an element (document coordinates).
    pub fn insert(&mut self, selector: impl Into<String>, rect: Rect) {
        self.elements.insert(selector.into(), rect);
    }

    /// Remove an element. Returns whether it existed.
    pub fn remove(&mut self, selector: &str) -> bool {
        self.elements.remove(selector).is_some()
    }

    /// Remove every element.
    pub fn clear(&mut self) {
        self.elements.clear();
    }

    pub fn contains(&self, selector: &str) -> bool {
        self.elements.contains_key(selector)
    }

    pub fn set_size(&mut self, width: f64, height: f64) {
        self.viewport.width = width;
        self.viewport.height = height;
    }

    /// Scroll the document, never past its origin.
    pub fn scroll_to(&mut self, x: f64, y: f64) {
        self.viewport.scroll_x = x.max(0.0);
        self.viewport.scroll_y = y.max(0.0);
    }

    /// Selectors passed to [`DomHost::scroll_into_view`], in call order.
    pub fn scroll_requests(&self) -> &[String] {
        &self.scroll_requests
    }
}

impl DomHost for MemoryDom {
    fn query_rect(&self, selector: &str) -> Option<Rect> {
        self.elements
            .get(selector)
            .map(|r| r.translate(-self.viewport.scroll_x, -self.viewport.scroll_y))
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn scroll_into_view(&mut self, selector: &str) -> bool {
        let Some(rect) = self.elements.get(selector).copied() else {
            return false;
        };
        self.scroll_requests.push(selector.to_string());
        let center = rect.center();
        self.scroll_to(
            center.x - self.viewport.width / 2.0,
            center.y - self.viewport.height / 2.0,
        );
        true
    }

    fn bindings(&self) -> &BindingRegistry {
        &self.bindings
    }
}
