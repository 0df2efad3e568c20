#![forbid(unsafe_code)]

//! Overlay geometry: spotlight, tooltip, and backdrop.
//!
//! Pure functions of the target rectangle, the preferred side, the padding
//! and the viewport. Target rectangles come in viewport coordinates.
//!
//! # Invariants
//!
//! 1. The spotlight is in document coordinates (target expanded by padding,
//!    shifted by the scroll offsets) so the cut-out tracks the page.
//! 2. The tooltip is in viewport coordinates and never leaves the clamp box:
//!    left in `[margin, vw - width - margin]`, top in
//!    `[margin, floor(vh * max_top_ratio) - height]`. On viewports too
//!    small for that box the lower bound wins, so nothing goes negative.
//! 3. The backdrop is one polygon: the visible region with the spotlight cut
//!    out as an explicit inner ring.

use std::fmt::Write as _;

use nostour_core::geometry::{Placement, Point, Rect, Size, Viewport};

/// Reference tooltip footprint.
pub const TOOLTIP_SIZE: Size = Size::new(320.0, 150.0);
/// Space between target and tooltip on directional placements.
pub const TOOLTIP_GAP: f64 = 16.0;
/// Minimum distance from the viewport edge.
pub const VIEWPORT_MARGIN: f64 = 16.0;
/// Tooltips stay in this top share of the viewport, clear of the control bar.
pub const MAX_TOP_RATIO: f64 = 0.6;

/// Geometry knobs for the overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayConfig {
    pub tooltip_size: Size,
    pub gap: f64,
    pub margin: f64,
    pub max_top_ratio: f64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            tooltip_size: TOOLTIP_SIZE,
            gap: TOOLTIP_GAP,
            margin: VIEWPORT_MARGIN,
            max_top_ratio: MAX_TOP_RATIO,
        }
    }
}

impl OverlayConfig {
    #[must_use]
    pub fn tooltip_size(mut self, size: Size) -> Self {
        self.tooltip_size = size;
        self
    }

    #[must_use]
    pub fn gap(mut self, gap: f64) -> Self {
        self.gap = gap;
        self
    }

    #[must_use]
    pub fn margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    #[must_use]
    pub fn max_top_ratio(mut self, ratio: f64) -> Self {
        self.max_top_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Allowed range for the tooltip's left edge.
    pub fn left_bounds(&self, viewport: &Viewport) -> (f64, f64) {
        (
            self.margin,
            viewport.width - self.tooltip_size.width - self.margin,
        )
    }

    /// Allowed range for the tooltip's top edge.
    pub fn top_bounds(&self, viewport: &Viewport) -> (f64, f64) {
        (
            self.margin,
            (viewport.height * self.max_top_ratio).floor() - self.tooltip_size.height,
        )
    }
}

/// Spotlight and tooltip for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepGeometry {
    /// Document coordinates.
    pub spotlight: Rect,
    /// Viewport coordinates.
    pub tooltip: Rect,
}

/// Compute both rectangles for a target.
pub fn layout(
    target: Rect,
    placement: Placement,
    padding: f64,
    viewport: &Viewport,
    config: &OverlayConfig,
) -> StepGeometry {
    StepGeometry {
        spotlight: spotlight_rect(target, padding, viewport),
        tooltip: tooltip_rect(target, placement, viewport, config),
    }
}

/// The target grown by `padding` and moved into document coordinates.
pub fn spotlight_rect(target: Rect, padding: f64, viewport: &Viewport) -> Rect {
    target
        .expand(padding.max(0.0))
        .translate(viewport.scroll_x, viewport.scroll_y)
}

/// Place the tooltip next to `target` on the preferred side, then clamp.
pub fn tooltip_rect(
    target: Rect,
    placement: Placement,
    viewport: &Viewport,
    config: &OverlayConfig,
) -> Rect {
    let Size { width, height } = config.tooltip_size;
    let center = target.center();
    let (left, top) = match placement {
        Placement::Top => (center.x - width / 2.0, target.top() - height - config.gap),
        Placement::Bottom => (center.x - width / 2.0, target.bottom() + config.gap),
        Placement::Left => (target.left() - width - config.gap, center.y - height / 2.0),
        Placement::Right => (target.right() + config.gap, center.y - height / 2.0),
        Placement::Center => (center.x - width / 2.0, center.y - height / 2.0),
    };
    let (min_left, max_left) = config.left_bounds(viewport);
    let (min_top, max_top) = config.top_bounds(viewport);
    Rect::new(
        clamp_low_wins(left, min_left, max_left),
        clamp_low_wins(top, min_top, max_top),
        width,
        height,
    )
}

/// Clamp into `[lo, hi]`; when `hi < lo` the result is `lo`.
fn clamp_low_wins(value: f64, lo: f64, hi: f64) -> f64 {
    value.min(hi).max(lo)
}

// ─────────────────────────────────────────────────────────────────────────────
// Backdrop
// ─────────────────────────────────────────────────────────────────────────────

/// The dimmed layer: `bounds` minus an optional cut-out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backdrop {
    pub bounds: Rect,
    pub hole: Option<Rect>,
}

impl Backdrop {
    /// Backdrop over `bounds`. The hole is clipped to the bounds and dropped
    /// when nothing of it is visible.
    pub fn new(bounds: Rect, hole: Option<Rect>) -> Self {
        let hole = hole.and_then(|h| h.intersection_opt(&bounds));
        Self { bounds, hole }
    }

    /// Backdrop over the visible part of the document.
    pub fn for_viewport(viewport: &Viewport, spotlight: Option<Rect>) -> Self {
        Self::new(viewport.document_rect(), spotlight)
    }

    /// The polygon outline.
    ///
    /// Without a hole this is the four corners. With a hole the outline runs
    /// down the left edge, across the bottom to the hole's left side, up
    /// into the hole, around it the other way, back down, and on around the
    /// outer rectangle: ten points that fill everything but the hole.
    pub fn polygon(&self) -> Vec<Point> {
        let b = &self.bounds;
        let (x0, y0, x1, y1) = (b.left(), b.top(), b.right(), b.bottom());
        match self.hole {
            None => vec![
                Point::new(x0, y0),
                Point::new(x0, y1),
                Point::new(x1, y1),
                Point::new(x1, y0),
            ],
            Some(h) => {
                let (hl, ht, hr, hb) = (h.left(), h.top(), h.right(), h.bottom());
                vec![
                    Point::new(x0, y0),
                    Point::new(x0, y1),
                    Point::new(hl, y1),
                    Point::new(hl, ht),
                    Point::new(hr, ht),
                    Point::new(hr, hb),
                    Point::new(hl, hb),
                    Point::new(hl, y1),
                    Point::new(x1, y1),
                    Point::new(x1, y0),
                ]
            }
        }
    }

    /// SVG path data for the backdrop, for use with `fill-rule="evenodd"`.
    pub fn svg_path(&self) -> String {
        let mut out = String::new();
        push_ring(&mut out, &self.bounds);
        if let Some(hole) = &self.hole {
            out.push(' ');
            push_ring(&mut out, hole);
        }
        out
    }

    /// CSS `clip-path` value showing the backdrop everywhere but the hole.
    pub fn clip_path(&self) -> String {
        let points: Vec<String> = self
            .polygon()
            .iter()
            .map(|p| format!("{}px {}px", num(p.x), num(p.y)))
            .collect();
        format!("polygon({})", points.join(", "))
    }
}

fn push_ring(out: &mut String, r: &Rect) {
    let _ = write!(
        out,
        "M{} {} H{} V{} H{} Z",
        num(r.left()),
        num(r.top()),
        num(r.right()),
        num(r.bottom()),
        num(r.left())
    );
}

/// Two decimals, no negative zero, no trailing zeros.
fn num(v: f64) -> String {
    let rounded = (v * 100.0).round() / 100.0 + 0.0;
    format!("{rounded}")
}
