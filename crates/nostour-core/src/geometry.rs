#![forbid(unsafe_code)]

//! Geometric primitives.
//!
//! All values are CSS pixels. Element rectangles reported by the host are
//! viewport-relative (the shape of `getBoundingClientRect()`); the overlay
//! converts them to document coordinates where needed.

use std::fmt;
use std::str::FromStr;

/// A point in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A width/height pair in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    /// Create a new size.
    #[inline]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width (never negative for rects built through [`Rect::new`]).
    pub width: f64,
    /// Height (never negative for rects built through [`Rect::new`]).
    pub height: f64,
}

impl Rect {
    /// Create a new rectangle. Negative extents are clamped to zero.
    #[inline]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    /// Create a rectangle at the origin with the given size.
    #[inline]
    pub fn from_size(size: Size) -> Self {
        Self::new(0.0, 0.0, size.width, size.height)
    }

    /// Left edge. Alias for `self.x`.
    #[inline]
    pub const fn left(&self) -> f64 {
        self.x
    }

    /// Top edge. Alias for `self.y`.
    #[inline]
    pub const fn top(&self) -> f64 {
        self.y
    }

    /// Right edge (exclusive).
    #[inline]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge (exclusive).
    #[inline]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Center point.
    #[inline]
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Size of the rectangle.
    #[inline]
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Check if the rectangle has zero area.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Check if a point is inside the rectangle.
    #[inline]
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    /// Check if `other` lies entirely inside this rectangle.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Grow the rectangle by `amount` on every side.
    #[must_use]
    pub fn expand(&self, amount: f64) -> Rect {
        Rect::new(
            self.x - amount,
            self.y - amount,
            self.width + amount * 2.0,
            self.height + amount * 2.0,
        )
    }

    /// Move the rectangle by `(dx, dy)`.
    #[must_use]
    pub fn translate(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Compute the intersection with another rectangle, returning `None` if no overlap.
    pub fn intersection_opt(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if x < right && y < bottom {
            Some(Rect::new(x, y, right - x, bottom - y))
        } else {
            None
        }
    }

    /// Compute the intersection with another rectangle.
    ///
    /// Returns an empty rectangle if the rectangles don't overlap.
    #[inline]
    pub fn intersection(&self, other: &Rect) -> Rect {
        self.intersection_opt(other).unwrap_or_default()
    }

    /// The smallest rectangle that contains both.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }
}

/// The visible window: its size plus the document scroll offsets.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

impl Viewport {
    /// Create an unscrolled viewport.
    #[inline]
    pub const fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }

    /// Set the scroll offsets.
    #[must_use]
    pub const fn scrolled(mut self, scroll_x: f64, scroll_y: f64) -> Self {
        self.scroll_x = scroll_x;
        self.scroll_y = scroll_y;
        self
    }

    /// The viewport in its own coordinates, origin at the top-left corner.
    #[inline]
    pub fn client_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }

    /// The visible region in document coordinates.
    #[inline]
    pub fn document_rect(&self) -> Rect {
        Rect::new(self.scroll_x, self.scroll_y, self.width, self.height)
    }
}

/// Preferred side for a tooltip relative to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Placement {
    Top,
    #[default]
    Bottom,
    Left,
    Right,
    Center,
}

impl Placement {
    /// The lowercase name used in tour scripts.
    pub const fn as_str(self) -> &'static str {
        match self {
            Placement::Top => "top",
            Placement::Bottom => "bottom",
            Placement::Left => "left",
            Placement::Right => "right",
            Placement::Center => "center",
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a placement name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePlacementError(pub String);

impl fmt::Display for ParsePlacementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown placement '{}'", self.0)
    }
}

impl std::error::Error for ParsePlacementError {}

impl FromStr for Placement {
    type Err = ParsePlacementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" => Ok(Placement::Top),
            "bottom" => Ok(Placement::Bottom),
            "left" => Ok(Placement::Left),
            "right" => Ok(Placement::Right),
            "center" => Ok(Placement::Center),
            other => Err(ParsePlacementError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_new_clamps_negative_extents() {
        let r = Rect::new(5.0, 5.0, -3.0, 10.0);
        assert_eq!(r.width, 0.0);
        assert!(r.is_empty());
    }

    #[test]
    fn rect_contains_edges() {
        let rect = Rect::new(2.0, 3.0, 4.0, 5.0);
        assert!(rect.contains(Point::new(2.0, 3.0)));
        assert!(rect.contains(Point::new(5.9, 7.9)));
        assert!(!rect.contains(Point::new(6.0, 3.0)));
        assert!(!rect.contains(Point::new(2.0, 8.0)));
    }

    #[test]
    fn rect_expand_grows_every_side() {
        let r = Rect::new(10.0, 20.0, 30.0, 40.0).expand(8.0);
        assert_eq!(r, Rect::new(2.0, 12.0, 46.0, 56.0));
    }

    #[test]
    fn rect_translate_moves_origin_only() {
        let r = Rect::new(1.0, 2.0, 3.0, 4.0).translate(10.0, -2.0);
        assert_eq!(r, Rect::new(11.0, 0.0, 3.0, 4.0));
    }

    #[test]
    fn rect_intersection_no_overlap_is_empty() {
        let a = Rect::new(0.0, 0.0, 2.0, 2.0);
        let b = Rect::new(3.0, 3.0, 2.0, 2.0);
        assert!(a.intersection_opt(&b).is_none());
        assert_eq!(a.intersection(&b), Rect::default());
    }

    #[test]
    fn rect_union_covers_both() {
        let a = Rect::new(0.0, 0.0, 2.0, 2.0);
        let b = Rect::new(3.0, 3.0, 2.0, 2.0);
        let u = a.union(&b);
        assert!(u.contains_rect(&a));
        assert!(u.contains_rect(&b));
        assert_eq!(u, Rect::new(0.0, 0.0, 5.0, 5.0));
    }

    #[test]
    fn viewport_document_rect_tracks_scroll() {
        let vp = Viewport::new(800.0, 600.0).scrolled(0.0, 250.0);
        assert_eq!(vp.document_rect(), Rect::new(0.0, 250.0, 800.0, 600.0));
        assert_eq!(vp.client_rect(), Rect::new(0.0, 0.0, 800.0, 600.0));
    }

    #[test]
    fn placement_parses_case_insensitively() {
        assert_eq!("Top".parse::<Placement>(), Ok(Placement::Top));
        assert_eq!(" center ".parse::<Placement>(), Ok(Placement::Center));
        assert!("diagonal".parse::<Placement>().is_err());
        assert_eq!(Placement::default(), Placement::Bottom);
        assert_eq!(Placement::Right.to_string(), "right");
    }
}
