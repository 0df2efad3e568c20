//! Property-based tests for overlay geometry.
//!
//! 1. The tooltip always lies inside the clamp box on reasonable viewports.
//! 2. On any viewport the tooltip's top-left is never above or left of the margin.
//! 3. The spotlight always contains the target shifted into document space.
//! 4. The backdrop hole, when present, lies inside the backdrop bounds.

use nostour_core::geometry::{Placement, Rect, Viewport};
use nostour_overlay::placement::{
    Backdrop, OverlayConfig, spotlight_rect, tooltip_rect,
};
use proptest::prelude::*;

fn placement_strategy() -> impl Strategy<Value = Placement> {
    prop_oneof![
        Just(Placement::Top),
        Just(Placement::Bottom),
        Just(Placement::Left),
        Just(Placement::Right),
        Just(Placement::Center),
    ]
}

fn target_strategy() -> impl Strategy<Value = Rect> {
    (-500.0f64..3500.0, -500.0f64..2500.0, 0.0f64..600.0, 0.0f64..400.0)
        .prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
}

proptest! {
    #[test]
    fn tooltip_stays_in_clamp_box(
        target in target_strategy(),
        placement in placement_strategy(),
        vw in 400.0f64..3000.0,
        vh in 300.0f64..2000.0,
    ) {
        let cfg = OverlayConfig::default();
        let viewport = Viewport::new(vw, vh);
        let tip = tooltip_rect(target, placement, &viewport, &cfg);
        prop_assert!(tip.x >= 16.0);
        prop_assert!(tip.y >= 16.0);
        // With vw >= 400 the horizontal box is never inverted.
        prop_assert!(tip.x <= vw - 320.0 - 16.0);
        let max_top = (vh * 0.6).floor() - 150.0;
        prop_assert!(tip.y <= max_top.max(16.0));
        prop_assert_eq!(tip.width, 320.0);
        prop_assert_eq!(tip.height, 150.0);
    }

    #[test]
    fn tooltip_never_negative(
        target in target_strategy(),
        placement in placement_strategy(),
        vw in 0.0f64..400.0,
        vh in 0.0f64..300.0,
    ) {
        let tip = tooltip_rect(target, placement, &Viewport::new(vw, vh), &OverlayConfig::default());
        prop_assert!(tip.x >= 16.0);
        prop_assert!(tip.y >= 16.0);
    }

    #[test]
    fn spotlight_contains_shifted_target(
        target in target_strategy(),
        pad in 0.0f64..32.0,
        sx in 0.0f64..2000.0,
        sy in 0.0f64..5000.0,
    ) {
        let viewport = Viewport::new(1280.0, 800.0).scrolled(sx, sy);
        let spot = spotlight_rect(target, pad, &viewport);
        let shifted = target.translate(sx, sy);
        let eps = 1e-6;
        prop_assert!(spot.x <= shifted.x + eps);
        prop_assert!(spot.y <= shifted.y + eps);
        prop_assert!(spot.right() + eps >= shifted.right());
        prop_assert!(spot.bottom() + eps >= shifted.bottom());
    }

    #[test]
    fn backdrop_hole_inside_bounds(
        target in target_strategy(),
        sy in 0.0f64..3000.0,
    ) {
        let viewport = Viewport::new(1024.0, 768.0).scrolled(0.0, sy);
        let spot = spotlight_rect(target, 8.0, &viewport);
        let backdrop = Backdrop::for_viewport(&viewport, Some(spot));
        let eps = 1e-6;
        if let Some(hole) = backdrop.hole {
            prop_assert!(hole.x + eps >= backdrop.bounds.x);
            prop_assert!(hole.y + eps >= backdrop.bounds.y);
            prop_assert!(hole.right() <= backdrop.bounds.right() + eps);
            prop_assert!(hole.bottom() <= backdrop.bounds.bottom() + eps);
            prop_assert_eq!(backdrop.polygon().len(), 10);
        } else {
            prop_assert_eq!(backdrop.polygon().len(), 4);
        }
    }
}
