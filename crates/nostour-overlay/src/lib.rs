#![forbid(unsafe_code)]

//! Overlay layer for the nostour guided-tour engine.
//!
//! - [`placement`]: spotlight, tooltip and backdrop geometry.
//! - [`overlay`]: composes machine state and geometry into an [`OverlayFrame`].
//! - [`keys`]: keyboard navigation.

pub mod keys;
pub mod overlay;
pub mod placement;

pub use keys::{KeyBindings, TourIntent};
pub use overlay::{Controls, DotState, NextLabel, OverlayFrame, ProgressDot, TooltipView, compose};
pub use placement::{Backdrop, OverlayConfig, StepGeometry};
