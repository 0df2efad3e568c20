#![forbid(unsafe_code)]

//! Core: geometry, key events, and the host boundary for the guided-tour engine.
//!
//! Nothing in this crate touches a real browser. The embedding environment
//! implements [`dom::DomHost`] and pushes layout signals; everything above
//! this crate stays deterministic and host-driven.

pub mod dom;
pub mod event;
pub mod geometry;
pub mod logging;

// Re-export tracing macros at crate root for ergonomic use.
#[cfg(feature = "tracing")]
pub use logging::{debug, debug_span, info, trace, warn};
