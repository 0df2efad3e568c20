#![forbid(unsafe_code)]

//! `nostour-web` wires the tour engine into a host-driven session.
//!
//! Design goals:
//! - **Host-driven I/O**: the embedding environment pushes keys, clicks,
//!   layout signals, and simulator callbacks as [`session::HostEvent`]s.
//! - **Deterministic time**: the host advances the clock explicitly; retry,
//!   settle, and auto-start delays are timers on a shared scheduler.
//! - **No blocking / no threads**: suitable for `wasm32-unknown-unknown`.
//!
//! [`memory_dom::MemoryDom`] stands in for a real page in headless runs.

pub mod memory_dom;
pub mod session;

pub use memory_dom::MemoryDom;
pub use session::{ControlAction, HostEvent, Mutation, SessionConfig, StepResult, TourSession};
