#![forbid(unsafe_code)]

//! Runtime for the nostour guided-tour engine.
//!
//! # Role in nostour
//! `nostour-runtime` owns tour state and everything that changes over time:
//! the [`machine::TourMachine`], the [`locator::ElementLocator`], the
//! [`bridge::CommandBridge`], and the [`progress::ProgressStore`]. Time comes
//! from a host-driven [`scheduler::Scheduler`], so every component is
//! deterministic under test.
//!
//! # How it fits in the system
//! The overlay crate reads machine state and locator rectangles to build a
//! frame. The web crate wires these pieces into a session that the host
//! drives with events and time.

pub mod bridge;
pub mod config;
pub mod context;
pub mod locator;
pub mod machine;
pub mod progress;
pub mod scheduler;

pub use bridge::{
    BridgeConfig, CommandAck, CommandBridge, CommandScript, Dispatch, Simulator, SimulatorAction,
    SimulatorCommand,
};
pub use config::{ConfigError, TourConfig, TourConfigBuilder, TourStep, Trigger};
pub use context::{ProviderGuard, TourError, TourHandle};
pub use locator::{ElementLocator, LocateStatus, LocatorConfig};
pub use machine::{ListenerId, TourAdvanceReason, TourEvent, TourMachine, TourState};
pub use progress::{
    MemoryStorage, PrivacySettings, ProgressStore, StorageBackend, StorageError, StorageResult,
    TourProgress,
};
#[cfg(feature = "file-storage")]
pub use progress::FileStorage;
pub use scheduler::{FiredTimer, Scheduler, TimerGuard, TimerId, TimerKind};
