#![forbid(unsafe_code)]

//! nostour demo: guided tours over a simulated Nostr client.
//!
//! - [`simulator`]: a headless client with login, feed, chats and profile screens.
//! - [`tours`]: tour scripts and the commands that steer the simulator.
//! - [`walkthrough`]: the host loop tying page, simulator and session together.
//! - [`cli`]: flag parsing for the binary.

pub mod cli;
pub mod simulator;
pub mod tours;
pub mod walkthrough;
