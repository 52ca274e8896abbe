//! Session module - Talking to the adapter as the console
//!
//! Provides:
//! - Per-session state (device identity latches, no-response latch)
//! - The command exchange driver
//! - Typed wrappers for each adapter command

mod commands;
mod driver;
#[cfg(test)]
mod mock;
mod state;

pub use commands::*;
pub use driver::*;
pub use state::*;
