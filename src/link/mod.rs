//! Link module - The virtual link cable between console and adapter
//!
//! Provides:
//! - The 8-byte clocked-link record format
//! - A listener that accepts the emulator and runs the version handshake
//! - A connection exchanging single bytes stamped with a logical clock

mod clock;
mod connection;
mod listener;
mod packet;

pub use clock::*;
pub use connection::*;
pub use listener::*;
pub use packet::*;

use std::time::Duration;

/// Default port the emulator connects to
pub const DEFAULT_PORT: u16 = 8765;

/// Configuration for the link listener
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Address to bind
    pub bind_address: String,
    /// Port to listen on
    pub port: u16,
    /// Bound on the handshake; `None` waits forever
    pub handshake_timeout_ms: Option<u64>,
    /// Bound on each byte exchange; `None` waits forever
    pub exchange_timeout_ms: Option<u64>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            handshake_timeout_ms: None,
            exchange_timeout_ms: None,
        }
    }
}

impl LinkConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn with_bind_address(mut self, bind_address: String) -> Self {
        self.bind_address = bind_address;
        self
    }
}

/// How long and how politely to wait on the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Bound on a whole wait; `None` waits forever
    pub timeout: Option<Duration>,
    /// Pause between unsuccessful polls
    pub backoff: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: None,
            backoff: Duration::from_millis(10),
        }
    }
}

impl WaitPolicy {
    /// Poll without pausing and without a bound
    pub fn immediate() -> Self {
        Self {
            timeout: None,
            backoff: Duration::ZERO,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
