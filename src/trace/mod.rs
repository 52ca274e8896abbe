//! Trace module - Offline analysis of captured serial traffic

mod analyzer;
mod log;

pub use analyzer::*;
pub use log::*;
