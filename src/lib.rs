//! mobilelink - Mobile adapter serial protocol over a virtual link cable
//!
//! Frames adapter commands, drives them byte by byte over an emulator's
//! clocked link, and reconstructs exchanges from captured traffic.

pub mod config;
pub mod link;
pub mod protocol;
pub mod session;
pub mod trace;
