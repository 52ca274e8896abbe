//! Per-session protocol state
//!
//! Holds the device-identity latches for both directions and the
//! transfer-no-response latch.

use crate::protocol::{DeviceLatch, Finding, Side};

/// One logical conversation between the driver and the adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    local_device: DeviceLatch,
    peer_device: DeviceLatch,
    transfer_no_response: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            local_device: DeviceLatch::new(Side::Console),
            peer_device: DeviceLatch::new(Side::Adapter),
            transfer_no_response: false,
        }
    }

    /// Device byte this side has been sending, once learned
    pub fn local_device_id(&self) -> Option<u8> {
        self.local_device.learned()
    }

    /// Device byte the adapter has been sending, once learned
    pub fn peer_device_id(&self) -> Option<u8> {
        self.peer_device.learned()
    }

    pub fn transfer_no_response(&self) -> bool {
        self.transfer_no_response
    }

    /// Don't wait for a reply frame after the next command
    pub fn set_transfer_no_response(&mut self) {
        self.transfer_no_response = true;
    }

    /// Read and clear the no-response latch
    pub fn take_transfer_no_response(&mut self) -> bool {
        std::mem::take(&mut self.transfer_no_response)
    }

    pub fn observe_local_device(&mut self, device: u8) -> Option<Finding> {
        self.local_device.observe(device)
    }

    pub fn observe_peer_device(&mut self, device: u8) -> Option<Finding> {
        self.peer_device.observe(device)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
