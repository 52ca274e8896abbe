//! Non-fatal protocol findings
//!
//! Findings are attached to otherwise successful decodes. They never abort
//! a parse or a trace scan.

use std::fmt;

/// Which end of the link a byte or frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The handheld console, which initiates commands
    Console,
    /// The mobile adapter
    Adapter,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Console => Side::Adapter,
            Side::Adapter => Side::Console,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Console => f.write_str("console"),
            Side::Adapter => f.write_str("adapter"),
        }
    }
}

/// A consistency violation observed while decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finding {
    /// One of the two reserved header bytes was non-zero
    UnexpectedReservedBytes { reserved: [u8; 2] },
    /// The transmitted checksum disagrees with the computed one
    ChecksumMismatch { expected: u16, actual: u16 },
    /// A device-identity byte changed after it was learned
    DeviceIdentityDrift { side: Side, learned: u8, observed: u8 },
    /// The sender of a frame did not transmit the success acknowledgement
    SendAckFailure { ack: u8 },
    /// The receiver of a frame did not answer with `command ^ 0x80`
    RecvAckFailure { expected: u8, actual: u8 },
    /// The input ends in the middle of a frame
    Incomplete { offset: usize, missing: usize },
    /// The two capture channels have different lengths
    ChannelLengthMismatch { console: usize, adapter: usize },
}

impl Finding {
    /// Short machine-friendly name of the finding kind
    pub fn kind(&self) -> &'static str {
        match self {
            Finding::UnexpectedReservedBytes { .. } => "reserved-field-anomaly",
            Finding::ChecksumMismatch { .. } => "checksum-mismatch",
            Finding::DeviceIdentityDrift { .. } => "device-identity-drift",
            Finding::SendAckFailure { .. } => "send-ack-failure",
            Finding::RecvAckFailure { .. } => "recv-ack-failure",
            Finding::Incomplete { .. } => "incomplete",
            Finding::ChannelLengthMismatch { .. } => "channel-length-mismatch",
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::UnexpectedReservedBytes { reserved } => write!(
                f,
                "unexpected reserved bytes {:02X} {:02X}",
                reserved[0], reserved[1]
            ),
            Finding::ChecksumMismatch { expected, actual } => write!(
                f,
                "checksum mismatch (calc: {:04X}, got: {:04X})",
                expected, actual
            ),
            Finding::DeviceIdentityDrift { side, learned, observed } => write!(
                f,
                "{} device mismatch (had: {:02X}, got: {:02X})",
                side, learned, observed
            ),
            Finding::SendAckFailure { ack } => write!(f, "send ack failure ({:02X})", ack),
            Finding::RecvAckFailure { expected, actual } => write!(
                f,
                "recv ack failure (expected: {:02X}, got: {:02X})",
                expected, actual
            ),
            Finding::Incomplete { offset, missing } => write!(
                f,
                "frame at offset {} is missing {} byte(s)",
                offset, missing
            ),
            Finding::ChannelLengthMismatch { console, adapter } => write!(
                f,
                "channel lengths differ (console: {}, adapter: {})",
                console, adapter
            ),
        }
    }
}

/// Latch for a device-identity byte
///
/// The first observed value is kept for the lifetime of the latch; later
/// values are compared against it and never replace it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLatch {
    side: Side,
    learned: Option<u8>,
}

impl DeviceLatch {
    pub fn new(side: Side) -> Self {
        Self { side, learned: None }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn learned(&self) -> Option<u8> {
        self.learned
    }

    /// Record an observation, returning a drift finding if it disagrees
    pub fn observe(&mut self, observed: u8) -> Option<Finding> {
        match self.learned {
            None => {
                self.learned = Some(observed);
                None
            }
            Some(learned) if learned == observed => None,
            Some(learned) => Some(Finding::DeviceIdentityDrift {
                side: self.side,
                learned,
                observed,
            }),
        }
    }
}
