//! Clocked-link packet definitions
//!
//! Every event on the virtual link cable is a fixed 8-byte record:
//! `[event_code][b2][b3][b4][timestamp: u32 little-endian]`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of one record on the wire
pub const PACKET_SIZE: usize = 8;

/// Event codes carried in the first byte of a record
pub mod event_codes {
    pub const VERSION: u8 = 1;
    pub const JOYPAD: u8 = 101;
    pub const DATA_REQUEST: u8 = 104;
    pub const DATA_REPLY: u8 = 105;
    pub const TIME_SYNC: u8 = 106;
    pub const STATUS: u8 = 108;
    pub const WANT_DISCONNECT: u8 = 109;
}

/// Control flag sent with a data request: internal clock, transfer start
pub const CONTROL_MASTER_TRANSFER: u8 = 0x81;

/// Packet encoding errors
#[derive(Error, Debug)]
pub enum PacketError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Bad packet size: {0} bytes (expected {expected})", expected = PACKET_SIZE)]
    BadSize(usize),
}

/// One raw record exchanged over the clocked link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPacket {
    pub code: u8,
    pub b2: u8,
    pub b3: u8,
    pub b4: u8,
    pub timestamp: u32,
}

impl LinkPacket {
    pub fn new(code: u8, b2: u8, b3: u8, b4: u8, timestamp: u32) -> Self {
        Self {
            code,
            b2,
            b3,
            b4,
            timestamp,
        }
    }

    pub fn to_bytes(&self) -> Result<[u8; PACKET_SIZE], PacketError> {
        let encoded = bincode::serialize(self)?;
        encoded
            .as_slice()
            .try_into()
            .map_err(|_| PacketError::BadSize(encoded.len()))
    }

    pub fn from_bytes(bytes: &[u8; PACKET_SIZE]) -> Result<Self, PacketError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// The version/capability record exchanged during the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRecord {
    pub major: u8,
    pub minor: u8,
    pub reserved: u8,
}

impl VersionRecord {
    /// The only version the link peer speaks
    pub const SUPPORTED: VersionRecord = VersionRecord {
        major: 1,
        minor: 4,
        reserved: 0,
    };
}

impl std::fmt::Display for VersionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} ({})", self.major, self.minor, self.reserved)
    }
}

/// A decoded link-level event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Version(VersionRecord),
    /// Joypad state; not relevant to the serial protocol
    Joypad,
    /// Master side pushes a byte and requests the peer's byte
    DataRequest { byte: u8, control: u8, timestamp: u32 },
    /// Peer's byte in answer to a data request
    DataReply { byte: u8, control: u8 },
    TimeSync { timestamp: u32 },
    Status { flags: u8 },
    WantDisconnect,
    Unknown(LinkPacket),
}

impl LinkEvent {
    pub fn from_packet(packet: LinkPacket) -> Self {
        match packet.code {
            event_codes::VERSION => LinkEvent::Version(VersionRecord {
                major: packet.b2,
                minor: packet.b3,
                reserved: packet.b4,
            }),
            event_codes::JOYPAD => LinkEvent::Joypad,
            event_codes::DATA_REQUEST => LinkEvent::DataRequest {
                byte: packet.b2,
                control: packet.b3,
                timestamp: packet.timestamp,
            },
            event_codes::DATA_REPLY => LinkEvent::DataReply {
                byte: packet.b2,
                control: packet.b3,
            },
            event_codes::TIME_SYNC => LinkEvent::TimeSync {
                timestamp: packet.timestamp,
            },
            event_codes::STATUS => LinkEvent::Status { flags: packet.b2 },
            event_codes::WANT_DISCONNECT => LinkEvent::WantDisconnect,
            _ => LinkEvent::Unknown(packet),
        }
    }

    pub fn to_packet(&self) -> LinkPacket {
        match *self {
            LinkEvent::Version(v) => {
                LinkPacket::new(event_codes::VERSION, v.major, v.minor, v.reserved, 0)
            }
            LinkEvent::Joypad => LinkPacket::new(event_codes::JOYPAD, 0, 0, 0, 0),
            LinkEvent::DataRequest {
                byte,
                control,
                timestamp,
            } => LinkPacket::new(event_codes::DATA_REQUEST, byte, control, 0, timestamp),
            LinkEvent::DataReply { byte, control } => {
                LinkPacket::new(event_codes::DATA_REPLY, byte, control, 0, 0)
            }
            LinkEvent::TimeSync { timestamp } => {
                LinkPacket::new(event_codes::TIME_SYNC, 0, 0, 0, timestamp)
            }
            LinkEvent::Status { flags } => LinkPacket::new(event_codes::STATUS, flags, 0, 0, 0),
            LinkEvent::WantDisconnect => LinkPacket::new(event_codes::WANT_DISCONNECT, 0, 0, 0, 0),
            LinkEvent::Unknown(packet) => packet,
        }
    }

    /// Whether the event is peer chatter that carries nothing for us
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            LinkEvent::Joypad | LinkEvent::Status { .. } | LinkEvent::WantDisconnect
        )
    }
}
