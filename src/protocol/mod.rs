//! Protocol module - Defines the mobile adapter packet format
//!
//! A frame on the wire looks like:
//! - 2 bytes magic marker (`0x99 0x66`)
//! - 1 byte command, 2 reserved bytes, 1 byte payload length
//! - Variable length payload (0-255 bytes)
//! - 2 bytes checksum (big-endian) over command..end of payload
//! - 1 byte device identity, 1 byte acknowledgement
//!
//! Nothing here performs I/O. The active driver and the passive analyzer
//! both go through these rules.

mod command;
mod finding;
mod frame;

pub use command::*;
pub use finding::*;
pub use frame::*;

/// Magic marker preceding every frame
pub const MAGIC_BYTES: [u8; 2] = [0x99, 0x66];

/// Byte the peer answers with while a frame is being pushed to it
pub const IDLE_BYTE: u8 = 0xD2;

/// Sent after the checksum; the peer answers with its device byte
pub const END_OF_COMMAND: u8 = 0x80;

/// Sent to solicit the next byte of an inbound frame
pub const POLL_BYTE: u8 = 0x4B;

/// Sent to solicit the acknowledgement of an outbound frame
pub const PADDING_BYTE: u8 = 0x00;

/// XOR mask relating a command to its acknowledgement and reply id
pub const ACK_MASK: u8 = 0x80;

/// Acknowledgement value the sender of a frame must transmit
pub const SEND_ACK_OK: u8 = 0x00;

/// Largest payload a frame can carry
pub const MAX_PAYLOAD_SIZE: usize = 0xFF;

/// Acknowledgement expected from the receiver of a frame carrying `command`
pub fn ack_for(command: u8) -> u8 {
    command ^ ACK_MASK
}
