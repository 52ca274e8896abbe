//! Frame codec for encoding/decoding adapter packets
//!
//! Encoding produces the part of a frame the sender controls (magic through
//! checksum). Parsing reads a complete frame as it appears in a capture,
//! including the trailing device-identity and acknowledgement bytes, and
//! reports anomalies as findings instead of failing.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{Finding, MAGIC_BYTES, MAX_PAYLOAD_SIZE};

/// Header size: command(1) + reserved(2) + length(1)
pub const HEADER_SIZE: usize = 4;

/// Bytes following the payload: checksum(2) + device(1) + ack(1)
pub const TRAILER_SIZE: usize = 4;

/// Codec errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("Payload too large: {0} bytes (max: {max})", max = MAX_PAYLOAD_SIZE)]
    PayloadTooLarge(usize),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Sum of the given bytes, mod 65536
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}

/// A decoded adapter frame, exactly as transmitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u8,
    pub reserved: [u8; 2],
    pub payload: Bytes,
    /// Checksum field as transmitted, which may disagree with the content
    pub checksum: u16,
    pub device: u8,
    pub ack: u8,
}

impl Frame {
    /// Build a well-formed frame with a correct checksum
    pub fn new(command: u8, payload: impl Into<Bytes>, device: u8, ack: u8) -> CodecResult<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(CodecError::PayloadTooLarge(payload.len()));
        }
        let mut frame = Self {
            command,
            reserved: [0, 0],
            payload,
            checksum: 0,
            device,
            ack,
        };
        frame.checksum = frame.computed_checksum();
        Ok(frame)
    }

    /// Header bytes covered by the checksum
    pub fn header(&self) -> [u8; HEADER_SIZE] {
        [
            self.command,
            self.reserved[0],
            self.reserved[1],
            self.payload.len() as u8,
        ]
    }

    /// Checksum computed over the header and payload
    pub fn computed_checksum(&self) -> u16 {
        checksum(&self.header()).wrapping_add(checksum(&self.payload))
    }

    /// Total size on the wire, magic and trailer included
    pub fn wire_len(&self) -> usize {
        MAGIC_BYTES.len() + HEADER_SIZE + self.payload.len() + TRAILER_SIZE
    }

    /// Validate the frame content, returning every anomaly found
    pub fn findings(&self) -> Vec<Finding> {
        let mut findings = Vec::new();
        if self.reserved != [0, 0] {
            findings.push(Finding::UnexpectedReservedBytes {
                reserved: self.reserved,
            });
        }
        let computed = self.computed_checksum();
        if computed != self.checksum {
            findings.push(Finding::ChecksumMismatch {
                expected: computed,
                actual: self.checksum,
            });
        }
        findings
    }

    /// Write the full wire form, including device and acknowledgement bytes
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.reserve(self.wire_len());
        buf.put_slice(&MAGIC_BYTES);
        buf.put_slice(&self.header());
        buf.put_slice(&self.payload);
        buf.put_u16(self.checksum);
        buf.put_u8(self.device);
        buf.put_u8(self.ack);
    }
}

/// Encode the sender-controlled part of a frame: magic through checksum
pub fn encode(command: u8, payload: &[u8]) -> CodecResult<BytesMut> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }

    let header = [command, 0, 0, payload.len() as u8];
    let sum = checksum(&header).wrapping_add(checksum(payload));

    let mut buf = BytesMut::with_capacity(MAGIC_BYTES.len() + HEADER_SIZE + payload.len() + 2);
    buf.put_slice(&MAGIC_BYTES);
    buf.put_slice(&header);
    buf.put_slice(payload);
    buf.put_u16(sum);
    Ok(buf)
}

/// A frame located by [`try_parse`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    pub frame: Frame,
    /// Bytes consumed from the parse offset, magic and trailer included
    pub consumed: usize,
    pub findings: Vec<Finding>,
}

impl ParsedFrame {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Result of attempting to parse a frame at some offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The bytes at the offset are not the magic marker
    NoMatch,
    /// The magic marker is present but the buffer ends mid-frame
    Incomplete { missing: usize },
    Parsed(ParsedFrame),
}

/// Attempt to interpret `buf[offset..]` as a frame preceded by the magic marker
pub fn try_parse(buf: &[u8], offset: usize) -> ParseOutcome {
    let rest = match buf.get(offset..) {
        Some(rest) => rest,
        None => return ParseOutcome::NoMatch,
    };
    if !rest.starts_with(&MAGIC_BYTES) {
        return ParseOutcome::NoMatch;
    }

    let header_start = MAGIC_BYTES.len();
    let payload_start = header_start + HEADER_SIZE;
    if rest.len() < payload_start {
        return ParseOutcome::Incomplete {
            missing: payload_start + TRAILER_SIZE - rest.len(),
        };
    }

    let length = rest[header_start + 3] as usize;
    let total = payload_start + length + TRAILER_SIZE;
    if rest.len() < total {
        return ParseOutcome::Incomplete {
            missing: total - rest.len(),
        };
    }

    let trailer = payload_start + length;
    let frame = Frame {
        command: rest[header_start],
        reserved: [rest[header_start + 1], rest[header_start + 2]],
        payload: Bytes::copy_from_slice(&rest[payload_start..trailer]),
        checksum: u16::from_be_bytes([rest[trailer], rest[trailer + 1]]),
        device: rest[trailer + 2],
        ack: rest[trailer + 3],
    };
    let findings = frame.findings();

    ParseOutcome::Parsed(ParsedFrame {
        frame,
        consumed: total,
        findings,
    })
}
