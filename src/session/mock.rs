//! Scripted adapter emulator for driver tests
//!
//! Follows the adapter's side of the serial contract one byte at a time:
//! idle while a frame comes in, device byte and acknowledgement after it,
//! then the reply frame shifted out in answer to poll bytes.

use async_trait::async_trait;
use std::collections::VecDeque;

use crate::link::{ByteLink, LinkResult};
use crate::protocol::{
    ack_for, encode, Command, DeviceClass, IDLE_BYTE, MAGIC_BYTES, SEND_ACK_OK,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockState {
    Waiting,
    Magic,
    Header,
    Payload { remaining: usize },
    Checksum { remaining: usize },
    Device,
    Acknowledge,
    Replying,
    ReplyDevice,
    ReplyAck,
}

pub(crate) struct MockAdapter {
    state: MockState,
    frame: Vec<u8>,
    outbound: VecDeque<u8>,
    /// Device byte shifted out after each frame
    pub device: u8,
    /// Replace the answer to the first byte of the next frame
    pub idle_override: Option<u8>,
    /// Replace the next acknowledgement; the command is then dropped
    pub ack_override: Option<u8>,
    /// Replace the command id of the next reply
    pub reply_command_override: Option<u8>,
    /// Answer the next command with an error reply carrying this code
    pub error_code: Option<u8>,
    /// Corrupt the checksum of the next reply
    pub corrupt_checksum: bool,
    /// Idle bytes to shift out before each reply's magic marker
    pub idle_polls: usize,
    /// Never send reply frames
    pub silent: bool,
    /// Commands received, with their payloads
    pub received: Vec<(u8, Vec<u8>)>,
    /// Bytes the driver sent to confirm reply frames
    pub confirmations: Vec<u8>,
    /// Device bytes the driver sent
    pub driver_devices: Vec<u8>,
    pub polls: usize,
    pub time_syncs: usize,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self {
            state: MockState::Waiting,
            frame: Vec::new(),
            outbound: VecDeque::new(),
            device: DeviceClass::BlueAdapter.wire_byte(),
            idle_override: None,
            ack_override: None,
            reply_command_override: None,
            error_code: None,
            corrupt_checksum: false,
            idle_polls: 0,
            silent: false,
            received: Vec::new(),
            confirmations: Vec::new(),
            driver_devices: Vec::new(),
            polls: 0,
            time_syncs: 0,
        }
    }

    /// Reply payload the emulated adapter gives for a command
    fn respond(&mut self, command: u8, payload: &[u8]) -> Option<(u8, Vec<u8>)> {
        if self.silent {
            return None;
        }
        if let Some(code) = self.error_code.take() {
            return Some((Command::Error.reply_id(), vec![command, code]));
        }

        let reply = match Command::from_id(command) {
            Some(Command::BeginSession) => payload.to_vec(),
            Some(Command::TelephoneStatus) => vec![0x00, 0x4D, 0x00],
            // A bare connection id terminates the transfer; no reply frame
            Some(Command::TransferData) if payload.len() == 1 => return None,
            Some(Command::TransferData) => payload.to_vec(),
            Some(Command::IspLogin) => vec![10, 0, 0, 2, 8, 8, 8, 8, 8, 8, 4, 4],
            Some(Command::OpenTcpConnection) | Some(Command::OpenUdpConnection) => vec![0x01],
            Some(Command::DnsQuery) => vec![93, 184, 216, 34],
            Some(Command::ReadConfigurationData) => {
                let offset = payload.first().copied().unwrap_or(0);
                let size = payload.get(1).copied().unwrap_or(0) as usize;
                let mut data = vec![offset];
                data.extend((0..size).map(|i| offset.wrapping_add(i as u8)));
                data
            }
            Some(Command::FirmwareVersion) => b"MOBILE 1.0".to_vec(),
            _ => Vec::new(),
        };
        let reply_command = self
            .reply_command_override
            .take()
            .unwrap_or(command ^ 0x80);
        Some((reply_command, reply))
    }

    fn queue_reply(&mut self, command: u8, payload: &[u8]) {
        let mut bytes = encode(command, payload).unwrap().to_vec();
        if std::mem::take(&mut self.corrupt_checksum) {
            let last = bytes.len() - 1;
            bytes[last] ^= 0x01;
        }
        self.outbound.extend(std::iter::repeat(IDLE_BYTE).take(self.idle_polls));
        self.outbound.extend(bytes);
    }

    fn step(&mut self, byte: u8) -> u8 {
        match self.state {
            MockState::Waiting => {
                if byte == MAGIC_BYTES[0] {
                    self.state = MockState::Magic;
                    if let Some(reply) = self.idle_override.take() {
                        return reply;
                    }
                }
                IDLE_BYTE
            }
            MockState::Magic => {
                self.state = match byte {
                    b if b == MAGIC_BYTES[1] => {
                        self.frame.clear();
                        MockState::Header
                    }
                    b if b == MAGIC_BYTES[0] => MockState::Magic,
                    _ => MockState::Waiting,
                };
                IDLE_BYTE
            }
            MockState::Header => {
                self.frame.push(byte);
                if self.frame.len() == 4 {
                    self.state = match self.frame[3] as usize {
                        0 => MockState::Checksum { remaining: 2 },
                        remaining => MockState::Payload { remaining },
                    };
                }
                IDLE_BYTE
            }
            MockState::Payload { remaining } => {
                self.frame.push(byte);
                self.state = match remaining - 1 {
                    0 => MockState::Checksum { remaining: 2 },
                    remaining => MockState::Payload { remaining },
                };
                IDLE_BYTE
            }
            MockState::Checksum { remaining } => {
                self.state = match remaining - 1 {
                    0 => MockState::Device,
                    remaining => MockState::Checksum { remaining },
                };
                IDLE_BYTE
            }
            MockState::Device => {
                self.driver_devices.push(byte);
                self.state = MockState::Acknowledge;
                self.device
            }
            MockState::Acknowledge => {
                let command = self.frame[0];
                let payload = self.frame[4..].to_vec();
                if let Some(ack) = self.ack_override.take() {
                    self.state = MockState::Waiting;
                    return ack;
                }
                self.received.push((command, payload.clone()));
                self.state = match self.respond(command, &payload) {
                    Some((reply_command, reply)) => {
                        self.queue_reply(reply_command, &reply);
                        MockState::Replying
                    }
                    None => MockState::Waiting,
                };
                ack_for(command)
            }
            MockState::Replying => {
                self.polls += 1;
                let reply = self.outbound.pop_front().unwrap_or(IDLE_BYTE);
                if self.outbound.is_empty() {
                    self.state = MockState::ReplyDevice;
                }
                reply
            }
            MockState::ReplyDevice => {
                self.driver_devices.push(byte);
                self.state = MockState::ReplyAck;
                self.device
            }
            MockState::ReplyAck => {
                self.confirmations.push(byte);
                self.state = MockState::Waiting;
                SEND_ACK_OK
            }
        }
    }
}

#[async_trait]
impl ByteLink for MockAdapter {
    async fn exchange(&mut self, byte: u8) -> LinkResult<u8> {
        Ok(self.step(byte))
    }

    async fn sync_time(&mut self) -> LinkResult<()> {
        self.time_syncs += 1;
        Ok(())
    }
}
