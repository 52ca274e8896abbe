//! Active session driver
//!
//! Turns adapter commands into framed byte exchanges over a [`ByteLink`]
//! and enforces the idle/acknowledge/poll contract on the way.

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

use super::Session;
use crate::link::{ByteLink, LinkError, WaitPolicy};
use crate::protocol::{
    self, ack_for, checksum, describe_command, CodecError, Command, DeviceClass, Finding,
    END_OF_COMMAND, HEADER_SIZE, IDLE_BYTE, MAGIC_BYTES, PADDING_BYTE, POLL_BYTE, SEND_ACK_OK,
};

/// Point in the exchange where a fixed control byte was expected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStage {
    /// Pushing the outbound frame; the peer must answer with the idle byte
    Idle,
    /// Requesting the acknowledgement of the outbound frame
    Acknowledge,
}

impl fmt::Display for ExchangeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeStage::Idle => f.write_str("idle"),
            ExchangeStage::Acknowledge => f.write_str("acknowledge"),
        }
    }
}

/// Driver errors
///
/// Each variant aborts the current command only. The session stays open.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Unexpected {stage} byte: expected {expected:02X}, got {actual:02X}")]
    LinkProtocolViolation {
        stage: ExchangeStage,
        expected: u8,
        actual: u8,
    },

    #[error("Reply checksum mismatch (calc: {expected:04X}, got: {actual:04X})")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("Reply command {received:02X} does not answer {sent:02X}")]
    CommandMismatch { sent: u8, received: u8 },

    #[error("Adapter rejected command {command:02X} with error {code}")]
    AdapterError { command: u8, code: u8 },

    #[error("Reply to {command} too short: {actual} bytes (need {expected})")]
    ShortReply {
        command: Command,
        expected: usize,
        actual: usize,
    },

    #[error("No reply frame for {0}")]
    NoReply(Command),

    #[error("Timed out waiting for the adapter")]
    Timeout,
}

pub type DriverResult<T> = Result<T, DriverError>;

/// A reply frame received from the adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub command: u8,
    pub payload: Bytes,
}

/// Outcome of one command exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// `None` when the command was acknowledged without a reply frame
    pub reply: Option<Reply>,
    /// Non-fatal anomalies seen during the exchange
    pub findings: Vec<Finding>,
}

/// Drives adapter commands over a byte link
pub struct SessionDriver<L> {
    link: L,
    session: Session,
    policy: WaitPolicy,
    /// Device byte sent in the end-of-command position
    local_device: u8,
}

impl<L: ByteLink> SessionDriver<L> {
    pub fn new(link: L) -> Self {
        Self::with_policy(link, WaitPolicy::default())
    }

    pub fn with_policy(link: L, policy: WaitPolicy) -> Self {
        Self {
            link,
            session: Session::new(),
            policy,
            local_device: END_OF_COMMAND,
        }
    }

    /// Override the device byte sent after each frame
    pub fn with_local_device(mut self, device: u8) -> Self {
        self.local_device = device;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }

    /// Don't wait for a reply frame after the next command
    pub fn set_transfer_no_response(&mut self) {
        self.session.set_transfer_no_response();
    }

    /// Send one command and collect the adapter's reply
    pub async fn transfer(&mut self, command: u8, payload: &[u8]) -> DriverResult<Exchange> {
        let frame = protocol::encode(command, payload)?;
        tracing::debug!(
            ">>> {} ({:02X}), {} byte(s)",
            describe_command(command),
            command,
            payload.len()
        );

        self.link.sync_time().await?;

        for &byte in frame.iter() {
            let reply = self.link.exchange(byte).await?;
            if reply != IDLE_BYTE {
                return Err(self.violation(ExchangeStage::Idle, IDLE_BYTE, reply));
            }
        }

        let peer_device = self.link.exchange(self.local_device).await?;
        let ack = self.link.exchange(PADDING_BYTE).await?;
        if ack != ack_for(command) {
            return Err(self.violation(ExchangeStage::Acknowledge, ack_for(command), ack));
        }

        let mut findings = Vec::new();
        findings.extend(self.session.observe_local_device(self.local_device));
        findings.extend(self.session.observe_peer_device(peer_device));

        if self.session.take_transfer_no_response() {
            tracing::debug!("Not waiting for a reply to {:02X}", command);
            report(&findings);
            return Ok(Exchange {
                reply: None,
                findings,
            });
        }

        match self.policy.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.resync())
                .await
                .map_err(|_| DriverError::Timeout)??,
            None => self.resync().await?,
        }

        let mut header = [0u8; HEADER_SIZE];
        for byte in header.iter_mut() {
            *byte = self.link.exchange(POLL_BYTE).await?;
        }
        let mut payload = Vec::with_capacity(header[3] as usize);
        for _ in 0..header[3] {
            payload.push(self.link.exchange(POLL_BYTE).await?);
        }
        let checksum_hi = self.link.exchange(POLL_BYTE).await?;
        let checksum_lo = self.link.exchange(POLL_BYTE).await?;
        let received = u16::from_be_bytes([checksum_hi, checksum_lo]);

        let computed = checksum(&header).wrapping_add(checksum(&payload));
        if computed != received {
            tracing::warn!(
                "Invalid reply checksum (calc: {:04X}, got: {:04X})",
                computed,
                received
            );
            return Err(DriverError::ChecksumMismatch {
                expected: computed,
                actual: received,
            });
        }
        if header[1] != 0 || header[2] != 0 {
            findings.push(Finding::UnexpectedReservedBytes {
                reserved: [header[1], header[2]],
            });
        }

        let reply_command = header[0];
        let peer_device = self.link.exchange(self.local_device).await?;
        let send_ack = self.link.exchange(ack_for(reply_command)).await?;
        findings.extend(self.session.observe_peer_device(peer_device));
        if send_ack != SEND_ACK_OK {
            findings.push(Finding::SendAckFailure { ack: send_ack });
        }

        tracing::debug!(
            "<<< {} ({:02X}), {} byte(s)",
            describe_command(reply_command),
            reply_command,
            payload.len()
        );
        report(&findings);

        if reply_command == Command::Error.reply_id() && ack_for(command) != reply_command {
            let failed = payload.first().copied().unwrap_or(command);
            let code = payload.get(1).copied().unwrap_or(0);
            tracing::warn!("Adapter error {} for command {:02X}", code, failed);
            return Err(DriverError::AdapterError {
                command: failed,
                code,
            });
        }
        if ack_for(reply_command) != command {
            tracing::warn!(
                "Unexpected reply {:02X} to command {:02X}",
                reply_command,
                command
            );
            return Err(DriverError::CommandMismatch {
                sent: command,
                received: reply_command,
            });
        }

        Ok(Exchange {
            reply: Some(Reply {
                command: reply_command,
                payload: Bytes::from(payload),
            }),
            findings,
        })
    }

    /// Poll until the adapter shifts out the magic marker
    async fn resync(&mut self) -> DriverResult<()> {
        let mut polls = 0u64;
        loop {
            polls += 1;
            if self.link.exchange(POLL_BYTE).await? != MAGIC_BYTES[0] {
                if !self.policy.backoff.is_zero() {
                    tokio::time::sleep(self.policy.backoff).await;
                }
                continue;
            }
            if self.link.exchange(POLL_BYTE).await? == MAGIC_BYTES[1] {
                tracing::trace!("Reply frame found after {} poll(s)", polls);
                return Ok(());
            }
        }
    }

    fn violation(&self, stage: ExchangeStage, expected: u8, actual: u8) -> DriverError {
        tracing::warn!(
            "Unexpected {} byte: expected {:02X}, got {:02X}",
            stage,
            expected,
            actual
        );
        DriverError::LinkProtocolViolation {
            stage,
            expected,
            actual,
        }
    }
}

fn report(findings: &[Finding]) {
    for finding in findings {
        match finding {
            Finding::DeviceIdentityDrift { observed, .. } => tracing::warn!(
                "{} ({:?})",
                finding,
                DeviceClass::from_wire(*observed)
            ),
            _ => tracing::warn!("{}", finding),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Side;
    use crate::session::mock::MockAdapter;
    use std::time::Duration;

    fn driver() -> SessionDriver<MockAdapter> {
        SessionDriver::with_policy(MockAdapter::new(), WaitPolicy::immediate())
    }

    #[tokio::test]
    async fn test_transfer_returns_reply_payload() {
        let mut driver = driver();
        let exchange = driver
            .transfer(Command::TelephoneStatus.id(), &[])
            .await
            .unwrap();

        let reply = exchange.reply.unwrap();
        assert_eq!(reply.command, 0x97);
        assert_eq!(&reply.payload[..], &[0x00, 0x4D, 0x00]);
        assert!(exchange.findings.is_empty());

        let mock = driver.link();
        assert_eq!(mock.time_syncs, 1);
        assert_eq!(mock.received, vec![(0x17, vec![])]);
        assert_eq!(mock.confirmations, vec![0x17]);
        assert_eq!(driver.session().local_device_id(), Some(0x80));
        assert_eq!(driver.session().peer_device_id(), Some(0x88));
    }

    #[tokio::test]
    async fn test_wrong_idle_byte_aborts() {
        let mut driver = driver();
        driver.link_mut().idle_override = Some(0x00);

        let err = driver
            .transfer(Command::BeginSession.id(), b"NINTENDO")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DriverError::LinkProtocolViolation {
                stage: ExchangeStage::Idle,
                expected: 0xD2,
                actual: 0x00,
            }
        ));
        assert!(driver.link().received.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_ack_leaves_session_unchanged() {
        let mut driver = driver();
        driver.link_mut().ack_override = Some(0x00);
        let before = driver.session().clone();

        let err = driver
            .transfer(Command::BeginSession.id(), b"NINTENDO")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DriverError::LinkProtocolViolation {
                stage: ExchangeStage::Acknowledge,
                expected: 0x90,
                actual: 0x00,
            }
        ));
        assert_eq!(driver.session(), &before);

        // Next, unrelated command still works
        let exchange = driver
            .transfer(Command::TelephoneStatus.id(), &[])
            .await
            .unwrap();
        assert!(exchange.reply.is_some());
    }

    #[tokio::test]
    async fn test_no_response_latch_skips_polling() {
        let mut driver = driver();
        driver.set_transfer_no_response();

        let exchange = driver
            .transfer(Command::TransferData.id(), &[0x00])
            .await
            .unwrap();
        assert_eq!(exchange.reply, None);
        assert_eq!(driver.link().polls, 0);
        assert!(!driver.session().transfer_no_response());
    }

    #[tokio::test]
    async fn test_resync_skips_idle_polls() {
        let mut driver = driver();
        driver.link_mut().idle_polls = 5;

        let exchange = driver
            .transfer(Command::EndSession.id(), &[])
            .await
            .unwrap();
        assert_eq!(exchange.reply.unwrap().command, 0x91);
        // 5 idle polls, 2 magic, 4 header, 2 checksum
        assert_eq!(driver.link().polls, 13);
    }

    #[tokio::test]
    async fn test_bad_reply_checksum() {
        let mut driver = driver();
        driver.link_mut().corrupt_checksum = true;

        let err = driver
            .transfer(Command::TelephoneStatus.id(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn test_reply_command_mismatch() {
        let mut driver = driver();
        driver.link_mut().reply_command_override = Some(0x91);

        let err = driver
            .transfer(Command::TelephoneStatus.id(), &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DriverError::CommandMismatch {
                sent: 0x17,
                received: 0x91,
            }
        ));
        // The frame was still confirmed to the adapter
        assert_eq!(driver.link().confirmations, vec![0x11]);
    }

    #[tokio::test]
    async fn test_adapter_error_reply() {
        let mut driver = driver();
        driver.link_mut().error_code = Some(0x01);

        let err = driver
            .transfer(Command::TelephoneStatus.id(), &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DriverError::AdapterError {
                command: 0x17,
                code: 0x01,
            }
        ));
    }

    #[tokio::test]
    async fn test_peer_device_drift_is_a_finding() {
        let mut driver = driver();
        driver
            .transfer(Command::EndSession.id(), &[])
            .await
            .unwrap();

        driver.link_mut().device = 0x8A;
        let exchange = driver
            .transfer(Command::EndSession.id(), &[])
            .await
            .unwrap();

        let drift = Finding::DeviceIdentityDrift {
            side: Side::Adapter,
            learned: 0x88,
            observed: 0x8A,
        };
        // Seen once after the outbound frame and once after the reply
        assert_eq!(exchange.findings, vec![drift, drift]);
        assert_eq!(driver.session().peer_device_id(), Some(0x88));
    }

    #[tokio::test]
    async fn test_poll_timeout() {
        let mut adapter = MockAdapter::new();
        adapter.silent = true;
        let policy = WaitPolicy {
            timeout: Some(Duration::from_millis(50)),
            backoff: Duration::from_millis(1),
        };
        let mut driver = SessionDriver::with_policy(adapter, policy);

        let err = driver
            .transfer(Command::EndSession.id(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Timeout));
    }
}
