//! Clocked link connection
//!
//! Manages one accepted link-cable peer, including:
//! - Version handshake
//! - Single-byte data exchanges stamped with the logical clock
//! - Time synchronization events

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::clock::LinkClock;
use super::packet::{
    LinkEvent, LinkPacket, PacketError, VersionRecord, CONTROL_MASTER_TRANSFER, PACKET_SIZE,
};

/// Link errors
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("Connection closed")]
    Closed,

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        expected: VersionRecord,
        actual: VersionRecord,
    },

    #[error("Link timeout")]
    Timeout,

    #[error("Link not ready (state: {0:?})")]
    NotReady(LinkState),
}

pub type LinkResult<T> = Result<T, LinkError>;

/// State of a link connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Bound, awaiting the peer's connection
    Listening,
    /// Peer connected, version record not yet validated
    Handshaking,
    /// Handshake complete, bytes can be exchanged
    Ready,
    /// Handshake mismatch; terminal
    Failed,
}

/// Link statistics
#[derive(Debug, Default, Clone)]
pub struct LinkStats {
    /// Completed single-byte exchanges
    pub bytes_exchanged: u64,
    /// Records written
    pub packets_sent: u64,
    /// Records read
    pub packets_received: u64,
    /// Records received and dropped (chatter, unknown codes)
    pub packets_ignored: u64,
}

/// A transport that exchanges exactly one byte at a time with a peer
#[async_trait]
pub trait ByteLink: Send {
    /// Send `byte` and return the byte the peer shifted out in exchange
    async fn exchange(&mut self, byte: u8) -> LinkResult<u8>;

    /// Push the current logical time to the peer
    async fn sync_time(&mut self) -> LinkResult<()>;
}

/// One virtual link-cable connection, driven from the master side
pub struct ClockedLink<S> {
    stream: S,
    clock: LinkClock,
    state: LinkState,
    /// Bound on each wait for a peer record; `None` waits forever
    recv_timeout: Option<Duration>,
    stats: LinkStats,
}

impl<S> ClockedLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a freshly accepted stream; the handshake has not run yet
    pub fn new(stream: S) -> Self {
        Self::with_clock(stream, LinkClock::new())
    }

    pub fn with_clock(stream: S, clock: LinkClock) -> Self {
        Self {
            stream,
            clock,
            state: LinkState::Handshaking,
            recv_timeout: None,
            stats: LinkStats::default(),
        }
    }

    /// Bound every wait for the peer
    pub fn set_recv_timeout(&mut self, timeout: Option<Duration>) {
        self.recv_timeout = timeout;
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn clock(&self) -> &LinkClock {
        &self.clock
    }

    /// Current logical timestamp
    pub fn timestamp(&self) -> u32 {
        self.clock.timestamp()
    }

    /// Validate the peer's version record and echo it back
    pub async fn handshake(&mut self) -> LinkResult<()> {
        if self.state != LinkState::Handshaking {
            return Err(LinkError::NotReady(self.state));
        }

        let packet = match self.recv_packet().await {
            Ok(packet) => packet,
            Err(e) => {
                self.state = LinkState::Failed;
                return Err(e);
            }
        };

        let record = match LinkEvent::from_packet(packet) {
            LinkEvent::Version(record) => record,
            other => {
                self.state = LinkState::Failed;
                return Err(LinkError::HandshakeFailed(format!(
                    "expected version record, got {:?}",
                    other
                )));
            }
        };

        if record != VersionRecord::SUPPORTED {
            self.state = LinkState::Failed;
            tracing::warn!("Rejecting link peer with version {}", record);
            return Err(LinkError::VersionMismatch {
                expected: VersionRecord::SUPPORTED,
                actual: record,
            });
        }

        if let Err(e) = self.send_event(LinkEvent::Version(record)).await {
            self.state = LinkState::Failed;
            return Err(e);
        }
        self.state = LinkState::Ready;

        tracing::info!("Link handshake complete (version {})", record);
        Ok(())
    }

    /// Exchange one byte with the peer
    ///
    /// Blocks until the peer answers with its data reply. Chatter and
    /// unrecognized records received meanwhile are dropped.
    pub async fn transfer(&mut self, byte: u8) -> LinkResult<u8> {
        self.ensure_ready()?;

        let timestamp = self.clock.timestamp();
        self.send_event(LinkEvent::DataRequest {
            byte,
            control: CONTROL_MASTER_TRANSFER,
            timestamp,
        })
        .await?;

        loop {
            let packet = self.recv_packet().await?;
            match LinkEvent::from_packet(packet) {
                LinkEvent::DataReply { byte: reply, .. } => {
                    self.stats.bytes_exchanged += 1;
                    tracing::trace!("Link {:02X} -> {:02X} @ {}", byte, reply, timestamp);
                    return Ok(reply);
                }
                LinkEvent::TimeSync { timestamp } => {
                    self.stats.packets_ignored += 1;
                    tracing::trace!("Peer time sync @ {}", timestamp);
                }
                event if event.is_informational() => {
                    self.stats.packets_ignored += 1;
                    tracing::debug!("Ignoring peer event {:?}", event);
                }
                event => {
                    self.stats.packets_ignored += 1;
                    tracing::warn!("Unexpected link event during transfer: {:?}", event);
                }
            }
        }
    }

    /// Move the logical clock by `seconds` and announce the new time
    pub async fn advance_time(&mut self, seconds: f64) -> LinkResult<()> {
        self.ensure_ready()?;
        self.clock.advance(seconds);
        tracing::debug!(
            "Link clock advanced by {}s (offset now {}s)",
            seconds,
            self.clock.time_offset()
        );
        self.send_time_sync().await
    }

    /// Emit a time-sync record with the current timestamp
    pub async fn send_time_sync(&mut self) -> LinkResult<()> {
        self.ensure_ready()?;
        let timestamp = self.clock.timestamp();
        self.send_event(LinkEvent::TimeSync { timestamp }).await
    }

    /// Close the underlying stream
    pub async fn shutdown(&mut self) -> LinkResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    fn ensure_ready(&self) -> LinkResult<()> {
        match self.state {
            LinkState::Ready => Ok(()),
            state => Err(LinkError::NotReady(state)),
        }
    }

    async fn send_event(&mut self, event: LinkEvent) -> LinkResult<()> {
        let bytes = event.to_packet().to_bytes()?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.packets_sent += 1;
        Ok(())
    }

    async fn recv_packet(&mut self) -> LinkResult<LinkPacket> {
        match self.recv_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.read_packet()).await {
                Ok(result) => result,
                Err(_) => Err(LinkError::Timeout),
            },
            None => self.read_packet().await,
        }
    }

    async fn read_packet(&mut self) -> LinkResult<LinkPacket> {
        let mut buf = [0u8; PACKET_SIZE];
        match self.stream.read_exact(&mut buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                tracing::error!("Link peer closed the connection");
                return Err(LinkError::Closed);
            }
            Err(e) => return Err(LinkError::Io(e)),
        }
        self.stats.packets_received += 1;
        Ok(LinkPacket::from_bytes(&buf)?)
    }
}

#[async_trait]
impl<S> ByteLink for ClockedLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn exchange(&mut self, byte: u8) -> LinkResult<u8> {
        self.transfer(byte).await
    }

    async fn sync_time(&mut self) -> LinkResult<()> {
        self.send_time_sync().await
    }
}
