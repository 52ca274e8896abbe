//! Link listener
//!
//! Binds the link port, accepts exactly one emulator connection and runs the
//! version handshake on it.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

use super::connection::{ClockedLink, LinkError, LinkResult, LinkState};
use super::LinkConfig;

/// A bound link port awaiting its peer
pub struct LinkListener {
    listener: TcpListener,
    config: LinkConfig,
}

impl LinkListener {
    /// Bind the configured address
    pub async fn bind(config: LinkConfig) -> LinkResult<Self> {
        let bind_addr = format!("{}:{}", config.bind_address, config.port);
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            tracing::error!("Failed to bind link port {}: {}", bind_addr, e);
            LinkError::Io(e)
        })?;

        tracing::info!("Link listening on {}", listener.local_addr()?);
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> LinkResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> LinkState {
        LinkState::Listening
    }

    /// Accept the peer, consuming the listener, and complete the handshake
    pub async fn accept(self) -> LinkResult<(ClockedLink<TcpStream>, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await?;
        tracing::info!("Link peer connected from {}", addr);
        stream.set_nodelay(true)?;

        let mut link = ClockedLink::new(stream);
        let handshake_timeout = self.config.handshake_timeout_ms.map(Duration::from_millis);
        link.set_recv_timeout(handshake_timeout);

        if let Err(e) = link.handshake().await {
            tracing::error!("Link handshake with {} failed: {}", addr, e);
            return Err(e);
        }

        link.set_recv_timeout(self.config.exchange_timeout_ms.map(Duration::from_millis));
        Ok((link, addr))
    }
}
