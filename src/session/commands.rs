//! Adapter command wrappers
//!
//! Each command encodes its request payload and describes its reply as a
//! list of fixed-width leading fields, optionally followed by a variable
//! tail. A single routine decodes every reply from that description.

use bytes::Bytes;
use std::net::{Ipv4Addr, SocketAddrV4};

use super::driver::{DriverError, DriverResult, SessionDriver};
use crate::link::ByteLink;
use crate::protocol::{Command, MAX_PAYLOAD_SIZE};

/// Connection id meaning "the current telephone call"
pub const CALL_CONNECTION: u8 = 0xFF;

/// Login string the adapter expects at session start
pub const SESSION_MAGIC: &[u8] = b"NINTENDO";

/// Shape of a reply payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyLayout {
    /// Names and widths of the leading fields
    pub fields: &'static [(&'static str, usize)],
    /// Whether variable data follows the fixed fields
    pub tail: bool,
}

impl ReplyLayout {
    const EMPTY: ReplyLayout = ReplyLayout {
        fields: &[],
        tail: false,
    };

    pub fn fixed_len(&self) -> usize {
        self.fields.iter().map(|(_, width)| width).sum()
    }

    /// Reply layout for a command
    pub fn of(command: Command) -> ReplyLayout {
        match command {
            Command::BeginSession => ReplyLayout {
                fields: &[],
                tail: true,
            },
            Command::TelephoneStatus => ReplyLayout {
                fields: &[("state", 1), ("service", 1), ("flags", 1)],
                tail: false,
            },
            Command::TransferData => ReplyLayout {
                fields: &[("connection", 1)],
                tail: true,
            },
            Command::IspLogin => ReplyLayout {
                fields: &[("ip", 4), ("dns1", 4), ("dns2", 4)],
                tail: false,
            },
            Command::OpenTcpConnection | Command::OpenUdpConnection => ReplyLayout {
                fields: &[("connection", 1)],
                tail: false,
            },
            Command::DnsQuery => ReplyLayout {
                fields: &[("address", 4)],
                tail: false,
            },
            Command::ReadConfigurationData => ReplyLayout {
                fields: &[("offset", 1)],
                tail: true,
            },
            Command::FirmwareVersion => ReplyLayout {
                fields: &[],
                tail: true,
            },
            _ => ReplyLayout::EMPTY,
        }
    }
}

/// A reply split according to its [`ReplyLayout`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedReply {
    fields: Vec<(&'static str, Bytes)>,
    tail: Bytes,
}

impl DecodedReply {
    pub fn field(&self, name: &str) -> Option<&[u8]> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value.as_ref())
    }

    fn byte(&self, name: &str) -> u8 {
        self.field(name).and_then(|f| f.first().copied()).unwrap_or(0)
    }

    fn ipv4(&self, name: &str) -> Ipv4Addr {
        match self.field(name) {
            Some(&[a, b, c, d]) => Ipv4Addr::new(a, b, c, d),
            _ => Ipv4Addr::UNSPECIFIED,
        }
    }

    pub fn tail(&self) -> &Bytes {
        &self.tail
    }
}

/// Split a reply payload into the fields its command declares
pub fn decode_reply(command: Command, payload: &Bytes) -> DriverResult<DecodedReply> {
    let layout = ReplyLayout::of(command);
    let expected = layout.fixed_len();
    if payload.len() < expected {
        return Err(DriverError::ShortReply {
            command,
            expected,
            actual: payload.len(),
        });
    }

    let mut offset = 0;
    let fields = layout
        .fields
        .iter()
        .map(|&(name, width)| {
            let value = payload.slice(offset..offset + width);
            offset += width;
            (name, value)
        })
        .collect();

    let tail = payload.slice(offset..);
    if !layout.tail && !tail.is_empty() {
        tracing::debug!("Ignoring {} trailing byte(s) in {} reply", tail.len(), command);
    }

    Ok(DecodedReply {
        fields,
        tail: if layout.tail { tail } else { Bytes::new() },
    })
}

/// Reply to telephone-status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelephoneStatus {
    pub state: u8,
    pub service: u8,
    pub flags: u8,
}

/// Reply to isp-login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IspLoginReply {
    pub ip: Ipv4Addr,
    pub dns1: Ipv4Addr,
    pub dns2: Ipv4Addr,
}

/// Reply to transfer-data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDataReply {
    pub connection: u8,
    pub data: Bytes,
}

/// Reply to read-configuration-data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationData {
    pub offset: u8,
    pub data: Bytes,
}

/// ISP login credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IspCredentials {
    pub id: String,
    pub password: String,
    pub dns1: Ipv4Addr,
    pub dns2: Ipv4Addr,
}

impl Default for IspCredentials {
    fn default() -> Self {
        Self {
            id: "nozomi".to_string(),
            password: "wahaha1".to_string(),
            dns1: Ipv4Addr::LOCALHOST,
            dns2: Ipv4Addr::LOCALHOST,
        }
    }
}

impl IspCredentials {
    fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(2 + self.id.len() + self.password.len() + 8);
        data.push(self.id.len() as u8);
        data.extend_from_slice(self.id.as_bytes());
        data.push(self.password.len() as u8);
        data.extend_from_slice(self.password.as_bytes());
        data.extend_from_slice(&self.dns1.octets());
        data.extend_from_slice(&self.dns2.octets());
        data
    }
}

fn encode_address(addr: SocketAddrV4) -> Vec<u8> {
    let mut data = addr.ip().octets().to_vec();
    data.extend_from_slice(&addr.port().to_be_bytes());
    data
}

impl<L: ByteLink> SessionDriver<L> {
    /// Send a command; `None` when no reply frame was awaited
    async fn request(
        &mut self,
        command: Command,
        payload: &[u8],
    ) -> DriverResult<Option<DecodedReply>> {
        let exchange = self.transfer(command.id(), payload).await?;
        match exchange.reply {
            Some(reply) => Ok(Some(decode_reply(command, &reply.payload)?)),
            None => Ok(None),
        }
    }

    /// Send a command whose reply carries data
    async fn query(&mut self, command: Command, payload: &[u8]) -> DriverResult<DecodedReply> {
        self.request(command, payload)
            .await?
            .ok_or(DriverError::NoReply(command))
    }

    async fn command(&mut self, command: Command, payload: &[u8]) -> DriverResult<()> {
        self.request(command, payload).await.map(|_| ())
    }

    pub async fn begin_session(&mut self) -> DriverResult<()> {
        let reply = self.query(Command::BeginSession, SESSION_MAGIC).await?;
        if reply.tail().as_ref() != SESSION_MAGIC {
            tracing::warn!("Adapter answered begin-session with {:02X?}", reply.tail());
        }
        Ok(())
    }

    pub async fn end_session(&mut self) -> DriverResult<()> {
        self.command(Command::EndSession, &[]).await
    }

    /// Dial a telephone number; `protocol` is the adapter's dial mode byte
    pub async fn dial_telephone(&mut self, number: &str, protocol: u8) -> DriverResult<()> {
        let mut data = vec![protocol];
        data.extend_from_slice(number.as_bytes());
        self.command(Command::DialTelephone, &data).await
    }

    pub async fn hang_up_telephone(&mut self) -> DriverResult<()> {
        self.command(Command::HangUpTelephone, &[]).await
    }

    pub async fn wait_for_telephone_call(&mut self) -> DriverResult<()> {
        self.command(Command::WaitForTelephoneCall, &[]).await
    }

    /// Send data on a connection and collect whatever the adapter received
    ///
    /// `None` as connection addresses the telephone call. Empty `data` is
    /// the transfer terminator: the adapter sends no reply frame for it, so
    /// the no-response latch is set and `None` is returned.
    pub async fn transfer_data(
        &mut self,
        connection: Option<u8>,
        data: &[u8],
    ) -> DriverResult<Option<TransferDataReply>> {
        let mut payload = Vec::with_capacity(1 + data.len());
        payload.push(connection.unwrap_or(CALL_CONNECTION));
        payload.extend_from_slice(data);
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(crate::protocol::CodecError::PayloadTooLarge(payload.len()).into());
        }
        if data.is_empty() {
            self.set_transfer_no_response();
        }

        let reply = self.request(Command::TransferData, &payload).await?;
        Ok(reply.map(|reply| TransferDataReply {
            connection: reply.byte("connection"),
            data: reply.tail().clone(),
        }))
    }

    /// Send the zero-length terminator, which the adapter never answers
    pub async fn finish_transfer(&mut self, connection: Option<u8>) -> DriverResult<()> {
        self.transfer_data(connection, &[]).await.map(|_| ())
    }

    pub async fn reset(&mut self) -> DriverResult<()> {
        self.command(Command::Reset, &[]).await
    }

    pub async fn telephone_status(&mut self) -> DriverResult<TelephoneStatus> {
        let reply = self.query(Command::TelephoneStatus, &[]).await?;
        Ok(TelephoneStatus {
            state: reply.byte("state"),
            service: reply.byte("service"),
            flags: reply.byte("flags"),
        })
    }

    pub async fn sio32_mode(&mut self, enable: bool) -> DriverResult<()> {
        self.command(Command::Sio32Mode, &[u8::from(enable)]).await
    }

    pub async fn read_configuration(
        &mut self,
        offset: u8,
        size: u8,
    ) -> DriverResult<ConfigurationData> {
        let reply = self
            .query(Command::ReadConfigurationData, &[offset, size])
            .await?;
        Ok(ConfigurationData {
            offset: reply.byte("offset"),
            data: reply.tail().clone(),
        })
    }

    pub async fn write_configuration(&mut self, offset: u8, data: &[u8]) -> DriverResult<()> {
        let mut payload = vec![offset];
        payload.extend_from_slice(data);
        self.command(Command::WriteConfigurationData, &payload).await
    }

    pub async fn isp_login(&mut self, credentials: &IspCredentials) -> DriverResult<IspLoginReply> {
        let reply = self.query(Command::IspLogin, &credentials.encode()).await?;
        Ok(IspLoginReply {
            ip: reply.ipv4("ip"),
            dns1: reply.ipv4("dns1"),
            dns2: reply.ipv4("dns2"),
        })
    }

    pub async fn isp_logout(&mut self) -> DriverResult<()> {
        self.command(Command::IspLogout, &[]).await
    }

    /// Open a TCP connection, returning its connection id
    pub async fn open_tcp_connection(&mut self, addr: SocketAddrV4) -> DriverResult<u8> {
        let reply = self
            .query(Command::OpenTcpConnection, &encode_address(addr))
            .await?;
        Ok(reply.byte("connection"))
    }

    pub async fn close_tcp_connection(&mut self, connection: u8) -> DriverResult<()> {
        self.command(Command::CloseTcpConnection, &[connection]).await
    }

    /// Open a UDP connection, returning its connection id
    pub async fn open_udp_connection(&mut self, addr: SocketAddrV4) -> DriverResult<u8> {
        let reply = self
            .query(Command::OpenUdpConnection, &encode_address(addr))
            .await?;
        Ok(reply.byte("connection"))
    }

    pub async fn close_udp_connection(&mut self, connection: u8) -> DriverResult<()> {
        self.command(Command::CloseUdpConnection, &[connection]).await
    }

    pub async fn dns_query(&mut self, name: &str) -> DriverResult<Ipv4Addr> {
        let reply = self.query(Command::DnsQuery, name.as_bytes()).await?;
        Ok(reply.ipv4("address"))
    }

    pub async fn firmware_version(&mut self) -> DriverResult<Bytes> {
        let reply = self.query(Command::FirmwareVersion, &[]).await?;
        Ok(reply.tail().clone())
    }
}
