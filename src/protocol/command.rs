//! Command and device identifiers
//!
//! Defines the one-byte command ids understood by the adapter and the
//! device classes that show up in the device-identity byte.

use std::fmt;

use super::ACK_MASK;

/// Adapter command identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    BeginSession = 0x10,
    EndSession = 0x11,
    DialTelephone = 0x12,
    HangUpTelephone = 0x13,
    WaitForTelephoneCall = 0x14,
    TransferData = 0x15,
    Reset = 0x16,
    TelephoneStatus = 0x17,
    Sio32Mode = 0x18,
    ReadConfigurationData = 0x19,
    WriteConfigurationData = 0x1A,
    TransferDataEnd = 0x1F,
    IspLogin = 0x21,
    IspLogout = 0x22,
    OpenTcpConnection = 0x23,
    CloseTcpConnection = 0x24,
    OpenUdpConnection = 0x25,
    CloseUdpConnection = 0x26,
    DnsQuery = 0x28,
    FirmwareVersion = 0x3F,
    Error = 0x6E,
}

impl Command {
    pub const ALL: [Command; 21] = [
        Command::BeginSession,
        Command::EndSession,
        Command::DialTelephone,
        Command::HangUpTelephone,
        Command::WaitForTelephoneCall,
        Command::TransferData,
        Command::Reset,
        Command::TelephoneStatus,
        Command::Sio32Mode,
        Command::ReadConfigurationData,
        Command::WriteConfigurationData,
        Command::TransferDataEnd,
        Command::IspLogin,
        Command::IspLogout,
        Command::OpenTcpConnection,
        Command::CloseTcpConnection,
        Command::OpenUdpConnection,
        Command::CloseUdpConnection,
        Command::DnsQuery,
        Command::FirmwareVersion,
        Command::Error,
    ];

    /// Wire value of this command
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Command id the adapter uses when replying to this command
    pub fn reply_id(self) -> u8 {
        self.id() ^ ACK_MASK
    }

    /// Look up a command from its wire value
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::BeginSession => "begin-session",
            Command::EndSession => "end-session",
            Command::DialTelephone => "dial-telephone",
            Command::HangUpTelephone => "hang-up-telephone",
            Command::WaitForTelephoneCall => "wait-for-telephone-call",
            Command::TransferData => "transfer-data",
            Command::Reset => "reset",
            Command::TelephoneStatus => "telephone-status",
            Command::Sio32Mode => "sio32-mode",
            Command::ReadConfigurationData => "read-configuration-data",
            Command::WriteConfigurationData => "write-configuration-data",
            Command::TransferDataEnd => "transfer-data-end",
            Command::IspLogin => "isp-login",
            Command::IspLogout => "isp-logout",
            Command::OpenTcpConnection => "open-tcp-connection",
            Command::CloseTcpConnection => "close-tcp-connection",
            Command::OpenUdpConnection => "open-udp-connection",
            Command::CloseUdpConnection => "close-udp-connection",
            Command::DnsQuery => "dns-query",
            Command::FirmwareVersion => "firmware-version",
            Command::Error => "error",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Human-readable label for a raw command byte, including reply ids
pub fn describe_command(id: u8) -> String {
    if let Some(command) = Command::from_id(id) {
        return command.name().to_string();
    }
    match Command::from_id(id ^ ACK_MASK) {
        Some(command) => format!("{} reply", command.name()),
        None => format!("unknown {:#04x}", id),
    }
}

/// Device classes carried in the device-identity byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeviceClass {
    Console = 0,
    AdvanceConsole = 1,
    BlueAdapter = 8,
    YellowAdapter = 9,
    GreenAdapter = 10,
    RedAdapter = 11,
}

impl DeviceClass {
    /// Device byte as transmitted (the class with the high bit set)
    pub fn wire_byte(self) -> u8 {
        self as u8 | ACK_MASK
    }

    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte & !ACK_MASK {
            0 => Some(DeviceClass::Console),
            1 => Some(DeviceClass::AdvanceConsole),
            8 => Some(DeviceClass::BlueAdapter),
            9 => Some(DeviceClass::YellowAdapter),
            10 => Some(DeviceClass::GreenAdapter),
            11 => Some(DeviceClass::RedAdapter),
            _ => None,
        }
    }

    pub fn is_adapter(self) -> bool {
        (self as u8) >= 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_ids() {
        assert_eq!(Command::BeginSession.id(), 0x10);
        assert_eq!(Command::TransferDataEnd.id(), 0x1F);
        assert_eq!(Command::DnsQuery.id(), 0x28);
        assert_eq!(Command::TelephoneStatus.reply_id(), 0x97);
    }

    #[test]
    fn test_from_id_covers_all() {
        for command in Command::ALL {
            assert_eq!(Command::from_id(command.id()), Some(command));
        }
        assert_eq!(Command::from_id(0x20), None);
    }

    #[test]
    fn test_describe_reply() {
        assert_eq!(describe_command(0x17), "telephone-status");
        assert_eq!(describe_command(0x97), "telephone-status reply");
        assert_eq!(describe_command(0x01), "unknown 0x01");
    }

    #[test]
    fn test_device_class_wire_byte() {
        assert_eq!(DeviceClass::Console.wire_byte(), 0x80);
        assert_eq!(DeviceClass::BlueAdapter.wire_byte(), 0x88);
        assert_eq!(DeviceClass::from_wire(0x88), Some(DeviceClass::BlueAdapter));
        assert!(DeviceClass::RedAdapter.is_adapter());
        assert!(!DeviceClass::AdvanceConsole.is_adapter());
        assert_eq!(DeviceClass::from_wire(0x85), None);
    }
}
