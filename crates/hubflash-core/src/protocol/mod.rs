//! LEGO Wireless Protocol v3 bootloader protocol
//!
//! Ref: <https://lego.github.io/lego-ble-wireless-protocol-docs/index.html#lego-hub-boot-loader-service>
//!
//! Every request is a single frame starting with a command opcode. Replies
//! start with the opcode of the command they answer, except for the generic
//! error reply which starts with its length byte (always 0x05).
//!
//! All multi-byte integers are little-endian.

mod request;
mod response;

pub use request::Request;
pub use response::{BootloaderInfo, Response};

use core::fmt;

/// Bootloader GATT service UUID
pub const SERVICE_UUID: &str = "00001625-1212-efde-1623-785feabcd123";
/// Bootloader GATT characteristic UUID
pub const CHARACTERISTIC_UUID: &str = "00001626-1212-efde-1623-785feabcd123";

/// Bootloader GATT service UUID as an integer
pub const SERVICE_UUID_U128: u128 = 0x00001625_1212_efde_1623_785feabcd123;
/// Bootloader GATT characteristic UUID as an integer
pub const CHARACTERISTIC_UUID_U128: u128 = 0x00001626_1212_efde_1623_785feabcd123;

/// Largest message that can be sent or received over the default BLE MTU
pub const MAX_MESSAGE_SIZE: usize = 20;

/// Largest Program payload any hub accepts
///
/// City and Technic hubs report an MTU of 158 but lock up when a Program
/// payload is larger than this.
pub const MAX_PROGRAM_SIZE: usize = 32;

/// Program payload size that is safe for every hub
pub const SAFE_PROGRAM_SIZE: usize = 14;

/// Bytes in a Program frame before the payload (opcode, length, address)
pub const PROGRAM_HEADER_SIZE: usize = 6;

/// Leading byte (length) of the generic error reply
pub const ERROR_MESSAGE_LENGTH: u8 = 0x05;
/// Error bytecode inside the generic error reply
pub const ERROR_BYTECODE: u8 = 0x05;
/// The only error code the bootloader defines
pub const ERROR_UNKNOWN_COMMAND: u8 = 0x05;

// Command opcodes
/// Erase the flash memory
pub const CMD_ERASE_FLASH: u8 = 0x11;
/// Program a chunk of flash memory
pub const CMD_PROGRAM_FLASH: u8 = 0x22;
/// Leave the bootloader and start the application
pub const CMD_START_APP: u8 = 0x33;
/// Prepare the bootloader for a new firmware
pub const CMD_INIT_LOADER: u8 = 0x44;
/// Query bootloader and device info
pub const CMD_GET_INFO: u8 = 0x55;
/// Query the running checksum of programmed data
pub const CMD_GET_CHECKSUM: u8 = 0x66;
/// Query the flash protection state
pub const CMD_GET_FLASH_STATE: u8 = 0x77;
/// Close the connection
pub const CMD_DISCONNECT: u8 = 0x88;

/// Result byte for success
pub const RESULT_OK: u8 = 0x00;
/// Result byte the bootloader uses for failure
pub const RESULT_ERROR: u8 = 0xFF;

/// Bootloader commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Erase the flash memory
    EraseFlash,
    /// Program flash memory
    ProgramFlash,
    /// Reboot into the application
    StartApp,
    /// Initialize the loader with the firmware size
    InitLoader,
    /// Get bootloader info
    GetInfo,
    /// Get the running checksum
    GetChecksum,
    /// Get the flash protection state
    GetFlashState,
    /// Disconnect
    Disconnect,
}

impl Command {
    /// Wire opcode of this command
    pub const fn opcode(self) -> u8 {
        match self {
            Self::EraseFlash => CMD_ERASE_FLASH,
            Self::ProgramFlash => CMD_PROGRAM_FLASH,
            Self::StartApp => CMD_START_APP,
            Self::InitLoader => CMD_INIT_LOADER,
            Self::GetInfo => CMD_GET_INFO,
            Self::GetChecksum => CMD_GET_CHECKSUM,
            Self::GetFlashState => CMD_GET_FLASH_STATE,
            Self::Disconnect => CMD_DISCONNECT,
        }
    }

    /// Look up a command by its opcode
    pub const fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            CMD_ERASE_FLASH => Some(Self::EraseFlash),
            CMD_PROGRAM_FLASH => Some(Self::ProgramFlash),
            CMD_START_APP => Some(Self::StartApp),
            CMD_INIT_LOADER => Some(Self::InitLoader),
            CMD_GET_INFO => Some(Self::GetInfo),
            CMD_GET_CHECKSUM => Some(Self::GetChecksum),
            CMD_GET_FLASH_STATE => Some(Self::GetFlashState),
            CMD_DISCONNECT => Some(Self::Disconnect),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::EraseFlash => "erase",
            Self::ProgramFlash => "program",
            Self::StartApp => "reboot",
            Self::InitLoader => "init",
            Self::GetInfo => "info",
            Self::GetChecksum => "checksum",
            Self::GetFlashState => "flash state",
            Self::Disconnect => "disconnect",
        };
        write!(f, "{} (0x{:02X})", name, self.opcode())
    }
}

/// Result status of Erase and Init
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    /// Command succeeded
    Ok,
    /// Command failed with the given status byte
    Failed(u8),
}

impl ResultCode {
    /// Decode a status byte
    pub const fn from_byte(b: u8) -> Self {
        if b == RESULT_OK {
            Self::Ok
        } else {
            Self::Failed(b)
        }
    }

    /// Encode as a status byte
    pub const fn byte(self) -> u8 {
        match self {
            Self::Ok => RESULT_OK,
            Self::Failed(b) => b,
        }
    }

    /// Returns true on success
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Flash memory protection level (see the STM32 reference manual)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionLevel {
    /// No read protection
    None,
    /// Level 1 read protection
    Level1,
    /// Level 2 (permanent) read protection
    Level2,
    /// Value not documented
    Unknown(u8),
}

impl ProtectionLevel {
    /// Decode a protection level byte
    pub const fn from_byte(b: u8) -> Self {
        match b {
            0x00 => Self::None,
            0x01 => Self::Level1,
            0x02 => Self::Level2,
            other => Self::Unknown(other),
        }
    }

    /// Encode as a byte
    pub const fn byte(self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::Level1 => 0x01,
            Self::Level2 => 0x02,
            Self::Unknown(b) => b,
        }
    }
}

impl fmt::Display for ProtectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Level1 => write!(f, "level 1"),
            Self::Level2 => write!(f, "level 2"),
            Self::Unknown(b) => write!(f, "unknown (0x{:02X})", b),
        }
    }
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

pub(crate) fn check_len(data: &[u8], expected: usize) -> crate::Result<()> {
    if data.len() < expected {
        return Err(crate::ProtocolError::Truncated {
            opcode: data.first().copied().unwrap_or(0),
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}
