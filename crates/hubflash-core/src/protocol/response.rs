//! Replies from the hub bootloader

use super::{
    check_len, read_u32, Command, ProtectionLevel, ResultCode, ERROR_BYTECODE,
    ERROR_MESSAGE_LENGTH, ERROR_UNKNOWN_COMMAND,
};
use crate::error::{ProtocolError, Result};
use crate::hub::HubType;

/// Contents of the GetInfo reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootloaderInfo {
    /// Bootloader protocol version
    pub version: u32,
    /// First writable flash address
    pub start_address: u32,
    /// Last flash address
    pub end_address: u32,
    /// Hub type id reported by the device
    pub hub_type: HubType,
}

impl BootloaderInfo {
    /// Usable flash size in bytes
    pub fn flash_size(&self) -> u32 {
        self.end_address.saturating_sub(self.start_address)
    }
}

/// A decoded bootloader reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Reply to Erase
    Erase(ResultCode),
    /// Reply to the last Program packet
    Program {
        /// XOR checksum of all bytes programmed
        checksum: u8,
        /// Number of bytes programmed
        count: u32,
    },
    /// Reply to Init
    Init(ResultCode),
    /// Reply to GetInfo
    Info(BootloaderInfo),
    /// Reply to GetChecksum
    Checksum(u8),
    /// Reply to GetFlashState
    FlashState(ProtectionLevel),
    /// The bootloader did not understand the given command
    Error(Command),
}

impl Response {
    /// The command this is the expected reply to
    ///
    /// Returns `None` for the generic error reply, which can follow any
    /// command.
    pub fn answers(&self) -> Option<Command> {
        match self {
            Self::Erase(_) => Some(Command::EraseFlash),
            Self::Program { .. } => Some(Command::ProgramFlash),
            Self::Init(_) => Some(Command::InitLoader),
            Self::Info(_) => Some(Command::GetInfo),
            Self::Checksum(_) => Some(Command::GetChecksum),
            Self::FlashState(_) => Some(Command::GetFlashState),
            Self::Error(_) => None,
        }
    }

    /// Decode a notification received from the bootloader
    pub fn decode(data: &[u8]) -> Result<Self> {
        let first = *data.first().ok_or(ProtocolError::Empty)?;

        if first == ERROR_MESSAGE_LENGTH {
            check_len(data, ERROR_MESSAGE_LENGTH as usize)?;
            if data[2] != ERROR_BYTECODE {
                return Err(ProtocolError::BadErrorBytecode(data[2]));
            }
            if data[4] != ERROR_UNKNOWN_COMMAND {
                return Err(ProtocolError::UnknownErrorCode(data[4]));
            }
            let command =
                Command::from_opcode(data[3]).ok_or(ProtocolError::UnknownCommand(data[3]))?;
            return Ok(Self::Error(command));
        }

        let command = Command::from_opcode(first).ok_or(ProtocolError::UnknownResponse(first))?;
        match command {
            Command::EraseFlash => {
                check_len(data, 2)?;
                Ok(Self::Erase(ResultCode::from_byte(data[1])))
            }
            Command::ProgramFlash => {
                check_len(data, 6)?;
                Ok(Self::Program {
                    checksum: data[1],
                    count: read_u32(data, 2),
                })
            }
            Command::InitLoader => {
                check_len(data, 2)?;
                Ok(Self::Init(ResultCode::from_byte(data[1])))
            }
            Command::GetInfo => {
                check_len(data, 14)?;
                Ok(Self::Info(BootloaderInfo {
                    version: read_u32(data, 1),
                    start_address: read_u32(data, 5),
                    end_address: read_u32(data, 9),
                    hub_type: HubType::from_id(data[13]),
                }))
            }
            Command::GetChecksum => {
                check_len(data, 2)?;
                Ok(Self::Checksum(data[1]))
            }
            Command::GetFlashState => {
                check_len(data, 2)?;
                Ok(Self::FlashState(ProtectionLevel::from_byte(data[1])))
            }
            // These commands never get a reply
            Command::StartApp | Command::Disconnect => Err(ProtocolError::UnknownResponse(first)),
        }
    }

    /// Encode as the bootloader would send it
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Erase(result) => vec![Command::EraseFlash.opcode(), result.byte()],
            Self::Program { checksum, count } => {
                let mut frame = vec![Command::ProgramFlash.opcode(), *checksum];
                frame.extend_from_slice(&count.to_le_bytes());
                frame
            }
            Self::Init(result) => vec![Command::InitLoader.opcode(), result.byte()],
            Self::Info(info) => {
                let mut frame = Vec::with_capacity(14);
                frame.push(Command::GetInfo.opcode());
                frame.extend_from_slice(&info.version.to_le_bytes());
                frame.extend_from_slice(&info.start_address.to_le_bytes());
                frame.extend_from_slice(&info.end_address.to_le_bytes());
                frame.push(info.hub_type.id());
                frame
            }
            Self::Checksum(checksum) => vec![Command::GetChecksum.opcode(), *checksum],
            Self::FlashState(level) => vec![Command::GetFlashState.opcode(), level.byte()],
            Self::Error(command) => vec![
                ERROR_MESSAGE_LENGTH,
                0x00,
                ERROR_BYTECODE,
                command.opcode(),
                ERROR_UNKNOWN_COMMAND,
            ],
        }
    }
}
