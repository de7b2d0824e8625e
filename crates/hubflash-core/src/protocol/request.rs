//! Outgoing bootloader commands

use super::{check_len, read_u32, Command, PROGRAM_HEADER_SIZE};
use crate::error::{ProtocolError, Result};

/// A command sent to the hub bootloader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Erase the whole user flash
    Erase,
    /// Write `payload` at `address`
    Program {
        /// Absolute flash address
        address: u32,
        /// Data to write, at most `MAX_PROGRAM_SIZE` bytes
        payload: Vec<u8>,
    },
    /// Leave the bootloader and start the new firmware
    Reboot,
    /// Prepare for a firmware of the given size
    Init {
        /// Total image length in bytes
        firmware_size: u32,
    },
    /// Query version, flash range and hub type
    GetInfo,
    /// Query the running checksum
    GetChecksum,
    /// Query the flash protection level
    GetFlashState,
    /// Ask the bootloader to drop the link
    Disconnect,
}

impl Request {
    /// The command this request issues
    pub fn command(&self) -> Command {
        match self {
            Self::Erase => Command::EraseFlash,
            Self::Program { .. } => Command::ProgramFlash,
            Self::Reboot => Command::StartApp,
            Self::Init { .. } => Command::InitLoader,
            Self::GetInfo => Command::GetInfo,
            Self::GetChecksum => Command::GetChecksum,
            Self::GetFlashState => Command::GetFlashState,
            Self::Disconnect => Command::Disconnect,
        }
    }

    /// Whether the write should wait for a link-layer acknowledgement
    ///
    /// Program is never acknowledged so packets can be streamed. Reboot and
    /// Disconnect make the hub drop the link, so there may be no one left to
    /// acknowledge them. Erase depends on the hub and is decided by the
    /// caller; this returns `false` for it.
    pub fn default_ack(&self) -> bool {
        match self {
            Self::Erase | Self::Program { .. } | Self::Reboot | Self::Disconnect => false,
            Self::Init { .. } | Self::GetInfo | Self::GetChecksum | Self::GetFlashState => true,
        }
    }

    /// Encode into a wire frame
    pub fn encode(&self) -> Vec<u8> {
        let opcode = self.command().opcode();
        match self {
            Self::Program { address, payload } => {
                let mut frame = Vec::with_capacity(PROGRAM_HEADER_SIZE + payload.len());
                frame.push(opcode);
                // Length covers the address and the payload
                frame.push((payload.len() + 4) as u8);
                frame.extend_from_slice(&address.to_le_bytes());
                frame.extend_from_slice(payload);
                frame
            }
            Self::Init { firmware_size } => {
                let mut frame = Vec::with_capacity(5);
                frame.push(opcode);
                frame.extend_from_slice(&firmware_size.to_le_bytes());
                frame
            }
            _ => vec![opcode],
        }
    }

    /// Decode a wire frame as received by the bootloader
    pub fn decode(data: &[u8]) -> Result<Self> {
        let opcode = *data.first().ok_or(ProtocolError::Empty)?;
        let command = Command::from_opcode(opcode).ok_or(ProtocolError::UnknownCommand(opcode))?;

        Ok(match command {
            Command::EraseFlash => Self::Erase,
            Command::ProgramFlash => {
                check_len(data, PROGRAM_HEADER_SIZE)?;
                let payload = &data[PROGRAM_HEADER_SIZE..];
                let field = data[1];
                if field as usize != payload.len() + 4 {
                    return Err(ProtocolError::LengthMismatch {
                        field,
                        payload: payload.len(),
                    });
                }
                Self::Program {
                    address: read_u32(data, 2),
                    payload: payload.to_vec(),
                }
            }
            Command::StartApp => Self::Reboot,
            Command::InitLoader => {
                check_len(data, 5)?;
                Self::Init {
                    firmware_size: read_u32(data, 1),
                }
            }
            Command::GetInfo => Self::GetInfo,
            Command::GetChecksum => Self::GetChecksum,
            Command::GetFlashState => Self::GetFlashState,
            Command::Disconnect => Self::Disconnect,
        })
    }
}
