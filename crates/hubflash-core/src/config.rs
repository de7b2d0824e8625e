//! Per-hub flashing parameters and timeouts
//!
//! The built-in table covers all hubs with an LWP3 bootloader. It can be
//! extended or overridden from a TOML file:
//!
//! ```toml
//! [timeouts]
//! response-ms = 500
//! erase-ms = 5000
//!
//! [[hub]]
//! id = "0x41"
//! name = "City Hub"
//! max-program-size = 32
//! checksum-interval = 8
//! erase-with-ack = true
//! firmware = "cityhub"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::hub::HubType;
use crate::protocol::{MAX_PROGRAM_SIZE, SAFE_PROGRAM_SIZE};

/// Packets between two checksum polls unless configured otherwise
pub const DEFAULT_CHECKSUM_INTERVAL: u32 = 8;

/// Errors loading a configuration file
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config file: {0}")]
    Io(String),
    /// The file is not valid TOML or has unexpected fields
    #[error("failed to parse config file: {0}")]
    Parse(String),
    /// Program payload size outside 1..=32
    #[error("hub 0x{id:02X}: max-program-size {size} is outside 1..={max}")]
    InvalidProgramSize {
        /// Hub type id
        id: u8,
        /// Configured size
        size: usize,
        /// Largest allowed size
        max: usize,
    },
    /// Checksum interval of zero
    #[error("hub 0x{id:02X}: checksum-interval must be at least 1")]
    InvalidChecksumInterval {
        /// Hub type id
        id: u8,
    },
}

/// Response timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Default wait for a decoded reply
    pub response: Duration,
    /// Wait for the Erase reply
    pub erase: Duration,
    /// Wait for the reply to the last Program packet
    pub program: Duration,
    /// Wait for a GetChecksum reply during programming
    pub checksum: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            response: Duration::from_millis(500),
            erase: Duration::from_millis(5000),
            program: Duration::from_millis(5000),
            checksum: Duration::from_millis(5000),
        }
    }
}

/// Flashing quirks of one hub type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubProfile {
    /// Hub type this profile applies to
    pub hub: HubType,
    /// Display name
    pub name: String,
    /// Payload bytes per Program packet
    pub max_program_size: usize,
    /// Packets between checksum polls
    pub checksum_interval: u32,
    /// Whether Erase is written with a link-layer acknowledgement
    pub erase_with_ack: bool,
    /// Name of the bundled firmware package
    pub firmware: Option<String>,
}

impl HubProfile {
    fn builtin(
        hub: HubType,
        max_program_size: usize,
        erase_with_ack: bool,
        firmware: &str,
    ) -> Self {
        Self {
            hub,
            name: hub.name().to_string(),
            max_program_size,
            checksum_interval: DEFAULT_CHECKSUM_INTERVAL,
            erase_with_ack,
            firmware: Some(firmware.to_string()),
        }
    }

    /// Conservative profile for hubs not in the table
    pub fn fallback(hub: HubType) -> Self {
        Self {
            hub,
            name: hub.name().to_string(),
            max_program_size: SAFE_PROGRAM_SIZE,
            checksum_interval: DEFAULT_CHECKSUM_INTERVAL,
            erase_with_ack: false,
            firmware: None,
        }
    }

    /// Ack mode to use for Erase on this host
    ///
    /// The Windows BLE stack never delivers the reply when Erase is
    /// acknowledged, so it is always sent without ack there.
    pub fn erase_ack(&self) -> bool {
        self.erase_with_ack && !cfg!(windows)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_program_size == 0 || self.max_program_size > MAX_PROGRAM_SIZE {
            return Err(ConfigError::InvalidProgramSize {
                id: self.hub.id(),
                size: self.max_program_size,
                max: MAX_PROGRAM_SIZE,
            });
        }
        if self.checksum_interval == 0 {
            return Err(ConfigError::InvalidChecksumInterval { id: self.hub.id() });
        }
        Ok(())
    }
}

/// Flashing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashConfig {
    /// Response timeouts
    pub timeouts: Timeouts,
    /// Known hub profiles
    pub hubs: Vec<HubProfile>,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            hubs: vec![
                HubProfile::builtin(HubType::MoveHub, SAFE_PROGRAM_SIZE, false, "movehub"),
                HubProfile::builtin(HubType::CityHub, MAX_PROGRAM_SIZE, true, "cityhub"),
                HubProfile::builtin(HubType::TechnicHub, MAX_PROGRAM_SIZE, false, "technichub"),
            ],
        }
    }
}

impl FlashConfig {
    /// Profile for a hub type, falling back to safe defaults
    pub fn profile(&self, hub: HubType) -> HubProfile {
        self.hubs
            .iter()
            .find(|p| p.hub == hub)
            .cloned()
            .unwrap_or_else(|| HubProfile::fallback(hub))
    }

    /// Load the built-in table merged with a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse a TOML string on top of the built-in table
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: TomlConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut config = Self::default();

        if let Some(t) = file.timeouts {
            let ms = Duration::from_millis;
            if let Some(v) = t.response_ms {
                config.timeouts.response = ms(v);
            }
            if let Some(v) = t.erase_ms {
                config.timeouts.erase = ms(v);
            }
            if let Some(v) = t.program_ms {
                config.timeouts.program = ms(v);
            }
            if let Some(v) = t.checksum_ms {
                config.timeouts.checksum = ms(v);
            }
        }

        for entry in file.hub {
            let hub = HubType::from_id(entry.id);
            let mut profile = config.profile(hub);
            if let Some(name) = entry.name {
                profile.name = name;
            }
            if let Some(size) = entry.max_program_size {
                profile.max_program_size = size;
            }
            if let Some(interval) = entry.checksum_interval {
                profile.checksum_interval = interval;
            }
            if let Some(ack) = entry.erase_with_ack {
                profile.erase_with_ack = ack;
            }
            if entry.firmware.is_some() {
                profile.firmware = entry.firmware;
            }
            profile.validate()?;

            match config.hubs.iter_mut().find(|p| p.hub == hub) {
                Some(existing) => *existing = profile,
                None => config.hubs.push(profile),
            }
        }

        Ok(config)
    }
}

/// TOML config file structure
#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfigFile {
    timeouts: Option<TomlTimeouts>,
    #[serde(default)]
    hub: Vec<TomlHub>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct TomlTimeouts {
    response_ms: Option<u64>,
    erase_ms: Option<u64>,
    program_ms: Option<u64>,
    checksum_ms: Option<u64>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct TomlHub {
    #[serde(deserialize_with = "deserialize_hex_u8")]
    id: u8,
    name: Option<String>,
    max_program_size: Option<usize>,
    checksum_interval: Option<u32>,
    erase_with_ack: Option<bool>,
    firmware: Option<String>,
}

/// Deserialize a u8 that can be hex (0x...) or decimal
fn deserialize_hex_u8<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexOrInt {
        Int(u8),
        Str(String),
    }

    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(n),
        HexOrInt::Str(s) => parse_number(&s).map_err(serde::de::Error::custom),
    }
}

/// Parse a number that can be hex (0x...) or decimal
fn parse_number(s: &str) -> Result<u8, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}
