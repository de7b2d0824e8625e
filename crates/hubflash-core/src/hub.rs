//! LEGO Powered Up hub types

use core::fmt;

/// Hub type identifier reported by the bootloader
///
/// Only the hubs that speak the LWP3 bootloader protocol have named variants.
/// Any other id is carried through as `Other` so it can still be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubType {
    /// BOOST Move Hub
    MoveHub,
    /// City Hub
    CityHub,
    /// Technic Hub (Control+)
    TechnicHub,
    /// Any other hub type id
    Other(u8),
}

impl HubType {
    /// Raw hub type id as sent on the wire
    pub const fn id(self) -> u8 {
        match self {
            Self::MoveHub => 0x40,
            Self::CityHub => 0x41,
            Self::TechnicHub => 0x80,
            Self::Other(id) => id,
        }
    }

    /// Map a raw id to a hub type
    pub const fn from_id(id: u8) -> Self {
        match id {
            0x40 => Self::MoveHub,
            0x41 => Self::CityHub,
            0x80 => Self::TechnicHub,
            other => Self::Other(other),
        }
    }

    /// Human readable product name
    pub fn name(self) -> &'static str {
        match self {
            Self::MoveHub => "Move Hub",
            Self::CityHub => "City Hub",
            Self::TechnicHub => "Technic Hub",
            Self::Other(_) => "Unknown Hub",
        }
    }
}

impl From<u8> for HubType {
    fn from(id: u8) -> Self {
        Self::from_id(id)
    }
}

impl From<HubType> for u8 {
    fn from(hub: HubType) -> Self {
        hub.id()
    }
}

impl fmt::Display for HubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.id())
    }
}
