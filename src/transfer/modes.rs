//! FTP Transfer modes
//!
//! Data connection modes and representation types.

use serde::Deserialize;

/// How the data connection is established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// Client listens, server connects in (PORT)
    Active,
    /// Client connects to the address from a 227 reply (PASV)
    #[default]
    Passive,
    /// Client connects to the control peer on the port from a 229 reply (EPSV)
    ExtendedPassive,
}

impl TransferMode {
    /// The mode tried when this one is refused and fallback is enabled
    pub fn fallback(self) -> TransferMode {
        match self {
            TransferMode::Active => TransferMode::Passive,
            TransferMode::Passive | TransferMode::ExtendedPassive => TransferMode::Active,
        }
    }
}

/// Representation type sent with TYPE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferType {
    Ascii,
    #[default]
    Binary,
}

impl TransferType {
    pub fn code(self) -> char {
        match self {
            TransferType::Ascii => 'A',
            TransferType::Binary => 'I',
        }
    }
}
