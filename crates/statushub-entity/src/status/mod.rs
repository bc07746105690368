//! User status domain entities.

pub mod codec;
pub mod model;

pub use model::StatusRecord;

use serde::{Deserialize, Serialize};

/// Presence state of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// User is connected and active.
    Online,
    /// User is connected but idle, or set themselves away.
    Away,
    /// User is not connected.
    Offline,
    /// Do not disturb.
    Dnd,
    /// Out of office.
    #[sqlx(rename = "ooo")]
    #[serde(rename = "ooo")]
    OutOfOffice,
}

impl UserStatus {
    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Offline => "offline",
            Self::Dnd => "dnd",
            Self::OutOfOffice => "ooo",
        }
    }

    /// Stable single-byte code used by the compact cache encoding.
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Online => 1,
            Self::Away => 2,
            Self::Offline => 3,
            Self::Dnd => 4,
            Self::OutOfOffice => 5,
        }
    }

    /// Inverse of [`code`](Self::code).
    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Online),
            2 => Some(Self::Away),
            3 => Some(Self::Offline),
            4 => Some(Self::Dnd),
            5 => Some(Self::OutOfOffice),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for UserStatus {
    type Err = statushub_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "away" => Ok(Self::Away),
            "offline" => Ok(Self::Offline),
            "dnd" => Ok(Self::Dnd),
            "ooo" | "out_of_office" => Ok(Self::OutOfOffice),
            _ => Err(statushub_core::AppError::validation(format!(
                "Invalid user status: '{s}'. Expected one of: online, away, offline, dnd, ooo"
            ))),
        }
    }
}
