use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a stored or transmitted enum name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Dance style taught by a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DanceStyle {
    Salsa,
    Bachata,
    Reggaeton,
}

impl DanceStyle {
    pub const ALL: [DanceStyle; 3] = [DanceStyle::Salsa, DanceStyle::Bachata, DanceStyle::Reggaeton];

    /// Returns the storage name (`SALSA`, `BACHATA`, `REGGAETON`).
    pub fn as_str(&self) -> &'static str {
        match self {
            DanceStyle::Salsa => "SALSA",
            DanceStyle::Bachata => "BACHATA",
            DanceStyle::Reggaeton => "REGGAETON",
        }
    }
}

impl std::fmt::Display for DanceStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DanceStyle {
    type Err = ParseEnumError;

    /// Case-insensitive, so both `salsa` and `SALSA` parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DanceStyle::ALL
            .into_iter()
            .find(|style| style.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseEnumError::new("dance style", s))
    }
}

/// Difficulty level of a class definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DanceLevel {
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "LEVEL_1")]
    Level1,
    #[serde(rename = "LEVEL_2")]
    Level2,
    #[serde(rename = "LEVEL_3")]
    Level3,
}

impl DanceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DanceLevel::Open => "OPEN",
            DanceLevel::Level1 => "LEVEL_1",
            DanceLevel::Level2 => "LEVEL_2",
            DanceLevel::Level3 => "LEVEL_3",
        }
    }
}

impl std::fmt::Display for DanceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DanceLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OPEN" => Ok(DanceLevel::Open),
            "LEVEL_1" => Ok(DanceLevel::Level1),
            "LEVEL_2" => Ok(DanceLevel::Level2),
            "LEVEL_3" => Ok(DanceLevel::Level3),
            _ => Err(ParseEnumError::new("dance level", s)),
        }
    }
}

/// Role of a registered user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    #[default]
    Student,
    Instructor,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Student => "STUDENT",
            UserRole::Instructor => "INSTRUCTOR",
        }
    }
}

impl FromStr for UserRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STUDENT" => Ok(UserRole::Student),
            "INSTRUCTOR" => Ok(UserRole::Instructor),
            _ => Err(ParseEnumError::new("user role", s)),
        }
    }
}

/// Status of a booking.
///
/// Bookings are created `Confirmed`; `Cancelled` exists in the data model
/// but nothing in this system transitions to it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    #[default]
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            _ => Err(ParseEnumError::new("booking status", s)),
        }
    }
}
