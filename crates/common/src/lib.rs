//! Shared identifiers and enums for the dance class booking system.

mod enums;
mod ids;

pub use enums::{BookingStatus, DanceLevel, DanceStyle, ParseEnumError, UserRole};
pub use ids::{BookingId, ClassDefinitionId, ClassInstanceId, UserId};
