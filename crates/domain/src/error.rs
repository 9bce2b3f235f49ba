//! Domain error types.

use booking_store::StoreError;
use common::{ClassInstanceId, UserId};
use thiserror::Error;

/// Coarse grouping of domain errors, used by the HTTP layer to pick a
/// status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A referenced entity does not exist.
    NotFound,
    /// The request conflicts with current state (full class, duplicate booking).
    Conflict,
    /// Storage failure or other unexpected error.
    Internal,
}

/// Errors that can occur during class and booking operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The class instance does not exist.
    #[error("Class instance not found: {0}")]
    ClassInstanceNotFound(ClassInstanceId),

    /// No user is registered with this email.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// The class instance has no remaining spots.
    #[error("Class is full: {0}")]
    ClassFull(ClassInstanceId),

    /// The user already holds a booking for this class instance.
    #[error("User already booked this class: user={user_id}, class={class_instance_id}")]
    DuplicateBooking {
        user_id: UserId,
        class_instance_id: ClassInstanceId,
    },

    /// An error occurred in the booking store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl DomainError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DomainError::ClassInstanceNotFound(_) | DomainError::UserNotFound(_) => {
                ErrorCategory::NotFound
            }
            DomainError::ClassFull(_) | DomainError::DuplicateBooking { .. } => {
                ErrorCategory::Conflict
            }
            DomainError::Store(_) => ErrorCategory::Internal,
        }
    }

    /// Short label used for the `reason` metric dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            DomainError::ClassInstanceNotFound(_) => "class_not_found",
            DomainError::UserNotFound(_) => "user_not_found",
            DomainError::ClassFull(_) => "class_full",
            DomainError::DuplicateBooking { .. } => "duplicate_booking",
            DomainError::Store(_) => "store_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        let id = ClassInstanceId::new();
        assert_eq!(
            DomainError::ClassInstanceNotFound(id).category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            DomainError::UserNotFound("a@b.com".into()).category(),
            ErrorCategory::NotFound
        );
        assert_eq!(DomainError::ClassFull(id).category(), ErrorCategory::Conflict);
        assert_eq!(
            DomainError::DuplicateBooking {
                user_id: UserId::new(),
                class_instance_id: id,
            }
            .category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            DomainError::Store(StoreError::Database(sqlx::Error::PoolTimedOut)).category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn messages_carry_the_missing_identifier() {
        let id = ClassInstanceId::new();
        assert_eq!(
            DomainError::ClassInstanceNotFound(id).to_string(),
            format!("Class instance not found: {id}")
        );
        assert_eq!(
            DomainError::UserNotFound("ghost@example.com".into()).to_string(),
            "User not found: ghost@example.com"
        );
    }
}
