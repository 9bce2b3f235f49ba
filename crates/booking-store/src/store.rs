use async_trait::async_trait;
use common::{ClassInstanceId, UserId};

use crate::{
    Booking, BookingWithRelations, BookingWrite, ClassQuery, NewBooking, Result, ScheduledClass,
    User,
};

/// Read access to registered users.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Finds a user by their unique email address.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
}

/// Read access to scheduled class instances.
///
/// Instances are always returned together with their definition and the
/// definition's instructor, if any.
#[async_trait]
pub trait ClassInstanceRepository: Send + Sync {
    /// Finds a class instance by ID.
    async fn find_by_id(&self, id: ClassInstanceId) -> Result<Option<ScheduledClass>>;

    /// Lists class instances matching a query, most recently created first.
    async fn find_many(&self, query: ClassQuery) -> Result<Vec<ScheduledClass>>;
}

/// Access to bookings, including the atomic booking write.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Finds the booking a user holds for a class instance, if any.
    async fn find_by_user_and_class(
        &self,
        user_id: UserId,
        class_instance_id: ClassInstanceId,
    ) -> Result<Option<Booking>>;

    /// Finds the booking created under an idempotency key, with relations.
    async fn find_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<BookingWithRelations>>;

    /// Creates a booking and increments the class instance's booked count
    /// as a single atomic unit.
    ///
    /// If a booking already exists for the same idempotency key, or for the
    /// same (user email, class instance) pair, that booking is returned as
    /// `BookingWrite::Existing` and nothing is written. A concurrent insert
    /// that loses the race on a uniqueness constraint is resolved the same way.
    ///
    /// The increment is guarded by the definition's capacity; a full class
    /// fails with `StoreError::CapacityExhausted` and nothing is written.
    async fn create_booking_atomic(&self, new_booking: NewBooking) -> Result<BookingWrite>;
}
