//! Storage access layer for the dance class booking system.
//!
//! One repository trait per entity, an in-memory implementation used by
//! tests and local runs, and a PostgreSQL implementation built on `sqlx`.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod query;
pub mod seed;
pub mod store;

pub use common::{
    BookingId, BookingStatus, ClassDefinitionId, ClassInstanceId, DanceLevel, DanceStyle, UserId,
    UserRole,
};
pub use error::{Result, StoreError};
pub use memory::InMemoryBookingStore;
pub use model::{
    Booking, BookingWithRelations, BookingWrite, ClassDefinition, ClassInstance, NewBooking, ScheduledClass,
    User, UserSummary,
};
pub use postgres::PostgresBookingStore;
pub use query::ClassQuery;
pub use seed::SeedData;
pub use store::{BookingRepository, ClassInstanceRepository, UserRepository};
