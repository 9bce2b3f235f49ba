//! Class service providing search, detail and booking operations.

use std::time::Instant;

use booking_store::{
    BookingRepository, BookingWithRelations, BookingWrite, ClassInstanceRepository, NewBooking,
    StoreError, UserRepository,
};
use common::ClassInstanceId;

use crate::error::DomainError;
use crate::filter::StyleFilter;
use crate::projection::{ClassDetails, SearchResult};

/// Request to book a seat in a class instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookClass {
    pub email: String,
    pub class_instance_id: ClassInstanceId,
    /// Caller-supplied key; retries with the same key return the same booking.
    pub idempotency_key: String,
}

impl BookClass {
    pub fn new(
        email: impl Into<String>,
        class_instance_id: ClassInstanceId,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            class_instance_id,
            idempotency_key: idempotency_key.into(),
        }
    }
}

/// How a successful booking request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    /// Matched by idempotency key before writing.
    Replayed,
    /// A matching booking turned up inside the write, e.g. a concurrent
    /// request committed it first.
    Existing,
}

/// Service for searching and booking dance classes.
///
/// Holds no state of its own between calls. All coordination between
/// concurrent bookings is left to the repositories.
pub struct ClassService<C, U, B> {
    classes: C,
    users: U,
    bookings: B,
}

impl<C, U, B> ClassService<C, U, B>
where
    C: ClassInstanceRepository,
    U: UserRepository,
    B: BookingRepository,
{
    pub fn new(classes: C, users: U, bookings: B) -> Self {
        Self {
            classes,
            users,
            bookings,
        }
    }

    /// Lists class instances matching the filter, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn search_classes(&self, filter: StyleFilter) -> Result<SearchResult, DomainError> {
        let classes = self.classes.find_many(filter.to_query()).await?;
        tracing::debug!(count = classes.len(), "classes found");
        Ok(SearchResult::new(classes))
    }

    /// Returns the display projection of a single class instance.
    #[tracing::instrument(skip(self))]
    pub async fn get_class_by_id(&self, id: ClassInstanceId) -> Result<ClassDetails, DomainError> {
        let class = self
            .classes
            .find_by_id(id)
            .await?
            .ok_or(DomainError::ClassInstanceNotFound(id))?;
        Ok(ClassDetails::from(&class))
    }

    /// Books a seat for the user with the given email.
    ///
    /// Replaying a request with an idempotency key that already produced a
    /// booking returns that booking unchanged, even if the class has since
    /// filled up.
    #[tracing::instrument(
        skip(self, cmd),
        fields(
            email = %cmd.email,
            class_instance_id = %cmd.class_instance_id,
            idempotency_key = %cmd.idempotency_key,
        )
    )]
    pub async fn book_class(&self, cmd: BookClass) -> Result<BookingWithRelations, DomainError> {
        let start = Instant::now();
        let result = self.try_book(cmd).await;
        metrics::histogram!("booking_duration_seconds").record(start.elapsed().as_secs_f64());

        match result {
            Ok((booking, outcome)) => {
                match outcome {
                    Outcome::Created => {
                        metrics::counter!("bookings_created_total").increment(1);
                        tracing::info!(booking_id = %booking.id(), "booking created");
                    }
                    Outcome::Replayed | Outcome::Existing => {
                        metrics::counter!("bookings_replayed_total").increment(1);
                        tracing::info!(
                            booking_id = %booking.id(),
                            ?outcome,
                            "existing booking returned"
                        );
                    }
                }
                Ok(booking)
            }
            Err(e) => {
                metrics::counter!("bookings_rejected_total", "reason" => e.reason()).increment(1);
                tracing::warn!(error = %e, "booking rejected");
                Err(e)
            }
        }
    }

    async fn try_book(
        &self,
        cmd: BookClass,
    ) -> Result<(BookingWithRelations, Outcome), DomainError> {
        let class_instance_id = cmd.class_instance_id;

        // Both lookups always run, so a bad email is reported even when the
        // class is missing too.
        let (class, user) = tokio::try_join!(
            self.classes.find_by_id(class_instance_id),
            self.users.find_by_email(&cmd.email),
        )?;

        let class = class.ok_or(DomainError::ClassInstanceNotFound(class_instance_id))?;
        let user = user.ok_or_else(|| DomainError::UserNotFound(cmd.email.clone()))?;

        if let Some(existing) = self
            .bookings
            .find_by_idempotency_key(&cmd.idempotency_key)
            .await?
        {
            return Ok((existing, Outcome::Replayed));
        }

        if class.is_full() {
            return Err(DomainError::ClassFull(class_instance_id));
        }

        if self
            .bookings
            .find_by_user_and_class(user.id, class_instance_id)
            .await?
            .is_some()
        {
            return Err(DomainError::DuplicateBooking {
                user_id: user.id,
                class_instance_id,
            });
        }

        let new_booking = NewBooking::new(
            user.id,
            class_instance_id,
            cmd.idempotency_key,
            cmd.email,
        );
        let write = self
            .bookings
            .create_booking_atomic(new_booking)
            .await
            .map_err(|e| match e {
                StoreError::CapacityExhausted(id) => DomainError::ClassFull(id),
                StoreError::NotFound {
                    entity: "Class instance",
                    ..
                } => DomainError::ClassInstanceNotFound(class_instance_id),
                other => DomainError::Store(other),
            })?;

        Ok(match write {
            BookingWrite::Inserted(booking) => (booking, Outcome::Created),
            BookingWrite::Existing(booking) => (booking, Outcome::Existing),
        })
    }
}
