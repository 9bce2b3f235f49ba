//! Records returned by the storage layer.
//!
//! Field names serialise in camelCase, which is the JSON shape the HTTP
//! layer returns for search results and bookings.

use chrono::{DateTime, Duration, Utc};
use common::{
    BookingId, BookingStatus, ClassDefinitionId, ClassInstanceId, DanceLevel, DanceStyle, UserId,
    UserRole,
};
use serde::{Deserialize, Serialize, Serializer};

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Creates a new user with a fresh ID and the current timestamp.
    pub fn new(email: impl Into<String>, name: impl Into<String>, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            email: email.into(),
            name: name.into(),
            role,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a new student.
    pub fn student(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(email, name, UserRole::Student)
    }

    /// Creates a new instructor.
    pub fn instructor(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(email, name, UserRole::Instructor)
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// The public subset of a user embedded in other records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

/// A recurring class template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDefinition {
    pub id: ClassDefinitionId,
    pub title: String,
    pub description: Option<String>,
    pub style: DanceStyle,
    pub level: Option<DanceLevel>,
    pub max_spots: i32,
    pub duration_min: i32,
    pub instructor_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClassDefinition {
    /// Default capacity of a class.
    pub const DEFAULT_MAX_SPOTS: i32 = 20;
    /// Default class length in minutes.
    pub const DEFAULT_DURATION_MIN: i32 = 60;

    /// Creates a definition with default capacity and duration.
    pub fn new(title: impl Into<String>, style: DanceStyle) -> Self {
        let now = Utc::now();
        Self {
            id: ClassDefinitionId::new(),
            title: title.into(),
            description: None,
            style,
            level: None,
            max_spots: Self::DEFAULT_MAX_SPOTS,
            duration_min: Self::DEFAULT_DURATION_MIN,
            instructor_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn level(mut self, level: DanceLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn max_spots(mut self, max_spots: i32) -> Self {
        self.max_spots = max_spots;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn instructor(mut self, instructor_id: UserId) -> Self {
        self.instructor_id = Some(instructor_id);
        self
    }
}

/// One scheduled occurrence of a class definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInstance {
    pub id: ClassInstanceId,
    pub definition_id: ClassDefinitionId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub booked_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClassInstance {
    /// Schedules an occurrence of `definition` starting at `start_time`.
    ///
    /// The end time is derived from the definition's duration.
    pub fn schedule(definition: &ClassDefinition, start_time: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: ClassInstanceId::new(),
            definition_id: definition.id,
            start_time,
            end_time: start_time + Duration::minutes(i64::from(definition.duration_min)),
            booked_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn booked_count(mut self, booked_count: i32) -> Self {
        self.booked_count = booked_count;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }
}

/// A class instance together with its definition and instructor.
///
/// Serialises as the instance fields plus `definition`, with the instructor
/// nested under `definition.instructor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledClass {
    pub instance: ClassInstance,
    pub definition: ClassDefinition,
    pub instructor: Option<UserSummary>,
}

#[derive(Serialize)]
struct DefinitionWithInstructor<'a> {
    #[serde(flatten)]
    definition: &'a ClassDefinition,
    instructor: Option<&'a UserSummary>,
}

#[derive(Serialize)]
struct ScheduledClassView<'a> {
    #[serde(flatten)]
    instance: &'a ClassInstance,
    definition: DefinitionWithInstructor<'a>,
}

impl Serialize for ScheduledClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ScheduledClassView {
            instance: &self.instance,
            definition: DefinitionWithInstructor {
                definition: &self.definition,
                instructor: self.instructor.as_ref(),
            },
        }
        .serialize(serializer)
    }
}

impl ScheduledClass {
    pub fn id(&self) -> ClassInstanceId {
        self.instance.id
    }

    pub fn max_spots(&self) -> i32 {
        self.definition.max_spots
    }

    pub fn booked_count(&self) -> i32 {
        self.instance.booked_count
    }

    /// Returns true once the booked count has reached capacity.
    pub fn is_full(&self) -> bool {
        self.booked_count() >= self.max_spots()
    }

    /// Remaining capacity, clamped at zero when the class is overbooked.
    pub fn spots_remaining(&self) -> i32 {
        (self.max_spots() - self.booked_count()).max(0)
    }
}

/// A user's seat in a class instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: BookingId,
    pub user_id: UserId,
    pub class_instance_id: ClassInstanceId,
    pub status: BookingStatus,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A booking with its user and class instance loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingWithRelations {
    #[serde(flatten)]
    pub booking: Booking,
    pub user: UserSummary,
    pub class_instance: ScheduledClass,
}

impl BookingWithRelations {
    pub fn id(&self) -> BookingId {
        self.booking.id
    }
}

/// Result of `BookingRepository::create_booking_atomic`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingWrite {
    /// A new row was inserted and the booked count incremented.
    Inserted(BookingWithRelations),
    /// A booking with the same key or (user, class) pair already existed;
    /// nothing was written.
    Existing(BookingWithRelations),
}

impl BookingWrite {
    pub fn is_inserted(&self) -> bool {
        matches!(self, BookingWrite::Inserted(_))
    }

    pub fn booking(&self) -> &BookingWithRelations {
        match self {
            BookingWrite::Inserted(booking) | BookingWrite::Existing(booking) => booking,
        }
    }

    pub fn into_booking(self) -> BookingWithRelations {
        match self {
            BookingWrite::Inserted(booking) | BookingWrite::Existing(booking) => booking,
        }
    }
}

/// Input to `BookingRepository::create_booking_atomic`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub user_id: UserId,
    pub class_instance_id: ClassInstanceId,
    pub idempotency_key: String,
    /// Email of the booking user, used by the in-transaction duplicate check.
    pub email: String,
    pub status: BookingStatus,
}

impl NewBooking {
    /// Creates a confirmed booking request.
    pub fn new(
        user_id: UserId,
        class_instance_id: ClassInstanceId,
        idempotency_key: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            class_instance_id,
            idempotency_key: idempotency_key.into(),
            email: email.into(),
            status: BookingStatus::Confirmed,
        }
    }

    pub fn with_status(mut self, status: BookingStatus) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduled(max_spots: i32, booked_count: i32) -> ScheduledClass {
        let definition = ClassDefinition::new("Salsa 1", DanceStyle::Salsa).max_spots(max_spots);
        let instance = ClassInstance::schedule(&definition, Utc::now()).booked_count(booked_count);
        ScheduledClass {
            instance,
            definition,
            instructor: None,
        }
    }

    #[test]
    fn spots_remaining_clamps_at_zero() {
        assert_eq!(scheduled(20, 5).spots_remaining(), 15);
        assert_eq!(scheduled(20, 20).spots_remaining(), 0);
        assert_eq!(scheduled(20, 25).spots_remaining(), 0);
    }

    #[test]
    fn is_full_at_or_over_capacity() {
        assert!(!scheduled(2, 1).is_full());
        assert!(scheduled(2, 2).is_full());
        assert!(scheduled(2, 3).is_full());
    }

    #[test]
    fn schedule_derives_end_time_from_duration() {
        let definition = ClassDefinition::new("Bachata 1", DanceStyle::Bachata);
        let start = Utc::now();
        let instance = ClassInstance::schedule(&definition, start);
        assert_eq!(instance.end_time - instance.start_time, Duration::minutes(60));
        assert_eq!(instance.booked_count, 0);
    }

    #[test]
    fn scheduled_class_serializes_flat_camel_case() {
        let class = scheduled(10, 3);
        let json = serde_json::to_value(&class).unwrap();
        assert_eq!(json["bookedCount"], 3);
        assert_eq!(json["definition"]["maxSpots"], 10);
        assert_eq!(json["definition"]["style"], "SALSA");
        assert!(json["definition"]["instructor"].is_null());
        assert!(json.get("instructor").is_none());
    }

    #[test]
    fn instructor_is_nested_under_definition() {
        let instructor = User::instructor("gamma@example.com", "Salsa Instructor");
        let mut class = scheduled(10, 0);
        class.definition.instructor_id = Some(instructor.id);
        class.instructor = Some(instructor.summary());

        let json = serde_json::to_value(&class).unwrap();
        assert_eq!(json["definition"]["instructor"]["id"], instructor.id.to_string());
        assert_eq!(json["definition"]["instructor"]["name"], "Salsa Instructor");
        assert_eq!(json["definition"]["instructorId"], instructor.id.to_string());
        assert_eq!(json["id"], class.id().to_string());
    }

    #[test]
    fn new_booking_defaults_to_confirmed() {
        let booking = NewBooking::new(UserId::new(), ClassInstanceId::new(), "k1", "a@b.com");
        assert_eq!(booking.status, BookingStatus::Confirmed);
        let cancelled = booking.with_status(BookingStatus::Cancelled);
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
    }
}
