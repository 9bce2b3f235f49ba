use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{BookingId, ClassDefinitionId, ClassInstanceId, UserId};
use tokio::sync::RwLock;

use crate::{
    Booking, BookingWithRelations, BookingWrite, ClassDefinition, ClassInstance, ClassQuery,
    NewBooking, Result, ScheduledClass, SeedData, StoreError, User,
    store::{BookingRepository, ClassInstanceRepository, UserRepository},
};

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    definitions: HashMap<ClassDefinitionId, ClassDefinition>,
    instances: HashMap<ClassInstanceId, ClassInstance>,
    bookings: Vec<Booking>,
}

impl Tables {
    fn scheduled(&self, instance: &ClassInstance) -> Result<ScheduledClass> {
        let definition = self
            .definitions
            .get(&instance.definition_id)
            .ok_or_else(|| StoreError::not_found("Class definition", instance.definition_id))?;
        let instructor = definition
            .instructor_id
            .and_then(|id| self.users.get(&id))
            .map(User::summary);

        Ok(ScheduledClass {
            instance: instance.clone(),
            definition: definition.clone(),
            instructor,
        })
    }

    fn with_relations(&self, booking: &Booking) -> Result<BookingWithRelations> {
        let user = self
            .users
            .get(&booking.user_id)
            .ok_or_else(|| StoreError::not_found("User", booking.user_id))?;
        let instance = self
            .instances
            .get(&booking.class_instance_id)
            .ok_or_else(|| StoreError::not_found("Class instance", booking.class_instance_id))?;

        Ok(BookingWithRelations {
            booking: booking.clone(),
            user: user.summary(),
            class_instance: self.scheduled(instance)?,
        })
    }

    fn email_of(&self, user_id: UserId) -> Option<&str> {
        self.users.get(&user_id).map(|u| u.email.as_str())
    }

    /// Booking matching the key, or failing that the (email, class) pair.
    fn matching_booking(&self, new_booking: &NewBooking) -> Option<&Booking> {
        self.bookings
            .iter()
            .find(|b| b.idempotency_key == new_booking.idempotency_key)
            .or_else(|| {
                self.bookings.iter().find(|b| {
                    b.class_instance_id == new_booking.class_instance_id
                        && self.email_of(b.user_id) == Some(new_booking.email.as_str())
                })
            })
    }
}

/// In-memory booking store for tests and local runs.
///
/// Every table lives behind one lock, so `create_booking_atomic` holds the
/// write lock for its whole read-check-write sequence. Uniqueness of
/// (user, class instance) and of the idempotency key is enforced the same
/// way the PostgreSQL schema enforces it.
#[derive(Clone, Default)]
pub struct InMemoryBookingStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryBookingStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with seed data.
    pub async fn with_seed(seed: &SeedData) -> Self {
        let store = Self::new();
        store.seed(seed).await;
        store
    }

    /// Loads seed data, replacing rows with the same IDs.
    pub async fn seed(&self, seed: &SeedData) {
        for user in &seed.users {
            self.insert_user(user.clone()).await;
        }
        for definition in &seed.definitions {
            self.insert_class_definition(definition.clone()).await;
        }
        for instance in &seed.instances {
            self.insert_class_instance(instance.clone()).await;
        }
    }

    pub async fn insert_user(&self, user: User) {
        self.tables.write().await.users.insert(user.id, user);
    }

    pub async fn insert_class_definition(&self, definition: ClassDefinition) {
        self.tables
            .write()
            .await
            .definitions
            .insert(definition.id, definition);
    }

    pub async fn insert_class_instance(&self, instance: ClassInstance) {
        self.tables
            .write()
            .await
            .instances
            .insert(instance.id, instance);
    }

    /// Overwrites an instance's booked count, e.g. to simulate an overbooked class.
    pub async fn set_booked_count(&self, id: ClassInstanceId, booked_count: i32) -> Result<()> {
        let mut tables = self.tables.write().await;
        let instance = tables
            .instances
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Class instance", id))?;
        instance.booked_count = booked_count;
        Ok(())
    }

    /// Returns the current booked count of an instance.
    pub async fn booked_count(&self, id: ClassInstanceId) -> Option<i32> {
        self.tables
            .read()
            .await
            .instances
            .get(&id)
            .map(|i| i.booked_count)
    }

    /// Returns the total number of bookings stored.
    pub async fn booking_count(&self) -> usize {
        self.tables.read().await.bookings.len()
    }

    /// Deletes every booking and resets all booked counts to zero.
    pub async fn clear_bookings(&self) {
        let mut tables = self.tables.write().await;
        tables.bookings.clear();
        for instance in tables.instances.values_mut() {
            instance.booked_count = 0;
        }
    }
}

#[async_trait]
impl UserRepository for InMemoryBookingStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }
}

#[async_trait]
impl ClassInstanceRepository for InMemoryBookingStore {
    async fn find_by_id(&self, id: ClassInstanceId) -> Result<Option<ScheduledClass>> {
        let tables = self.tables.read().await;
        tables
            .instances
            .get(&id)
            .map(|instance| tables.scheduled(instance))
            .transpose()
    }

    async fn find_many(&self, query: ClassQuery) -> Result<Vec<ScheduledClass>> {
        let tables = self.tables.read().await;
        let mut classes = tables
            .instances
            .values()
            .map(|instance| tables.scheduled(instance))
            .collect::<Result<Vec<_>>>()?;

        classes.retain(|class| query.matches(class.definition.style));

        // Newest first, ties broken by ID so the order is stable
        classes.sort_by(|a, b| {
            b.instance
                .created_at
                .cmp(&a.instance.created_at)
                .then(b.instance.id.cmp(&a.instance.id))
        });

        Ok(classes)
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingStore {
    async fn find_by_user_and_class(
        &self,
        user_id: UserId,
        class_instance_id: ClassInstanceId,
    ) -> Result<Option<Booking>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bookings
            .iter()
            .find(|b| b.user_id == user_id && b.class_instance_id == class_instance_id)
            .cloned())
    }

    async fn find_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<BookingWithRelations>> {
        let tables = self.tables.read().await;
        tables
            .bookings
            .iter()
            .find(|b| b.idempotency_key == idempotency_key)
            .map(|b| tables.with_relations(b))
            .transpose()
    }

    async fn create_booking_atomic(
        &self,
        new_booking: NewBooking,
    ) -> Result<BookingWrite> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables.matching_booking(&new_booking) {
            return tables.with_relations(existing).map(BookingWrite::Existing);
        }

        if !tables.users.contains_key(&new_booking.user_id) {
            return Err(StoreError::not_found("User", new_booking.user_id));
        }

        // Unique (user_id, class_instance_id): the row that holds it wins
        if let Some(existing) = tables.bookings.iter().find(|b| {
            b.user_id == new_booking.user_id && b.class_instance_id == new_booking.class_instance_id
        }) {
            return tables.with_relations(existing).map(BookingWrite::Existing);
        }

        let instance = tables
            .instances
            .get(&new_booking.class_instance_id)
            .ok_or_else(|| StoreError::not_found("Class instance", new_booking.class_instance_id))?;
        let max_spots = tables
            .definitions
            .get(&instance.definition_id)
            .map(|d| d.max_spots)
            .ok_or_else(|| StoreError::not_found("Class definition", instance.definition_id))?;

        if instance.booked_count >= max_spots {
            return Err(StoreError::CapacityExhausted(new_booking.class_instance_id));
        }

        // All checks passed; nothing below can fail, so no partial writes
        let now = Utc::now();
        let booking = Booking {
            id: BookingId::new(),
            user_id: new_booking.user_id,
            class_instance_id: new_booking.class_instance_id,
            status: new_booking.status,
            idempotency_key: new_booking.idempotency_key,
            created_at: now,
            updated_at: now,
        };
        tables.bookings.push(booking.clone());

        if let Some(instance) = tables.instances.get_mut(&booking.class_instance_id) {
            instance.booked_count += 1;
            instance.updated_at = now;
        }

        tables.with_relations(&booking).map(BookingWrite::Inserted)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use common::{BookingStatus, DanceStyle};

    use super::*;

    struct Fixture {
        store: InMemoryBookingStore,
        student: User,
        class_id: ClassInstanceId,
    }

    async fn fixture(max_spots: i32) -> Fixture {
        let store = InMemoryBookingStore::new();
        let instructor = User::instructor("gamma@example.com", "Salsa Instructor");
        let student = User::student("alpha@example.com", "Alpha User");
        let definition = ClassDefinition::new("Salsa 1", DanceStyle::Salsa)
            .max_spots(max_spots)
            .instructor(instructor.id);
        let instance = ClassInstance::schedule(&definition, Utc::now());
        let class_id = instance.id;

        store.insert_user(instructor).await;
        store.insert_user(student.clone()).await;
        store.insert_class_definition(definition).await;
        store.insert_class_instance(instance).await;

        Fixture {
            store,
            student,
            class_id,
        }
    }

    fn request(f: &Fixture, key: &str) -> NewBooking {
        NewBooking::new(f.student.id, f.class_id, key, f.student.email.clone())
    }

    #[tokio::test]
    async fn create_booking_increments_count() {
        let f = fixture(20).await;

        let write = f.store.create_booking_atomic(request(&f, "k1")).await.unwrap();
        assert!(write.is_inserted());
        let booking = write.into_booking();

        assert_eq!(booking.booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.user.id, f.student.id);
        assert_eq!(booking.class_instance.booked_count(), 1);
        assert_eq!(
            booking.class_instance.instructor.as_ref().map(|i| i.name.as_str()),
            Some("Salsa Instructor")
        );
        assert_eq!(f.store.booked_count(f.class_id).await, Some(1));
        assert_eq!(f.store.booking_count().await, 1);
    }

    #[tokio::test]
    async fn same_key_returns_existing_booking() {
        let f = fixture(20).await;

        let first = f.store.create_booking_atomic(request(&f, "k1")).await.unwrap();
        let second = f.store.create_booking_atomic(request(&f, "k1")).await.unwrap();

        assert!(first.is_inserted());
        assert!(matches!(second, BookingWrite::Existing(_)));
        assert_eq!(first.booking().id(), second.booking().id());
        assert_eq!(f.store.booked_count(f.class_id).await, Some(1));
        assert_eq!(f.store.booking_count().await, 1);
    }

    #[tokio::test]
    async fn same_user_and_class_returns_existing_booking() {
        let f = fixture(20).await;

        let first = f.store.create_booking_atomic(request(&f, "k1")).await.unwrap();
        let second = f.store.create_booking_atomic(request(&f, "k2")).await.unwrap();

        assert!(!second.is_inserted());
        assert_eq!(first.booking().id(), second.booking().id());
        assert_eq!(second.booking().booking.idempotency_key, "k1");
        assert_eq!(f.store.booked_count(f.class_id).await, Some(1));
    }

    #[tokio::test]
    async fn guarded_increment_rejects_full_class() {
        let f = fixture(1).await;
        f.store.set_booked_count(f.class_id, 1).await.unwrap();

        let result = f.store.create_booking_atomic(request(&f, "k1")).await;

        assert!(matches!(result, Err(StoreError::CapacityExhausted(id)) if id == f.class_id));
        assert_eq!(f.store.booking_count().await, 0);
        assert_eq!(f.store.booked_count(f.class_id).await, Some(1));
    }

    #[tokio::test]
    async fn missing_class_instance_is_not_found() {
        let f = fixture(20).await;
        let new_booking =
            NewBooking::new(f.student.id, ClassInstanceId::new(), "k1", f.student.email.clone());

        let result = f.store.create_booking_atomic(new_booking).await;

        assert!(matches!(
            result,
            Err(StoreError::NotFound {
                entity: "Class instance",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn concurrent_bookings_never_exceed_capacity() {
        let f = fixture(3).await;
        let mut handles = Vec::new();
        for i in 0..10 {
            let user = User::student(format!("user{i}@example.com"), format!("User {i}"));
            f.store.insert_user(user.clone()).await;
            let store = f.store.clone();
            let new_booking = NewBooking::new(user.id, f.class_id, format!("key-{i}"), user.email);
            handles.push(tokio::spawn(async move {
                store.create_booking_atomic(new_booking).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(write) => {
                    assert!(write.is_inserted());
                    succeeded += 1;
                }
                Err(StoreError::CapacityExhausted(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(succeeded, 3);
        assert_eq!(f.store.booked_count(f.class_id).await, Some(3));
    }

    #[tokio::test]
    async fn find_by_idempotency_key_loads_relations() {
        let f = fixture(20).await;
        f.store.create_booking_atomic(request(&f, "k1")).await.unwrap();

        let found = f.store.find_by_idempotency_key("k1").await.unwrap().unwrap();
        assert_eq!(found.user.email, f.student.email);
        assert_eq!(found.class_instance.id(), f.class_id);

        assert!(f.store.find_by_idempotency_key("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_by_user_and_class() {
        let f = fixture(20).await;
        assert!(
            f.store
                .find_by_user_and_class(f.student.id, f.class_id)
                .await
                .unwrap()
                .is_none()
        );

        f.store.create_booking_atomic(request(&f, "k1")).await.unwrap();

        let found = f
            .store
            .find_by_user_and_class(f.student.id, f.class_id)
            .await
            .unwrap();
        assert_eq!(found.map(|b| b.idempotency_key), Some("k1".to_string()));
    }

    #[tokio::test]
    async fn find_many_filters_and_orders_newest_first() {
        let store = InMemoryBookingStore::new();
        let salsa = ClassDefinition::new("Salsa 1", DanceStyle::Salsa);
        let bachata = ClassDefinition::new("Bachata 1", DanceStyle::Bachata);
        let base = Utc::now();

        let oldest = ClassInstance::schedule(&salsa, base).created_at(base - Duration::hours(2));
        let middle = ClassInstance::schedule(&bachata, base).created_at(base - Duration::hours(1));
        let newest = ClassInstance::schedule(&salsa, base).created_at(base);

        store.insert_class_definition(salsa).await;
        store.insert_class_definition(bachata).await;
        for instance in [oldest.clone(), middle.clone(), newest.clone()] {
            store.insert_class_instance(instance).await;
        }

        let all = store.find_many(ClassQuery::new()).await.unwrap();
        let ids: Vec<_> = all.iter().map(ScheduledClass::id).collect();
        assert_eq!(ids, vec![newest.id, middle.id, oldest.id]);

        let salsa_only = store
            .find_many(ClassQuery::for_style(DanceStyle::Salsa))
            .await
            .unwrap();
        let ids: Vec<_> = salsa_only.iter().map(ScheduledClass::id).collect();
        assert_eq!(ids, vec![newest.id, oldest.id]);
    }

    #[tokio::test]
    async fn find_by_email() {
        let f = fixture(20).await;
        let user = f.store.find_by_email("alpha@example.com").await.unwrap();
        assert_eq!(user.map(|u| u.id), Some(f.student.id));
        assert!(f.store.find_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_bookings_resets_counts() {
        let f = fixture(20).await;
        f.store.create_booking_atomic(request(&f, "k1")).await.unwrap();

        f.store.clear_bookings().await;

        assert_eq!(f.store.booking_count().await, 0);
        assert_eq!(f.store.booked_count(f.class_id).await, Some(0));
        let again = f.store.create_booking_atomic(request(&f, "k1")).await.unwrap();
        assert!(again.is_inserted());
        assert_eq!(again.booking().class_instance.booked_count(), 1);
    }
}
