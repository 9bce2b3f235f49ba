use std::collections::HashMap;

use async_trait::async_trait;
use common::{BookingId, ClassDefinitionId, ClassInstanceId, UserId};
use sqlx::{Executor, PgPool, Postgres, Row, postgres::PgPoolOptions, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Booking, BookingWithRelations, BookingWrite, ClassDefinition, ClassInstance, ClassQuery,
    NewBooking, Result, ScheduledClass, SeedData, StoreError, User, UserSummary,
    store::{BookingRepository, ClassInstanceRepository, UserRepository},
};

const UNIQUE_USER_CLASS: &str = "unique_user_class";
const UNIQUE_IDEMPOTENCY_KEY: &str = "unique_idempotency_key";
const FK_BOOKINGS_USER: &str = "fk_bookings_user";
const FK_BOOKINGS_CLASS_INSTANCE: &str = "fk_bookings_class_instance";

const CLASS_COLUMNS: &str = r#"
    ci.id AS instance_id, ci.definition_id, ci.start_time, ci.end_time, ci.booked_count,
    ci.created_at AS instance_created_at, ci.updated_at AS instance_updated_at,
    cd.title, cd.description, cd.style, cd.level, cd.max_spots, cd.duration_min, cd.instructor_id,
    cd.created_at AS definition_created_at, cd.updated_at AS definition_updated_at,
    inst.name AS instructor_name, inst.email AS instructor_email
"#;

/// Joins that hang a definition and instructor off `ci`.
const CLASS_JOINS: &str = r#"
    JOIN class_definitions cd ON cd.id = ci.definition_id
    LEFT JOIN users inst ON inst.id = cd.instructor_id
"#;

const BOOKING_COLUMNS: &str = r#"
    b.id AS booking_id, b.user_id, b.class_instance_id, b.status, b.idempotency_key,
    b.created_at AS booking_created_at, b.updated_at AS booking_updated_at
"#;

fn class_query(filter: &str) -> String {
    format!("SELECT {CLASS_COLUMNS} FROM class_instances ci {CLASS_JOINS} {filter}")
}

fn booking_with_relations_query(filter: &str) -> String {
    format!(
        r#"
        SELECT {BOOKING_COLUMNS}, bu.name AS user_name, bu.email AS user_email, {CLASS_COLUMNS}
        FROM bookings b
        JOIN users bu ON bu.id = b.user_id
        JOIN class_instances ci ON ci.id = b.class_instance_id
        {CLASS_JOINS}
        {filter}
        "#
    )
}

/// PostgreSQL-backed booking store.
///
/// Holds a connection pool supplied by the caller; cloning shares the pool.
#[derive(Clone)]
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    /// Creates a new store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn insert_user(&self, user: &User) -> Result<()> {
        insert_user(&self.pool, user).await
    }

    pub async fn insert_class_definition(&self, definition: &ClassDefinition) -> Result<()> {
        insert_class_definition(&self.pool, definition).await
    }

    pub async fn insert_class_instance(&self, instance: &ClassInstance) -> Result<()> {
        insert_class_instance(&self.pool, instance).await
    }

    /// Loads seed data in one transaction, skipping rows that already exist.
    ///
    /// A seed user whose email is already registered under another ID keeps
    /// the stored row, and definitions taught by that user point at it.
    #[tracing::instrument(skip_all, fields(instances = seed.instances.len()))]
    pub async fn seed(&self, seed: &SeedData) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let mut stored_ids = HashMap::new();
        for user in &seed.users {
            insert_user(&mut *tx, user).await?;
            let stored: Uuid = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
                .bind(&user.email)
                .fetch_one(&mut *tx)
                .await?;
            stored_ids.insert(user.id, UserId::from_uuid(stored));
        }
        for definition in &seed.definitions {
            let instructor_id = definition
                .instructor_id
                .map(|id| stored_ids.get(&id).copied().unwrap_or(id));
            let definition = ClassDefinition {
                instructor_id,
                ..definition.clone()
            };
            insert_class_definition(&mut *tx, &definition).await?;
        }
        for instance in &seed.instances {
            insert_class_instance(&mut *tx, instance).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    fn row_to_user(row: PgRow) -> Result<User> {
        Ok(User {
            id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            role: row.try_get::<String, _>("role")?.parse()?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_booking(row: &PgRow) -> Result<Booking> {
        Ok(Booking {
            id: BookingId::from_uuid(row.try_get::<Uuid, _>("booking_id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            class_instance_id: ClassInstanceId::from_uuid(
                row.try_get::<Uuid, _>("class_instance_id")?,
            ),
            status: row.try_get::<String, _>("status")?.parse()?,
            idempotency_key: row.try_get("idempotency_key")?,
            created_at: row.try_get("booking_created_at")?,
            updated_at: row.try_get("booking_updated_at")?,
        })
    }

    fn row_to_scheduled_class(row: &PgRow) -> Result<ScheduledClass> {
        let definition_id = ClassDefinitionId::from_uuid(row.try_get::<Uuid, _>("definition_id")?);
        let instructor_id = row
            .try_get::<Option<Uuid>, _>("instructor_id")?
            .map(UserId::from_uuid);
        let level = row
            .try_get::<Option<String>, _>("level")?
            .map(|level| level.parse())
            .transpose()?;

        let instructor = match (
            instructor_id,
            row.try_get::<Option<String>, _>("instructor_name")?,
            row.try_get::<Option<String>, _>("instructor_email")?,
        ) {
            (Some(id), Some(name), Some(email)) => Some(UserSummary { id, name, email }),
            _ => None,
        };

        Ok(ScheduledClass {
            instance: ClassInstance {
                id: ClassInstanceId::from_uuid(row.try_get::<Uuid, _>("instance_id")?),
                definition_id,
                start_time: row.try_get("start_time")?,
                end_time: row.try_get("end_time")?,
                booked_count: row.try_get("booked_count")?,
                created_at: row.try_get("instance_created_at")?,
                updated_at: row.try_get("instance_updated_at")?,
            },
            definition: ClassDefinition {
                id: definition_id,
                title: row.try_get("title")?,
                description: row.try_get("description")?,
                style: row.try_get::<String, _>("style")?.parse()?,
                level,
                max_spots: row.try_get("max_spots")?,
                duration_min: row.try_get("duration_min")?,
                instructor_id,
                created_at: row.try_get("definition_created_at")?,
                updated_at: row.try_get("definition_updated_at")?,
            },
            instructor,
        })
    }

    fn row_to_booking_with_relations(row: PgRow) -> Result<BookingWithRelations> {
        let booking = Self::row_to_booking(&row)?;
        let user = UserSummary {
            id: booking.user_id,
            name: row.try_get("user_name")?,
            email: row.try_get("user_email")?,
        };
        Ok(BookingWithRelations {
            booking,
            user,
            class_instance: Self::row_to_scheduled_class(&row)?,
        })
    }
}

async fn insert_user<'e, E>(executor: E, user: &User) -> Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO users (id, email, name, role, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(user.id.as_uuid())
    .bind(&user.email)
    .bind(&user.name)
    .bind(user.role.as_str())
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

async fn insert_class_definition<'e, E>(executor: E, definition: &ClassDefinition) -> Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO class_definitions
            (id, title, description, style, level, max_spots, duration_min, instructor_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(definition.id.as_uuid())
    .bind(&definition.title)
    .bind(&definition.description)
    .bind(definition.style.as_str())
    .bind(definition.level.map(|level| level.as_str()))
    .bind(definition.max_spots)
    .bind(definition.duration_min)
    .bind(definition.instructor_id.map(Uuid::from))
    .bind(definition.created_at)
    .bind(definition.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

async fn insert_class_instance<'e, E>(executor: E, instance: &ClassInstance) -> Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO class_instances
            (id, definition_id, start_time, end_time, booked_count, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(instance.id.as_uuid())
    .bind(instance.definition_id.as_uuid())
    .bind(instance.start_time)
    .bind(instance.end_time)
    .bind(instance.booked_count)
    .bind(instance.created_at)
    .bind(instance.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// ID of a booking holding the request's idempotency key or its
/// (user email, class instance) pair. A key match is preferred.
async fn find_matching_booking<'e, E>(executor: E, new_booking: &NewBooking) -> Result<Option<Uuid>>
where
    E: Executor<'e, Database = Postgres>,
{
    let id = sqlx::query_scalar(
        r#"
        SELECT b.id
        FROM bookings b
        JOIN users u ON u.id = b.user_id
        WHERE b.idempotency_key = $1
           OR (u.email = $2 AND b.class_instance_id = $3)
        ORDER BY (b.idempotency_key = $1) DESC
        LIMIT 1
        "#,
    )
    .bind(&new_booking.idempotency_key)
    .bind(&new_booking.email)
    .bind(new_booking.class_instance_id.as_uuid())
    .fetch_optional(executor)
    .await?;
    Ok(id)
}

async fn fetch_booking_with_relations<'e, E>(
    executor: E,
    booking_id: Uuid,
) -> Result<Option<BookingWithRelations>>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = booking_with_relations_query("WHERE b.id = $1");
    let row = sqlx::query(&sql)
        .bind(booking_id)
        .fetch_optional(executor)
        .await?;
    row.map(PostgresBookingStore::row_to_booking_with_relations)
        .transpose()
}

fn violated_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint().map(ToOwned::to_owned),
        _ => None,
    }
}

#[async_trait]
impl UserRepository for PostgresBookingStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, name, role, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_user).transpose()
    }
}

#[async_trait]
impl ClassInstanceRepository for PostgresBookingStore {
    async fn find_by_id(&self, id: ClassInstanceId) -> Result<Option<ScheduledClass>> {
        let sql = class_query("WHERE ci.id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_scheduled_class).transpose()
    }

    async fn find_many(&self, query: ClassQuery) -> Result<Vec<ScheduledClass>> {
        let sql = class_query(
            "WHERE ($1::text IS NULL OR cd.style = $1) ORDER BY ci.created_at DESC, ci.id DESC",
        );
        let rows = sqlx::query(&sql)
            .bind(query.style.map(|style| style.as_str()))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_scheduled_class).collect()
    }
}

#[async_trait]
impl BookingRepository for PostgresBookingStore {
    async fn find_by_user_and_class(
        &self,
        user_id: UserId,
        class_instance_id: ClassInstanceId,
    ) -> Result<Option<Booking>> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings b WHERE b.user_id = $1 AND b.class_instance_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .bind(class_instance_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_booking).transpose()
    }

    async fn find_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<BookingWithRelations>> {
        let sql = booking_with_relations_query("WHERE b.idempotency_key = $1");
        let row = sqlx::query(&sql)
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_booking_with_relations).transpose()
    }

    #[tracing::instrument(
        skip(self, new_booking),
        fields(
            user_id = %new_booking.user_id,
            class_instance_id = %new_booking.class_instance_id,
        )
    )]
    async fn create_booking_atomic(
        &self,
        new_booking: NewBooking,
    ) -> Result<BookingWrite> {
        let class_instance_id = new_booking.class_instance_id;
        let mut tx = self.pool.begin().await?;

        // Authoritative duplicate / replay check
        if let Some(existing_id) = find_matching_booking(&mut *tx, &new_booking).await? {
            tracing::debug!(booking_id = %existing_id, "matching booking found in transaction");
            let existing = fetch_booking_with_relations(&mut *tx, existing_id)
                .await?
                .ok_or_else(|| StoreError::not_found("Booking", existing_id))?;
            tx.commit().await?;
            return Ok(BookingWrite::Existing(existing));
        }

        let booking_id = BookingId::new();
        let inserted = sqlx::query(
            r#"
            INSERT INTO bookings (id, user_id, class_instance_id, status, idempotency_key)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(booking_id.as_uuid())
        .bind(new_booking.user_id.as_uuid())
        .bind(class_instance_id.as_uuid())
        .bind(new_booking.status.as_str())
        .bind(&new_booking.idempotency_key)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            return match violated_constraint(&e).as_deref() {
                // A concurrent transaction committed the same booking first
                Some(UNIQUE_USER_CLASS | UNIQUE_IDEMPOTENCY_KEY) => {
                    tx.rollback().await?;
                    tracing::debug!("lost insert race, returning winning booking");
                    match find_matching_booking(&self.pool, &new_booking).await? {
                        Some(existing_id) => fetch_booking_with_relations(&self.pool, existing_id)
                            .await?
                            .map(BookingWrite::Existing)
                            .ok_or_else(|| StoreError::not_found("Booking", existing_id)),
                        None => Err(StoreError::Database(e)),
                    }
                }
                Some(FK_BOOKINGS_CLASS_INSTANCE) => {
                    Err(StoreError::not_found("Class instance", class_instance_id))
                }
                Some(FK_BOOKINGS_USER) => {
                    Err(StoreError::not_found("User", new_booking.user_id))
                }
                _ => Err(StoreError::Database(e)),
            };
        }

        // Guarded increment: concurrent writers serialise on the instance row
        // and the capacity predicate is re-evaluated after each one commits.
        let incremented = sqlx::query(
            r#"
            UPDATE class_instances ci
            SET booked_count = ci.booked_count + 1, updated_at = NOW()
            FROM class_definitions cd
            WHERE ci.id = $1
              AND cd.id = ci.definition_id
              AND ci.booked_count < cd.max_spots
            "#,
        )
        .bind(class_instance_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        if incremented.rows_affected() == 0 {
            tx.rollback().await?;
            tracing::debug!("class instance full, booking rolled back");
            return Err(StoreError::CapacityExhausted(class_instance_id));
        }

        let booking = fetch_booking_with_relations(&mut *tx, booking_id.as_uuid())
            .await?
            .ok_or_else(|| StoreError::not_found("Booking", booking_id))?;

        tx.commit().await?;
        tracing::debug!(booking_id = %booking_id, "booking committed");
        Ok(BookingWrite::Inserted(booking))
    }
}
