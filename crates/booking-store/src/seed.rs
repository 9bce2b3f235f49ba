//! Demo studio data: students, instructors, class definitions and one
//! week of scheduled classes.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use common::{ClassDefinitionId, ClassInstanceId, DanceLevel, DanceStyle, UserId};
use uuid::Uuid;

use crate::{ClassDefinition, ClassInstance, User};

const STUDENTS: [(&str, &str); 2] = [
    ("alpha@example.com", "Alpha User"),
    ("beta@example.com", "Beta User"),
];

const INSTRUCTORS: [(&str, &str, DanceStyle); 3] = [
    ("gamma@example.com", "Salsa Instructor", DanceStyle::Salsa),
    ("delta@example.com", "Bachata Instructor", DanceStyle::Bachata),
    ("epsilon@example.com", "Reggaeton Instructor", DanceStyle::Reggaeton),
];

const CLASSES: [(&str, DanceStyle, DanceLevel); 6] = [
    ("Bachata 1", DanceStyle::Bachata, DanceLevel::Level1),
    ("Bachata 2", DanceStyle::Bachata, DanceLevel::Level2),
    ("Salsa 1", DanceStyle::Salsa, DanceLevel::Level1),
    ("Salsa 2", DanceStyle::Salsa, DanceLevel::Level2),
    ("Salsa 3", DanceStyle::Salsa, DanceLevel::Level3),
    ("Reggaeton", DanceStyle::Reggaeton, DanceLevel::Open),
];

/// (days after Monday, hour, minute, class title)
const WEEKLY_TIMETABLE: [(i64, u32, u32, &str); 13] = [
    (0, 18, 30, "Bachata 1"),
    (0, 19, 30, "Bachata 2"),
    (0, 20, 30, "Salsa 3"),
    (1, 18, 30, "Salsa 1"),
    (1, 19, 30, "Salsa 2"),
    (1, 20, 30, "Reggaeton"),
    (2, 18, 30, "Bachata 1"),
    (2, 19, 30, "Bachata 2"),
    (2, 20, 30, "Salsa 3"),
    (3, 18, 30, "Salsa 1"),
    (3, 19, 30, "Salsa 2"),
    (4, 18, 30, "Reggaeton"),
    (4, 19, 30, "Salsa 3"),
];

/// Namespace for the name-based IDs of demo rows.
const SEED_NAMESPACE: Uuid = Uuid::from_u128(0x5c1e_d0a7_3b4f_4d2e_9a61_0c8b_7f2e_d415);

/// Stable ID for a demo row, so loading the demo twice yields the same rows.
fn seed_id(name: &str) -> Uuid {
    Uuid::new_v5(&SEED_NAMESPACE, name.as_bytes())
}

fn seed_user(user: User) -> User {
    User {
        id: UserId::from_uuid(seed_id(&format!("user:{}", user.email))),
        ..user
    }
}

/// Rows to load into a fresh store.
#[derive(Debug, Clone, Default)]
pub struct SeedData {
    pub users: Vec<User>,
    pub definitions: Vec<ClassDefinition>,
    pub instances: Vec<ClassInstance>,
}

impl SeedData {
    /// Demo data scheduled for the week containing `now`.
    ///
    /// Row IDs are derived from emails, titles and start times, so two calls
    /// for the same week produce identical IDs.
    pub fn demo(now: DateTime<Utc>) -> Self {
        let monday = week_start(now.date_naive());

        let mut users: Vec<User> = STUDENTS
            .iter()
            .map(|(email, name)| seed_user(User::student(*email, *name)))
            .collect();

        let instructors: Vec<(User, DanceStyle)> = INSTRUCTORS
            .iter()
            .map(|(email, name, style)| (seed_user(User::instructor(*email, *name)), *style))
            .collect();

        let definitions: Vec<ClassDefinition> = CLASSES
            .iter()
            .map(|(title, style, level)| {
                let definition = ClassDefinition {
                    id: ClassDefinitionId::from_uuid(seed_id(&format!("definition:{title}"))),
                    ..ClassDefinition::new(*title, *style).level(*level)
                };
                match instructors.iter().find(|(_, s)| s == style) {
                    Some((instructor, _)) => definition.instructor(instructor.id),
                    None => definition,
                }
            })
            .collect();

        let instances = WEEKLY_TIMETABLE
            .iter()
            .filter_map(|(day, hour, minute, title)| {
                let definition = definitions.iter().find(|d| d.title == *title)?;
                let start = (monday + Duration::days(*day))
                    .and_hms_opt(*hour, *minute, 0)?
                    .and_utc();
                let id = seed_id(&format!("instance:{title}:{}", start.to_rfc3339()));
                Some(ClassInstance {
                    id: ClassInstanceId::from_uuid(id),
                    ..ClassInstance::schedule(definition, start)
                })
            })
            .collect();

        users.extend(instructors.into_iter().map(|(user, _)| user));

        Self {
            users,
            definitions,
            instances,
        }
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}
