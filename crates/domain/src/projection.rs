//! Read-side views returned by `ClassService`.

use booking_store::ScheduledClass;
use common::{ClassInstanceId, DanceLevel, DanceStyle};
use serde::Serialize;

/// Display format for the class date.
const DATE_FORMAT: &str = "%d/%m/%Y";
/// Display format for the class start time.
const TIME_FORMAT: &str = "%H:%M";

/// Summary of a single class instance for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDetails {
    pub id: ClassInstanceId,
    #[serde(rename = "type")]
    pub style: DanceStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<DanceLevel>,
    /// Start date as `dd/MM/yyyy` (UTC).
    pub date: String,
    /// Start time as `HH:mm` (UTC).
    pub start_time: String,
    pub max_spots: i32,
    /// Never negative, even for an overbooked class.
    pub spots_remaining: i32,
}

impl From<&ScheduledClass> for ClassDetails {
    fn from(class: &ScheduledClass) -> Self {
        Self {
            id: class.id(),
            style: class.definition.style,
            level: class.definition.level,
            date: class.instance.start_time.format(DATE_FORMAT).to_string(),
            start_time: class.instance.start_time.format(TIME_FORMAT).to_string(),
            max_spots: class.max_spots(),
            spots_remaining: class.spots_remaining(),
        }
    }
}

/// Result of a class search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub classes: Vec<ScheduledClass>,
    pub count: usize,
}

impl SearchResult {
    pub fn new(classes: Vec<ScheduledClass>) -> Self {
        Self {
            count: classes.len(),
            classes,
        }
    }
}
