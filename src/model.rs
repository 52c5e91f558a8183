use chrono::NaiveDateTime;
use diesel::{Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};

use crate::schema::{performance_records, reminders, study_topics};

/// Reminder kind emitted when a review schedules the next one.
pub const REMINDER_KIND_SPACED_REPETITION: &str = "spaced-repetition";

/// A unit of study material a user wants to retain. Created and deleted by
/// the topic handlers; the scheduler only ever reads it.
#[derive(Debug, Clone, Serialize, Queryable, Selectable)]
#[diesel(table_name = study_topics)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StudyTopic {
    pub topic_id: i32,
    pub owner_user_id: i32,
    pub title: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = study_topics)]
pub struct NewStudyTopic<'a> {
    pub owner_user_id: i32,
    pub title: &'a str,
    pub created_at: NaiveDateTime,
}

/// One immutable row per review event. The chronologically most recent row
/// for a topic carries the state that seeds the next calculation.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = performance_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PerformanceRecord {
    pub record_id: i32,
    pub owner_user_id: i32,
    pub topic_id: i32,
    pub triggering_reminder_id: Option<i32>,
    pub reviewed_at: NaiveDateTime,
    pub quality_rating: i32,          // 0 = total blackout, 5 = effortless recall
    pub response_time_seconds: Option<i32>,
    pub ease_factor: f64,             // never below 1.3
    pub interval_days: i32,           // interval that was active going into this review
    pub next_interval_days: i32,      // interval computed by this review
    pub repetition_number: i32,       // previous record's value plus one
}

#[derive(Debug, Insertable)]
#[diesel(table_name = performance_records)]
pub struct NewPerformanceRecord {
    pub owner_user_id: i32,
    pub topic_id: i32,
    pub triggering_reminder_id: Option<i32>,
    pub reviewed_at: NaiveDateTime,
    pub quality_rating: i32,
    pub response_time_seconds: Option<i32>,
    pub ease_factor: f64,
    pub interval_days: i32,
    pub next_interval_days: i32,
    pub repetition_number: i32,
}

/// A scheduled notification-worthy event. The external delivery subsystem
/// reads pending rows and composes the user-facing message from `context`.
#[derive(Debug, Clone, Serialize, Queryable, Selectable)]
#[diesel(table_name = reminders)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Reminder {
    pub reminder_id: i32,
    pub owner_user_id: i32,
    pub topic_id: i32,
    pub scheduled_at: NaiveDateTime,
    pub kind: String,
    pub context: Option<String>,      // JSON blob: topic id and title
    pub completed: bool,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = reminders)]
pub struct NewReminder {
    pub owner_user_id: i32,
    pub topic_id: i32,
    pub scheduled_at: NaiveDateTime,
    pub kind: String,
    pub context: Option<String>,
    pub completed: bool,
    pub completed_at: Option<NaiveDateTime>,
}

/// Aggregate view over a user's whole review history.
#[derive(Debug, Serialize)]
pub struct StatisticsSummary {
    pub total_topics: i64,
    pub total_reviews: i64,
    pub average_quality: f64,
    pub due_count: i64,
    pub quality_distribution: [i64; 6],
}
