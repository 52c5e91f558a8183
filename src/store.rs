use async_trait::async_trait;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::sql_types::Integer;

use crate::error::StoreError;
use crate::model::{
    NewPerformanceRecord, NewReminder, PerformanceRecord, Reminder, StudyTopic,
    REMINDER_KIND_SPACED_REPETITION,
};
use crate::schema::{performance_records, reminders, study_topics};
use crate::DbPool;

/// Record-store seam consumed by the scheduler. Backed by diesel in
/// production; any store that can answer these queries will do.
#[async_trait]
pub trait SrsStore: Send + Sync {
    /// Topic lookup scoped to its owner. Returns `None` both when the topic
    /// does not exist and when it belongs to someone else.
    async fn find_topic(
        &self,
        owner_user_id: i32,
        topic_id: i32,
    ) -> Result<Option<StudyTopic>, StoreError>;

    /// Most recent performance record for a topic, tie-broken by insertion
    /// order.
    async fn latest_record(
        &self,
        owner_user_id: i32,
        topic_id: i32,
    ) -> Result<Option<PerformanceRecord>, StoreError>;

    /// Appends a new performance record and returns the stored row.
    async fn insert_record(
        &self,
        record: NewPerformanceRecord,
    ) -> Result<PerformanceRecord, StoreError>;

    /// Number of reviews of a topic recorded at or after `since`.
    async fn count_reviews_since(
        &self,
        owner_user_id: i32,
        topic_id: i32,
        since: NaiveDateTime,
    ) -> Result<i64, StoreError>;

    async fn insert_reminder(&self, reminder: NewReminder) -> Result<Reminder, StoreError>;

    /// Marks a reminder completed, scoped to its owner. Completing an
    /// already-completed or missing reminder is a no-op.
    async fn complete_reminder(
        &self,
        owner_user_id: i32,
        reminder_id: i32,
        at: NaiveDateTime,
    ) -> Result<(), StoreError>;

    /// Pending spaced-repetition reminders due at `now`, oldest first.
    async fn due_reminders(
        &self,
        owner_user_id: i32,
        now: NaiveDateTime,
        limit: i64,
    ) -> Result<Vec<Reminder>, StoreError>;

    async fn count_due_reminders(
        &self,
        owner_user_id: i32,
        now: NaiveDateTime,
    ) -> Result<i64, StoreError>;

    /// Quality ratings across every record the user owns.
    async fn quality_ratings(&self, owner_user_id: i32) -> Result<Vec<i32>, StoreError>;

    async fn count_topics(&self, owner_user_id: i32) -> Result<i64, StoreError>;
}

/// Diesel-backed store over the shared connection pool.
pub struct DieselStore {
    pool: DbPool,
}

impl DieselStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<PooledConnection<ConnectionManager<SqliteConnection>>, StoreError> {
        Ok(self.pool.get()?)
    }
}

#[async_trait]
impl SrsStore for DieselStore {
    async fn find_topic(
        &self,
        owner_user_id: i32,
        topic_id: i32,
    ) -> Result<Option<StudyTopic>, StoreError> {
        let mut conn = self.conn()?;
        let topic = study_topics::table
            .filter(study_topics::topic_id.eq(topic_id))
            .filter(study_topics::owner_user_id.eq(owner_user_id))
            .select(StudyTopic::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(topic)
    }

    async fn latest_record(
        &self,
        owner_user_id: i32,
        topic_id: i32,
    ) -> Result<Option<PerformanceRecord>, StoreError> {
        let mut conn = self.conn()?;
        let record = performance_records::table
            .filter(performance_records::owner_user_id.eq(owner_user_id))
            .filter(performance_records::topic_id.eq(topic_id))
            .order_by(performance_records::reviewed_at.desc())
            .then_order_by(performance_records::record_id.desc())
            .select(PerformanceRecord::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(record)
    }

    async fn insert_record(
        &self,
        record: NewPerformanceRecord,
    ) -> Result<PerformanceRecord, StoreError> {
        let mut conn = self.conn()?;

        diesel::insert_into(performance_records::table)
            .values(&record)
            .execute(&mut conn)?;

        let record_id = diesel::select(diesel::dsl::sql::<Integer>("last_insert_rowid()"))
            .get_result::<i32>(&mut conn)?;

        let stored = performance_records::table
            .find(record_id)
            .select(PerformanceRecord::as_select())
            .first(&mut conn)?;
        Ok(stored)
    }

    async fn count_reviews_since(
        &self,
        owner_user_id: i32,
        topic_id: i32,
        since: NaiveDateTime,
    ) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        let count = performance_records::table
            .filter(performance_records::owner_user_id.eq(owner_user_id))
            .filter(performance_records::topic_id.eq(topic_id))
            .filter(performance_records::reviewed_at.ge(since))
            .count()
            .get_result::<i64>(&mut conn)?;
        Ok(count)
    }

    async fn insert_reminder(&self, reminder: NewReminder) -> Result<Reminder, StoreError> {
        let mut conn = self.conn()?;

        diesel::insert_into(reminders::table)
            .values(&reminder)
            .execute(&mut conn)?;

        let reminder_id = diesel::select(diesel::dsl::sql::<Integer>("last_insert_rowid()"))
            .get_result::<i32>(&mut conn)?;

        let stored = reminders::table
            .find(reminder_id)
            .select(Reminder::as_select())
            .first(&mut conn)?;
        Ok(stored)
    }

    async fn complete_reminder(
        &self,
        owner_user_id: i32,
        reminder_id: i32,
        at: NaiveDateTime,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn()?;

        // The completed filter makes repeated completion a no-op and keeps
        // the original completed_at.
        diesel::update(
            reminders::table
                .filter(reminders::reminder_id.eq(reminder_id))
                .filter(reminders::owner_user_id.eq(owner_user_id))
                .filter(reminders::completed.eq(false)),
        )
        .set((
            reminders::completed.eq(true),
            reminders::completed_at.eq(Some(at)),
        ))
        .execute(&mut conn)?;

        Ok(())
    }

    async fn due_reminders(
        &self,
        owner_user_id: i32,
        now: NaiveDateTime,
        limit: i64,
    ) -> Result<Vec<Reminder>, StoreError> {
        let mut conn = self.conn()?;
        let due = reminders::table
            .filter(reminders::owner_user_id.eq(owner_user_id))
            .filter(reminders::kind.eq(REMINDER_KIND_SPACED_REPETITION))
            .filter(reminders::completed.eq(false))
            .filter(reminders::scheduled_at.le(now))
            .order_by(reminders::scheduled_at.asc())
            .limit(limit)
            .select(Reminder::as_select())
            .load(&mut conn)?;
        Ok(due)
    }

    async fn count_due_reminders(
        &self,
        owner_user_id: i32,
        now: NaiveDateTime,
    ) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        let count = reminders::table
            .filter(reminders::owner_user_id.eq(owner_user_id))
            .filter(reminders::kind.eq(REMINDER_KIND_SPACED_REPETITION))
            .filter(reminders::completed.eq(false))
            .filter(reminders::scheduled_at.le(now))
            .count()
            .get_result::<i64>(&mut conn)?;
        Ok(count)
    }

    async fn quality_ratings(&self, owner_user_id: i32) -> Result<Vec<i32>, StoreError> {
        let mut conn = self.conn()?;
        let ratings = performance_records::table
            .filter(performance_records::owner_user_id.eq(owner_user_id))
            .select(performance_records::quality_rating)
            .load::<i32>(&mut conn)?;
        Ok(ratings)
    }

    async fn count_topics(&self, owner_user_id: i32) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        let count = study_topics::table
            .filter(study_topics::owner_user_id.eq(owner_user_id))
            .count()
            .get_result::<i64>(&mut conn)?;
        Ok(count)
    }
}
