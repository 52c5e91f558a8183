use chrono::{Duration, NaiveDateTime};

use crate::clock::Clock;
use crate::cramming::{self, DEFAULT_CRAM_WINDOW_HOURS};
use crate::error::SrsError;
use crate::interval::{self, INITIAL_EASE_FACTOR};
use crate::model::{
    NewPerformanceRecord, NewReminder, PerformanceRecord, Reminder, StatisticsSummary, StudyTopic,
    REMINDER_KIND_SPACED_REPETITION,
};
use crate::store::SrsStore;

/// Upper bound on a single page of due reminders.
pub const DUE_PAGE_SIZE: i64 = 10;

/// Validated input for one grading of a study topic.
#[derive(Debug, Clone)]
pub struct RecordReview {
    pub topic_session_id: i32,
    pub quality_rating: i32,
    pub reminder_id: Option<i32>,
    pub response_time_seconds: Option<i32>,
    pub schedule_next: bool,
}

/// Orchestrates one "record a review" transaction: ownership check, prior
/// state load, cramming detection, interval calculation, record append, and
/// the best-effort reminder bookkeeping that follows.
///
/// Collaborators arrive through the constructor; the scheduler keeps no
/// global state of its own.
pub struct SrsScheduler<S, C> {
    store: S,
    clock: C,
}

impl<S: SrsStore, C: Clock> SrsScheduler<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// Records a graded review and returns the newly appended performance
    /// record.
    ///
    /// Everything up to and including the record insert must succeed;
    /// resolving the triggering reminder and scheduling the next one are
    /// best-effort and never fail the call.
    pub async fn record_review(
        &self,
        caller_user_id: i32,
        input: RecordReview,
    ) -> Result<PerformanceRecord, SrsError> {
        if input.topic_session_id <= 0 {
            return Err(SrsError::Validation(format!(
                "Malformed topic session id: {}",
                input.topic_session_id
            )));
        }
        if !(0..=5).contains(&input.quality_rating) {
            return Err(SrsError::Validation(format!(
                "Quality rating must be between 0 and 5, got {}",
                input.quality_rating
            )));
        }
        if let Some(seconds) = input.response_time_seconds {
            if seconds <= 0 {
                return Err(SrsError::Validation(format!(
                    "Response time must be positive, got {}",
                    seconds
                )));
            }
        }

        // Missing and foreign topics read the same to the caller.
        let topic = self
            .store
            .find_topic(caller_user_id, input.topic_session_id)
            .await?
            .ok_or(SrsError::NotFound)?;

        let now = self.clock.now();

        let last = self
            .store
            .latest_record(caller_user_id, topic.topic_id)
            .await?;

        let (current_interval_days, mut ease_factor, repetition_number) = match &last {
            Some(prev) => (
                prev.next_interval_days.max(1),
                prev.ease_factor,
                prev.repetition_number + 1,
            ),
            None => (1, INITIAL_EASE_FACTOR, 1),
        };

        let crammed = cramming::detect_cramming(
            &self.store,
            caller_user_id,
            topic.topic_id,
            now,
            DEFAULT_CRAM_WINDOW_HOURS,
        )
        .await;
        if crammed {
            ease_factor = cramming::penalized_ease(ease_factor);
        }

        let outcome = interval::compute_next_interval(
            input.quality_rating,
            current_interval_days,
            ease_factor,
            repetition_number,
        );

        let record = self
            .store
            .insert_record(NewPerformanceRecord {
                owner_user_id: caller_user_id,
                topic_id: topic.topic_id,
                triggering_reminder_id: input.reminder_id,
                reviewed_at: now,
                quality_rating: input.quality_rating,
                response_time_seconds: input.response_time_seconds,
                ease_factor: outcome.ease_factor,
                interval_days: current_interval_days,
                next_interval_days: outcome.next_interval_days,
                repetition_number,
            })
            .await?;

        let resolve = async {
            if let Some(reminder_id) = input.reminder_id {
                self.resolve_triggering_reminder(caller_user_id, reminder_id, now)
                    .await;
            }
        };
        let schedule = async {
            if input.schedule_next {
                self.schedule_next_reminder(&topic, outcome.next_interval_days, now)
                    .await;
            }
        };
        futures_util::join!(resolve, schedule);

        Ok(record)
    }

    /// Most recent performance record for an owned topic.
    pub async fn get_performance_history(
        &self,
        caller_user_id: i32,
        topic_session_id: i32,
    ) -> Result<PerformanceRecord, SrsError> {
        let topic = self
            .store
            .find_topic(caller_user_id, topic_session_id)
            .await?
            .ok_or(SrsError::NotFound)?;

        self.store
            .latest_record(caller_user_id, topic.topic_id)
            .await?
            .ok_or(SrsError::NotFound)
    }

    /// Pending spaced-repetition reminders due at `now`, oldest first, capped
    /// at one page.
    pub async fn get_due_reviews(
        &self,
        caller_user_id: i32,
        now: NaiveDateTime,
    ) -> Result<Vec<Reminder>, SrsError> {
        let due = self
            .store
            .due_reminders(caller_user_id, now, DUE_PAGE_SIZE)
            .await?;
        Ok(due)
    }

    /// Aggregates the caller's full review history. The due count is read
    /// live from the reminders table, never cached on the records.
    pub async fn get_statistics(&self, caller_user_id: i32) -> Result<StatisticsSummary, SrsError> {
        let now = self.clock.now();

        let total_topics = self.store.count_topics(caller_user_id).await?;
        let ratings = self.store.quality_ratings(caller_user_id).await?;
        let due_count = self.store.count_due_reminders(caller_user_id, now).await?;

        let total_reviews = ratings.len() as i64;
        let mut quality_distribution = [0i64; 6];
        for rating in &ratings {
            quality_distribution[(*rating).clamp(0, 5) as usize] += 1;
        }
        let average_quality = if ratings.is_empty() {
            0.0
        } else {
            ratings.iter().map(|r| f64::from(*r)).sum::<f64>() / ratings.len() as f64
        };

        Ok(StatisticsSummary {
            total_topics,
            total_reviews,
            average_quality,
            due_count,
            quality_distribution,
        })
    }

    async fn resolve_triggering_reminder(
        &self,
        caller_user_id: i32,
        reminder_id: i32,
        at: NaiveDateTime,
    ) {
        if let Err(e) = self
            .store
            .complete_reminder(caller_user_id, reminder_id, at)
            .await
        {
            log::warn!(
                "Failed to resolve reminder {} after review, continuing: {}",
                reminder_id,
                e
            );
        }
    }

    async fn schedule_next_reminder(
        &self,
        topic: &StudyTopic,
        next_interval_days: i32,
        now: NaiveDateTime,
    ) {
        let context = serde_json::json!({
            "topic_id": topic.topic_id,
            "title": topic.title,
        });

        let reminder = NewReminder {
            owner_user_id: topic.owner_user_id,
            topic_id: topic.topic_id,
            scheduled_at: now + Duration::days(i64::from(next_interval_days)),
            kind: REMINDER_KIND_SPACED_REPETITION.to_string(),
            context: Some(context.to_string()),
            completed: false,
            completed_at: None,
        };

        if let Err(e) = self.store.insert_reminder(reminder).await {
            log::warn!(
                "Failed to schedule next review for topic {}, continuing: {}",
                topic.topic_id,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use diesel::connection::SimpleConnection;
    use diesel::prelude::*;
    use diesel::r2d2::{ConnectionManager, Pool};

    use super::*;
    use crate::model::NewStudyTopic;
    use crate::schema::{performance_records, reminders, study_topics};
    use crate::store::DieselStore;
    use crate::DbPool;

    #[derive(Clone)]
    struct TestClock(Arc<Mutex<NaiveDateTime>>);

    impl TestClock {
        fn at(start: NaiveDateTime) -> Self {
            TestClock(Arc::new(Mutex::new(start)))
        }

        fn advance(&self, delta: Duration) {
            let mut now = self.0.lock().unwrap();
            *now = *now + delta;
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> NaiveDateTime {
            *self.0.lock().unwrap()
        }
    }

    fn start_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn test_pool() -> DbPool {
        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder().max_size(1).build(manager).unwrap();
        pool.get()
            .unwrap()
            .batch_execute(include_str!(
                "../migrations/2026-07-18-091400_create_srs_tables/up.sql"
            ))
            .unwrap();
        pool
    }

    fn scheduler() -> (SrsScheduler<DieselStore, TestClock>, DbPool, TestClock) {
        let pool = test_pool();
        let clock = TestClock::at(start_time());
        let scheduler = SrsScheduler::new(DieselStore::new(pool.clone()), clock.clone());
        (scheduler, pool, clock)
    }

    fn create_topic(pool: &DbPool, owner_user_id: i32, title: &str) -> i32 {
        let mut conn = pool.get().unwrap();
        diesel::insert_into(study_topics::table)
            .values(&NewStudyTopic {
                owner_user_id,
                title,
                created_at: start_time(),
            })
            .execute(&mut conn)
            .unwrap();
        diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>(
            "last_insert_rowid()",
        ))
        .get_result::<i32>(&mut conn)
        .unwrap()
    }

    fn seed_record(
        pool: &DbPool,
        owner_user_id: i32,
        topic_id: i32,
        reviewed_at: NaiveDateTime,
        ease_factor: f64,
        next_interval_days: i32,
        repetition_number: i32,
    ) {
        let mut conn = pool.get().unwrap();
        diesel::insert_into(performance_records::table)
            .values(&NewPerformanceRecord {
                owner_user_id,
                topic_id,
                triggering_reminder_id: None,
                reviewed_at,
                quality_rating: 4,
                response_time_seconds: None,
                ease_factor,
                interval_days: 1,
                next_interval_days,
                repetition_number,
            })
            .execute(&mut conn)
            .unwrap();
    }

    fn seed_reminder(
        pool: &DbPool,
        owner_user_id: i32,
        topic_id: i32,
        scheduled_at: NaiveDateTime,
        kind: &str,
        completed: bool,
    ) {
        let mut conn = pool.get().unwrap();
        diesel::insert_into(reminders::table)
            .values(&NewReminder {
                owner_user_id,
                topic_id,
                scheduled_at,
                kind: kind.to_string(),
                context: None,
                completed,
                completed_at: None,
            })
            .execute(&mut conn)
            .unwrap();
    }

    fn all_records(pool: &DbPool) -> Vec<PerformanceRecord> {
        let mut conn = pool.get().unwrap();
        performance_records::table
            .order_by(performance_records::record_id.asc())
            .select(PerformanceRecord::as_select())
            .load(&mut conn)
            .unwrap()
    }

    fn all_reminders(pool: &DbPool) -> Vec<Reminder> {
        let mut conn = pool.get().unwrap();
        reminders::table
            .order_by(reminders::reminder_id.asc())
            .select(Reminder::as_select())
            .load(&mut conn)
            .unwrap()
    }

    fn review(topic_id: i32, quality_rating: i32) -> RecordReview {
        RecordReview {
            topic_session_id: topic_id,
            quality_rating,
            reminder_id: None,
            response_time_seconds: None,
            schedule_next: false,
        }
    }

    #[tokio::test]
    async fn first_review_starts_from_defaults() {
        let (scheduler, pool, _clock) = scheduler();
        let topic_id = create_topic(&pool, 1, "Hiragana");

        let record = scheduler.record_review(1, review(topic_id, 4)).await.unwrap();

        assert_eq!(record.repetition_number, 1);
        assert_eq!(record.interval_days, 1);
        assert_eq!(record.next_interval_days, 1);
        assert!((record.ease_factor - 2.5).abs() < 1e-9);
        assert_eq!(record.reviewed_at, start_time());
    }

    #[tokio::test]
    async fn second_successful_review_gets_six_days() {
        let (scheduler, pool, clock) = scheduler();
        let topic_id = create_topic(&pool, 1, "Hiragana");

        scheduler.record_review(1, review(topic_id, 4)).await.unwrap();
        clock.advance(Duration::hours(48));
        let record = scheduler.record_review(1, review(topic_id, 5)).await.unwrap();

        assert_eq!(record.repetition_number, 2);
        assert_eq!(record.interval_days, 1);
        assert_eq!(record.next_interval_days, 6);
        assert!((record.ease_factor - 2.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn lapse_forces_one_day_and_damages_ease() {
        let (scheduler, pool, clock) = scheduler();
        let topic_id = create_topic(&pool, 1, "Kanji radicals");
        seed_record(&pool, 1, topic_id, start_time(), 2.8, 20, 5);

        clock.advance(Duration::days(20));
        let record = scheduler.record_review(1, review(topic_id, 1)).await.unwrap();

        assert_eq!(record.interval_days, 20);
        assert_eq!(record.next_interval_days, 1);
        assert!((record.ease_factor - 2.26).abs() < 1e-9);
        assert!(record.ease_factor >= 1.3);
    }

    #[tokio::test]
    async fn lapse_keeps_repetition_monotonic() {
        let (scheduler, pool, clock) = scheduler();
        let topic_id = create_topic(&pool, 1, "Kanji radicals");
        seed_record(&pool, 1, topic_id, start_time(), 2.8, 20, 5);

        clock.advance(Duration::days(20));
        let record = scheduler.record_review(1, review(topic_id, 0)).await.unwrap();

        // A failing grade does not reset the counter, it only forces the
        // interval back to one day.
        assert_eq!(record.repetition_number, 6);
        assert_eq!(record.next_interval_days, 1);
    }

    #[tokio::test]
    async fn quality_rating_out_of_range_is_rejected() {
        let (scheduler, pool, _clock) = scheduler();
        let topic_id = create_topic(&pool, 1, "Hiragana");

        let err = scheduler.record_review(1, review(topic_id, 6)).await.unwrap_err();
        assert!(matches!(err, SrsError::Validation(_)));
        assert!(all_records(&pool).is_empty());
    }

    #[tokio::test]
    async fn non_positive_response_time_is_rejected() {
        let (scheduler, pool, _clock) = scheduler();
        let topic_id = create_topic(&pool, 1, "Hiragana");

        let mut input = review(topic_id, 4);
        input.response_time_seconds = Some(0);
        let err = scheduler.record_review(1, input).await.unwrap_err();

        assert!(matches!(err, SrsError::Validation(_)));
        assert!(all_records(&pool).is_empty());
    }

    #[tokio::test]
    async fn foreign_topic_reads_as_not_found() {
        let (scheduler, pool, _clock) = scheduler();
        let topic_id = create_topic(&pool, 2, "Someone else's notes");

        let err = scheduler.record_review(1, review(topic_id, 4)).await.unwrap_err();
        assert!(matches!(err, SrsError::NotFound));
        assert!(all_records(&pool).is_empty());

        let err = scheduler.record_review(1, review(999, 4)).await.unwrap_err();
        assert!(matches!(err, SrsError::NotFound));
    }

    #[tokio::test]
    async fn records_are_append_only() {
        let (scheduler, pool, clock) = scheduler();
        let topic_id = create_topic(&pool, 1, "Hiragana");

        scheduler.record_review(1, review(topic_id, 4)).await.unwrap();
        let first_snapshot = all_records(&pool)[0].clone();

        clock.advance(Duration::days(2));
        scheduler.record_review(1, review(topic_id, 5)).await.unwrap();
        clock.advance(Duration::days(7));
        scheduler.record_review(1, review(topic_id, 3)).await.unwrap();

        let records = all_records(&pool);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].record_id, first_snapshot.record_id);
        assert_eq!(records[0].reviewed_at, first_snapshot.reviewed_at);
        assert_eq!(records[0].quality_rating, first_snapshot.quality_rating);
        assert!((records[0].ease_factor - first_snapshot.ease_factor).abs() < 1e-9);
        assert_eq!(records[0].next_interval_days, first_snapshot.next_interval_days);
    }

    #[tokio::test]
    async fn cramming_penalty_lowers_resulting_ease() {
        let (scheduler, pool, clock) = scheduler();
        let crammed_topic = create_topic(&pool, 1, "Crammed topic");
        let spaced_topic = create_topic(&pool, 1, "Spaced topic");

        // Same grades, but the second review of the crammed topic lands
        // inside the 24h window.
        scheduler.record_review(1, review(crammed_topic, 5)).await.unwrap();
        clock.advance(Duration::hours(2));
        let crammed = scheduler.record_review(1, review(crammed_topic, 5)).await.unwrap();

        clock.advance(Duration::days(2));
        scheduler.record_review(1, review(spaced_topic, 5)).await.unwrap();
        clock.advance(Duration::days(2));
        let spaced = scheduler.record_review(1, review(spaced_topic, 5)).await.unwrap();

        assert!((crammed.ease_factor - 2.6).abs() < 1e-9);
        assert!((spaced.ease_factor - 2.7).abs() < 1e-9);
        assert!(crammed.ease_factor < spaced.ease_factor);
    }

    #[tokio::test]
    async fn review_schedules_the_next_reminder() {
        let (scheduler, pool, clock) = scheduler();
        let topic_id = create_topic(&pool, 1, "Hiragana");

        scheduler.record_review(1, review(topic_id, 4)).await.unwrap();
        clock.advance(Duration::days(2));

        let mut input = review(topic_id, 5);
        input.schedule_next = true;
        scheduler.record_review(1, input).await.unwrap();

        let created = all_reminders(&pool);
        assert_eq!(created.len(), 1);
        let reminder = &created[0];
        assert_eq!(reminder.kind, REMINDER_KIND_SPACED_REPETITION);
        assert_eq!(reminder.topic_id, topic_id);
        assert_eq!(reminder.scheduled_at, clock.now() + Duration::days(6));
        assert!(!reminder.completed);

        let context: serde_json::Value =
            serde_json::from_str(reminder.context.as_deref().unwrap()).unwrap();
        assert_eq!(context["title"], "Hiragana");
        assert_eq!(context["topic_id"], topic_id);
    }

    #[tokio::test]
    async fn schedule_next_false_creates_no_reminder() {
        let (scheduler, pool, _clock) = scheduler();
        let topic_id = create_topic(&pool, 1, "Hiragana");

        scheduler.record_review(1, review(topic_id, 4)).await.unwrap();
        assert!(all_reminders(&pool).is_empty());
    }

    #[tokio::test]
    async fn triggering_reminder_completion_is_idempotent() {
        let (scheduler, pool, clock) = scheduler();
        let topic_id = create_topic(&pool, 1, "Hiragana");

        let mut input = review(topic_id, 4);
        input.schedule_next = true;
        scheduler.record_review(1, input).await.unwrap();
        let reminder_id = all_reminders(&pool)[0].reminder_id;

        clock.advance(Duration::days(2));
        let mut input = review(topic_id, 5);
        input.reminder_id = Some(reminder_id);
        scheduler.record_review(1, input.clone()).await.unwrap();

        let resolved = all_reminders(&pool)[0].clone();
        assert!(resolved.completed);
        let completed_at = resolved.completed_at.unwrap();
        assert_eq!(completed_at, clock.now());

        // A second review referencing the same reminder neither errors nor
        // rewrites the completion time.
        clock.advance(Duration::days(1));
        scheduler.record_review(1, input).await.unwrap();

        let resolved_again = all_reminders(&pool)[0].clone();
        assert!(resolved_again.completed);
        assert_eq!(resolved_again.completed_at.unwrap(), completed_at);
    }

    #[tokio::test]
    async fn due_reviews_are_ordered_and_bounded() {
        let (scheduler, pool, clock) = scheduler();
        let topic_id = create_topic(&pool, 1, "Hiragana");

        // Inserted newest-first to make the ordering do the work.
        for offset in (0..12).rev() {
            seed_reminder(
                &pool,
                1,
                topic_id,
                start_time() + Duration::hours(offset),
                REMINDER_KIND_SPACED_REPETITION,
                false,
            );
        }
        // Neither completed nor foreign-kind reminders are due.
        seed_reminder(&pool, 1, topic_id, start_time(), REMINDER_KIND_SPACED_REPETITION, true);
        seed_reminder(&pool, 1, topic_id, start_time(), "exam", false);

        clock.advance(Duration::days(1));
        let due = scheduler.get_due_reviews(1, clock.now()).await.unwrap();

        assert_eq!(due.len() as i64, DUE_PAGE_SIZE);
        for (i, reminder) in due.iter().enumerate() {
            assert_eq!(reminder.scheduled_at, start_time() + Duration::hours(i as i64));
            assert_eq!(reminder.kind, REMINDER_KIND_SPACED_REPETITION);
            assert!(!reminder.completed);
        }
    }

    #[tokio::test]
    async fn due_reviews_exclude_future_reminders() {
        let (scheduler, pool, clock) = scheduler();
        let topic_id = create_topic(&pool, 1, "Hiragana");

        seed_reminder(
            &pool,
            1,
            topic_id,
            start_time() + Duration::days(3),
            REMINDER_KIND_SPACED_REPETITION,
            false,
        );

        let due = scheduler.get_due_reviews(1, clock.now()).await.unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn history_returns_the_most_recent_record() {
        let (scheduler, pool, clock) = scheduler();
        let topic_id = create_topic(&pool, 1, "Hiragana");

        scheduler.record_review(1, review(topic_id, 4)).await.unwrap();
        clock.advance(Duration::days(2));
        scheduler.record_review(1, review(topic_id, 5)).await.unwrap();

        let latest = scheduler.get_performance_history(1, topic_id).await.unwrap();
        assert_eq!(latest.repetition_number, 2);

        let err = scheduler.get_performance_history(1, 999).await.unwrap_err();
        assert!(matches!(err, SrsError::NotFound));

        let unreviewed = create_topic(&pool, 1, "Untouched");
        let err = scheduler.get_performance_history(1, unreviewed).await.unwrap_err();
        assert!(matches!(err, SrsError::NotFound));
    }

    #[tokio::test]
    async fn statistics_aggregate_the_owners_history_only() {
        let (scheduler, pool, clock) = scheduler();
        let topic_a = create_topic(&pool, 1, "Hiragana");
        let topic_b = create_topic(&pool, 1, "Katakana");
        let foreign = create_topic(&pool, 2, "Not ours");

        scheduler.record_review(1, review(topic_a, 5)).await.unwrap();
        clock.advance(Duration::days(2));
        scheduler.record_review(1, review(topic_a, 4)).await.unwrap();
        clock.advance(Duration::days(2));
        scheduler.record_review(1, review(topic_a, 4)).await.unwrap();
        scheduler.record_review(1, review(topic_b, 2)).await.unwrap();
        scheduler.record_review(2, review(foreign, 0)).await.unwrap();

        seed_reminder(
            &pool,
            1,
            topic_a,
            start_time(),
            REMINDER_KIND_SPACED_REPETITION,
            false,
        );

        let stats = scheduler.get_statistics(1).await.unwrap();
        assert_eq!(stats.total_topics, 2);
        assert_eq!(stats.total_reviews, 4);
        assert!((stats.average_quality - 3.75).abs() < 1e-9);
        assert_eq!(stats.due_count, 1);
        assert_eq!(stats.quality_distribution, [0, 0, 1, 0, 2, 1]);
    }

    #[tokio::test]
    async fn statistics_for_a_fresh_user_are_empty() {
        let (scheduler, _pool, _clock) = scheduler();

        let stats = scheduler.get_statistics(7).await.unwrap();
        assert_eq!(stats.total_topics, 0);
        assert_eq!(stats.total_reviews, 0);
        assert_eq!(stats.average_quality, 0.0);
        assert_eq!(stats.due_count, 0);
        assert_eq!(stats.quality_distribution, [0; 6]);
    }
}
