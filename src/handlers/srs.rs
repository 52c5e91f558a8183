use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_sessions::Session;
use validator::Validate;

use crate::{
    clock::SystemClock,
    error::ApiError,
    model::{PerformanceRecord, Reminder, StatisticsSummary},
    scheduler::{RecordReview, SrsScheduler},
    session,
    store::DieselStore,
};

pub type AppScheduler = SrsScheduler<DieselStore, SystemClock>;

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPerformanceRequest {
    pub topic_session_id: i32,
    #[validate(range(min = 0, max = 5, message = "Quality rating must be between 0 and 5"))]
    pub quality_rating: i32,
    pub reminder_id: Option<i32>,
    #[validate(range(min = 1, message = "Response time must be positive"))]
    pub response_time_seconds: Option<i32>,
    #[serde(default = "default_schedule_next")]
    pub schedule_next: bool,
}

fn default_schedule_next() -> bool {
    true
}

#[axum::debug_handler]
pub async fn record_performance(
    State(scheduler): State<Arc<AppScheduler>>,
    session: Session,
    Json(payload): Json<RecordPerformanceRequest>,
) -> Result<Json<PerformanceRecord>, ApiError> {
    let user_id = session::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    payload.validate()?;

    let record = scheduler
        .record_review(
            user_id,
            RecordReview {
                topic_session_id: payload.topic_session_id,
                quality_rating: payload.quality_rating,
                reminder_id: payload.reminder_id,
                response_time_seconds: payload.response_time_seconds,
                schedule_next: payload.schedule_next,
            },
        )
        .await?;

    Ok(Json(record))
}

#[axum::debug_handler]
pub async fn performance_history(
    State(scheduler): State<Arc<AppScheduler>>,
    session: Session,
    Path(topic_id): Path<i32>,
) -> Result<Json<PerformanceRecord>, ApiError> {
    let user_id = session::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let record = scheduler.get_performance_history(user_id, topic_id).await?;
    Ok(Json(record))
}

#[axum::debug_handler]
pub async fn due_reviews(
    State(scheduler): State<Arc<AppScheduler>>,
    session: Session,
) -> Result<Json<Vec<Reminder>>, ApiError> {
    let user_id = session::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let due = scheduler.get_due_reviews(user_id, scheduler.now()).await?;
    Ok(Json(due))
}

#[axum::debug_handler]
pub async fn statistics(
    State(scheduler): State<Arc<AppScheduler>>,
    session: Session,
) -> Result<Json<StatisticsSummary>, ApiError> {
    let user_id = session::get_current_user_id(&session)
        .await
        .ok_or(ApiError::Unauthorized)?;

    let summary = scheduler.get_statistics(user_id).await?;
    Ok(Json(summary))
}

pub fn srs_router(scheduler: Arc<AppScheduler>) -> Router {
    Router::new()
        .route("/record-performance", post(record_performance))
        .route("/history/{topic_id}", get(performance_history))
        .route("/due", get(due_reviews))
        .route("/statistics", get(statistics))
        .with_state(scheduler)
}
