use axum::extract::Path;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use serde::{Deserialize, Serialize};

use crate::{
    model::{NewStudyTopic, StudyTopic},
    schema::{performance_records, reminders, study_topics},
    session, DbPool,
};

#[derive(Deserialize)]
pub struct CreateTopicRequest {
    pub title: String,
}

#[derive(Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

pub async fn list_topics(
    State(pool): State<DbPool>,
    session: tower_sessions::Session,
) -> Result<Json<Vec<StudyTopic>>, (StatusCode, String)> {
    let user_id = match session::get_current_user_id(&session).await {
        Some(id) => id,
        None => return Err((StatusCode::UNAUTHORIZED, "Not logged in".to_string())),
    };

    let mut conn = pool.get().map_err(|e| {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
    })?;

    let topics = study_topics::table
        .filter(study_topics::owner_user_id.eq(user_id))
        .order_by(study_topics::created_at.asc())
        .select(StudyTopic::as_select())
        .load(&mut conn)
        .map_err(|e| {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
        })?;

    Ok(Json(topics))
}

pub async fn create_topic(
    State(pool): State<DbPool>,
    session: tower_sessions::Session,
    Json(payload): Json<CreateTopicRequest>,
) -> Result<Json<StudyTopic>, (StatusCode, String)> {
    let user_id = match session::get_current_user_id(&session).await {
        Some(id) => id,
        None => return Err((StatusCode::UNAUTHORIZED, "Not logged in".to_string())),
    };

    let title = payload.title.trim();
    if title.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Topic title is required".to_string()));
    }

    let mut conn = pool.get().map_err(|e| {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
    })?;

    diesel::insert_into(study_topics::table)
        .values(&NewStudyTopic {
            owner_user_id: user_id,
            title,
            created_at: Utc::now().naive_utc(),
        })
        .execute(&mut conn)
        .map_err(|e| {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
        })?;

    let topic_id = diesel::select(diesel::dsl::sql::<Integer>("last_insert_rowid()"))
        .get_result::<i32>(&mut conn)
        .map_err(|e| {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
        })?;

    let topic = study_topics::table
        .find(topic_id)
        .select(StudyTopic::as_select())
        .first(&mut conn)
        .map_err(|e| {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
        })?;

    Ok(Json(topic))
}

pub async fn delete_topic(
    State(pool): State<DbPool>,
    session: tower_sessions::Session,
    Path(topic_id): Path<i32>,
) -> Result<Json<ApiResponse>, (StatusCode, String)> {
    let user_id = match session::get_current_user_id(&session).await {
        Some(id) => id,
        None => return Err((StatusCode::UNAUTHORIZED, "Not logged in".to_string())),
    };

    let mut conn = pool.get().map_err(|e| {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
    })?;

    let topic_exists = study_topics::table
        .filter(study_topics::topic_id.eq(topic_id))
        .filter(study_topics::owner_user_id.eq(user_id))
        .count()
        .get_result::<i64>(&mut conn)
        .map_err(|e| {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
        })? > 0;

    if !topic_exists {
        return Err((StatusCode::NOT_FOUND, "Topic not found".to_string()));
    }

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(reminders::table.filter(reminders::topic_id.eq(topic_id))).execute(conn)?;
        diesel::delete(
            performance_records::table.filter(performance_records::topic_id.eq(topic_id)),
        )
        .execute(conn)?;
        diesel::delete(study_topics::table.filter(study_topics::topic_id.eq(topic_id)))
            .execute(conn)
    })
    .map_err(|e| {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
    })?;

    Ok(Json(ApiResponse {
        success: true,
        message: "Topic deleted successfully".to_string(),
    }))
}

pub fn topics_router(pool: DbPool) -> Router {
    Router::new()
        .route("/", get(list_topics))
        .route("/create", post(create_topic))
        .route("/{topic_id}", delete(delete_topic))
        .with_state(pool)
}
