use axum::{
    routing::post,
    Json, Router,
};
use diesel::{
    r2d2::{ConnectionManager, Pool},
    SqliteConnection,
};
use std::sync::Arc;
use time::Duration;
use tokio::net::TcpListener;
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};

mod clock;
mod cramming;
mod error;
mod handlers;
mod interval;
mod model;
mod scheduler;
mod schema;
mod session;
mod store;

type DbPool = Pool<ConnectionManager<SqliteConnection>>;

#[tokio::main]
async fn main() {
    // Database configuration
    dotenv::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "studyloop.db".into());

    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder()
        .build(manager)
        .expect("Failed to create DB pool");

    // The scheduler owns its collaborators; the topic glue talks to the pool
    // directly.
    let srs_scheduler = Arc::new(scheduler::SrsScheduler::new(
        store::DieselStore::new(pool.clone()),
        clock::SystemClock,
    ));

    // Sessions configuration
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_expiry(Expiry::OnInactivity(Duration::days(1)))
        .with_secure(false);

    // Combined API router
    let api_router = Router::new()
        .nest("/srs", handlers::srs::srs_router(srs_scheduler))
        .nest("/topics", handlers::topics::topics_router(pool.clone()));

    // Main application router
    let app = Router::new()
        .route("/session", post(open_session).delete(close_session))
        .nest("/api", api_router)
        .layer(session_layer);

    // Start server
    let listener = match TcpListener::bind("127.0.0.1:5000").await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to address: {}", e);
            std::process::exit(1);
        }
    };

    println!("Server running on http://localhost:5000");

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}

#[derive(serde::Deserialize)]
struct OpenSessionRequest {
    user_id: i32,
}

// Authentication lives in the surrounding application; this endpoint only
// pins the already-identified caller onto the session cookie.
async fn open_session(
    session: Session,
    Json(body): Json<OpenSessionRequest>,
) -> Result<Json<serde_json::Value>, error::ApiError> {
    session::set_user_session(&session, body.user_id).await?;
    Ok(Json(serde_json::json!({ "user_id": body.user_id })))
}

async fn close_session(session: Session) -> Result<Json<serde_json::Value>, error::ApiError> {
    session.flush().await.map_err(|e| {
        log::error!("Failed to delete session: {}", e);
        error::ApiError::Session("Failed to logout".into())
    })?;
    Ok(Json(serde_json::json!({ "success": true })))
}
