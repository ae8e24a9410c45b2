use axum::{
    routing::{get, post},
    Json, Router,
};
use chainstream::models::input::Feedback;
use serde_json::{json, Value};

async fn feedback_handler(Json(feedback): Json<Feedback>) -> Json<Value> {
    tracing::info!(
        log_type = "feedback",
        run_id = %feedback.run_id,
        score = feedback.score,
        text = feedback.text.as_deref().unwrap_or_default(),
        "feedback received"
    );
    Json(json!({"status": "success"}))
}

async fn status_handler() -> &'static str {
    "ok"
}

pub fn routes() -> Router {
    Router::new()
        .route("/feedback", post(feedback_handler))
        .route("/status", get(status_handler))
}
