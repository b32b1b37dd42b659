use std::sync::Arc;

use axum::{
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use appointment_cell::{appointment_routes, SchedulingEngine};

pub fn create_router(engine: Arc<SchedulingEngine>) -> Router {
    Router::new()
        .route("/", get(|| async { "Wellbeing scheduling API is running!" }))
        .route("/health", get(health))
        .nest("/appointments", appointment_routes(engine))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
