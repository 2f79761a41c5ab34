//! Ping Handler

use axum::Json;
use serde_json::{json, Value};

pub async fn ping() -> Json<Value> {
    Json(json!({ "errno": 0, "data": "pong" }))
}
