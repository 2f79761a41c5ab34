//! HTTP Routes
//!
//! API Endpoints:
//! - /api/ping               GET   存活检查
//! - /api/speech/synthesize  POST  文本合成，流式返回音频块
//! - /api/cache/stats        GET   两层缓存统计
//! - /api/cache/invalidate   POST  按 (text, voice) 删除缓存条目

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new().nest("/api", api_routes())
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", get(handlers::ping))
        .nest("/speech", speech_routes())
        .nest("/cache", cache_routes())
}

fn speech_routes() -> Router<Arc<AppState>> {
    Router::new().route("/synthesize", post(handlers::synthesize))
}

fn cache_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(handlers::cache_stats))
        .route("/invalidate", post(handlers::invalidate))
}
