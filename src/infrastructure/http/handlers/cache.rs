//! Cache Handlers - 缓存管理接口

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

#[derive(Debug, Serialize)]
pub struct TierStatsDto {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub max_size_bytes: u64,
    pub hit_count: u64,
    pub miss_count: u64,
}

#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub local: TierStatsDto,
    pub shared: Option<TierStatsDto>,
}

pub async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStatsResponse> {
    let local = state.local_cache.stats().await;
    let shared = match &state.shared_cache {
        Some(tier) => Some(tier.stats().await),
        None => None,
    };

    let to_dto = |s: crate::application::ports::CacheStats| TierStatsDto {
        total_entries: s.total_entries,
        total_size_bytes: s.total_size_bytes,
        max_size_bytes: s.max_size_bytes,
        hit_count: s.hit_count,
        miss_count: s.miss_count,
    };

    Json(CacheStatsResponse {
        local: to_dto(local),
        shared: shared.map(to_dto),
    })
}

#[derive(Debug, Deserialize)]
pub struct InvalidateRequest {
    pub text: String,
    pub voice: String,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub errno: i32,
}

pub async fn invalidate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>, ApiError> {
    state.orchestrator.invalidate(&req.text, &req.voice).await?;
    Ok(Json(InvalidateResponse { errno: 0 }))
}
