//! Speech Handlers - 合成入口
//!
//! 将编排器产出的块序列作为分块响应体流式返回；
//! 客户端断开即触发取消信号，不影响同指纹的其他等待者

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
    Json,
};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;

use futures_util::StreamExt;

use crate::application::SynthesisRequest;
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SynthesizeRequest {
    pub text: String,
    pub voice: String,
}

pub async fn synthesize(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SynthesizeRequest>,
) -> Result<Response, ApiError> {
    let request = SynthesisRequest::new(req.text, req.voice);
    // 客户端断开会丢弃 handler future，drop guard 随之触发取消；
    // 同指纹的其他等待者不受影响
    let _cancel_guard = request.cancel.clone().drop_guard();

    let chunks = state.orchestrator.synthesize(request).await?;

    let body_stream = chunks
        .into_stream()
        .map(|chunk| Ok::<_, Infallible>(chunk.data));

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, state.output_format.content_type())
        .body(Body::from_stream(body_stream))
        .map_err(|e| ApiError::Internal(e.to_string()))?)
}
