//! HTTP Synthesizer - 调用外部语音合成 HTTP 服务
//!
//! 实现 SynthesizerPort trait，通过 HTTP 调用外部合成 provider
//!
//! 外部 API:
//! POST {base_url}/api/tts/synthesize
//! Request: {"text": "...", "voice": "...", "model": "...", "format": "wav"}  (JSON)
//! Response: 音频二进制
//!
//! 错误分类：超时 → Timeout；连接失败、408/429/5xx → Transient；
//! 其余 4xx（含鉴权失败）→ Permanent，绝不重试

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

use crate::application::ports::{ProviderError, SynthesisJob, SynthesizerPort};

/// 合成请求体 (JSON)
#[derive(Debug, Serialize)]
struct SynthesisHttpRequest<'a> {
    text: &'a str,
    voice: &'a str,
    model: &'a str,
    format: &'a str,
}

/// HTTP Synthesizer 配置
#[derive(Debug, Clone)]
pub struct HttpSynthesizerConfig {
    /// provider 服务基础 URL
    pub base_url: String,
    /// 单次请求超时（秒）
    pub timeout_secs: u64,
}

impl Default for HttpSynthesizerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
        }
    }
}

impl HttpSynthesizerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// HTTP 合成客户端
pub struct HttpSynthesizer {
    client: Client,
    config: HttpSynthesizerConfig,
}

impl HttpSynthesizer {
    pub fn new(config: HttpSynthesizerConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Permanent(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn synthesize_url(&self) -> String {
        format!("{}/api/tts/synthesize", self.config.base_url)
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url)
    }

    fn classify_status(status: StatusCode, body: String) -> ProviderError {
        let detail = format!("HTTP {}: {}", status, body);
        if status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            ProviderError::Transient(detail)
        } else {
            ProviderError::Permanent(detail)
        }
    }
}

#[async_trait]
impl SynthesizerPort for HttpSynthesizer {
    async fn call(&self, job: &SynthesisJob) -> Result<Bytes, ProviderError> {
        let request = SynthesisHttpRequest {
            text: &job.text,
            voice: &job.voice,
            model: &job.model,
            format: job.format.as_str(),
        };

        tracing::debug!(
            url = %self.synthesize_url(),
            text_len = job.text.len(),
            voice = %job.voice,
            "Sending synthesis request"
        );

        let response = self
            .client
            .post(self.synthesize_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else if e.is_connect() {
                    ProviderError::Transient(format!("Cannot connect to provider: {}", e))
                } else {
                    ProviderError::Transient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Transient(format!("Failed to read audio: {}", e)))?;

        if audio.is_empty() {
            return Err(ProviderError::Permanent(
                "Provider returned empty audio".to_string(),
            ));
        }

        tracing::info!(
            voice = %job.voice,
            audio_size = audio.len(),
            "Synthesis call completed"
        );

        Ok(audio)
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.health_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
