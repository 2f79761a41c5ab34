//! Synthesizer Port - 外部语音合成 provider 抽象
//!
//! provider 被建模为单次同步能力：call(text, voice, model, format) -> 音频字节，
//! 可能超时或失败。只允许经由 RetryPolicy / CircuitBreaker 调用。

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider 错误
///
/// `Timeout` / `Transient` 可重试；`Permanent`（鉴权、畸形请求等）不重试
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Provider request timeout")]
    Timeout,

    #[error("Transient provider error: {0}")]
    Transient(String),

    #[error("Permanent provider error: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Timeout | ProviderError::Transient(_))
    }
}

/// 输出音频格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Wav,
    Mp3,
    Opus,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Opus => "opus",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Opus => "audio/ogg",
        }
    }
}

/// 单次合成调用
#[derive(Debug, Clone)]
pub struct SynthesisJob {
    pub text: String,
    pub voice: String,
    pub model: String,
    pub format: AudioFormat,
}

/// Synthesizer Port
#[async_trait]
pub trait SynthesizerPort: Send + Sync {
    /// 执行一次合成调用，返回完整音频字节
    async fn call(&self, job: &SynthesisJob) -> Result<Bytes, ProviderError>;

    /// 检查 provider 是否可用
    async fn health_check(&self) -> bool {
        true
    }
}
