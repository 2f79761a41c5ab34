//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::time::Duration;

use crate::application::ports::AudioFormat;
use crate::application::resilience::{BreakerConfig, RetryConfig};
use crate::application::stream::StreamConfig;

/// 应用主配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 合成 provider 配置
    #[serde(default)]
    pub provider: ProviderConfig,

    /// 缓存配置
    #[serde(default)]
    pub cache: CacheConfig,

    /// 熔断器配置
    #[serde(default)]
    pub breaker: BreakerSettings,

    /// 重试配置
    #[serde(default)]
    pub retry: RetrySettings,

    /// 分块配置
    #[serde(default)]
    pub stream: StreamSettings,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5070
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// 合成 provider 配置
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// provider 服务基础 URL
    #[serde(default = "default_provider_url")]
    pub url: String,

    /// 单次请求超时（秒）
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// 合成模型标识
    #[serde(default = "default_model")]
    pub model: String,

    /// 输出格式
    /// 可选: wav, mp3, opus
    #[serde(default)]
    pub format: AudioFormat,
}

fn default_provider_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_provider_timeout() -> u64 {
    30
}

fn default_model() -> String {
    "default".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: default_provider_url(),
            timeout_secs: default_provider_timeout(),
            model: default_model(),
            format: AudioFormat::Wav,
        }
    }
}

/// 缓存配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CacheConfig {
    /// 本地层
    #[serde(default)]
    pub local: LocalCacheConfig,

    /// 共享层（可选）
    #[serde(default)]
    pub shared: SharedCacheConfig,
}

/// 本地缓存层配置
#[derive(Debug, Clone, Deserialize)]
pub struct LocalCacheConfig {
    /// 字节预算（按 payload 大小而非条目数约束）
    #[serde(default = "default_local_max_bytes")]
    pub max_size_bytes: u64,
}

fn default_local_max_bytes() -> u64 {
    256 * 1024 * 1024 // 256MB
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_local_max_bytes(),
        }
    }
}

/// 共享缓存层配置
#[derive(Debug, Clone, Deserialize)]
pub struct SharedCacheConfig {
    /// 是否启用共享层
    #[serde(default)]
    pub enabled: bool,

    /// sled 数据库路径
    #[serde(default = "default_shared_path")]
    pub path: String,

    /// 字节预算
    #[serde(default = "default_shared_max_bytes")]
    pub max_size_bytes: u64,

    /// 单次共享层调用的超时（毫秒）
    #[serde(default = "default_shared_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_shared_path() -> String {
    "data/cache.sled".to_string()
}

fn default_shared_max_bytes() -> u64 {
    2 * 1024 * 1024 * 1024 // 2GB
}

fn default_shared_timeout_ms() -> u64 {
    200
}

impl Default for SharedCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_shared_path(),
            max_size_bytes: default_shared_max_bytes(),
            timeout_ms: default_shared_timeout_ms(),
        }
    }
}

/// 熔断器配置
#[derive(Debug, Clone, Deserialize)]
pub struct BreakerSettings {
    /// 连续失败阈值
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Open 状态冷却时间（秒）
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// HalfOpen 同时放行的试探数
    #[serde(default = "default_half_open_trials")]
    pub half_open_trials: u32,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown_secs() -> u64 {
    30
}

fn default_half_open_trials() -> u32 {
    1
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
            half_open_trials: default_half_open_trials(),
        }
    }
}

impl BreakerSettings {
    pub fn to_breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown: Duration::from_secs(self.cooldown_secs),
            half_open_trials: self.half_open_trials,
        }
    }
}

/// 重试配置
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// 最大尝试次数（含首次）
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// 基础延迟（毫秒）
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// 指数倍率
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// 单次延迟上限（毫秒）
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// 抖动因子下限
    #[serde(default = "default_jitter_min")]
    pub jitter_min: f64,

    /// 抖动因子上限
    #[serde(default = "default_jitter_max")]
    pub jitter_max: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_jitter_min() -> f64 {
    0.8
}

fn default_jitter_max() -> f64 {
    1.2
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter_min: default_jitter_min(),
            jitter_max: default_jitter_max(),
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: (self.jitter_min, self.jitter_max),
        }
    }
}

/// 分块配置
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSettings {
    /// 目标块大小下限（字节）
    #[serde(default = "default_min_chunk_bytes")]
    pub min_chunk_bytes: usize,

    /// 目标块大小上限（字节）
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
}

fn default_min_chunk_bytes() -> usize {
    4 * 1024
}

fn default_max_chunk_bytes() -> usize {
    32 * 1024
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            min_chunk_bytes: default_min_chunk_bytes(),
            max_chunk_bytes: default_max_chunk_bytes(),
        }
    }
}

impl StreamSettings {
    pub fn to_stream_config(&self) -> StreamConfig {
        StreamConfig {
            min_chunk_bytes: self.min_chunk_bytes,
            max_chunk_bytes: self.max_chunk_bytes,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
