//! Configuration Loader
//!
//! 多源配置加载与合并
//!
//! 优先级（从高到低）：
//! 1. 环境变量（前缀 `RESONA_`，层级分隔符 `__`）
//! 2. 配置文件（config.toml 或 config.local.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// # 环境变量示例
/// - `RESONA_SERVER__PORT=8080`
/// - `RESONA_PROVIDER__URL=http://tts-server:8000`
/// - `RESONA_CACHE__SHARED__ENABLED=true`
/// - `RESONA_BREAKER__FAILURE_THRESHOLD=5`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 2. 环境变量（最高优先级）
    builder = builder.add_source(
        Environment::with_prefix("RESONA")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    // 缺省字段由 serde default 补齐
    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::ParseError(format!("Failed to deserialize config: {}", e)))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "Server port cannot be 0".to_string(),
        ));
    }

    if config.provider.url.is_empty() {
        return Err(ConfigError::ValidationError(
            "Provider URL cannot be empty".to_string(),
        ));
    }

    if config.retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "Retry max_attempts must be at least 1".to_string(),
        ));
    }

    if config.retry.jitter_min > config.retry.jitter_max {
        return Err(ConfigError::ValidationError(
            "Retry jitter_min cannot exceed jitter_max".to_string(),
        ));
    }

    if config.breaker.failure_threshold == 0 {
        return Err(ConfigError::ValidationError(
            "Breaker failure_threshold must be at least 1".to_string(),
        ));
    }

    if config.cache.local.max_size_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "Local cache budget cannot be 0".to_string(),
        ));
    }

    if config.stream.min_chunk_bytes > config.stream.max_chunk_bytes
        || config.stream.max_chunk_bytes == 0
    {
        return Err(ConfigError::ValidationError(
            "Stream chunk size range is invalid".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}:{}", config.server.host, config.server.port);
    tracing::info!("Provider URL: {}", config.provider.url);
    tracing::info!("Provider Timeout: {}s", config.provider.timeout_secs);
    tracing::info!("Model: {}", config.provider.model);
    tracing::info!("Local Cache Budget: {} bytes", config.cache.local.max_size_bytes);
    tracing::info!("Shared Cache Enabled: {}", config.cache.shared.enabled);
    if config.cache.shared.enabled {
        tracing::info!("Shared Cache Path: {}", config.cache.shared.path);
        tracing::info!("Shared Cache Budget: {} bytes", config.cache.shared.max_size_bytes);
        tracing::info!("Shared Cache Timeout: {}ms", config.cache.shared.timeout_ms);
    }
    tracing::info!(
        "Breaker: threshold={} cooldown={}s trials={}",
        config.breaker.failure_threshold,
        config.breaker.cooldown_secs,
        config.breaker.half_open_trials
    );
    tracing::info!(
        "Retry: attempts={} base={}ms x{} cap={}ms jitter=[{}, {}]",
        config.retry.max_attempts,
        config.retry.base_delay_ms,
        config.retry.multiplier,
        config.retry.max_delay_ms,
        config.retry.jitter_min,
        config.retry.jitter_max
    );
    tracing::info!(
        "Chunk Size: {}..{} bytes",
        config.stream.min_chunk_bytes,
        config.stream.max_chunk_bytes
    );
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}
