//! Configuration - 配置模块
//!
//! 配置由外部消费方提供（环境变量 / 配置文件），核心只消费不拥有

mod loader;
mod types;

pub use loader::{load_config, load_config_from_path, print_config, ConfigError};
pub use types::{
    AppConfig, BreakerSettings, CacheConfig, LocalCacheConfig, LogConfig, ProviderConfig,
    RetrySettings, ServerConfig, SharedCacheConfig, StreamSettings,
};
