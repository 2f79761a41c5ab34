//! Resona - 弹性语音合成管线服务
//!
//! 装配：配置 → 缓存层 → provider 客户端 → 熔断/重试 → 编排器 → HTTP 服务

use std::sync::Arc;
use std::time::Duration;

use resona::application::ports::CacheTierPort;
use resona::application::resilience::{CircuitBreaker, RetryPolicy};
use resona::application::{OrchestratorConfig, StreamAssembler, SynthesisOrchestrator};
use resona::config::{load_config, print_config};
use resona::infrastructure::cache::{MemoryCacheTier, SledCacheConfig, SledCacheTier};
use resona::infrastructure::http::{AppState, HttpServer, ServerConfig};
use resona::infrastructure::synthesizer::{HttpSynthesizer, HttpSynthesizerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    // 初始化日志
    let log_filter = format!(
        "{},resona={},tower_http=debug",
        config.log.level, config.log.level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter)),
        )
        .init();

    tracing::info!("Resona - 弹性语音合成管线");
    print_config(&config);

    // 本地缓存层
    let local_cache: Arc<dyn CacheTierPort> =
        MemoryCacheTier::new(config.cache.local.max_size_bytes).arc();

    // 共享缓存层（可选）
    let shared_cache: Option<Arc<dyn CacheTierPort>> = if config.cache.shared.enabled {
        if let Some(parent) = std::path::Path::new(&config.cache.shared.path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tier = SledCacheTier::new(&SledCacheConfig {
            db_path: config.cache.shared.path.clone(),
            max_size_bytes: config.cache.shared.max_size_bytes,
        })
        .map_err(|e| anyhow::anyhow!("Failed to open shared cache: {}", e))?;
        Some(tier.arc())
    } else {
        None
    };

    // HTTP 合成客户端
    let synthesizer = HttpSynthesizer::new(
        HttpSynthesizerConfig::new(config.provider.url.clone())
            .with_timeout(config.provider.timeout_secs),
    )
    .map_err(|e| anyhow::anyhow!("Failed to build synthesizer: {}", e))?;

    // 编排器
    let orchestrator = SynthesisOrchestrator::new(
        OrchestratorConfig {
            model: config.provider.model.clone(),
            format: config.provider.format,
            shared_tier_timeout: Duration::from_millis(config.cache.shared.timeout_ms),
        },
        local_cache.clone(),
        shared_cache.clone(),
        Arc::new(synthesizer),
        Arc::new(CircuitBreaker::new(config.breaker.to_breaker_config())),
        RetryPolicy::new(config.retry.to_retry_config()),
        StreamAssembler::new(config.stream.to_stream_config()),
    );

    // HTTP 服务器
    let server_config = ServerConfig::new(&config.server.host, config.server.port);
    let state = AppState::new(
        orchestrator,
        local_cache,
        shared_cache,
        config.provider.format,
    );

    let server = HttpServer::new(server_config, state);

    tracing::info!("Starting HTTP server...");

    // 启动服务器（带优雅关闭）
    server
        .run_with_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for ctrl-c");
            tracing::info!("Received shutdown signal");
        })
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}
