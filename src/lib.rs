//! Resona - 弹性语音合成管线
//!
//! 架构设计: Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Fingerprint: 文本归一化与内容寻址指纹
//!
//! 应用层 (application/):
//! - Ports: 缓存层与合成 provider 端口
//! - Resilience: 熔断器、重试策略
//! - Orchestrator: 合成编排（缓存 → 熔断门控 → 重试 → 回写 → 分块）
//! - Stream: 音频块装配
//!
//! 基础设施层 (infrastructure/):
//! - Cache: 内存 LRU 层 + Sled 共享层
//! - Synthesizer: HTTP / Fake provider 客户端
//! - HTTP: axum API 服务

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
