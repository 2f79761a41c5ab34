//! Application Layer
//!
//! - Ports: 缓存层与合成 provider 的出站端口
//! - Resilience: 熔断器与重试策略
//! - Orchestrator: 合成编排（缓存查找 → 熔断门控 → 重试 → 回写 → 分块）
//! - Stream: 音频分块装配

pub mod error;
pub mod orchestrator;
pub mod ports;
pub mod resilience;
pub mod stream;

pub use error::SynthesisError;
pub use orchestrator::{OrchestratorConfig, SynthesisOrchestrator, SynthesisRequest};
pub use stream::{AudioChunk, ChunkStream, StreamAssembler, StreamConfig};
