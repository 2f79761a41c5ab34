//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod cache_tier;
mod synthesizer;

pub use cache_tier::{CacheEntry, CacheStats, CacheTierPort, TierError};
pub use synthesizer::{AudioFormat, ProviderError, SynthesisJob, SynthesizerPort};
