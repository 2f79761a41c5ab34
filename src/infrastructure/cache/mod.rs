//! Cache Tiers - 缓存层实现
//!
//! - memory: 进程内 LRU 快路径
//! - shared: sled 持久化共享层（可选）

mod memory;
mod shared;

pub use memory::MemoryCacheTier;
pub use shared::{SledCacheConfig, SledCacheTier};
