//! Cache Tier Port - 音频缓存层抽象
//!
//! 本地层与共享层实现同一接口。区分"确认不存在"（`Ok(None)`）
//! 与"层不可达"（`Err(Unavailable)`）——后者不得当作可缓存的 miss。

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::domain::Fingerprint;

/// 缓存层错误
#[derive(Debug, Error)]
pub enum TierError {
    /// 单个条目超过整层预算，拒绝写入（不是合成失败）
    #[error("Entry of {size} bytes exceeds tier budget of {budget} bytes")]
    EntryTooLarge { size: u64, budget: u64 },

    /// 层不可达（共享层 IO/序列化故障），调用方应透明绕过
    #[error("Cache tier unavailable: {0}")]
    Unavailable(String),
}

/// 缓存条目
///
/// payload 一经存入即不可变；读取仅更新访问时间与计数
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Bytes,
    pub size_bytes: u64,
    pub created_at: i64,
    pub last_accessed: i64,
    pub access_count: u64,
}

/// 缓存统计信息
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub max_size_bytes: u64,
    pub hit_count: u64,
    pub miss_count: u64,
}

/// Cache Tier Port
///
/// 按指纹寻址、字节预算约束的 LRU 缓存层
#[async_trait]
pub trait CacheTierPort: Send + Sync {
    /// 查找条目
    ///
    /// 命中时更新 last_accessed / access_count，并将条目置为最近使用
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, TierError>;

    /// 写入条目（幂等替换）
    ///
    /// 超出预算时按 LRU 淘汰直至放得下；单条目超过整层预算则拒绝
    async fn put(&self, fingerprint: &Fingerprint, payload: Bytes) -> Result<(), TierError>;

    /// 删除条目（不存在则为 no-op）
    async fn invalidate(&self, fingerprint: &Fingerprint) -> Result<(), TierError>;

    /// 获取缓存统计信息
    async fn stats(&self) -> CacheStats;
}
