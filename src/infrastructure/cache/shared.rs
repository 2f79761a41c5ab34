//! Sled-backed Shared Cache Tier
//!
//! 跨进程共享的第二层缓存（可选启用）。与本地层实现同一端口；
//! 任何 sled / 序列化故障都映射为 `TierError::Unavailable`，由编排器
//! 透明绕过——共享层故障永远不使一次合成请求失败。

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::application::ports::{CacheEntry, CacheStats, CacheTierPort, TierError};
use crate::domain::Fingerprint;

/// Sled 共享缓存配置
#[derive(Debug, Clone)]
pub struct SledCacheConfig {
    /// 数据库路径
    pub db_path: String,
    /// 最大缓存大小（字节）
    pub max_size_bytes: u64,
}

impl Default for SledCacheConfig {
    fn default() -> Self {
        Self {
            db_path: "data/cache.sled".to_string(),
            max_size_bytes: 2 * 1024 * 1024 * 1024, // 2GB
        }
    }
}

/// 内部存储条目
#[derive(Debug, Clone, Serialize, Deserialize)]
struct InternalEntry {
    payload: Vec<u8>,
    size_bytes: u64,
    created_at: i64,
    last_accessed: i64,
    access_count: u64,
}

/// Sled 共享缓存层
pub struct SledCacheTier {
    db: Db,
    max_size_bytes: u64,
    current_size: AtomicU64,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

const KEY_PREFIX: &str = "audio:";

fn storage_key(fingerprint: &Fingerprint) -> String {
    format!("{}{}", KEY_PREFIX, fingerprint.to_hex())
}

fn unavailable(e: impl std::fmt::Display) -> TierError {
    TierError::Unavailable(e.to_string())
}

impl SledCacheTier {
    /// 打开（或创建）共享缓存
    pub fn new(config: &SledCacheConfig) -> Result<Self, TierError> {
        let db = sled::open(&config.db_path).map_err(unavailable)?;
        let current_size = Self::calculate_total_size(&db)?;

        tracing::info!(
            db_path = %config.db_path,
            max_size_bytes = config.max_size_bytes,
            current_size = current_size,
            "SledCacheTier initialized"
        );

        Ok(Self {
            db,
            max_size_bytes: config.max_size_bytes,
            current_size: AtomicU64::new(current_size),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        })
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 启动时统计既有条目的总大小
    fn calculate_total_size(db: &Db) -> Result<u64, TierError> {
        let mut total = 0u64;
        for item in db.scan_prefix(KEY_PREFIX) {
            let (_, value) = item.map_err(unavailable)?;
            if let Ok(entry) = bincode::deserialize::<InternalEntry>(&value) {
                total += entry.size_bytes;
            }
        }
        Ok(total)
    }

    /// 淘汰 last_accessed 最旧的条目
    fn evict_lru(&self) -> Result<bool, TierError> {
        let mut oldest: Option<(Vec<u8>, InternalEntry)> = None;

        for item in self.db.scan_prefix(KEY_PREFIX) {
            let (key, value) = item.map_err(unavailable)?;
            if let Ok(entry) = bincode::deserialize::<InternalEntry>(&value) {
                let is_older = oldest
                    .as_ref()
                    .map(|(_, e)| entry.last_accessed < e.last_accessed)
                    .unwrap_or(true);
                if is_older {
                    oldest = Some((key.to_vec(), entry));
                }
            }
        }

        match oldest {
            Some((key, entry)) => {
                self.db.remove(&key).map_err(unavailable)?;
                self.current_size.fetch_sub(entry.size_bytes, Ordering::Relaxed);
                tracing::debug!(size_bytes = entry.size_bytes, "Shared tier LRU evicted entry");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 刷盘
    pub fn flush(&self) -> Result<(), TierError> {
        self.db.flush().map_err(unavailable)?;
        Ok(())
    }
}

#[async_trait]
impl CacheTierPort for SledCacheTier {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, TierError> {
        let key = storage_key(fingerprint);

        match self.db.get(&key).map_err(unavailable)? {
            Some(data) => {
                let mut entry: InternalEntry =
                    bincode::deserialize(&data).map_err(unavailable)?;

                // LRU touch
                entry.last_accessed = Utc::now().timestamp();
                entry.access_count += 1;
                let updated = bincode::serialize(&entry).map_err(unavailable)?;
                self.db.insert(&key, updated).map_err(unavailable)?;

                self.hit_count.fetch_add(1, Ordering::Relaxed);
                Ok(Some(CacheEntry {
                    payload: Bytes::from(entry.payload),
                    size_bytes: entry.size_bytes,
                    created_at: entry.created_at,
                    last_accessed: entry.last_accessed,
                    access_count: entry.access_count,
                }))
            }
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn put(&self, fingerprint: &Fingerprint, payload: Bytes) -> Result<(), TierError> {
        let size = payload.len() as u64;
        if size > self.max_size_bytes {
            return Err(TierError::EntryTooLarge {
                size,
                budget: self.max_size_bytes,
            });
        }

        let key = storage_key(fingerprint);

        // 幂等替换：先移除旧条目的大小占用
        if let Some(old) = self.db.get(&key).map_err(unavailable)? {
            if let Ok(old_entry) = bincode::deserialize::<InternalEntry>(&old) {
                self.current_size.fetch_sub(old_entry.size_bytes, Ordering::Relaxed);
            }
        }

        while self.current_size.load(Ordering::Relaxed) + size > self.max_size_bytes {
            if !self.evict_lru()? {
                break;
            }
        }

        let now = Utc::now().timestamp();
        let entry = InternalEntry {
            payload: payload.to_vec(),
            size_bytes: size,
            created_at: now,
            last_accessed: now,
            access_count: 0,
        };
        let encoded = bincode::serialize(&entry).map_err(unavailable)?;

        self.db.insert(&key, encoded).map_err(unavailable)?;
        self.current_size.fetch_add(size, Ordering::Relaxed);

        tracing::debug!(fingerprint = %fingerprint, size_bytes = size, "Audio cached in shared tier");
        Ok(())
    }

    async fn invalidate(&self, fingerprint: &Fingerprint) -> Result<(), TierError> {
        let key = storage_key(fingerprint);
        if let Some(data) = self.db.remove(&key).map_err(unavailable)? {
            if let Ok(entry) = bincode::deserialize::<InternalEntry>(&data) {
                self.current_size.fetch_sub(entry.size_bytes, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        let total_entries = self.db.scan_prefix(KEY_PREFIX).count();
        CacheStats {
            total_entries,
            total_size_bytes: self.current_size.load(Ordering::Relaxed),
            max_size_bytes: self.max_size_bytes,
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_cache(dir: &tempfile::TempDir, max_size_bytes: u64) -> SledCacheTier {
        SledCacheTier::new(&SledCacheConfig {
            db_path: dir.path().join("test.sled").to_string_lossy().to_string(),
            max_size_bytes,
        })
        .unwrap()
    }

    fn fp(label: &str) -> Fingerprint {
        Fingerprint::derive(label, "v1", "m1", "wav").unwrap()
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempdir().unwrap();
        let cache = open_cache(&dir, 1024 * 1024);
        let key = fp("a");

        cache.put(&key, Bytes::from(vec![1, 2, 3, 4, 5])).await.unwrap();
        let entry = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(entry.payload, Bytes::from(vec![1, 2, 3, 4, 5]));
        assert_eq!(entry.access_count, 1);

        let stats = cache.stats().await;
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.hit_count, 1);
    }

    #[tokio::test]
    async fn test_miss_returns_none() {
        let dir = tempdir().unwrap();
        let cache = open_cache(&dir, 1024);
        assert!(cache.get(&fp("missing")).await.unwrap().is_none());
        assert_eq!(cache.stats().await.miss_count, 1);
    }

    #[tokio::test]
    async fn test_budget_enforced_with_eviction() {
        let dir = tempdir().unwrap();
        let cache = open_cache(&dir, 1000);

        for i in 0..5 {
            cache
                .put(&fp(&format!("k{}", i)), Bytes::from(vec![i as u8; 400]))
                .await
                .unwrap();
            assert!(cache.stats().await.total_size_bytes <= 1000);
        }
    }

    #[tokio::test]
    async fn test_oversized_entry_rejected() {
        let dir = tempdir().unwrap();
        let cache = open_cache(&dir, 100);

        let err = cache
            .put(&fp("huge"), Bytes::from(vec![0u8; 200]))
            .await
            .unwrap_err();
        assert!(matches!(err, TierError::EntryTooLarge { .. }));
        assert_eq!(cache.stats().await.total_entries, 0);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let dir = tempdir().unwrap();
        let cache = open_cache(&dir, 1024);
        let key = fp("x");

        cache.put(&key, Bytes::from(vec![7u8; 10])).await.unwrap();
        cache.invalidate(&key).await.unwrap();
        assert!(cache.get(&key).await.unwrap().is_none());
        assert_eq!(cache.stats().await.total_size_bytes, 0);
    }

    #[tokio::test]
    async fn test_size_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("persist.sled");
        let config = SledCacheConfig {
            db_path: path.to_string_lossy().to_string(),
            max_size_bytes: 1024 * 1024,
        };

        {
            let cache = SledCacheTier::new(&config).unwrap();
            cache.put(&fp("keep"), Bytes::from(vec![1u8; 64])).await.unwrap();
            cache.flush().unwrap();
        }

        let reopened = SledCacheTier::new(&config).unwrap();
        assert_eq!(reopened.stats().await.total_size_bytes, 64);
        assert!(reopened.get(&fp("keep")).await.unwrap().is_some());
    }
}
