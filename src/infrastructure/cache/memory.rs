//! In-Memory LRU Cache Tier - 本地快路径缓存
//!
//! 按字节预算（而非条目数）约束的进程内缓存。recency 索引是自有的
//! 显式结构：严格单调的逻辑时钟 + BTreeMap，而不是依赖某个容器的
//! 插入顺序语义。索引与条目集在同一把锁下保持一致：每个存活条目
//! 恰好占据一个索引位置，任何 insert/evict 步骤完成后常驻字节数
//! 不超过预算。

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::application::ports::{CacheEntry, CacheStats, CacheTierPort, TierError};
use crate::domain::Fingerprint;

#[derive(Debug)]
struct StoredEntry {
    payload: Bytes,
    size_bytes: u64,
    created_at: i64,
    last_accessed: i64,
    access_count: u64,
    /// recency 索引中的位置（逻辑时钟值）
    recency_seq: u64,
}

#[derive(Debug, Default)]
struct TierInner {
    entries: HashMap<Fingerprint, StoredEntry>,
    /// 逻辑时钟值 → 指纹；最小键即 LRU
    recency: BTreeMap<u64, Fingerprint>,
    total_bytes: u64,
    /// 严格单调的 recency 时钟；每次写入与命中都会推进，
    /// 因此索引键唯一，淘汰顺序与容器迭代行为无关
    clock: u64,
}

/// 内存缓存层
pub struct MemoryCacheTier {
    max_size_bytes: u64,
    inner: Mutex<TierInner>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl MemoryCacheTier {
    pub fn new(max_size_bytes: u64) -> Self {
        Self {
            max_size_bytes,
            inner: Mutex::new(TierInner::default()),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        }
    }

    pub fn arc(self) -> std::sync::Arc<Self> {
        std::sync::Arc::new(self)
    }
}

impl TierInner {
    fn touch(&mut self, fingerprint: &Fingerprint) {
        self.clock += 1;
        let seq = self.clock;
        if let Some(entry) = self.entries.get_mut(fingerprint) {
            self.recency.remove(&entry.recency_seq);
            entry.recency_seq = seq;
            self.recency.insert(seq, *fingerprint);
        }
    }

    fn remove(&mut self, fingerprint: &Fingerprint) -> Option<StoredEntry> {
        let entry = self.entries.remove(fingerprint)?;
        self.recency.remove(&entry.recency_seq);
        self.total_bytes -= entry.size_bytes;
        Some(entry)
    }

    /// 淘汰 LRU 条目；返回被淘汰条目的指纹
    fn evict_lru(&mut self) -> Option<Fingerprint> {
        let (&_, &victim) = self.recency.iter().next()?;
        self.remove(&victim);
        Some(victim)
    }
}

#[async_trait]
impl CacheTierPort for MemoryCacheTier {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, TierError> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");

        if !inner.entries.contains_key(fingerprint) {
            self.miss_count.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        inner.touch(fingerprint);
        let entry = inner
            .entries
            .get_mut(fingerprint)
            .expect("entry present after touch");
        entry.last_accessed = Utc::now().timestamp();
        entry.access_count += 1;

        self.hit_count.fetch_add(1, Ordering::Relaxed);
        Ok(Some(CacheEntry {
            payload: entry.payload.clone(),
            size_bytes: entry.size_bytes,
            created_at: entry.created_at,
            last_accessed: entry.last_accessed,
            access_count: entry.access_count,
        }))
    }

    async fn put(&self, fingerprint: &Fingerprint, payload: Bytes) -> Result<(), TierError> {
        let size = payload.len() as u64;
        if size > self.max_size_bytes {
            // 单条目超过整层预算：拒绝，绝不允许为其超出预算
            return Err(TierError::EntryTooLarge {
                size,
                budget: self.max_size_bytes,
            });
        }

        let mut inner = self.inner.lock().expect("cache lock poisoned");

        // 幂等替换：旧条目整体让位
        inner.remove(fingerprint);

        while inner.total_bytes + size > self.max_size_bytes {
            match inner.evict_lru() {
                Some(victim) => {
                    tracing::debug!(evicted = %victim, "LRU evicted cache entry");
                }
                None => break,
            }
        }

        inner.clock += 1;
        let seq = inner.clock;
        let now = Utc::now().timestamp();
        inner.recency.insert(seq, *fingerprint);
        inner.entries.insert(
            *fingerprint,
            StoredEntry {
                payload,
                size_bytes: size,
                created_at: now,
                last_accessed: now,
                access_count: 0,
                recency_seq: seq,
            },
        );
        inner.total_bytes += size;

        Ok(())
    }

    async fn invalidate(&self, fingerprint: &Fingerprint) -> Result<(), TierError> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.remove(fingerprint);
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("cache lock poisoned");
        CacheStats {
            total_entries: inner.entries.len(),
            total_size_bytes: inner.total_bytes,
            max_size_bytes: self.max_size_bytes,
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }
}
