//! Synthesis Orchestrator - 合成编排器
//!
//! 对上层暴露的唯一入口：synthesize(text, voice) -> 块序列。
//!
//! 解析路径：指纹 → 本地缓存 → 共享缓存（限时）→ 熔断门控 + 重试的
//! provider 调用 → 双层回写 → 分块装配。
//!
//! 并发保证：同一指纹的并发请求合并为一次 provider 调用，结果扇出给
//! 所有等待者。leader 的实际工作跑在独立任务上，调用方取消不会连累
//! 其他等待者，已在途的 provider 调用照常回填缓存。

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::application::error::SynthesisError;
use crate::application::ports::{
    AudioFormat, CacheTierPort, SynthesisJob, SynthesizerPort, TierError,
};
use crate::application::resilience::{CircuitBreaker, RetryPolicy};
use crate::application::stream::{ChunkStream, StreamAssembler};
use crate::domain::Fingerprint;

/// 编排器配置
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// 合成使用的模型标识
    pub model: String,
    /// 输出音频格式
    pub format: AudioFormat,
    /// 共享层单次调用的超时
    pub shared_tier_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            format: AudioFormat::Wav,
            shared_tier_timeout: Duration::from_millis(200),
        }
    }
}

/// 单次合成请求
///
/// 每次调用创建、完成即丢弃，不跨调用共享
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    /// 调用方取消信号；取消只影响本调用方的等待
    pub cancel: CancellationToken,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: voice.into(),
            cancel: CancellationToken::new(),
        }
    }
}

type SharedResult = Result<Bytes, SynthesisError>;

/// 合成编排器
///
/// 可廉价 Clone 的句柄；全部共享状态在内部 Arc 中
#[derive(Clone)]
pub struct SynthesisOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: OrchestratorConfig,
    local_cache: Arc<dyn CacheTierPort>,
    shared_cache: Option<Arc<dyn CacheTierPort>>,
    synthesizer: Arc<dyn SynthesizerPort>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    assembler: StreamAssembler,
    /// 在途合并表：fingerprint → 结果广播端
    in_flight: DashMap<Fingerprint, broadcast::Sender<SharedResult>>,
}

impl SynthesisOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        local_cache: Arc<dyn CacheTierPort>,
        shared_cache: Option<Arc<dyn CacheTierPort>>,
        synthesizer: Arc<dyn SynthesizerPort>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        assembler: StreamAssembler,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                local_cache,
                shared_cache,
                synthesizer,
                breaker,
                retry,
                assembler,
                in_flight: DashMap::new(),
            }),
        }
    }

    /// 合成入口
    pub async fn synthesize(
        &self,
        request: SynthesisRequest,
    ) -> Result<ChunkStream, SynthesisError> {
        let fingerprint = Fingerprint::derive(
            &request.text,
            &request.voice,
            &self.inner.config.model,
            self.inner.config.format.as_str(),
        )
        .map_err(|e| SynthesisError::InvalidInput(e.to_string()))?;

        let payload = self.resolve_payload(&fingerprint, &request).await?;
        Ok(self.inner.assembler.assemble(payload))
    }

    /// 按指纹删除两层缓存中的条目
    pub async fn invalidate(&self, text: &str, voice: &str) -> Result<(), SynthesisError> {
        let fingerprint = Fingerprint::derive(
            text,
            voice,
            &self.inner.config.model,
            self.inner.config.format.as_str(),
        )
        .map_err(|e| SynthesisError::InvalidInput(e.to_string()))?;

        if let Err(e) = self.inner.local_cache.invalidate(&fingerprint).await {
            tracing::warn!(fingerprint = %fingerprint, error = %e, "Local invalidate failed");
        }
        if let Some(shared) = &self.inner.shared_cache {
            if let Err(e) = shared.invalidate(&fingerprint).await {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "Shared invalidate failed");
            }
        }
        Ok(())
    }

    /// 解析音频 payload（缓存或新合成）
    async fn resolve_payload(
        &self,
        fingerprint: &Fingerprint,
        request: &SynthesisRequest,
    ) -> Result<Bytes, SynthesisError> {
        // 1. 本地缓存；层故障降级为 miss
        match self.inner.local_cache.get(fingerprint).await {
            Ok(Some(entry)) => {
                tracing::debug!(fingerprint = %fingerprint, "Local cache hit");
                return Ok(entry.payload);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "Local cache get failed");
            }
        }

        // 2. 共享缓存（限时）；Miss / Unavailable / 超时都落到合成
        if let Some(payload) = self.inner.try_shared_get(fingerprint).await {
            // 写透到本地层，后续请求走快路径
            if let Err(e) = self
                .inner
                .local_cache
                .put(fingerprint, payload.clone())
                .await
            {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "Local write-through failed");
            }
            return Ok(payload);
        }

        // 3. 合并的 provider 路径
        self.coalesced_synthesis(fingerprint, request).await
    }

    /// 同一指纹的并发请求合并为一次 provider 调用
    async fn coalesced_synthesis(
        &self,
        fingerprint: &Fingerprint,
        request: &SynthesisRequest,
    ) -> Result<Bytes, SynthesisError> {
        // entry API 在分片锁内完成 check-and-insert，保证恰好一个 leader。
        // 守卫不跨 await 持有。
        let mut receiver = match self.inner.in_flight.entry(*fingerprint) {
            Entry::Occupied(occupied) => occupied.get().subscribe(),
            Entry::Vacant(vacant) => {
                let (tx, rx) = broadcast::channel(1);
                vacant.insert(tx.clone());

                let inner = self.inner.clone();
                let fingerprint = *fingerprint;
                let job = SynthesisJob {
                    text: request.text.clone(),
                    voice: request.voice.clone(),
                    model: self.inner.config.model.clone(),
                    format: self.inner.config.format,
                };
                // 独立任务：调用方取消后仍完成合成并回填缓存
                tokio::spawn(async move {
                    let result = inner.lead_synthesis(&fingerprint, job).await;
                    // 先移除在途表再广播：迟到者重查缓存即可命中
                    inner.in_flight.remove(&fingerprint);
                    let _ = tx.send(result);
                });
                rx
            }
        };

        tokio::select! {
            outcome = receiver.recv() => match outcome {
                Ok(result) => result,
                // 广播端先于订阅消失：结果已写入缓存，重查一次
                Err(_) => match self.inner.local_cache.get(fingerprint).await {
                    Ok(Some(entry)) => Ok(entry.payload),
                    _ => Err(SynthesisError::SynthesisFailed {
                        attempts: 0,
                        cause: "In-flight synthesis result lost".to_string(),
                    }),
                },
            },
            _ = request.cancel.cancelled() => Err(SynthesisError::Cancelled),
        }
    }
}

impl Inner {
    /// 共享层查找，限定超时
    async fn try_shared_get(&self, fingerprint: &Fingerprint) -> Option<Bytes> {
        let shared = self.shared_cache.as_ref()?;
        match tokio::time::timeout(self.config.shared_tier_timeout, shared.get(fingerprint)).await
        {
            Ok(Ok(Some(entry))) => {
                tracing::debug!(fingerprint = %fingerprint, "Shared cache hit");
                Some(entry.payload)
            }
            Ok(Ok(None)) => None,
            Ok(Err(TierError::Unavailable(reason))) => {
                tracing::warn!(fingerprint = %fingerprint, reason = %reason, "Shared tier unavailable");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "Shared cache get failed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    fingerprint = %fingerprint,
                    timeout_ms = self.config.shared_tier_timeout.as_millis() as u64,
                    "Shared cache get timed out"
                );
                None
            }
        }
    }

    /// leader 路径：熔断门控 → 重试 → 双层回写
    ///
    /// 整个重试序列只向熔断器上报一次最终结果
    async fn lead_synthesis(&self, fingerprint: &Fingerprint, job: SynthesisJob) -> SharedResult {
        if self.breaker.acquire().is_err() {
            tracing::warn!(fingerprint = %fingerprint, "Circuit open, failing fast");
            return Err(SynthesisError::CircuitOpen);
        }

        let synthesizer = self.synthesizer.clone();
        let outcome = self
            .retry
            .run(|| {
                let synthesizer = synthesizer.clone();
                let job = job.clone();
                async move { synthesizer.call(&job).await }
            })
            .await;

        match outcome {
            Ok(payload) => {
                self.breaker.record_success();
                self.write_back(fingerprint, &payload).await;
                tracing::info!(
                    fingerprint = %fingerprint,
                    audio_size = payload.len(),
                    "Synthesis completed"
                );
                Ok(payload)
            }
            Err(exhausted) => {
                self.breaker.record_failure();
                tracing::error!(
                    fingerprint = %fingerprint,
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "Synthesis failed"
                );
                Err(SynthesisError::SynthesisFailed {
                    attempts: exhausted.attempts,
                    cause: exhausted.last_error.to_string(),
                })
            }
        }
    }

    /// 回写两层缓存；任一层失败都不影响本次请求
    async fn write_back(&self, fingerprint: &Fingerprint, payload: &Bytes) {
        if let Err(e) = self.local_cache.put(fingerprint, payload.clone()).await {
            tracing::warn!(fingerprint = %fingerprint, error = %e, "Local cache put failed");
        }
        if let Some(shared) = &self.shared_cache {
            let write = shared.put(fingerprint, payload.clone());
            match tokio::time::timeout(self.config.shared_tier_timeout, write).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(fingerprint = %fingerprint, error = %e, "Shared cache put failed");
                }
                Err(_) => {
                    tracing::warn!(fingerprint = %fingerprint, "Shared cache put timed out");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::resilience::{BreakerConfig, RetryConfig};
    use crate::application::stream::{AudioChunk, StreamConfig};
    use crate::infrastructure::cache::MemoryCacheTier;
    use crate::infrastructure::synthesizer::{FakeOutcome, FakeSynthesizer};

    fn build(
        synthesizer: Arc<FakeSynthesizer>,
        breaker_config: BreakerConfig,
        with_shared: bool,
    ) -> (
        SynthesisOrchestrator,
        Arc<MemoryCacheTier>,
        Option<Arc<MemoryCacheTier>>,
    ) {
        let local = Arc::new(MemoryCacheTier::new(64 * 1024 * 1024));
        let shared = with_shared.then(|| Arc::new(MemoryCacheTier::new(64 * 1024 * 1024)));

        let retry = RetryPolicy::new(RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(10),
            jitter: (1.0, 1.0),
        });

        let orchestrator = SynthesisOrchestrator::new(
            OrchestratorConfig::default(),
            local.clone(),
            shared.clone().map(|s| s as Arc<dyn CacheTierPort>),
            synthesizer,
            Arc::new(CircuitBreaker::new(breaker_config)),
            retry,
            StreamAssembler::new(StreamConfig {
                min_chunk_bytes: 16,
                max_chunk_bytes: 64,
            }),
        );
        (orchestrator, local, shared)
    }

    async fn collect(
        orchestrator: &SynthesisOrchestrator,
        text: &str,
        voice: &str,
    ) -> Result<Vec<AudioChunk>, SynthesisError> {
        orchestrator
            .synthesize(SynthesisRequest::new(text, voice))
            .await
            .map(|s| s.collect())
    }

    #[tokio::test]
    async fn test_repeat_calls_hit_cache_provider_called_once() {
        let fake = FakeSynthesizer::with_payload(vec![7u8; 300]).arc();
        let (orchestrator, _, _) = build(fake.clone(), BreakerConfig::default(), false);

        let first = collect(&orchestrator, "hello world", "v1").await.unwrap();
        assert_eq!(fake.invocations(), 1);

        for _ in 0..5 {
            let again = collect(&orchestrator, "hello world", "v1").await.unwrap();
            assert_eq!(again, first);
        }
        assert_eq!(fake.invocations(), 1);
    }

    #[tokio::test]
    async fn test_cold_call_populates_both_tiers_and_ends_final() {
        let fake = FakeSynthesizer::with_payload(vec![3u8; 200]).arc();
        let (orchestrator, local, shared) = build(fake.clone(), BreakerConfig::default(), true);

        let chunks = collect(&orchestrator, "Bitcoin is decentralized.", "v1")
            .await
            .unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks.last().unwrap().is_final);
        assert_eq!(fake.invocations(), 1);

        let fp = Fingerprint::derive("Bitcoin is decentralized.", "v1", "default", "wav").unwrap();
        assert!(local.get(&fp).await.unwrap().is_some());
        assert!(shared.unwrap().get(&fp).await.unwrap().is_some());

        // 第二次调用完全由本地层服务
        let again = collect(&orchestrator, "Bitcoin is decentralized.", "v1")
            .await
            .unwrap();
        assert_eq!(again, chunks);
        assert_eq!(fake.invocations(), 1);
    }

    #[tokio::test]
    async fn test_shared_hit_writes_through_to_local() {
        let fake = FakeSynthesizer::with_payload(vec![9u8; 128]).arc();
        let (orchestrator, local, shared) = build(fake.clone(), BreakerConfig::default(), true);
        let shared = shared.unwrap();

        let fp = Fingerprint::derive("warm in shared", "v1", "default", "wav").unwrap();
        shared.put(&fp, Bytes::from(vec![9u8; 128])).await.unwrap();

        let chunks = collect(&orchestrator, "warm in shared", "v1").await.unwrap();
        assert_eq!(fake.invocations(), 0);
        assert!(chunks.last().unwrap().is_final);
        assert!(local.get(&fp).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_coalescing_concurrent_requests_single_provider_call() {
        let fake = FakeSynthesizer::with_payload(vec![5u8; 256])
            .with_latency(Duration::from_millis(80))
            .arc();
        let (orchestrator, _, _) = build(fake.clone(), BreakerConfig::default(), false);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let orchestrator = orchestrator.clone();
            handles.push(tokio::spawn(async move {
                collect(&orchestrator, "same text", "v1").await
            }));
        }

        let mut payloads = Vec::new();
        for h in handles {
            let chunks = h.await.unwrap().unwrap();
            let mut bytes = Vec::new();
            for c in &chunks {
                bytes.extend_from_slice(&c.data);
            }
            payloads.push(bytes);
        }

        assert_eq!(fake.invocations(), 1);
        assert!(payloads.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failures() {
        let fake = FakeSynthesizer::with_payload(vec![1u8; 64])
            .script(vec![
                FakeOutcome::Transient,
                FakeOutcome::Transient,
                FakeOutcome::Success,
            ])
            .arc();
        let (orchestrator, _, _) = build(fake.clone(), BreakerConfig::default(), false);

        let chunks = collect(&orchestrator, "flaky provider", "v1").await.unwrap();
        assert!(chunks.last().unwrap().is_final);
        assert_eq!(fake.invocations(), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_fails_without_retry() {
        let fake = FakeSynthesizer::with_payload(vec![1u8; 64])
            .script(vec![FakeOutcome::Permanent])
            .arc();
        let (orchestrator, _, _) = build(fake.clone(), BreakerConfig::default(), false);

        let err = collect(&orchestrator, "bad auth", "v1").await.unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::SynthesisFailed { attempts: 1, .. }
        ));
        assert_eq!(fake.invocations(), 1);
    }

    #[tokio::test]
    async fn test_breaker_opens_after_threshold_then_fails_fast() {
        // 每个请求重试耗尽后作为一次失败上报；阈值 3 → 前 3 个请求
        // 打开熔断，第 4、5 个请求不再触达 provider
        let fake = FakeSynthesizer::with_payload(vec![1u8; 64])
            .script(vec![FakeOutcome::Timeout; 64])
            .arc();
        let breaker_config = BreakerConfig {
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
            half_open_trials: 1,
        };
        let (orchestrator, _, _) = build(fake.clone(), breaker_config, false);

        for i in 0..3 {
            let err = collect(&orchestrator, &format!("text {}", i), "v1")
                .await
                .unwrap_err();
            assert!(matches!(err, SynthesisError::SynthesisFailed { .. }));
        }
        let invocations_when_open = fake.invocations();

        for i in 3..5 {
            let err = collect(&orchestrator, &format!("text {}", i), "v1")
                .await
                .unwrap_err();
            assert!(matches!(err, SynthesisError::CircuitOpen));
        }
        assert_eq!(fake.invocations(), invocations_when_open);
    }

    #[tokio::test]
    async fn test_breaker_trial_recovers_after_cooldown() {
        let fake = FakeSynthesizer::with_payload(vec![2u8; 64])
            .script(vec![FakeOutcome::Permanent, FakeOutcome::Success])
            .arc();
        let breaker_config = BreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::from_millis(30),
            half_open_trials: 1,
        };
        let (orchestrator, _, _) = build(fake.clone(), breaker_config, false);

        let _ = collect(&orchestrator, "first", "v1").await.unwrap_err();
        assert!(matches!(
            collect(&orchestrator, "second", "v1").await.unwrap_err(),
            SynthesisError::CircuitOpen
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;

        // 冷却后的试探调用成功，熔断闭合
        let chunks = collect(&orchestrator, "third", "v1").await.unwrap();
        assert!(chunks.last().unwrap().is_final);
        assert_eq!(fake.invocations(), 2);
    }

    #[tokio::test]
    async fn test_invalid_input_surfaces_immediately() {
        let fake = FakeSynthesizer::with_payload(vec![1u8; 8]).arc();
        let (orchestrator, _, _) = build(fake.clone(), BreakerConfig::default(), false);

        let err = collect(&orchestrator, "   ", "v1").await.unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidInput(_)));
        assert_eq!(fake.invocations(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_fail_others() {
        let fake = FakeSynthesizer::with_payload(vec![4u8; 64])
            .with_latency(Duration::from_millis(80))
            .arc();
        let (orchestrator, _, _) = build(fake.clone(), BreakerConfig::default(), false);

        let cancelled = SynthesisRequest::new("shared text", "v1");
        let token = cancelled.cancel.clone();
        let o1 = orchestrator.clone();
        let h1 = tokio::spawn(async move { o1.synthesize(cancelled).await.map(|s| s.count()) });

        let o2 = orchestrator.clone();
        let h2 = tokio::spawn(async move { collect(&o2, "shared text", "v1").await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        assert!(matches!(h1.await.unwrap(), Err(SynthesisError::Cancelled)));
        let chunks = h2.await.unwrap().unwrap();
        assert!(chunks.last().unwrap().is_final);
        assert_eq!(fake.invocations(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_resynthesis() {
        let fake = FakeSynthesizer::with_payload(vec![6u8; 64]).arc();
        let (orchestrator, _, _) = build(fake.clone(), BreakerConfig::default(), true);

        collect(&orchestrator, "evict me", "v1").await.unwrap();
        assert_eq!(fake.invocations(), 1);

        orchestrator.invalidate("evict me", "v1").await.unwrap();

        collect(&orchestrator, "evict me", "v1").await.unwrap();
        assert_eq!(fake.invocations(), 2);
    }
}
