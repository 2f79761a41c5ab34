//! Fake Synthesizer - 用于测试的合成客户端
//!
//! 返回确定性的音频字节，不实际调用 provider。
//! 支持按脚本注入失败序列，并统计被调用次数——
//! 重试、熔断与合并的可测性都依赖这个计数器。

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::application::ports::{ProviderError, SynthesisJob, SynthesizerPort};

/// 单次调用的脚本化结果
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    Success,
    Timeout,
    Transient,
    Permanent,
}

/// Fake 合成客户端
pub struct FakeSynthesizer {
    payload: Bytes,
    latency: Duration,
    /// 预设的调用结果；耗尽后默认 Success
    script: Mutex<VecDeque<FakeOutcome>>,
    invocations: AtomicU32,
}

impl FakeSynthesizer {
    pub fn with_payload(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: Bytes::from(payload.into()),
            latency: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            invocations: AtomicU32::new(0),
        }
    }

    /// 模拟推理延迟
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// 预设每次调用的结果序列
    pub fn script(self, outcomes: Vec<FakeOutcome>) -> Self {
        *self.script.lock().expect("script lock poisoned") = outcomes.into();
        self
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// provider 被实际调用的次数
    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesizerPort for FakeSynthesizer {
    async fn call(&self, job: &SynthesisJob) -> Result<Bytes, ProviderError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(
            text_len = job.text.len(),
            voice = %job.voice,
            "FakeSynthesizer invoked"
        );

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = self
            .script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or(FakeOutcome::Success);

        match outcome {
            FakeOutcome::Success => Ok(self.payload.clone()),
            FakeOutcome::Timeout => Err(ProviderError::Timeout),
            FakeOutcome::Transient => {
                Err(ProviderError::Transient("scripted transient failure".into()))
            }
            FakeOutcome::Permanent => {
                Err(ProviderError::Permanent("scripted permanent failure".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::AudioFormat;

    fn job() -> SynthesisJob {
        SynthesisJob {
            text: "hello".into(),
            voice: "v1".into(),
            model: "m1".into(),
            format: AudioFormat::Wav,
        }
    }

    #[tokio::test]
    async fn test_counts_invocations_and_follows_script() {
        let fake = FakeSynthesizer::with_payload(vec![1, 2, 3])
            .script(vec![FakeOutcome::Transient, FakeOutcome::Success]);

        assert!(fake.call(&job()).await.is_err());
        assert_eq!(fake.call(&job()).await.unwrap(), Bytes::from(vec![1, 2, 3]));
        // 脚本耗尽后默认成功
        assert!(fake.call(&job()).await.is_ok());
        assert_eq!(fake.invocations(), 3);
    }
}
