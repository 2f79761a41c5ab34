//! Retry Policy - 有界指数退避重试
//!
//! 包裹单次逻辑合成调用：
//! - 可重试失败（超时、瞬时错误）按 `min(base * multiplier^(n-1), cap)`
//!   乘以抖动因子等待后重试，最多 max_attempts 次
//! - 永久性失败立即返回，不消耗重试预算
//! - 重试循环本身不向熔断器上报，只有整个序列的最终结果计为一次

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::application::ports::ProviderError;

/// 重试配置
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 首次重试前的基础延迟
    pub base_delay: Duration,
    /// 指数退避倍率
    pub multiplier: f64,
    /// 单次延迟上限
    pub max_delay: Duration,
    /// 抖动因子区间（乘性），如 (0.8, 1.2)
    pub jitter: (f64, f64),
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            jitter: (0.8, 1.2),
        }
    }
}

/// 重试耗尽后的终态
#[derive(Debug, Clone)]
pub struct RetryExhausted {
    /// 实际执行的尝试次数
    pub attempts: u32,
    /// 最后一次失败
    pub last_error: ProviderError,
}

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// 第 attempt 次失败后的退避延迟（不含抖动），attempt 从 1 开始
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.config.multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = self.config.base_delay.as_millis() as f64 * exp;
        let capped = millis.min(self.config.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let (lo, hi) = self.config.jitter;
        if hi <= lo {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(lo..hi);
        Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
    }

    /// 执行带重试的调用
    pub async fn run<T, F, Fut>(&self, mut call: F) -> Result<T, RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max = self.config.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max => {
                    let delay = self.jittered(self.backoff_for_attempt(attempt));
                    tracing::warn!(
                        attempt,
                        max_attempts = max,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Synthesis attempt failed, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: err,
                    });
                }
            }
        }
    }
}
