//! Circuit Breaker - Provider 熔断器
//!
//! 跟踪 provider 健康状态，门控调用，实现 half-open 试探：
//! - Closed: 放行；连续失败达到阈值后转 Open
//! - Open: 立即拒绝；冷却期过后放行一次试探并转 HalfOpen
//! - HalfOpen: 试探成功转 Closed，失败转回 Open 并重置冷却计时
//!
//! 熔断器是进程级共享状态，状态迁移对并发调用方原子可见。

use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// 熔断器拒绝
#[derive(Debug, Clone, Error)]
#[error("Circuit breaker is open")]
pub struct CircuitOpen;

/// 熔断器配置
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// 连续失败阈值，达到后打开熔断
    pub failure_threshold: u32,
    /// Open 状态的冷却时间
    pub cooldown: Duration,
    /// HalfOpen 状态同时放行的试探数
    pub half_open_trials: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
            half_open_trials: 1,
        }
    }
}

/// 熔断器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// 被放行的调用类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Closed 状态下的正常调用
    Normal,
    /// HalfOpen 状态下的试探调用
    Trial,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    /// 最近一次状态迁移时间（Open 冷却计时基准）
    transitioned_at: Instant,
    /// HalfOpen 下在途试探数
    trials_in_flight: u32,
}

/// 熔断器
///
/// 状态与计数器在同一把锁下迁移；锁内不做任何 await
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                transitioned_at: Instant::now(),
                trials_in_flight: 0,
            }),
        }
    }

    /// 申请放行一次调用
    ///
    /// Open 且冷却未到时返回 `CircuitOpen`，不会有任何调用到达 provider
    pub fn acquire(&self) -> Result<Admission, CircuitOpen> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed => Ok(Admission::Normal),
            BreakerState::Open => {
                if inner.transitioned_at.elapsed() >= self.config.cooldown {
                    inner.state = BreakerState::HalfOpen;
                    inner.transitioned_at = Instant::now();
                    inner.trials_in_flight = 1;
                    tracing::info!("Circuit breaker half-open, admitting trial call");
                    Ok(Admission::Trial)
                } else {
                    Err(CircuitOpen)
                }
            }
            BreakerState::HalfOpen => {
                if inner.trials_in_flight < self.config.half_open_trials {
                    inner.trials_in_flight += 1;
                    Ok(Admission::Trial)
                } else {
                    Err(CircuitOpen)
                }
            }
        }
    }

    /// 上报一次调用的最终成功
    ///
    /// 整个重试序列只上报一次最终结果，中间尝试不计入
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.consecutive_failures = 0;
                inner.trials_in_flight = 0;
                inner.transitioned_at = Instant::now();
                tracing::info!("Circuit breaker closed after successful trial");
            }
            // Open 下不应有在途调用；保守忽略
            BreakerState::Open => {}
        }
    }

    /// 上报一次调用的最终失败
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.transitioned_at = Instant::now();
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        cooldown_secs = self.config.cooldown.as_secs_f64(),
                        "Circuit breaker opened"
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.trials_in_flight = 0;
                inner.transitioned_at = Instant::now();
                tracing::warn!("Circuit breaker re-opened after failed trial");
            }
            BreakerState::Open => {}
        }
    }

    /// 当前状态（诊断用）
    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker lock poisoned").state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_millis(cooldown_ms),
            half_open_trials: 1,
        })
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let b = breaker(3, 1000);
        for _ in 0..2 {
            assert!(b.acquire().is_ok());
            b.record_failure();
        }
        assert_eq!(b.state(), BreakerState::Closed);

        assert!(b.acquire().is_ok());
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(b.acquire().is_err());
    }

    #[test]
    fn test_success_resets_failure_counter() {
        let b = breaker(3, 1000);
        b.acquire().unwrap();
        b.record_failure();
        b.acquire().unwrap();
        b.record_failure();
        b.acquire().unwrap();
        b.record_success();

        // 计数归零，需要重新累计满 3 次才会打开
        for _ in 0..2 {
            b.acquire().unwrap();
            b.record_failure();
        }
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn test_cooldown_admits_single_trial() {
        let b = breaker(1, 30);
        b.acquire().unwrap();
        b.record_failure();
        assert!(b.acquire().is_err());

        std::thread::sleep(Duration::from_millis(50));

        // 冷却期过后恰好放行一个试探，其余调用仍被拒绝
        let admission = b.acquire().unwrap();
        assert_eq!(admission, Admission::Trial);
        assert_eq!(b.state(), BreakerState::HalfOpen);
        assert!(b.acquire().is_err());
    }

    #[test]
    fn test_trial_success_closes() {
        let b = breaker(1, 10);
        b.acquire().unwrap();
        b.record_failure();
        std::thread::sleep(Duration::from_millis(30));

        b.acquire().unwrap();
        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.acquire().is_ok());
    }

    #[test]
    fn test_trial_failure_reopens_and_restarts_cooldown() {
        let b = breaker(1, 30);
        b.acquire().unwrap();
        b.record_failure();
        std::thread::sleep(Duration::from_millis(50));

        b.acquire().unwrap();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(b.acquire().is_err());

        std::thread::sleep(Duration::from_millis(50));
        assert!(b.acquire().is_ok());
    }

    #[test]
    fn test_concurrent_failures_open_once() {
        use std::sync::Arc;

        let b = Arc::new(breaker(8, 1000));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let b = b.clone();
            handles.push(std::thread::spawn(move || {
                if b.acquire().is_ok() {
                    b.record_failure();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(b.state(), BreakerState::Open);
    }
}
