//! Resilience - 弹性原语
//!
//! 熔断器与重试策略，供编排器组合使用

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{
    Admission, BreakerConfig, BreakerState, CircuitBreaker, CircuitOpen,
};
pub use retry::{RetryConfig, RetryExhausted, RetryPolicy};
