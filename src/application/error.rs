//! 应用层错误定义
//!
//! 合成管线对调用方暴露的统一错误分类。缓存层故障不在此列——
//! 它们在管线内部被吸收并降级为 miss。

use thiserror::Error;

/// 合成错误
///
/// 所有变体都是可恢复的调用边界错误，任何一个都不会使进程崩溃。
/// 字段保持 `Clone`，以便同一结果能广播给所有合并等待者。
#[derive(Debug, Clone, Error)]
pub enum SynthesisError {
    /// 输入无效（归一化后文本为空等），不重试，立即返回
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 熔断器打开，未发起任何 provider 调用
    #[error("Provider unavailable: circuit breaker is open")]
    CircuitOpen,

    /// 重试预算耗尽或遇到永久性失败
    #[error("Synthesis failed after {attempts} attempt(s): {cause}")]
    SynthesisFailed { attempts: u32, cause: String },

    /// 调用方取消了请求
    #[error("Request cancelled by caller")]
    Cancelled,
}
