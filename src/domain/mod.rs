//! Domain Layer
//!
//! 纯领域逻辑：文本归一化与合成指纹派生

pub mod fingerprint;

pub use fingerprint::{Fingerprint, FingerprintError};
