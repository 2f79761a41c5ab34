//! Infrastructure Layer
//!
//! - Cache: 内存与 sled 缓存层适配器
//! - Synthesizer: HTTP / Fake 合成客户端
//! - HTTP: axum API 服务

pub mod cache;
pub mod http;
pub mod synthesizer;
