//! HTTP Handlers

mod cache;
mod ping;
mod speech;

pub use cache::{cache_stats, invalidate};
pub use ping::ping;
pub use speech::synthesize;
