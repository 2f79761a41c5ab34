//! Synthesizer Adapters - 合成 provider 适配器

mod fake_synthesizer;
mod http_synthesizer;

pub use fake_synthesizer::{FakeOutcome, FakeSynthesizer};
pub use http_synthesizer::{HttpSynthesizer, HttpSynthesizerConfig};
