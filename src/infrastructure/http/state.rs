//! Application State

use std::sync::Arc;

use crate::application::ports::{AudioFormat, CacheTierPort};
use crate::application::SynthesisOrchestrator;

/// 应用状态
pub struct AppState {
    pub orchestrator: SynthesisOrchestrator,
    pub local_cache: Arc<dyn CacheTierPort>,
    pub shared_cache: Option<Arc<dyn CacheTierPort>>,
    /// 响应 Content-Type 所需的输出格式
    pub output_format: AudioFormat,
}

impl AppState {
    pub fn new(
        orchestrator: SynthesisOrchestrator,
        local_cache: Arc<dyn CacheTierPort>,
        shared_cache: Option<Arc<dyn CacheTierPort>>,
        output_format: AudioFormat,
    ) -> Self {
        Self {
            orchestrator,
            local_cache,
            shared_cache,
            output_format,
        }
    }
}
