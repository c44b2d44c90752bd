use std::sync::Arc;

use crate::index::IndexBackend;
use crate::pipeline::Pipeline;

/// 应用状态
pub struct AppState {
    /// 请求流水线
    pub pipeline: Pipeline<IndexBackend>,
    /// 上传大小限制，单位为字节
    pub body_limit: usize,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(pipeline: Pipeline<IndexBackend>, body_limit: usize) -> Arc<Self> {
        Arc::new(AppState { pipeline, body_limit })
    }
}
