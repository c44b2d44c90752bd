use thiserror::Error;

/// 流水线各阶段的错误
#[derive(Error, Debug)]
pub enum FaceError {
    /// 上传内容无法写入临时目录
    #[error("failed to store uploaded image: {0}")]
    StorageWrite(#[source] std::io::Error),
    #[error("no face detected")]
    NoFaceDetected,
    /// 图片损坏或格式不受支持
    #[error("failed to process image: {0}")]
    Extraction(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// 模型文件缺失或无法加载
    #[error("face model unavailable: {0}")]
    ModelUnavailable(String),
    /// 模型推理失败，与上传内容无关
    #[error("face model inference failed: {0}")]
    Inference(String),
    #[error("failed to write to vector index: {0}")]
    IndexWrite(String),
    #[error("failed to query vector index: {0}")]
    IndexQuery(String),
    #[error("vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl FaceError {
    /// 错误类型名称，用于响应体与指标标签
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StorageWrite(_) => "StorageWriteError",
            Self::NoFaceDetected => "NoFaceDetected",
            Self::Extraction(_) => "ExtractionError",
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::ModelUnavailable(_) => "ModelUnavailable",
            Self::Inference(_) => "InferenceError",
            Self::IndexWrite(_) => "IndexWriteError",
            Self::IndexQuery(_) => "IndexQueryError",
            Self::DimensionMismatch { .. } => "DimensionMismatchError",
        }
    }

    /// 是否可以由调用方修正（对应 4xx）
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NoFaceDetected | Self::Extraction(_) | Self::InvalidRequest(_))
    }
}

pub type Result<T, E = FaceError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors() {
        assert!(FaceError::NoFaceDetected.is_client_error());
        assert!(FaceError::Extraction("truncated".into()).is_client_error());
        assert!(!FaceError::IndexWrite("connection refused".into()).is_client_error());
        assert!(!FaceError::Inference("session run failed".into()).is_client_error());
        assert!(!FaceError::DimensionMismatch { expected: 512, actual: 128 }.is_client_error());
    }

    #[test]
    fn dimension_mismatch_message() {
        let err = FaceError::DimensionMismatch { expected: 512, actual: 128 };
        assert_eq!(err.to_string(), "vector dimension mismatch: index expects 512, got 128");
        assert_eq!(err.kind(), "DimensionMismatchError");
    }
}
