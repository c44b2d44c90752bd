use axum::body::Bytes;
use axum_typed_multipart::{BaseMultipart, FieldData, TryFromMultipart};
use serde::Serialize;
use utoipa::ToSchema;

use super::error::AppError;
use crate::artifact::UploadedImage;

/// 表单解析失败时同样返回 `{"error", "kind"}` 格式的错误
pub type Multipart<T> = BaseMultipart<T, AppError>;

/// 只包含一张图片的请求
#[derive(TryFromMultipart)]
pub struct ImageRequest {
    pub file: FieldData<Bytes>,
}

/// 录入人脸的请求
#[derive(TryFromMultipart)]
pub struct AddFaceRequest {
    pub file: FieldData<Bytes>,
    pub name: String,
}

/// 将上传的文件转换为流水线的输入
pub fn uploaded(file: FieldData<Bytes>) -> UploadedImage {
    let FieldData { metadata, contents } = file;
    UploadedImage { bytes: contents, content_type: metadata.content_type, file_name: metadata.file_name }
}

/// 图片表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct ImageForm {
    /// 上传的图片文件
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
}

/// 录入人脸表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct AddFaceForm {
    /// 上传的图片文件，只录入第一张人脸
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    /// 人脸对应的名字
    pub name: String,
}

/// 识别结果
#[derive(Debug, Serialize, ToSchema)]
pub struct RecognizeResponse {
    /// 最相似的人脸的名字，没有匹配时为 `null`
    pub name: Option<String>,
}

/// 错误响应
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct ErrorResponse {
    pub error: String,
    /// 例如 `NoFaceDetected`
    pub kind: String,
}
