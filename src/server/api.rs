use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum_typed_multipart::BaseMultipart;
use log::info;
use serde_json::{Value, json};

use super::error::Result;
use super::state::AppState;
use super::types::*;
use crate::face::{Embedding, FacePixels};

/// 服务状态检查
#[utoipa::path(get, path = "/", responses((status = 200, description = "`{\"Hello\": \"World\"}`")))]
pub async fn root_handler() -> Json<Value> {
    Json(json!({ "Hello": "World" }))
}

/// 检测图片中的人脸，返回第一张人脸的像素
#[utoipa::path(
    post,
    path = "/detect",
    request_body(content = ImageForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "`H x W x RGB` 像素数组，取值范围 [0, 1]"),
        (status = 400, body = ErrorResponse),
        (status = 422, body = ErrorResponse),
    )
)]
pub async fn detect_handler(
    State(state): State<Arc<AppState>>,
    BaseMultipart { data, .. }: Multipart<ImageRequest>,
) -> Result<Json<FacePixels>> {
    let face = state.pipeline.detect(&uploaded(data.file)).await?;
    Ok(Json(face.face))
}

/// 录入第一张人脸
#[utoipa::path(
    post,
    path = "/add_face",
    request_body(content = AddFaceForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = String, example = json!("succes")),
        (status = 400, body = ErrorResponse),
        (status = 422, body = ErrorResponse),
        (status = 503, body = ErrorResponse),
    )
)]
pub async fn add_face_handler(
    State(state): State<Arc<AppState>>,
    BaseMultipart { data, .. }: Multipart<AddFaceRequest>,
) -> Result<Json<&'static str>> {
    let record = state.pipeline.add_face(&uploaded(data.file), &data.name).await?;
    info!("已录入 {}: {}", record.label, record.id);
    // 保持与现有客户端一致的拼写
    Ok(Json("succes"))
}

/// 提取第一张人脸的特征向量
#[utoipa::path(
    post,
    path = "/encode",
    request_body(content = ImageForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = Embedding),
        (status = 400, body = ErrorResponse),
        (status = 422, body = ErrorResponse),
    )
)]
pub async fn encode_handler(
    State(state): State<Arc<AppState>>,
    BaseMultipart { data, .. }: Multipart<ImageRequest>,
) -> Result<Json<Embedding>> {
    Ok(Json(state.pipeline.encode(&uploaded(data.file)).await?))
}

/// 识别第一张人脸，返回最相似的已录入人脸的名字
#[utoipa::path(
    post,
    path = "/recognize",
    request_body(content = ImageForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = RecognizeResponse),
        (status = 400, body = ErrorResponse),
        (status = 422, body = ErrorResponse),
        (status = 503, body = ErrorResponse),
    )
)]
pub async fn recognize_handler(
    State(state): State<Arc<AppState>>,
    BaseMultipart { data, .. }: Multipart<ImageRequest>,
) -> Result<Json<RecognizeResponse>> {
    let best = state.pipeline.recognize(&uploaded(data.file)).await?;
    Ok(Json(RecognizeResponse { name: best.map(|result| result.label) }))
}
