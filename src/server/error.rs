use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_typed_multipart::TypedMultipartError;
use serde_json::json;

use crate::error::FaceError;

/// API错误类型
pub struct AppError(pub anyhow::Error);

pub type Result<T, E = AppError> = std::result::Result<T, E>;

impl AppError {
    fn status(&self) -> StatusCode {
        if let Some(e) = self.0.downcast_ref::<TypedMultipartError>() {
            return e.get_status();
        }
        match self.0.downcast_ref::<FaceError>() {
            Some(FaceError::NoFaceDetected) => StatusCode::UNPROCESSABLE_ENTITY,
            Some(FaceError::Extraction(_) | FaceError::InvalidRequest(_)) => {
                StatusCode::BAD_REQUEST
            }
            Some(FaceError::IndexWrite(_) | FaceError::IndexQuery(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Some(
                FaceError::StorageWrite(_)
                | FaceError::ModelUnavailable(_)
                | FaceError::Inference(_)
                | FaceError::DimensionMismatch { .. },
            )
            | None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        if let Some(e) = self.0.downcast_ref::<TypedMultipartError>() {
            return if e.get_status().is_client_error() { "InvalidRequest" } else { "InternalError" };
        }
        self.0.downcast_ref::<FaceError>().map(FaceError::kind).unwrap_or("InternalError")
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.0.to_string(),
            "kind": self.kind(),
        });
        (self.status(), Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
