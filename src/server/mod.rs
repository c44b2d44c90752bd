mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::error::AppError;
pub use self::state::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::root_handler,
        api::detect_handler,
        api::add_face_handler,
        api::encode_handler,
        api::recognize_handler,
    ),
    components(schemas(
        types::ImageForm,
        types::AddFaceForm,
        types::RecognizeResponse,
        types::ErrorResponse,
        crate::face::Embedding,
    ))
)]
pub struct ApiDoc;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    let body_limit = state.body_limit;
    Router::new()
        .route("/", get(api::root_handler))
        .route("/detect", post(api::detect_handler))
        .route("/add_face", post(api::add_face_handler))
        .route("/encode", post(api::encode_handler))
        .route("/recognize", post(api::recognize_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}
