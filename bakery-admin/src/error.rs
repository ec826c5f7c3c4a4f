use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use bakery_core::error::BakeryError;

/// Wraps `BakeryError` so it can be returned directly from Axum handlers.
pub struct ApiError(pub BakeryError);

impl From<BakeryError> for ApiError {
    fn from(e: BakeryError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.to_json_body())).into_response()
    }
}
