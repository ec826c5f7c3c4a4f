use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use bakery_core::error::BakeryError;
use bakery_core::slug::{derive_slug, is_valid_slug};
use bakery_core::wire::{CreatePieRequest, PieView};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::server::AppState;

/// GET /v1/pies — newest first.
pub async fn list_pies(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let pies = state.orchestrator.store().list_pies().await?;
    let views: Vec<PieView> = pies.iter().map(PieView::from).collect();
    Ok(Json(json!({ "pies": views })))
}

/// POST /v1/pies — derives the slug server-side; `400` on an empty result, `409` on collision.
pub async fn create_pie(
    State(state): State<AppState>,
    body: Result<Json<CreatePieRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PieView>), ApiError> {
    let Json(req) = body.map_err(|e| BakeryError::InvalidArgument(e.body_text()))?;

    if req.name.trim().is_empty() {
        return Err(BakeryError::InvalidArgument("name must be non-empty".to_string()).into());
    }

    let slug = derive_slug(&req.name);
    if !is_valid_slug(&slug) {
        return Err(BakeryError::InvalidArgument(
            "derived slug is empty; name must contain at least one alphanumeric character".to_string(),
        )
        .into());
    }

    let pie = state.orchestrator.store().create_pie(&req.name, &slug).await?;
    Ok((StatusCode::CREATED, Json(PieView::from(&pie))))
}

/// DELETE /v1/pies/{idOrSlug} — cascades to slices and resources.
pub async fn delete_pie(
    State(state): State<AppState>,
    Path(id_or_slug): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let pie = state
        .orchestrator
        .store()
        .find_pie_by_id_or_slug(&id_or_slug)
        .await?
        .ok_or_else(|| BakeryError::NotFound("Pie not found".to_string()))?;

    state.orchestrator.store().delete_pie(pie.id).await?;
    Ok(Json(json!({ "ok": true })))
}
