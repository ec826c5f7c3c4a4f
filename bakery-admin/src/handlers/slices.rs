use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use bakery_core::error::BakeryError;
use bakery_core::slug::is_valid_resource_key;
use bakery_core::wire::{CreateSliceRequest, OrchestratedSlice};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ListSlicesQuery {
    #[serde(rename = "pieId")]
    pie_id: Option<String>,
    all: Option<bool>,
}

/// GET /v1/slices?pieId=…&all=true — the two parameters are mutually exclusive.
pub async fn list_slices(
    State(state): State<AppState>,
    Query(query): Query<ListSlicesQuery>,
) -> Result<Json<Value>, ApiError> {
    let pie_id = match (&query.pie_id, query.all) {
        (Some(_), Some(true)) => {
            return Err(BakeryError::InvalidArgument(
                "pieId and all are mutually exclusive".to_string(),
            )
            .into())
        }
        (Some(id_or_slug), _) => {
            let pie = state
                .orchestrator
                .store()
                .find_pie_by_id_or_slug(id_or_slug)
                .await?
                .ok_or_else(|| BakeryError::NotFound("Pie not found".to_string()))?;
            Some(pie.id)
        }
        (None, _) => None,
    };

    let slices = state.orchestrator.store().list_slices(pie_id).await?;
    let views: Vec<_> = slices
        .iter()
        .map(|swr| bakery_core::wire::SliceView::from(&swr.slice))
        .collect();
    Ok(Json(json!({ "slices": views })))
}

/// POST /v1/slices — create from `{pieId, resources}`.
pub async fn create_slice(
    State(state): State<AppState>,
    body: Result<Json<CreateSliceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrchestratedSlice>), ApiError> {
    let Json(req) = body.map_err(|e| BakeryError::InvalidArgument(e.body_text()))?;

    let pie = state
        .orchestrator
        .store()
        .find_pie_by_id_or_slug(&req.pie_id)
        .await?
        .ok_or_else(|| BakeryError::NotFound("Pie not found".to_string()))?;

    for r in &req.resources {
        if !is_valid_resource_key(&r.key) {
            return Err(BakeryError::InvalidArgument(format!(
                "invalid resource key {:?}: must match ^[a-z0-9][a-z0-9-]*$ and be at most 64 chars",
                r.key
            ))
            .into());
        }
    }

    let resources = req
        .resources
        .into_iter()
        .map(|r| bakery_orchestrator::CreateSliceResource {
            key: r.key,
            protocol: r.protocol,
            expose: r.expose,
        })
        .collect();

    let slice = state.orchestrator.create_slice(&pie, resources).await?;
    Ok((StatusCode::CREATED, Json(slice)))
}

/// POST /v1/slices/{id}/stop — idempotent, writes audit on every call.
pub async fn stop_slice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state.orchestrator.stop_slice(id).await?;
    Ok(Json(json!({ "ok": true })))
}

/// DELETE /v1/slices/{id} — removes the slice and its resources.
pub async fn delete_slice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state.orchestrator.remove_slice(id).await?;
    Ok(Json(json!({ "ok": true })))
}
