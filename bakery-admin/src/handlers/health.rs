use std::collections::HashMap;

use axum::extract::State;
use axum::response::Json;
use bakery_core::model::SliceStatus;
use bakery_core::wire::{
    HealthResponse, StatusDaemon, StatusPies, StatusResponse, StatusSlices, StatusSlicesByPie,
    StatusSlicesByStatus,
};

use crate::error::ApiError;
use crate::server::AppState;

/// GET /v1/health — liveness probe, no Store access.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        port: state.port,
        router_port: state.orchestrator.router_port(),
    })
}

/// GET /v1/status — dashboard snapshot: pie/slice totals and breakdowns.
pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let store = state.orchestrator.store();
    let pies = store.list_pies().await?;
    let slices = store.list_slices(None).await?;

    let mut by_status = StatusSlicesByStatus {
        creating: 0,
        running: 0,
        stopped: 0,
        error: 0,
    };
    let mut by_pie: HashMap<uuid::Uuid, StatusSlicesByPie> = HashMap::new();

    for pie in &pies {
        by_pie.insert(
            pie.id,
            StatusSlicesByPie {
                pie_id: pie.id,
                pie_name: pie.name.clone(),
                pie_slug: pie.slug.clone(),
                total: 0,
                running: 0,
            },
        );
    }

    for swr in &slices {
        match swr.slice.status {
            SliceStatus::Creating => by_status.creating += 1,
            SliceStatus::Running => by_status.running += 1,
            SliceStatus::Stopped => by_status.stopped += 1,
            SliceStatus::Error => by_status.error += 1,
        }
        if let Some(entry) = by_pie.get_mut(&swr.slice.pie_id) {
            entry.total += 1;
            if swr.slice.status == SliceStatus::Running {
                entry.running += 1;
            }
        }
    }

    let mut by_pie: Vec<StatusSlicesByPie> = by_pie.into_values().collect();
    by_pie.sort_by(|a, b| a.pie_slug.cmp(&b.pie_slug));

    Ok(Json(StatusResponse {
        daemon: StatusDaemon {
            status: "ok",
            host: state.host.clone(),
            port: state.port,
            router_port: state.orchestrator.router_port(),
        },
        pies: StatusPies {
            total: pies.len() as u64,
        },
        slices: StatusSlices {
            total: slices.len() as u64,
            by_status,
            by_pie,
        },
        generated_at: chrono::Utc::now(),
    }))
}
