use bakery_core::error::BakeryError;
use bakery_core::model::HostRoute;
use sqlx::Row;
use uuid::Uuid;

use crate::{db_err, Store};

impl Store {
    /// Single-row lookup joining a resource's `routeHost` to its owning
    /// slice, for the Router Proxy's Host-header dispatch.
    pub async fn get_host_route(&self, host: &str) -> Result<Option<HostRoute>, BakeryError> {
        let row = sqlx::query(
            r#"
            SELECT r.route_host, r.allocated_port, s.id as slice_id, s.pie_id, s.status
            FROM slice_resources r
            JOIN slices s ON s.id = r.slice_id
            WHERE r.route_host = ?
            "#,
        )
        .bind(host)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else { return Ok(None) };

        let slice_id: String = row.get("slice_id");
        let pie_id: String = row.get("pie_id");
        let status: String = row.get("status");

        Ok(Some(HostRoute {
            route_host: row.get("route_host"),
            allocated_port: row.get::<i64, _>("allocated_port") as u16,
            slice_id: Uuid::parse_str(&slice_id)
                .map_err(|e| BakeryError::Internal(format!("corrupt slice id: {e}")))?,
            pie_id: Uuid::parse_str(&pie_id)
                .map_err(|e| BakeryError::Internal(format!("corrupt pie id: {e}")))?,
            slice_status: status.parse().map_err(|e: String| BakeryError::Internal(e))?,
        }))
    }
}
