use bakery_core::error::BakeryError;
use bakery_core::model::{Expose, Protocol, Slice, SliceResource, SliceStatus, SliceWithResources};
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::{conflict_or_internal, db_err, Store};

/// Caller-supplied resource to be allocated and attached during slice creation.
pub struct NewResource {
    pub key: String,
    pub allocated_port: u16,
    pub protocol: Protocol,
    pub expose: Expose,
    pub route_host: Option<String>,
}

impl Store {
    pub async fn next_slice_ordinal(&self, pie_id: Uuid) -> Result<u32, BakeryError> {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(ordinal) FROM slices WHERE pie_id = ?")
                .bind(pie_id.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(max.unwrap_or(0) as u32 + 1)
    }

    /// All ports ever recorded in `slice_resources`, for the port
    /// allocator's reserved-set exclusion.
    pub async fn allocated_ports(&self) -> Result<Vec<u16>, BakeryError> {
        let rows: Vec<i64> = sqlx::query_scalar("SELECT allocated_port FROM slice_resources")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(|p| p as u16).collect())
    }

    /// Create a slice and attach its resources as one transaction (spec's
    /// "one logical transaction" create algorithm): no partial slice is
    /// ever left behind on a uniqueness failure. `status` is persisted
    /// directly (the orchestrator's create algorithm persists as `running`
    /// with no intermediate `creating` row visible to callers).
    pub async fn create_slice_with_resources(
        &self,
        pie_id: Uuid,
        ordinal: u32,
        host: &str,
        status: SliceStatus,
        resources: Vec<NewResource>,
    ) -> Result<SliceWithResources, BakeryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let slice = Slice {
            id: Uuid::new_v4(),
            pie_id,
            ordinal,
            host: host.to_string(),
            status,
            created_at: Utc::now(),
            stopped_at: None,
        };

        sqlx::query(
            "INSERT INTO slices (id, pie_id, ordinal, host, status, created_at, stopped_at) VALUES (?, ?, ?, ?, ?, ?, NULL)",
        )
        .bind(slice.id.to_string())
        .bind(slice.pie_id.to_string())
        .bind(slice.ordinal)
        .bind(&slice.host)
        .bind(slice.status.as_str())
        .bind(slice.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or_internal(e, "host"))?;

        let mut persisted = Vec::with_capacity(resources.len());
        for input in resources {
            let resource = SliceResource {
                id: Uuid::new_v4(),
                slice_id: slice.id,
                key: input.key,
                allocated_port: input.allocated_port,
                protocol: input.protocol,
                expose: input.expose,
                route_host: input.route_host,
                created_at: Utc::now(),
            };

            sqlx::query(
                "INSERT INTO slice_resources (id, slice_id, key, allocated_port, protocol, expose, route_host, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(resource.id.to_string())
            .bind(resource.slice_id.to_string())
            .bind(&resource.key)
            .bind(resource.allocated_port)
            .bind(resource.protocol.as_str())
            .bind(resource.expose.as_str())
            .bind(&resource.route_host)
            .bind(resource.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| conflict_or_internal(e, "resource key, port, or route host"))?;

            persisted.push(resource);
        }

        sqlx::query(
            "INSERT INTO audit_log (id, pie_id, slice_id, kind, payload, created_at) VALUES (?, ?, ?, 'slice.created', ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(pie_id.to_string())
        .bind(slice.id.to_string())
        .bind(serde_json::json!({ "pieId": pie_id, "sliceId": slice.id, "host": host }).to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        Ok(SliceWithResources { slice, resources: persisted })
    }

    /// Sets `status`, and `stoppedAt` iff the new status is `stopped`.
    /// Idempotent: transitioning into the same status is a no-op write.
    pub async fn update_slice_status(
        &self,
        slice_id: Uuid,
        status: SliceStatus,
    ) -> Result<(), BakeryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        self.update_slice_status_tx(&mut tx, slice_id, status).await?;

        sqlx::query(
            "INSERT INTO audit_log (id, pie_id, slice_id, kind, payload, created_at) VALUES (?, NULL, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(slice_id.to_string())
        .bind(format!("slice.{status}"))
        .bind(serde_json::json!({ "sliceId": slice_id, "status": status.as_str() }).to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    /// Raw status update with no audit side-effect, for composite workflows
    /// (e.g. cascading pie delete) that write their own audit rows.
    pub(crate) async fn update_slice_status_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        slice_id: Uuid,
        status: SliceStatus,
    ) -> Result<(), BakeryError> {
        let stopped_at = matches!(status, SliceStatus::Stopped).then(|| Utc::now().to_rfc3339());
        let result = sqlx::query("UPDATE slices SET status = ?, stopped_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(stopped_at)
            .bind(slice_id.to_string())
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(BakeryError::NotFound("Slice not found".to_string()));
        }
        Ok(())
    }

    pub async fn delete_slice(&self, slice_id: Uuid) -> Result<(), BakeryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let pie_id: Option<String> =
            sqlx::query_scalar("SELECT pie_id FROM slices WHERE id = ?")
                .bind(slice_id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
        let Some(pie_id) = pie_id else {
            return Err(BakeryError::NotFound("Slice not found".to_string()));
        };

        sqlx::query("DELETE FROM slices WHERE id = ?")
            .bind(slice_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        sqlx::query(
            "INSERT INTO audit_log (id, pie_id, slice_id, kind, payload, created_at) VALUES (?, ?, NULL, 'slice.deleted', ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&pie_id)
        .bind(serde_json::json!({ "pieId": pie_id, "sliceId": slice_id }).to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    pub async fn get_slice_by_id(&self, slice_id: Uuid) -> Result<Option<SliceWithResources>, BakeryError> {
        let row = sqlx::query(
            "SELECT id, pie_id, ordinal, host, status, created_at, stopped_at FROM slices WHERE id = ?",
        )
        .bind(slice_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else { return Ok(None) };
        let slice = row_to_slice(&row)?;
        let resources = self.resources_for_slice(slice.id).await?;
        Ok(Some(SliceWithResources { slice, resources }))
    }

    pub async fn get_slice_by_host(&self, host: &str) -> Result<Option<SliceWithResources>, BakeryError> {
        let row = sqlx::query(
            "SELECT id, pie_id, ordinal, host, status, created_at, stopped_at FROM slices WHERE host = ?",
        )
        .bind(host)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else { return Ok(None) };
        let slice = row_to_slice(&row)?;
        let resources = self.resources_for_slice(slice.id).await?;
        Ok(Some(SliceWithResources { slice, resources }))
    }

    /// `pie_id = None` lists slices across all pies.
    pub async fn list_slices(&self, pie_id: Option<Uuid>) -> Result<Vec<SliceWithResources>, BakeryError> {
        let rows = match pie_id {
            Some(pid) => sqlx::query(
                "SELECT id, pie_id, ordinal, host, status, created_at, stopped_at FROM slices WHERE pie_id = ? ORDER BY created_at ASC",
            )
            .bind(pid.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?,
            None => sqlx::query(
                "SELECT id, pie_id, ordinal, host, status, created_at, stopped_at FROM slices ORDER BY created_at ASC",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?,
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let slice = row_to_slice(row)?;
            let resources = self.resources_for_slice(slice.id).await?;
            out.push(SliceWithResources { slice, resources });
        }
        Ok(out)
    }

    async fn resources_for_slice(&self, slice_id: Uuid) -> Result<Vec<SliceResource>, BakeryError> {
        let rows = sqlx::query(
            "SELECT id, slice_id, key, allocated_port, protocol, expose, route_host, created_at FROM slice_resources WHERE slice_id = ? ORDER BY created_at ASC",
        )
        .bind(slice_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_resource).collect()
    }
}

fn row_to_slice(row: &sqlx::sqlite::SqliteRow) -> Result<Slice, BakeryError> {
    let id: String = row.get("id");
    let pie_id: String = row.get("pie_id");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let stopped_at: Option<String> = row.get("stopped_at");

    Ok(Slice {
        id: Uuid::parse_str(&id).map_err(|e| BakeryError::Internal(format!("corrupt slice id: {e}")))?,
        pie_id: Uuid::parse_str(&pie_id).map_err(|e| BakeryError::Internal(format!("corrupt pie id: {e}")))?,
        ordinal: row.get::<i64, _>("ordinal") as u32,
        host: row.get("host"),
        status: status
            .parse()
            .map_err(|e: String| BakeryError::Internal(e))?,
        created_at: parse_ts(&created_at)?,
        stopped_at: stopped_at.map(|s| parse_ts(&s)).transpose()?,
    })
}

fn row_to_resource(row: &sqlx::sqlite::SqliteRow) -> Result<SliceResource, BakeryError> {
    let id: String = row.get("id");
    let slice_id: String = row.get("slice_id");
    let protocol: String = row.get("protocol");
    let expose: String = row.get("expose");
    let created_at: String = row.get("created_at");

    Ok(SliceResource {
        id: Uuid::parse_str(&id).map_err(|e| BakeryError::Internal(format!("corrupt resource id: {e}")))?,
        slice_id: Uuid::parse_str(&slice_id)
            .map_err(|e| BakeryError::Internal(format!("corrupt slice id: {e}")))?,
        key: row.get("key"),
        allocated_port: row.get::<i64, _>("allocated_port") as u16,
        protocol: protocol.parse().map_err(|e: String| BakeryError::Internal(e))?,
        expose: expose.parse().map_err(|e: String| BakeryError::Internal(e))?,
        route_host: row.get("route_host"),
        created_at: parse_ts(&created_at)?,
    })
}

fn parse_ts(s: &str) -> Result<chrono::DateTime<Utc>, BakeryError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BakeryError::Internal(format!("corrupt timestamp: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    async fn pie(store: &Store) -> Uuid {
        store.create_pie("App", "app").await.unwrap().id
    }

    fn one_resource(port: u16) -> NewResource {
        NewResource {
            key: "web".to_string(),
            allocated_port: port,
            protocol: Protocol::Http,
            expose: Expose::Primary,
            route_host: Some("app-s1.localtest.me".to_string()),
        }
    }

    #[tokio::test]
    async fn create_slice_with_resources_is_atomic() {
        let store = Store::open_in_memory().await.unwrap();
        let pie_id = pie(&store).await;
        let swr = store
            .create_slice_with_resources(pie_id, 1, "app-s1.localtest.me", SliceStatus::Running, vec![one_resource(30000)])
            .await
            .unwrap();
        assert_eq!(swr.resources.len(), 1);
        assert_eq!(swr.slice.status, SliceStatus::Running);
    }

    #[tokio::test]
    async fn duplicate_host_rolls_back_whole_transaction() {
        let store = Store::open_in_memory().await.unwrap();
        let pie_id = pie(&store).await;
        store
            .create_slice_with_resources(pie_id, 1, "app-s1.localtest.me", SliceStatus::Running, vec![one_resource(30000)])
            .await
            .unwrap();

        let err = store
            .create_slice_with_resources(pie_id, 2, "app-s1.localtest.me", SliceStatus::Running, vec![one_resource(30001)])
            .await
            .unwrap_err();
        assert!(matches!(err, BakeryError::Conflict(_)));

        // Port 30001 must not have been persisted despite being in the failed tx.
        assert!(!store.allocated_ports().await.unwrap().contains(&30001));
    }

    #[tokio::test]
    async fn update_slice_status_sets_stopped_at_only_on_stopped() {
        let store = Store::open_in_memory().await.unwrap();
        let pie_id = pie(&store).await;
        let swr = store
            .create_slice_with_resources(pie_id, 1, "app-s1.localtest.me", SliceStatus::Running, vec![one_resource(30000)])
            .await
            .unwrap();

        store.update_slice_status(swr.slice.id, SliceStatus::Running).await.unwrap();
        let fetched = store.get_slice_by_id(swr.slice.id).await.unwrap().unwrap();
        assert_eq!(fetched.slice.status, SliceStatus::Running);
        assert!(fetched.slice.stopped_at.is_none());

        store.update_slice_status(swr.slice.id, SliceStatus::Stopped).await.unwrap();
        let fetched = store.get_slice_by_id(swr.slice.id).await.unwrap().unwrap();
        assert_eq!(fetched.slice.status, SliceStatus::Stopped);
        assert!(fetched.slice.stopped_at.is_some());
    }

    #[tokio::test]
    async fn update_slice_status_is_idempotent() {
        let store = Store::open_in_memory().await.unwrap();
        let pie_id = pie(&store).await;
        let swr = store
            .create_slice_with_resources(pie_id, 1, "app-s1.localtest.me", SliceStatus::Running, vec![one_resource(30000)])
            .await
            .unwrap();

        store.update_slice_status(swr.slice.id, SliceStatus::Stopped).await.unwrap();
        store.update_slice_status(swr.slice.id, SliceStatus::Stopped).await.unwrap();
        let fetched = store.get_slice_by_id(swr.slice.id).await.unwrap().unwrap();
        assert_eq!(fetched.slice.status, SliceStatus::Stopped);
    }

    #[tokio::test]
    async fn next_slice_ordinal_starts_at_one_and_increments() {
        let store = Store::open_in_memory().await.unwrap();
        let pie_id = pie(&store).await;
        assert_eq!(store.next_slice_ordinal(pie_id).await.unwrap(), 1);

        store
            .create_slice_with_resources(pie_id, 1, "app-s1.localtest.me", SliceStatus::Running, vec![one_resource(30000)])
            .await
            .unwrap();
        assert_eq!(store.next_slice_ordinal(pie_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_slice_removes_resources_and_writes_audit() {
        let store = Store::open_in_memory().await.unwrap();
        let pie_id = pie(&store).await;
        let swr = store
            .create_slice_with_resources(pie_id, 1, "app-s1.localtest.me", SliceStatus::Running, vec![one_resource(30000)])
            .await
            .unwrap();

        store.delete_slice(swr.slice.id).await.unwrap();
        assert!(store.get_slice_by_id(swr.slice.id).await.unwrap().is_none());
        assert!(store.allocated_ports().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_unknown_slice_is_not_found() {
        let store = Store::open_in_memory().await.unwrap();
        let err = store.delete_slice(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BakeryError::NotFound(_)));
    }

    #[tokio::test]
    async fn get_slice_by_host_finds_resources() {
        let store = Store::open_in_memory().await.unwrap();
        let pie_id = pie(&store).await;
        store
            .create_slice_with_resources(pie_id, 1, "app-s1.localtest.me", SliceStatus::Running, vec![one_resource(30000)])
            .await
            .unwrap();

        let swr = store.get_slice_by_host("app-s1.localtest.me").await.unwrap().unwrap();
        assert_eq!(swr.resources.len(), 1);
    }

    #[tokio::test]
    async fn list_slices_filters_by_pie() {
        let store = Store::open_in_memory().await.unwrap();
        let pie_a = pie(&store).await;
        let pie_b = store.create_pie("Other", "other").await.unwrap().id;
        store
            .create_slice_with_resources(pie_a, 1, "app-s1.localtest.me", SliceStatus::Running, vec![one_resource(30000)])
            .await
            .unwrap();
        store
            .create_slice_with_resources(pie_b, 1, "other-s1.localtest.me", SliceStatus::Running, vec![one_resource(30001)])
            .await
            .unwrap();

        assert_eq!(store.list_slices(Some(pie_a)).await.unwrap().len(), 1);
        assert_eq!(store.list_slices(None).await.unwrap().len(), 2);
    }
}
