use bakery_core::error::BakeryError;
use bakery_core::model::AuditLogEntry;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::{db_err, Store};

impl Store {
    /// Append a standalone audit entry. Composite operations (slice
    /// creation, pie/slice deletion, status updates) write their own audit
    /// rows inline within their transaction instead of calling this, so the
    /// log entry commits atomically with the mutation it describes.
    pub async fn append_audit_log(
        &self,
        kind: &str,
        pie_id: Option<Uuid>,
        slice_id: Option<Uuid>,
        payload: serde_json::Value,
    ) -> Result<AuditLogEntry, BakeryError> {
        let entry = AuditLogEntry {
            id: Uuid::new_v4(),
            pie_id,
            slice_id,
            kind: kind.to_string(),
            payload,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO audit_log (id, pie_id, slice_id, kind, payload, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id.to_string())
        .bind(entry.pie_id.map(|id| id.to_string()))
        .bind(entry.slice_id.map(|id| id.to_string()))
        .bind(&entry.kind)
        .bind(entry.payload.to_string())
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(entry)
    }

    /// Most recent entries first, for debugging/status use. Not part of the
    /// Control API surface.
    pub async fn recent_audit_log(&self, limit: u32) -> Result<Vec<AuditLogEntry>, BakeryError> {
        let rows = sqlx::query(
            "SELECT id, pie_id, slice_id, kind, payload, created_at FROM audit_log ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_entry).collect()
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<AuditLogEntry, BakeryError> {
    let id: String = row.get("id");
    let pie_id: Option<String> = row.get("pie_id");
    let slice_id: Option<String> = row.get("slice_id");
    let payload: String = row.get("payload");
    let created_at: String = row.get("created_at");

    Ok(AuditLogEntry {
        id: Uuid::parse_str(&id).map_err(|e| BakeryError::Internal(format!("corrupt audit id: {e}")))?,
        pie_id: pie_id
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| BakeryError::Internal(format!("corrupt pie id: {e}")))?,
        slice_id: slice_id
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| BakeryError::Internal(format!("corrupt slice id: {e}")))?,
        kind: row.get("kind"),
        payload: serde_json::from_str(&payload).unwrap_or(serde_json::json!({})),
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| BakeryError::Internal(format!("corrupt created_at: {e}")))?
            .with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[tokio::test]
    async fn append_and_read_back_audit_entry() {
        let store = Store::open_in_memory().await.unwrap();
        let pie = store.create_pie("App", "app").await.unwrap();
        store
            .append_audit_log("pie.created", Some(pie.id), None, serde_json::json!({"pieId": pie.id}))
            .await
            .unwrap();

        let entries = store.recent_audit_log(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, "pie.created");
        assert_eq!(entries[0].pie_id, Some(pie.id));
    }

    #[tokio::test]
    async fn deleting_pie_leaves_audit_rows_with_null_pie_id() {
        let store = Store::open_in_memory().await.unwrap();
        let pie = store.create_pie("App", "app").await.unwrap();
        store.delete_pie(pie.id).await.unwrap();

        let entries = store.recent_audit_log(10).await.unwrap();
        let deleted = entries.iter().find(|e| e.kind == "pie.deleted").unwrap();
        assert_eq!(deleted.pie_id, None);
        assert_eq!(deleted.payload["pieId"], pie.id.to_string());
    }
}
