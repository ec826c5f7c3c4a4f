use bakery_core::error::BakeryError;
use bakery_core::model::Pie;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::{conflict_or_internal, db_err, Store};

impl Store {
    pub async fn create_pie(&self, name: &str, slug: &str) -> Result<Pie, BakeryError> {
        let pie = Pie {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slug.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO pies (id, name, slug, created_at) VALUES (?, ?, ?, ?)")
            .bind(pie.id.to_string())
            .bind(&pie.name)
            .bind(&pie.slug)
            .bind(pie.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or_internal(e, "slug"))?;

        Ok(pie)
    }

    pub async fn list_pies(&self) -> Result<Vec<Pie>, BakeryError> {
        let rows = sqlx::query("SELECT id, name, slug, created_at FROM pies ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_pie).collect()
    }

    /// Resolve by UUID first, falling back to slug, matching the daemon's
    /// "id or slug" path parameter convention.
    pub async fn find_pie_by_id_or_slug(&self, id_or_slug: &str) -> Result<Option<Pie>, BakeryError> {
        let row = if let Ok(id) = Uuid::parse_str(id_or_slug) {
            sqlx::query("SELECT id, name, slug, created_at FROM pies WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?
        } else {
            None
        };

        let row = match row {
            Some(r) => Some(r),
            None => sqlx::query("SELECT id, name, slug, created_at FROM pies WHERE slug = ?")
                .bind(id_or_slug)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?,
        };

        row.map(|r| row_to_pie(&r)).transpose()
    }

    /// Stop every non-stopped slice, then delete the pie. Cascades remove
    /// its slices and resources; the audit entries survive the cascade
    /// because `audit_log.pie_id`/`slice_id` are `ON DELETE SET NULL`.
    pub async fn delete_pie(&self, pie_id: Uuid) -> Result<(), BakeryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let slice_ids: Vec<Uuid> = sqlx::query("SELECT id FROM slices WHERE pie_id = ?")
            .bind(pie_id.to_string())
            .fetch_all(&mut *tx)
            .await
            .map_err(db_err)?
            .iter()
            .map(|r| {
                Uuid::parse_str(&r.get::<String, _>("id"))
                    .map_err(|e| BakeryError::Internal(format!("corrupt slice id: {e}")))
            })
            .collect::<Result<_, _>>()?;

        for slice_id in &slice_ids {
            let now = Utc::now();
            sqlx::query(
                "INSERT INTO audit_log (id, pie_id, slice_id, kind, payload, created_at) VALUES (?, ?, NULL, 'slice.deleted', ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(pie_id.to_string())
            .bind(serde_json::json!({ "pieId": pie_id, "sliceId": slice_id }).to_string())
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO audit_log (id, pie_id, slice_id, kind, payload, created_at) VALUES (?, NULL, NULL, 'pie.deleted', ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(serde_json::json!({ "pieId": pie_id }).to_string())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let result = sqlx::query("DELETE FROM pies WHERE id = ?")
            .bind(pie_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(BakeryError::NotFound("Pie not found".to_string()));
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}

fn row_to_pie(row: &sqlx::sqlite::SqliteRow) -> Result<Pie, BakeryError> {
    let id: String = row.get("id");
    let created_at: String = row.get("created_at");
    Ok(Pie {
        id: Uuid::parse_str(&id).map_err(|e| BakeryError::Internal(format!("corrupt pie id: {e}")))?,
        name: row.get("name"),
        slug: row.get("slug"),
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
    async fn create_and_find_pie_by_id_and_slug() {
        let store = Store::open_in_memory().await.unwrap();
        let pie = store.create_pie("My App", "my-app").await.unwrap();

        let by_id = store.find_pie_by_id_or_slug(&pie.id.to_string()).await.unwrap().unwrap();
        assert_eq!(by_id.slug, "my-app");

        let by_slug = store.find_pie_by_id_or_slug("my-app").await.unwrap().unwrap();
        assert_eq!(by_slug.id, pie.id);
    }

    #[tokio::test]
    async fn duplicate_slug_is_conflict() {
        let store = Store::open_in_memory().await.unwrap();
        store.create_pie("First", "dup").await.unwrap();
        let err = store.create_pie("Second", "dup").await.unwrap_err();
        assert!(matches!(err, BakeryError::Conflict(_)));
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn delete_unknown_pie_is_not_found() {
        let store = Store::open_in_memory().await.unwrap();
        let err = store.delete_pie(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BakeryError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_pies_ordered_by_creation_descending() {
        let store = Store::open_in_memory().await.unwrap();
        store.create_pie("A", "a").await.unwrap();
        store.create_pie("B", "b").await.unwrap();
        let pies = store.list_pies().await.unwrap();
        assert_eq!(pies.len(), 2);
        assert_eq!(pies[0].slug, "b");
    }
}
