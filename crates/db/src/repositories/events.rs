use chrono::Utc;
use sqlx::Row;

use tably_core::domain::identity::Identity;
use tably_core::domain::menu::MenuItemId;

use super::{EventKind, EventLogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlEventLogRepository {
    pool: DbPool,
}

impl SqlEventLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EventLogRepository for SqlEventLogRepository {
    async fn record(
        &self,
        identity: &Identity,
        item_id: MenuItemId,
        kind: EventKind,
    ) -> Result<(), RepositoryError> {
        let (user_id, guest_token) = identity.clone().into_columns();

        sqlx::query(
            "INSERT INTO event_log (user_id, guest_token, item_id, event_type, ts)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id.as_deref())
        .bind(guest_token.as_deref())
        .bind(item_id.0)
        .bind(kind.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn top_tags(
        &self,
        identity: &Identity,
        limit: usize,
    ) -> Result<Vec<String>, RepositoryError> {
        let (user_id, guest_token) = identity.clone().into_columns();

        let rows = sqlx::query(
            "SELECT t.tag AS tag, COUNT(*) AS uses
             FROM event_log e
             JOIN menu_item_tag t ON t.item_id = e.item_id
             WHERE (e.user_id = ?1 AND ?1 IS NOT NULL)
                OR (e.guest_token = ?2 AND ?2 IS NOT NULL)
             GROUP BY t.tag
             ORDER BY uses DESC, t.tag ASC
             LIMIT ?3",
        )
        .bind(user_id.as_deref())
        .bind(guest_token.as_deref())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get::<String, _>("tag")).collect())
    }
}
