use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use tably_core::domain::cart::{Cart, CartId, CartLine};
use tably_core::domain::identity::Identity;
use tably_core::domain::menu::MenuItemId;

use super::{CartStore, RepositoryError};
use crate::DbPool;

pub struct SqlCartStore {
    pool: DbPool,
}

impl SqlCartStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load(&self, row: SqliteRow) -> Result<Cart, RepositoryError> {
        let id: String = row.get("id");
        let owner = Identity::from_columns(row.get("user_id"), row.get("guest_token"))
            .map_err(|error| RepositoryError::Corrupted(error.to_string()))?;
        let created_raw: String = row.get("created_at");
        let created_at = parse_timestamp(&created_raw)?;

        let line_rows = sqlx::query(
            "SELECT item_id, qty FROM cart_line WHERE cart_id = ? ORDER BY position",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        let lines = line_rows
            .into_iter()
            .map(|line| CartLine {
                item_id: MenuItemId(line.get("item_id")),
                quantity: u32::try_from(line.get::<i64, _>("qty")).unwrap_or_default(),
            })
            .collect();

        Ok(Cart { id: CartId(id), owner, lines, created_at })
    }
}

#[async_trait::async_trait]
impl CartStore for SqlCartStore {
    async fn resolve(&self, identity: &Identity) -> Result<Cart, RepositoryError> {
        let (user_id, guest_token) = identity.clone().into_columns();

        // INSERT OR IGNORE + re-select: the partial unique indexes on the
        // owner columns make concurrent first-touch creation converge on one
        // row.
        let candidate = Cart::new(identity.clone());
        sqlx::query(
            "INSERT OR IGNORE INTO cart (id, user_id, guest_token, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&candidate.id.0)
        .bind(user_id.as_deref())
        .bind(guest_token.as_deref())
        .bind(candidate.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let row = match (&user_id, &guest_token) {
            (Some(user), _) => {
                sqlx::query(
                    "SELECT id, user_id, guest_token, created_at FROM cart WHERE user_id = ?",
                )
                .bind(user)
                .fetch_one(&self.pool)
                .await?
            }
            (_, Some(token)) => {
                sqlx::query(
                    "SELECT id, user_id, guest_token, created_at FROM cart WHERE guest_token = ?",
                )
                .bind(token)
                .fetch_one(&self.pool)
                .await?
            }
            (None, None) => {
                return Err(RepositoryError::Corrupted(
                    "identity resolved to neither user nor guest".to_string(),
                ))
            }
        };

        self.load(row).await
    }

    async fn find_by_id(&self, id: &CartId) -> Result<Option<Cart>, RepositoryError> {
        let row = sqlx::query("SELECT id, user_id, guest_token, created_at FROM cart WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.load(row).await?)),
            None => Ok(None),
        }
    }

    async fn add_line(
        &self,
        cart_id: &CartId,
        item_id: MenuItemId,
        quantity: u32,
    ) -> Result<(), RepositoryError> {
        // Single-statement upsert keeps concurrent adds of the same item
        // lost-update free without any application-side lock.
        sqlx::query(
            "INSERT INTO cart_line (cart_id, item_id, qty, position)
             VALUES (
                ?, ?, ?,
                (SELECT COALESCE(MAX(position), 0) + 1 FROM cart_line WHERE cart_id = ?)
             )
             ON CONFLICT(cart_id, item_id) DO UPDATE SET qty = qty + excluded.qty",
        )
        .bind(&cart_id.0)
        .bind(item_id.0)
        .bind(i64::from(quantity.max(1)))
        .bind(&cart_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_line(
        &self,
        cart_id: &CartId,
        item_id: MenuItemId,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM cart_line WHERE cart_id = ? AND item_id = ?")
            .bind(&cart_id.0)
            .bind(item_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_line_quantity(
        &self,
        cart_id: &CartId,
        item_id: MenuItemId,
        quantity: i64,
    ) -> Result<(), RepositoryError> {
        if quantity <= 0 {
            return self.remove_line(cart_id, item_id).await;
        }

        sqlx::query(
            "INSERT INTO cart_line (cart_id, item_id, qty, position)
             VALUES (
                ?, ?, ?,
                (SELECT COALESCE(MAX(position), 0) + 1 FROM cart_line WHERE cart_id = ?)
             )
             ON CONFLICT(cart_id, item_id) DO UPDATE SET qty = excluded.qty",
        )
        .bind(&cart_id.0)
        .bind(item_id.0)
        .bind(quantity)
        .bind(&cart_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear(&self, cart_id: &CartId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM cart_line WHERE cart_id = ?")
            .bind(&cart_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|_| RepositoryError::Decode(format!("unparseable timestamp `{raw}`")))
}
