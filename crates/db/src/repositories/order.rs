use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use tably_core::domain::cart::CartId;
use tably_core::domain::identity::UserId;
use tably_core::domain::menu::MenuItemId;
use tably_core::domain::order::{Order, OrderId, OrderLine, OrderStatus};

use super::{OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load(&self, row: SqliteRow) -> Result<Order, RepositoryError> {
        let id: String = row.get("id");
        let status_raw: String = row.get("status");
        let status = OrderStatus::parse(&status_raw)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown order status `{status_raw}`")))?;
        let total_minor: i64 = row.get("total_minor");
        if total_minor < 0 {
            return Err(RepositoryError::Corrupted(format!(
                "order {id} has negative total {total_minor}"
            )));
        }
        let created_raw: String = row.get("created_at");
        let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_raw)
            .map(|value| value.with_timezone(&Utc))
            .map_err(|_| RepositoryError::Decode(format!("unparseable timestamp `{created_raw}`")))?;

        let line_rows = sqlx::query(
            "SELECT item_id, name, qty, unit_price_minor
             FROM order_line
             WHERE order_id = ?
             ORDER BY position",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        let lines = line_rows
            .into_iter()
            .map(|line| OrderLine {
                item_id: MenuItemId(line.get("item_id")),
                name: line.get("name"),
                quantity: u32::try_from(line.get::<i64, _>("qty")).unwrap_or_default(),
                unit_price_minor: line.get("unit_price_minor"),
            })
            .collect();

        Ok(Order {
            id: OrderId(id),
            owner: UserId(row.get("user_id")),
            cart_id: CartId(row.get("cart_id")),
            status,
            lines,
            total_minor,
            payment_session_ref: row.get("payment_session_ref"),
            created_at,
        })
    }
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO customer_order
                (id, user_id, cart_id, status, total_minor, payment_session_ref, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&order.id.0)
        .bind(&order.owner.0)
        .bind(&order.cart_id.0)
        .bind(order.status.as_str())
        .bind(order.total_minor)
        .bind(order.payment_session_ref.as_deref())
        .bind(order.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for (position, line) in order.lines.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_line (order_id, item_id, name, qty, unit_price_minor, position)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&order.id.0)
            .bind(line.item_id.0)
            .bind(&line.name)
            .bind(i64::from(line.quantity))
            .bind(line.unit_price_minor)
            .bind(i64::try_from(position).unwrap_or_default())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, cart_id, status, total_minor, payment_session_ref, created_at
             FROM customer_order
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.load(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_session_ref(
        &self,
        session_ref: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, cart_id, status, total_minor, payment_session_ref, created_at
             FROM customer_order
             WHERE payment_session_ref = ?",
        )
        .bind(session_ref)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.load(row).await?)),
            None => Ok(None),
        }
    }

    async fn set_session_ref(
        &self,
        id: &OrderId,
        session_ref: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE customer_order SET payment_session_ref = ? WHERE id = ?")
            .bind(session_ref)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn transition_if_pending(
        &self,
        id: &OrderId,
        next: OrderStatus,
    ) -> Result<bool, RepositoryError> {
        // The status precondition in the WHERE clause is the compare-and-set:
        // of N racing callers, exactly one sees a row change.
        let result = sqlx::query(
            "UPDATE customer_order SET status = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(next.as_str())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, id: &OrderId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM customer_order WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
