use std::collections::BTreeMap;

use sqlx::{sqlite::SqliteRow, Row};

use tably_core::domain::menu::{MenuItem, MenuItemId};

use super::{CatalogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn tags_for(&self, ids: &[i64]) -> Result<BTreeMap<i64, Vec<String>>, RepositoryError> {
        let mut tags: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        if ids.is_empty() {
            return Ok(tags);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT item_id, tag FROM menu_item_tag WHERE item_id IN ({placeholders}) ORDER BY item_id, tag"
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }

        for row in query.fetch_all(&self.pool).await? {
            let item_id: i64 = row.get("item_id");
            let tag: String = row.get("tag");
            tags.entry(item_id).or_default().push(tag);
        }
        Ok(tags)
    }
}

#[async_trait::async_trait]
impl CatalogRepository for SqlCatalogRepository {
    async fn list_available(&self) -> Result<Vec<MenuItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, description, price, is_available, popularity
             FROM menu_item
             WHERE is_available = 1
             ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<i64> = rows.iter().map(|row| row.get::<i64, _>("id")).collect();
        let mut tags = self.tags_for(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let id: i64 = row.get("id");
                item_from_row(&row, tags.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn get(&self, id: MenuItemId) -> Result<Option<MenuItem>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, description, price, is_available, popularity
             FROM menu_item
             WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut tags = self.tags_for(&[id.0]).await?;
        Ok(Some(item_from_row(&row, tags.remove(&id.0).unwrap_or_default())?))
    }

    async fn upsert(&self, item: MenuItem) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO menu_item (id, name, description, price, is_available, popularity)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                price = excluded.price,
                is_available = excluded.is_available,
                popularity = excluded.popularity",
        )
        .bind(item.id.0)
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.price.to_string())
        .bind(i64::from(item.is_available))
        .bind(i64::from(item.popularity))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM menu_item_tag WHERE item_id = ?")
            .bind(item.id.0)
            .execute(&mut *tx)
            .await?;
        for tag in &item.tags {
            sqlx::query("INSERT INTO menu_item_tag (item_id, tag) VALUES (?, ?)")
                .bind(item.id.0)
                .bind(tag)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn item_from_row(row: &SqliteRow, tags: Vec<String>) -> Result<MenuItem, RepositoryError> {
    let price_raw: String = row.get("price");
    let price = price_raw
        .parse()
        .map_err(|_| RepositoryError::Decode(format!("unparseable menu price `{price_raw}`")))?;

    Ok(MenuItem {
        id: MenuItemId(row.get("id")),
        name: row.get("name"),
        description: row.get("description"),
        price,
        is_available: row.get::<i64, _>("is_available") != 0,
        popularity: u32::try_from(row.get::<i64, _>("popularity")).unwrap_or_default(),
        tags,
    })
}
