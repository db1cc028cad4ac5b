use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use mealkit_core::repository::InventoryStore;
use mealkit_core::stats::InventoryFilter;
use mealkit_core::{InventoryItem, NewInventoryItem, StoreError, StoreResult};

use crate::database::acquire;
use crate::error::db_err;

const ITEM_COLUMNS: &str =
    "id, name, description, quantity, price_cents, category, dietary_tags, is_active, created_at, updated_at";

pub struct PgInventoryStore {
    pool: PgPool,
}

impl PgInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct InventoryRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    quantity: i32,
    price_cents: i64,
    category: Option<String>,
    dietary_tags: Vec<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<InventoryRow> for InventoryItem {
    fn from(row: InventoryRow) -> Self {
        InventoryItem {
            id: row.id,
            name: row.name,
            description: row.description,
            quantity: row.quantity,
            price_cents: row.price_cents,
            category: row.category,
            dietary_tags: row.dietary_tags,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub(crate) async fn insert_item(
    conn: &mut PgConnection,
    item: &NewInventoryItem,
) -> StoreResult<InventoryItem> {
    item.validate()?;

    let sql = format!(
        r#"
        INSERT INTO inventory (id, name, description, quantity, price_cents, category, dietary_tags)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {ITEM_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, InventoryRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.price_cents)
        .bind(&item.category)
        .bind(&item.dietary_tags)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?;

    Ok(row.into())
}

pub(crate) async fn fetch_item(conn: &mut PgConnection, id: Uuid) -> StoreResult<Option<InventoryItem>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM inventory WHERE id = $1");
    let row = sqlx::query_as::<_, InventoryRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;

    Ok(row.map(Into::into))
}

/// Same as `fetch_item` but holds the row lock until the transaction ends.
pub(crate) async fn lock_item(conn: &mut PgConnection, id: Uuid) -> StoreResult<Option<InventoryItem>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM inventory WHERE id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, InventoryRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;

    Ok(row.map(Into::into))
}

/// `quantity = quantity - n WHERE quantity >= n`. Zero rows affected means the
/// stock was not there; a follow-up read only shapes the error.
pub(crate) async fn decrement_item(
    conn: &mut PgConnection,
    id: Uuid,
    quantity: i32,
) -> StoreResult<InventoryItem> {
    if quantity <= 0 {
        return Err(StoreError::Validation(format!(
            "decrement quantity must be positive, got {}",
            quantity
        )));
    }

    let sql = format!(
        r#"
        UPDATE inventory
        SET quantity = quantity - $1, updated_at = NOW()
        WHERE id = $2 AND is_active = TRUE AND quantity >= $1
        RETURNING {ITEM_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, InventoryRow>(&sql)
        .bind(quantity)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;

    if let Some(row) = row {
        return Ok(row.into());
    }

    match fetch_item(conn, id).await? {
        Some(item) => Err(StoreError::InsufficientStock {
            item_id: id,
            requested: quantity,
            available: if item.is_active { item.quantity } else { 0 },
        }),
        None => Err(StoreError::not_found("inventory item", id)),
    }
}

pub(crate) async fn restock_item(conn: &mut PgConnection, id: Uuid, delta: i32) -> StoreResult<InventoryItem> {
    if delta <= 0 {
        return Err(StoreError::Validation(format!(
            "restock delta must be positive, got {}",
            delta
        )));
    }

    let sql = format!(
        r#"
        UPDATE inventory
        SET quantity = quantity + $1, updated_at = NOW()
        WHERE id = $2
        RETURNING {ITEM_COLUMNS}
        "#
    );
    sqlx::query_as::<_, InventoryRow>(&sql)
        .bind(delta)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?
        .map(Into::into)
        .ok_or_else(|| StoreError::not_found("inventory item", id))
}

async fn set_price(conn: &mut PgConnection, id: Uuid, price_cents: i64) -> StoreResult<InventoryItem> {
    if price_cents < 0 {
        return Err(StoreError::Validation("price must not be negative".into()));
    }

    let sql = format!(
        "UPDATE inventory SET price_cents = $1, updated_at = NOW() WHERE id = $2 RETURNING {ITEM_COLUMNS}"
    );
    sqlx::query_as::<_, InventoryRow>(&sql)
        .bind(price_cents)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?
        .map(Into::into)
        .ok_or_else(|| StoreError::not_found("inventory item", id))
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    async fn create_item(&self, item: &NewInventoryItem) -> StoreResult<InventoryItem> {
        let mut conn = acquire(&self.pool).await?;
        insert_item(&mut *conn, item).await
    }

    async fn get_item(&self, id: Uuid) -> StoreResult<Option<InventoryItem>> {
        let mut conn = acquire(&self.pool).await?;
        fetch_item(&mut *conn, id).await
    }

    async fn check_available(&self, id: Uuid, required: i32) -> StoreResult<bool> {
        let mut conn = acquire(&self.pool).await?;
        Ok(fetch_item(&mut *conn, id)
            .await?
            .is_some_and(|item| item.can_supply(required)))
    }

    async fn decrement(&self, id: Uuid, quantity: i32) -> StoreResult<InventoryItem> {
        let mut conn = acquire(&self.pool).await?;
        decrement_item(&mut *conn, id, quantity).await
    }

    async fn restock(&self, id: Uuid, delta: i32) -> StoreResult<InventoryItem> {
        let mut conn = acquire(&self.pool).await?;
        restock_item(&mut *conn, id, delta).await
    }

    async fn update_price(&self, id: Uuid, price_cents: i64) -> StoreResult<InventoryItem> {
        let mut conn = acquire(&self.pool).await?;
        set_price(&mut *conn, id, price_cents).await
    }

    async fn list_items(&self, filter: &InventoryFilter) -> StoreResult<Vec<InventoryItem>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ITEM_COLUMNS} FROM inventory WHERE is_active = TRUE"
        ));

        if let Some(category) = &filter.category {
            qb.push(" AND category = ").push_bind(category.clone());
        }
        if let Some(max) = filter.max_price_cents {
            qb.push(" AND price_cents <= ").push_bind(max);
        }
        if let Some(min) = filter.min_price_cents {
            qb.push(" AND price_cents >= ").push_bind(min);
        }
        qb.push(" ORDER BY name ASC, id ASC");

        let rows = qb
            .build_query_as::<InventoryRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn low_stock(&self, threshold: i32) -> StoreResult<Vec<InventoryItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM inventory WHERE is_active = TRUE AND quantity <= $1 ORDER BY quantity ASC, id ASC"
        );
        let rows = sqlx::query_as::<_, InventoryRow>(&sql)
            .bind(threshold)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
