use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use std::collections::HashSet;
use uuid::Uuid;

use mealkit_core::repository::LineItemStore;
use mealkit_core::stats::{ItemPopularity, PopularityFilter};
use mealkit_core::{LineItem, LineItemDetail, NewLineItem, StoreError, StoreResult};

use crate::database::acquire;
use crate::error::{db_err, is_foreign_key_violation, is_unique_violation};

pub struct PgLineItemStore {
    pool: PgPool,
}

impl PgLineItemStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct LineItemRow {
    order_id: Uuid,
    meal_id: Uuid,
    quantity: i32,
    unit_price_cents: i64,
}

impl From<LineItemRow> for LineItem {
    fn from(row: LineItemRow) -> Self {
        LineItem {
            order_id: row.order_id,
            item_id: row.meal_id,
            quantity: row.quantity,
            unit_price_cents: row.unit_price_cents,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LineItemDetailRow {
    order_id: Uuid,
    meal_id: Uuid,
    quantity: i32,
    unit_price_cents: i64,
    name: String,
    current_price_cents: i64,
}

#[derive(sqlx::FromRow)]
struct PopularityRow {
    meal_id: Uuid,
    name: String,
    times_ordered: i64,
    total_quantity: i64,
    average_price_cents: i64,
    total_revenue_cents: i64,
}

pub(crate) fn check_batch(items: &[NewLineItem]) -> StoreResult<()> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        item.validate()?;
        if !seen.insert(item.item_id) {
            return Err(StoreError::Validation(format!(
                "item {} appears more than once",
                item.item_id
            )));
        }
    }
    Ok(())
}

async fn insert_line(conn: &mut PgConnection, order_id: Uuid, item: &NewLineItem) -> StoreResult<LineItem> {
    let row = sqlx::query_as::<_, LineItemRow>(
        r#"
        INSERT INTO order_meal (order_id, meal_id, quantity, unit_price_cents)
        VALUES ($1, $2, $3, $4)
        RETURNING order_id, meal_id, quantity, unit_price_cents
        "#,
    )
    .bind(order_id)
    .bind(item.item_id)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::Conflict(format!(
                "order {} already contains item {}",
                order_id, item.item_id
            ))
        } else if is_foreign_key_violation(&e) {
            StoreError::NotFound {
                entity: "order or inventory item",
                id: format!("{}/{}", order_id, item.item_id),
            }
        } else {
            db_err(e)
        }
    })?;

    Ok(row.into())
}

/// Inserts every line or fails on the first bad one. Callers own the transaction.
pub(crate) async fn insert_lines(
    conn: &mut PgConnection,
    order_id: Uuid,
    items: &[NewLineItem],
) -> StoreResult<Vec<LineItem>> {
    check_batch(items)?;

    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        lines.push(insert_line(conn, order_id, item).await?);
    }
    Ok(lines)
}

pub(crate) async fn fetch_lines(conn: &mut PgConnection, order_id: Uuid) -> StoreResult<Vec<LineItemDetail>> {
    let rows = sqlx::query_as::<_, LineItemDetailRow>(
        r#"
        SELECT om.order_id, om.meal_id, om.quantity, om.unit_price_cents,
               i.name, i.price_cents AS current_price_cents
        FROM order_meal om
        JOIN inventory i ON i.id = om.meal_id
        WHERE om.order_id = $1
        ORDER BY i.name ASC, om.meal_id ASC
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    Ok(rows
        .into_iter()
        .map(|row| LineItemDetail {
            line: LineItem {
                order_id: row.order_id,
                item_id: row.meal_id,
                quantity: row.quantity,
                unit_price_cents: row.unit_price_cents,
            },
            name: row.name,
            current_price_cents: row.current_price_cents,
        })
        .collect())
}

pub(crate) async fn sum_lines(conn: &mut PgConnection, order_id: Uuid) -> StoreResult<i64> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(quantity::BIGINT * unit_price_cents), 0)::BIGINT FROM order_meal WHERE order_id = $1",
    )
    .bind(order_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err)
}

#[async_trait]
impl LineItemStore for PgLineItemStore {
    async fn add_item(&self, order_id: Uuid, item: &NewLineItem) -> StoreResult<LineItem> {
        item.validate()?;
        let mut conn = acquire(&self.pool).await?;
        insert_line(&mut *conn, order_id, item).await
    }

    async fn add_items(&self, order_id: Uuid, items: &[NewLineItem]) -> StoreResult<Vec<LineItem>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let lines = insert_lines(&mut *tx, order_id, items).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(lines)
    }

    async fn get_by_order(&self, order_id: Uuid) -> StoreResult<Vec<LineItemDetail>> {
        let mut conn = acquire(&self.pool).await?;
        fetch_lines(&mut *conn, order_id).await
    }

    async fn sum_for_order(&self, order_id: Uuid) -> StoreResult<i64> {
        let mut conn = acquire(&self.pool).await?;
        sum_lines(&mut *conn, order_id).await
    }

    async fn popularity_stats(&self, filter: &PopularityFilter) -> StoreResult<Vec<ItemPopularity>> {
        let mut qb = QueryBuilder::<Postgres>::new(
            r#"
            SELECT
                i.id AS meal_id,
                i.name,
                COUNT(om.order_id) AS times_ordered,
                SUM(om.quantity)::BIGINT AS total_quantity,
                ROUND(AVG(om.unit_price_cents))::BIGINT AS average_price_cents,
                SUM(om.quantity::BIGINT * om.unit_price_cents)::BIGINT AS total_revenue_cents
            FROM order_meal om
            JOIN inventory i ON i.id = om.meal_id
            JOIN "order" o ON o.id = om.order_id
            WHERE 1=1
            "#,
        );

        if let Some(status) = filter.status {
            qb.push(" AND o.status = ").push_bind(status.as_str());
        }
        if let Some(from) = filter.range.from {
            qb.push(" AND o.created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.range.to {
            qb.push(" AND o.created_at <= ").push_bind(to);
        }
        qb.push(" GROUP BY i.id, i.name ORDER BY total_quantity DESC, i.id ASC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let rows = qb
            .build_query_as::<PopularityRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|row| ItemPopularity {
                item_id: row.meal_id,
                name: row.name,
                times_ordered: row.times_ordered,
                total_quantity: row.total_quantity,
                average_price_cents: row.average_price_cents,
                total_revenue_cents: row.total_revenue_cents,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_rejects_duplicate_items() {
        let item_id = Uuid::new_v4();
        let line = NewLineItem { item_id, quantity: 1, unit_price_cents: 500 };
        let err = check_batch(&[line, line]).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        assert!(check_batch(&[line]).is_ok());
    }
}
