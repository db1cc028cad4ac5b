use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use mealkit_core::repository::OrderStore;
use mealkit_core::stats::{CustomerTotals, DateRange, OrderFilter, OrderStatistics};
use mealkit_core::{Order, OrderStatus, StoreError, StoreResult};

use crate::database::acquire;
use crate::error::{corrupt_column, db_err};

const ORDER_COLUMNS: &str = "id, user_id, total_cents, status, payment_method, created_at, updated_at";

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    total_cents: i64,
    status: String,
    payment_method: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(|_| corrupt_column("order status", &row.status))?;

        Ok(Order {
            id: row.id,
            owner_id: row.user_id,
            total_cents: row.total_cents,
            status,
            payment_method: row.payment_method,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StatisticsRow {
    total_orders: i64,
    pending_orders: i64,
    confirmed_orders: i64,
    delivered_orders: i64,
    cancelled_orders: i64,
    average_order_value_cents: i64,
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    account_id: Uuid,
    name: String,
    email: String,
    order_count: i64,
    total_spent_cents: i64,
    last_order_at: Option<DateTime<Utc>>,
    subscribed: bool,
}

fn collect_orders(rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
    rows.into_iter().map(Order::try_from).collect()
}

pub(crate) async fn insert_order(
    conn: &mut PgConnection,
    owner_id: Uuid,
    total_cents: i64,
    status: OrderStatus,
    payment_method: Option<&str>,
) -> StoreResult<Order> {
    if total_cents < 0 {
        return Err(StoreError::Validation("order total must not be negative".into()));
    }

    let sql = format!(
        r#"
        INSERT INTO "order" (id, user_id, total_cents, status, payment_method)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {ORDER_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(total_cents)
        .bind(status.as_str())
        .bind(payment_method)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?;

    row.try_into()
}

pub(crate) async fn fetch_order(conn: &mut PgConnection, id: Uuid) -> StoreResult<Option<Order>> {
    let sql = format!(r#"SELECT {ORDER_COLUMNS} FROM "order" WHERE id = $1"#);
    sqlx::query_as::<_, OrderRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?
        .map(Order::try_from)
        .transpose()
}

/// Moves an order along the transition table. The `status = ANY(...)` guard
/// makes the check and the write a single statement.
pub(crate) async fn set_order_status(
    conn: &mut PgConnection,
    id: Uuid,
    status: OrderStatus,
) -> StoreResult<Order> {
    let allowed_from: Vec<&str> = status.predecessors().iter().map(|s| s.as_str()).collect();

    let sql = format!(
        r#"
        UPDATE "order"
        SET status = $1, updated_at = NOW()
        WHERE id = $2 AND status = ANY($3)
        RETURNING {ORDER_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(status.as_str())
        .bind(id)
        .bind(&allowed_from)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;

    if let Some(row) = row {
        return row.try_into();
    }

    match fetch_order(conn, id).await? {
        Some(current) => Err(current.status.transition(status).err().unwrap_or_else(|| {
            StoreError::Conflict(format!("order {} changed concurrently", id))
        })),
        None => Err(StoreError::not_found("order", id)),
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(
        &self,
        owner_id: Uuid,
        total_cents: i64,
        status: OrderStatus,
        payment_method: Option<&str>,
    ) -> StoreResult<Order> {
        let mut conn = acquire(&self.pool).await?;
        insert_order(&mut *conn, owner_id, total_cents, status, payment_method).await
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let mut conn = acquire(&self.pool).await?;
        fetch_order(&mut *conn, id).await
    }

    async fn get_by_id_for_owner(&self, id: Uuid, owner_id: Uuid) -> StoreResult<Option<Order>> {
        let sql = format!(r#"SELECT {ORDER_COLUMNS} FROM "order" WHERE id = $1 AND user_id = $2"#);
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(Order::try_from)
            .transpose()
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
        status: Option<OrderStatus>,
    ) -> StoreResult<Vec<Order>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            r#"SELECT {ORDER_COLUMNS} FROM "order" WHERE user_id = "#
        ));
        qb.push_bind(owner_id);
        if let Some(status) = status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY created_at DESC, id DESC");

        let rows = qb
            .build_query_as::<OrderRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        collect_orders(rows)
    }

    async fn update_status(&self, id: Uuid, status: OrderStatus) -> StoreResult<Order> {
        let mut conn = acquire(&self.pool).await?;
        set_order_status(&mut *conn, id, status).await
    }

    async fn list_all(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            r#"SELECT {ORDER_COLUMNS} FROM "order" WHERE 1=1"#
        ));

        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(from) = filter.range.from {
            qb.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.range.to {
            qb.push(" AND created_at <= ").push_bind(to);
        }
        qb.push(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let rows = qb
            .build_query_as::<OrderRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        collect_orders(rows)
    }

    async fn statistics(&self) -> StoreResult<OrderStatistics> {
        let row = sqlx::query_as::<_, StatisticsRow>(
            r#"
            SELECT
                COUNT(*) AS total_orders,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending_orders,
                COUNT(*) FILTER (WHERE status = 'confirmed') AS confirmed_orders,
                COUNT(*) FILTER (WHERE status = 'delivered') AS delivered_orders,
                COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled_orders,
                COALESCE(ROUND(AVG(total_cents)), 0)::BIGINT AS average_order_value_cents
            FROM "order"
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(OrderStatistics {
            total_orders: row.total_orders,
            pending_orders: row.pending_orders,
            confirmed_orders: row.confirmed_orders,
            delivered_orders: row.delivered_orders,
            cancelled_orders: row.cancelled_orders,
            average_order_value_cents: row.average_order_value_cents,
        })
    }

    async fn total_revenue(&self, range: &DateRange) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(total_cents), 0)::BIGINT
            FROM "order"
            WHERE status = 'delivered'
              AND ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at <= $2)
            "#,
        )
        .bind(range.from)
        .bind(range.to)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn customer_totals(&self) -> StoreResult<Vec<CustomerTotals>> {
        let rows = sqlx::query_as::<_, CustomerRow>(
            r#"
            SELECT
                a.id AS account_id,
                a.name,
                a.email,
                COUNT(o.id) AS order_count,
                COALESCE(SUM(o.total_cents), 0)::BIGINT AS total_spent_cents,
                MAX(o.created_at) AS last_order_at,
                EXISTS (
                    SELECT 1 FROM plan p WHERE p.user_id = a.id AND p.expires_on > CURRENT_DATE
                ) AS subscribed
            FROM account a
            LEFT JOIN "order" o ON o.user_id = a.id AND o.status <> 'cancelled'
            WHERE a.role = 'user'
            GROUP BY a.id
            ORDER BY a.created_at DESC, a.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|row| CustomerTotals {
                account_id: row.account_id,
                name: row.name,
                email: row.email,
                order_count: row.order_count,
                total_spent_cents: row.total_spent_cents,
                last_order_at: row.last_order_at,
                subscribed: row.subscribed,
            })
            .collect())
    }
}
