use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use mealkit_core::pii::Masked;
use mealkit_core::repository::DeliveryStore;
use mealkit_core::stats::DeliveryStatistics;
use mealkit_core::{Delivery, DeliveryStatus, NewDelivery, ShippingInfo, StoreError, StoreResult};

use crate::database::acquire;
use crate::error::{corrupt_column, db_err, is_foreign_key_violation, is_unique_violation};

const DELIVERY_COLUMNS: &str =
    "id, order_id, status, estimated_time, first_name, last_name, phone, address, city, created_at, updated_at";

pub struct PgDeliveryStore {
    pool: PgPool,
}

impl PgDeliveryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    id: Uuid,
    order_id: Uuid,
    status: String,
    estimated_time: Option<DateTime<Utc>>,
    first_name: String,
    last_name: String,
    phone: String,
    address: String,
    city: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DeliveryRow> for Delivery {
    type Error = StoreError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<DeliveryStatus>()
            .map_err(|_| corrupt_column("delivery status", &row.status))?;

        Ok(Delivery {
            id: row.id,
            order_id: row.order_id,
            status,
            estimated_time: row.estimated_time,
            recipient: ShippingInfo {
                first_name: row.first_name,
                last_name: row.last_name,
                phone: Masked(row.phone),
                address: Masked(row.address),
                city: row.city,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) async fn insert_delivery(
    conn: &mut PgConnection,
    order_id: Uuid,
    delivery: &NewDelivery,
) -> StoreResult<Delivery> {
    delivery.recipient.validate()?;
    let recipient = &delivery.recipient;

    let sql = format!(
        r#"
        INSERT INTO delivery (id, order_id, status, estimated_time, first_name, last_name, phone, address, city)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {DELIVERY_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, DeliveryRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(order_id)
        .bind(delivery.status.as_str())
        .bind(delivery.estimated_time)
        .bind(&recipient.first_name)
        .bind(&recipient.last_name)
        .bind(recipient.phone.expose())
        .bind(recipient.address.expose())
        .bind(&recipient.city)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("order {} already has a delivery", order_id))
            } else if is_foreign_key_violation(&e) {
                StoreError::not_found("order", order_id)
            } else {
                db_err(e)
            }
        })?;

    row.try_into()
}

pub(crate) async fn fetch_delivery(conn: &mut PgConnection, order_id: Uuid) -> StoreResult<Option<Delivery>> {
    let sql = format!("SELECT {DELIVERY_COLUMNS} FROM delivery WHERE order_id = $1");
    sqlx::query_as::<_, DeliveryRow>(&sql)
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?
        .map(Delivery::try_from)
        .transpose()
}

/// Compare-and-set on the delivery row keyed by its order. A `None` eta keeps
/// the current estimate.
pub(crate) async fn set_delivery_status(
    conn: &mut PgConnection,
    order_id: Uuid,
    status: DeliveryStatus,
    estimated_time: Option<DateTime<Utc>>,
) -> StoreResult<Delivery> {
    let allowed_from: Vec<&str> = status.predecessors().iter().map(|s| s.as_str()).collect();

    let sql = format!(
        r#"
        UPDATE delivery
        SET status = $1, estimated_time = COALESCE($2, estimated_time), updated_at = NOW()
        WHERE order_id = $3 AND status = ANY($4)
        RETURNING {DELIVERY_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, DeliveryRow>(&sql)
        .bind(status.as_str())
        .bind(estimated_time)
        .bind(order_id)
        .bind(&allowed_from)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;

    if let Some(row) = row {
        return row.try_into();
    }

    match fetch_delivery(conn, order_id).await? {
        Some(current) => Err(current.status.transition(status).err().unwrap_or_else(|| {
            StoreError::Conflict(format!("delivery for order {} changed concurrently", order_id))
        })),
        None => Err(StoreError::not_found("delivery", order_id)),
    }
}

#[async_trait]
impl DeliveryStore for PgDeliveryStore {
    async fn create(&self, order_id: Uuid, delivery: &NewDelivery) -> StoreResult<Delivery> {
        let mut conn = acquire(&self.pool).await?;
        insert_delivery(&mut *conn, order_id, delivery).await
    }

    async fn get_by_order(&self, order_id: Uuid) -> StoreResult<Option<Delivery>> {
        let mut conn = acquire(&self.pool).await?;
        fetch_delivery(&mut *conn, order_id).await
    }

    async fn update_status(
        &self,
        order_id: Uuid,
        status: DeliveryStatus,
        estimated_time: Option<DateTime<Utc>>,
    ) -> StoreResult<Delivery> {
        let mut conn = acquire(&self.pool).await?;
        set_delivery_status(&mut *conn, order_id, status, estimated_time).await
    }

    async fn list_all(&self, status: Option<DeliveryStatus>) -> StoreResult<Vec<Delivery>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {DELIVERY_COLUMNS} FROM delivery WHERE 1=1"
        ));
        if let Some(status) = status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY created_at DESC, id DESC");

        let rows = qb
            .build_query_as::<DeliveryRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter().map(Delivery::try_from).collect()
    }

    async fn statistics(&self) -> StoreResult<DeliveryStatistics> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM delivery GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

        let mut stats = DeliveryStatistics::default();
        for (status, count) in rows {
            let status = status
                .parse::<DeliveryStatus>()
                .map_err(|_| corrupt_column("delivery status", &status))?;
            stats.add(status, count);
        }
        Ok(stats)
    }
}
