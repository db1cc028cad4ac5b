use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use mealkit_core::{StoreResult, StoreSet};

use crate::account_repo::PgAccountStore;
use crate::app_config::DatabaseConfig;
use crate::delivery_repo::PgDeliveryStore;
use crate::error::db_err;
use crate::inventory_repo::PgInventoryStore;
use crate::line_item_repo::PgLineItemStore;
use crate::order_repo::PgOrderStore;
use crate::unit_of_work::PgUnitOfWork;

#[derive(Clone)]
pub struct DbClient {
    pub pool: PgPool,
}

impl DbClient {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Postgres-backed stores sharing this client's pool.
    pub fn stores(&self) -> StoreSet {
        StoreSet {
            inventory: Arc::new(PgInventoryStore::new(self.pool.clone())),
            orders: Arc::new(PgOrderStore::new(self.pool.clone())),
            line_items: Arc::new(PgLineItemStore::new(self.pool.clone())),
            deliveries: Arc::new(PgDeliveryStore::new(self.pool.clone())),
            accounts: Arc::new(PgAccountStore::new(self.pool.clone())),
            unit_of_work: Arc::new(PgUnitOfWork::new(self.pool.clone())),
        }
    }
}

pub(crate) async fn acquire(pool: &PgPool) -> StoreResult<PoolConnection<Postgres>> {
    pool.acquire().await.map_err(db_err)
}
