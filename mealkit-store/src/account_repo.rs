use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use mealkit_core::repository::AccountStore;
use mealkit_core::{Account, NewAccount, Plan, Role, StoreError, StoreResult};

use crate::error::{corrupt_column, db_err, is_foreign_key_violation, is_unique_violation};

pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    password_hash: String,
    name: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|_| corrupt_column("account role", &row.role))?;

        Ok(Account {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            role,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PlanRow {
    id: Uuid,
    user_id: Uuid,
    tier: String,
    expires_on: NaiveDate,
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn create_account(&self, account: &NewAccount) -> StoreResult<Account> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            INSERT INTO account (id, email, password_hash, name, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, password_hash, name, role, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.name)
        .bind(account.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("email {} is already registered", account.email))
            } else {
                db_err(e)
            }
        })?;

        row.try_into()
    }

    async fn get_account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        sqlx::query_as::<_, AccountRow>(
            "SELECT id, email, password_hash, name, role, created_at FROM account WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(Account::try_from)
        .transpose()
    }

    async fn count_by_role(&self, role: Role) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM account WHERE role = $1")
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn create_plan(&self, owner_id: Uuid, tier: &str, expires_on: NaiveDate) -> StoreResult<Plan> {
        let row = sqlx::query_as::<_, PlanRow>(
            r#"
            INSERT INTO plan (id, user_id, tier, expires_on)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, tier, expires_on
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(tier)
        .bind(expires_on)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StoreError::not_found("account", owner_id)
            } else {
                db_err(e)
            }
        })?;

        Ok(Plan {
            id: row.id,
            owner_id: row.user_id,
            tier: row.tier,
            expires_on: row.expires_on,
        })
    }
}
