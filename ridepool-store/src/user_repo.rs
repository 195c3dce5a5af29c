use crate::storage_err;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ridepool_core::repository::UserRepository;
use ridepool_core::{CoreError, CoreResult};
use ridepool_shared::{Masked, User};
use sqlx::PgPool;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, external_id, display_name, is_driver, is_passenger, payment_account, \
     rating_sum, rating_count, disabled, created_at, updated_at";

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    external_id: String,
    display_name: Option<String>,
    is_driver: bool,
    is_passenger: bool,
    payment_account: Option<String>,
    rating_sum: i64,
    rating_count: i64,
    disabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            external_id: row.external_id,
            display_name: row.display_name,
            is_driver: row.is_driver,
            is_passenger: row.is_passenger,
            payment_account: row.payment_account.map(Masked),
            rating_sum: row.rating_sum,
            rating_count: row.rating_count,
            disabled: row.disabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn get_or_create(&self, external_id: &str) -> CoreResult<User> {
        let fresh = User::new(external_id);
        // The no-op update makes RETURNING yield the existing row on conflict.
        let row: UserRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO users (id, external_id, is_driver, is_passenger, disabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, FALSE, $5, $5)
            ON CONFLICT (external_id) DO UPDATE SET external_id = EXCLUDED.external_id
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(fresh.id)
        .bind(&fresh.external_id)
        .bind(fresh.is_driver)
        .bind(fresh.is_passenger)
        .bind(fresh.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(row.into())
    }

    async fn get_user(&self, id: Uuid) -> CoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(User::from))
    }

    async fn update_user(&self, user: &User) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                display_name = $2, is_driver = $3, is_passenger = $4, payment_account = $5,
                rating_sum = $6, rating_count = $7, disabled = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.display_name)
        .bind(user.is_driver)
        .bind(user.is_passenger)
        .bind(user.payment_account.as_ref().map(|a| a.expose().as_str()))
        .bind(user.rating_sum)
        .bind(user.rating_count)
        .bind(user.disabled)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("user", user.id));
        }
        Ok(())
    }

    async fn disable_user(&self, id: Uuid) -> CoreResult<()> {
        let result = sqlx::query("UPDATE users SET disabled = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("user", id));
        }
        Ok(())
    }
}
