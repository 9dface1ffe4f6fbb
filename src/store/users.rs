//! Users and role membership.

use super::models::UserRow;
use super::Store;
use crate::error::{AppError, AppResult};

const USER_COLUMNS: &str =
    "id, email, username, password_hash, active, confirmed_at, external_id, created_at";

impl Store {
    /// Inserts an account that is immediately active and confirmed. A UNIQUE
    /// violation on email or username surfaces as `AppError::Conflict`.
    pub async fn create_user(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
        external_id: &str,
        now: i64,
    ) -> AppResult<UserRow> {
        let res = sqlx::query(
            "INSERT INTO users (email, username, password_hash, active, confirmed_at, \
             external_id, created_at) VALUES (?, ?, ?, 1, ?, ?, ?)",
        )
        .bind(email)
        .bind(username)
        .bind(password_hash)
        .bind(now)
        .bind(external_id)
        .bind(now)
        .execute(self.pool())
        .await?;
        let id = res.last_insert_rowid();
        self.user_by_id(id).await?.ok_or_else(|| {
            AppError::internal("users", format!("user row vanished after insert: {email}"))
        })
    }

    pub async fn user_by_id(&self, id: i64) -> AppResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn user_by_email(&self, email: &str) -> AppResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn user_by_username(&self, username: &str) -> AppResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn update_password(&self, user_id: i64, password_hash: &str) -> AppResult<bool> {
        let res = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Enables or disables an account. Disabled accounts keep their rows and
    /// history but cannot log in, and live sessions stop resolving to them.
    pub async fn set_user_active(&self, user_id: i64, active: bool) -> AppResult<bool> {
        let res = sqlx::query("UPDATE users SET active = ? WHERE id = ?")
            .bind(active)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn roles_for_user(&self, user_id: i64) -> AppResult<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT r.name FROM roles r \
             JOIN user_roles ur ON ur.role_id = r.id \
             WHERE ur.user_id = ? ORDER BY r.name",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(names)
    }

    /// Grants `role` to the user; granting an already-held role is a no-op.
    pub async fn grant_role(&self, user_id: i64, role: &str) -> AppResult<()> {
        let role_id = sqlx::query_scalar::<_, i64>("SELECT id FROM roles WHERE name = ?")
            .bind(role)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| AppError::not_found("role_unknown", format!("no such role: {role}")))?;
        sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(role_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
