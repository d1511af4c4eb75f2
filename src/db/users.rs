use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UserType {
    Student,
    Company,
    Admin,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub user_type: UserType,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Account repository, one row per login regardless of profile type
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        email: &str,
        password_hash: &str,
        user_type: UserType,
    ) -> Result<User, AppError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO users (email, password_hash, user_type, is_active, created_at, updated_at)
            VALUES (?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(user_type)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let user = self
            .find_by_id(result.last_insert_rowid())
            .await?
            .ok_or(AppError::NotFound("user"))?;
        Ok(user)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, user_type, is_active, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, user_type, is_active, created_at, updated_at
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Flips the account's active flag, returning the new state.
    pub async fn toggle_active(&self, id: i64) -> Result<bool, AppError> {
        sqlx::query("UPDATE users SET is_active = 1 - is_active, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        let user = self.find_by_id(id).await?.ok_or(AppError::NotFound("user"))?;
        Ok(user.is_active)
    }

    pub async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_pool;

    #[tokio::test]
    async fn create_and_find_round_trip() {
        let pool = memory_pool().await;
        let repo = UserRepository::new(pool);

        let created = repo
            .create("ana@university.edu", "hash", UserType::Student)
            .await
            .unwrap();
        assert!(created.is_active);
        assert_eq!(created.user_type, UserType::Student);

        let by_email = repo.find_by_email("ana@university.edu").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);

        assert!(repo.find_by_email("nobody@university.edu").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn toggle_active_flips_the_flag() {
        let pool = memory_pool().await;
        let repo = UserRepository::new(pool);

        let user = repo
            .create("shop@partners.com", "hash", UserType::Company)
            .await
            .unwrap();

        assert!(!repo.toggle_active(user.id).await.unwrap());
        assert!(repo.toggle_active(user.id).await.unwrap());
    }
}
