use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::error::AppError;

/// Company profile joined with its login email and active flag.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CompanyProfile {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub cnpj: String,
    pub address: Option<String>,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CompanyUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
}

const PROFILE_SELECT: &str = r#"
    SELECT c.id, c.user_id, c.name, c.cnpj, c.address,
           u.email, u.is_active, c.created_at
    FROM companies c
    JOIN users u ON u.id = c.user_id
"#;

#[derive(Clone)]
pub struct CompanyRepository {
    pool: SqlitePool,
}

impl CompanyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: i64,
        name: &str,
        cnpj: &str,
        address: Option<&str>,
    ) -> Result<CompanyProfile, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO companies (user_id, name, cnpj, address, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(cnpj)
        .bind(address)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.find_by_id(result.last_insert_rowid())
            .await?
            .ok_or(AppError::NotFound("company"))
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<CompanyProfile>, AppError> {
        let company = sqlx::query_as::<_, CompanyProfile>(&format!("{PROFILE_SELECT} WHERE c.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(company)
    }

    pub async fn find_by_cnpj(&self, cnpj: &str) -> Result<Option<CompanyProfile>, AppError> {
        let company =
            sqlx::query_as::<_, CompanyProfile>(&format!("{PROFILE_SELECT} WHERE c.cnpj = ?"))
                .bind(cnpj)
                .fetch_optional(&self.pool)
                .await?;
        Ok(company)
    }

    pub async fn find_by_user_id(&self, user_id: i64) -> Result<Option<CompanyProfile>, AppError> {
        let company =
            sqlx::query_as::<_, CompanyProfile>(&format!("{PROFILE_SELECT} WHERE c.user_id = ?"))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(company)
    }

    pub async fn find_all(&self) -> Result<Vec<CompanyProfile>, AppError> {
        let companies =
            sqlx::query_as::<_, CompanyProfile>(&format!("{PROFILE_SELECT} ORDER BY c.created_at DESC"))
                .fetch_all(&self.pool)
                .await?;
        Ok(companies)
    }

    pub async fn find_active(&self) -> Result<Vec<CompanyProfile>, AppError> {
        let companies = sqlx::query_as::<_, CompanyProfile>(&format!(
            "{PROFILE_SELECT} WHERE u.is_active = 1 ORDER BY c.created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(companies)
    }

    pub async fn search_by_name(&self, term: &str) -> Result<Vec<CompanyProfile>, AppError> {
        let companies = sqlx::query_as::<_, CompanyProfile>(&format!(
            "{PROFILE_SELECT} WHERE c.name LIKE '%' || ? || '%' ORDER BY c.name"
        ))
        .bind(term)
        .fetch_all(&self.pool)
        .await?;
        Ok(companies)
    }

    pub async fn update(&self, id: i64, update: &CompanyUpdate) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE companies
            SET name = COALESCE(?, name),
                address = COALESCE(?, address)
            WHERE id = ?
            "#,
        )
        .bind(update.name.as_deref())
        .bind(update.address.as_deref())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM companies WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
