use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::error::AppError;

/// Student profile joined with its login email and institution name,
/// the shape every read endpoint returns.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StudentProfile {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub cpf: String,
    pub rg: Option<String>,
    pub address: Option<String>,
    pub institution_id: i64,
    pub institution_name: String,
    pub course: Option<String>,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct StudentUpdate {
    pub name: Option<String>,
    pub rg: Option<String>,
    pub address: Option<String>,
    pub institution_id: Option<i64>,
    pub course: Option<String>,
}

const PROFILE_SELECT: &str = r#"
    SELECT s.id, s.user_id, s.name, s.cpf, s.rg, s.address,
           s.institution_id, i.name AS institution_name, s.course,
           u.email, s.created_at
    FROM students s
    JOIN users u ON u.id = s.user_id
    JOIN institutions i ON i.id = s.institution_id
"#;

#[derive(Clone)]
pub struct StudentRepository {
    pool: SqlitePool,
}

impl StudentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: i64,
        name: &str,
        cpf: &str,
        rg: Option<&str>,
        address: Option<&str>,
        institution_id: i64,
        course: Option<&str>,
    ) -> Result<StudentProfile, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO students (user_id, name, cpf, rg, address, institution_id, course, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(cpf)
        .bind(rg)
        .bind(address)
        .bind(institution_id)
        .bind(course)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.find_by_id(result.last_insert_rowid())
            .await?
            .ok_or(AppError::NotFound("student"))
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<StudentProfile>, AppError> {
        let student = sqlx::query_as::<_, StudentProfile>(&format!("{PROFILE_SELECT} WHERE s.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(student)
    }

    pub async fn find_by_cpf(&self, cpf: &str) -> Result<Option<StudentProfile>, AppError> {
        let student = sqlx::query_as::<_, StudentProfile>(&format!("{PROFILE_SELECT} WHERE s.cpf = ?"))
            .bind(cpf)
            .fetch_optional(&self.pool)
            .await?;
        Ok(student)
    }

    pub async fn find_by_user_id(&self, user_id: i64) -> Result<Option<StudentProfile>, AppError> {
        let student =
            sqlx::query_as::<_, StudentProfile>(&format!("{PROFILE_SELECT} WHERE s.user_id = ?"))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(student)
    }

    pub async fn find_all(&self) -> Result<Vec<StudentProfile>, AppError> {
        let students =
            sqlx::query_as::<_, StudentProfile>(&format!("{PROFILE_SELECT} ORDER BY s.created_at DESC"))
                .fetch_all(&self.pool)
                .await?;
        Ok(students)
    }

    pub async fn find_by_institution(&self, institution_id: i64) -> Result<Vec<StudentProfile>, AppError> {
        let students = sqlx::query_as::<_, StudentProfile>(&format!(
            "{PROFILE_SELECT} WHERE s.institution_id = ? ORDER BY s.name"
        ))
        .bind(institution_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(students)
    }

    /// Partial update; absent fields keep their current value.
    pub async fn update(&self, id: i64, update: &StudentUpdate) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE students
            SET name = COALESCE(?, name),
                rg = COALESCE(?, rg),
                address = COALESCE(?, address),
                institution_id = COALESCE(?, institution_id),
                course = COALESCE(?, course)
            WHERE id = ?
            "#,
        )
        .bind(update.name.as_deref())
        .bind(update.rg.as_deref())
        .bind(update.address.as_deref())
        .bind(update.institution_id)
        .bind(update.course.as_deref())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn institution_exists(&self, institution_id: i64) -> Result<bool, AppError> {
        Ok(super::schema::institution_exists(&self.pool, institution_id).await?)
    }

    pub async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM students WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
