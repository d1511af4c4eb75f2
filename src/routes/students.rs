use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::db::students::{StudentRepository, StudentUpdate};
use crate::error::AppError;

use super::auth::{AuthService, RegisterStudentRequest};
use super::utils::validate_auth_token;

// Public registration, same path the auth module exposes for symmetry
// with the company routes.
async fn create_student(
    State((service, _)): State<(Arc<AuthService>, StudentRepository)>,
    Json(req): Json<RegisterStudentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student = service.register_student(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "student registered", "student": student })),
    ))
}

async fn list_students(
    headers: HeaderMap,
    State((service, repo)): State<(Arc<AuthService>, StudentRepository)>,
) -> Result<impl IntoResponse, AppError> {
    validate_auth_token(&headers, &service)?;

    let students = repo.find_all().await?;
    Ok(Json(json!({ "students": students })))
}

async fn get_student(
    headers: HeaderMap,
    State((service, repo)): State<(Arc<AuthService>, StudentRepository)>,
    Path(student_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    validate_auth_token(&headers, &service)?;

    let student = repo
        .find_by_id(student_id)
        .await?
        .ok_or(AppError::NotFound("student"))?;
    Ok(Json(json!({ "student": student })))
}

async fn get_student_by_cpf(
    headers: HeaderMap,
    State((service, repo)): State<(Arc<AuthService>, StudentRepository)>,
    Path(cpf): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    validate_auth_token(&headers, &service)?;

    let student = repo
        .find_by_cpf(&cpf)
        .await?
        .ok_or(AppError::NotFound("student"))?;
    Ok(Json(json!({ "student": student })))
}

async fn list_by_institution(
    headers: HeaderMap,
    State((service, repo)): State<(Arc<AuthService>, StudentRepository)>,
    Path(institution_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    validate_auth_token(&headers, &service)?;

    let students = repo.find_by_institution(institution_id).await?;
    Ok(Json(json!({ "students": students })))
}

async fn update_student(
    headers: HeaderMap,
    State((service, repo)): State<(Arc<AuthService>, StudentRepository)>,
    Path(student_id): Path<i64>,
    Json(update): Json<StudentUpdate>,
) -> Result<impl IntoResponse, AppError> {
    validate_auth_token(&headers, &service)?;

    if let Some(institution_id) = update.institution_id {
        if !repo.institution_exists(institution_id).await? {
            return Err(AppError::validation("institution does not exist"));
        }
    }

    if !repo.update(student_id, &update).await? {
        return Err(AppError::NotFound("student"));
    }

    let student = repo
        .find_by_id(student_id)
        .await?
        .ok_or(AppError::NotFound("student"))?;
    tracing::info!("student {student_id} updated");
    Ok(Json(json!({ "message": "student updated", "student": student })))
}

async fn delete_student(
    headers: HeaderMap,
    State((service, repo)): State<(Arc<AuthService>, StudentRepository)>,
    Path(student_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    validate_auth_token(&headers, &service)?;

    if !repo.delete(student_id).await? {
        return Err(AppError::NotFound("student"));
    }
    tracing::info!("student {student_id} deleted");
    Ok(Json(json!({ "message": "student deleted" })))
}

pub fn student_routes(service: Arc<AuthService>, repo: StudentRepository) -> Router {
    Router::new()
        .route("/", post(create_student).get(list_students))
        .route("/:id", get(get_student).put(update_student).delete(delete_student))
        .route("/cpf/:cpf", get(get_student_by_cpf))
        .route("/institution/:institution_id", get(list_by_institution))
        .with_state((service, repo))
}
