use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::db::companies::{CompanyRepository, CompanyUpdate};
use crate::db::users::UserRepository;
use crate::error::AppError;

use super::auth::{AuthService, RegisterCompanyRequest};
use super::utils::validate_auth_token;

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
}

type CompanyState = (Arc<AuthService>, CompanyRepository, UserRepository);

// Public registration
async fn create_company(
    State((service, _, _)): State<CompanyState>,
    Json(req): Json<RegisterCompanyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let company = service.register_company(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "company registered", "company": company })),
    ))
}

async fn list_companies(
    headers: HeaderMap,
    State((service, repo, _)): State<CompanyState>,
) -> Result<impl IntoResponse, AppError> {
    validate_auth_token(&headers, &service)?;

    let companies = repo.find_all().await?;
    Ok(Json(json!({ "companies": companies })))
}

async fn list_active_companies(
    headers: HeaderMap,
    State((service, repo, _)): State<CompanyState>,
) -> Result<impl IntoResponse, AppError> {
    validate_auth_token(&headers, &service)?;

    let companies = repo.find_active().await?;
    Ok(Json(json!({ "companies": companies })))
}

async fn search_companies(
    headers: HeaderMap,
    State((service, repo, _)): State<CompanyState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, AppError> {
    validate_auth_token(&headers, &service)?;

    let companies = repo.search_by_name(&params.q).await?;
    Ok(Json(json!({ "companies": companies })))
}

async fn get_company(
    headers: HeaderMap,
    State((service, repo, _)): State<CompanyState>,
    Path(company_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    validate_auth_token(&headers, &service)?;

    let company = repo
        .find_by_id(company_id)
        .await?
        .ok_or(AppError::NotFound("company"))?;
    Ok(Json(json!({ "company": company })))
}

async fn get_company_by_cnpj(
    headers: HeaderMap,
    State((service, repo, _)): State<CompanyState>,
    Path(cnpj): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    validate_auth_token(&headers, &service)?;

    let company = repo
        .find_by_cnpj(&cnpj)
        .await?
        .ok_or(AppError::NotFound("company"))?;
    Ok(Json(json!({ "company": company })))
}

async fn update_company(
    headers: HeaderMap,
    State((service, repo, _)): State<CompanyState>,
    Path(company_id): Path<i64>,
    Json(update): Json<CompanyUpdate>,
) -> Result<impl IntoResponse, AppError> {
    validate_auth_token(&headers, &service)?;

    if !repo.update(company_id, &update).await? {
        return Err(AppError::NotFound("company"));
    }

    let company = repo
        .find_by_id(company_id)
        .await?
        .ok_or(AppError::NotFound("company"))?;
    tracing::info!("company {company_id} updated");
    Ok(Json(json!({ "message": "company updated", "company": company })))
}

// Flips the linked account's active flag
async fn toggle_company(
    headers: HeaderMap,
    State((service, repo, users)): State<CompanyState>,
    Path(company_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    validate_auth_token(&headers, &service)?;

    let company = repo
        .find_by_id(company_id)
        .await?
        .ok_or(AppError::NotFound("company"))?;

    let is_active = users.toggle_active(company.user_id).await?;
    let message = if is_active {
        "company activated"
    } else {
        "company deactivated"
    };

    let company = repo
        .find_by_id(company_id)
        .await?
        .ok_or(AppError::NotFound("company"))?;
    tracing::info!("company {company_id} active flag set to {is_active}");
    Ok(Json(json!({ "message": message, "company": company })))
}

async fn delete_company(
    headers: HeaderMap,
    State((service, repo, _)): State<CompanyState>,
    Path(company_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    validate_auth_token(&headers, &service)?;

    if !repo.delete(company_id).await? {
        return Err(AppError::NotFound("company"));
    }
    tracing::info!("company {company_id} deleted");
    Ok(Json(json!({ "message": "company deleted" })))
}

pub fn company_routes(
    service: Arc<AuthService>,
    repo: CompanyRepository,
    users: UserRepository,
) -> Router {
    Router::new()
        .route("/", post(create_company).get(list_companies))
        .route("/active", get(list_active_companies))
        .route("/search", get(search_companies))
        .route(
            "/:id",
            get(get_company).put(update_company).delete(delete_company),
        )
        .route("/:id/toggle", patch(toggle_company))
        .route("/cnpj/:cnpj", get(get_company_by_cnpj))
        .with_state((service, repo, users))
}
