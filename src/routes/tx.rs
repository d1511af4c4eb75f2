use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_email::Email;
use serde_json::json;

use crate::db::users::UserType;
use crate::engine::CoinEngine;
use crate::error::AppError;

use super::auth::AuthService;
use super::utils::validate_auth_token;

#[derive(Debug, Deserialize)]
pub struct SendCoinsRequest {
    pub to_email: Email,
    pub amount: i64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct GrantCreditRequest {
    pub to_email: Email,
    pub amount: i64,
    pub reason: String,
}

async fn get_balance(
    headers: HeaderMap,
    State((service, engine)): State<(Arc<AuthService>, Arc<CoinEngine>)>,
) -> Result<impl IntoResponse, AppError> {
    let auth = validate_auth_token(&headers, &service)?;

    let balance = engine.balance(auth.id).await?;
    Ok(Json(json!({ "balance": balance })))
}

async fn list_transactions(
    headers: HeaderMap,
    State((service, engine)): State<(Arc<AuthService>, Arc<CoinEngine>)>,
) -> Result<impl IntoResponse, AppError> {
    let auth = validate_auth_token(&headers, &service)?;

    let transactions = engine.history(auth.id).await?;
    Ok(Json(json!({ "transactions": transactions })))
}

// Transfer from the authenticated account to the recipient email
async fn send_coins(
    headers: HeaderMap,
    State((service, engine)): State<(Arc<AuthService>, Arc<CoinEngine>)>,
    Json(req): Json<SendCoinsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let auth = validate_auth_token(&headers, &service)?;

    let transaction = engine
        .transfer(auth.id, req.to_email.as_str(), req.amount, &req.reason)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "coins sent",
            "transaction": {
                "id": transaction.id,
                "amount": transaction.amount,
                "reason": transaction.reason,
                "created_at": transaction.created_at,
            }
        })),
    ))
}

// Institutional issuance, admin only
async fn grant_credit(
    headers: HeaderMap,
    State((service, engine)): State<(Arc<AuthService>, Arc<CoinEngine>)>,
    Json(req): Json<GrantCreditRequest>,
) -> Result<impl IntoResponse, AppError> {
    let auth = validate_auth_token(&headers, &service)?;
    if auth.user_type != UserType::Admin {
        tracing::warn!("credit issuance attempt by non-admin user {}", auth.id);
        return Err(AppError::Forbidden);
    }

    let transaction = engine
        .grant_semester_credit(req.to_email.as_str(), req.amount, &req.reason)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "semester credit issued",
            "transaction": {
                "id": transaction.id,
                "amount": transaction.amount,
                "reason": transaction.reason,
                "created_at": transaction.created_at,
            }
        })),
    ))
}

pub fn tx_routes(service: Arc<AuthService>, engine: Arc<CoinEngine>) -> Router {
    Router::new()
        .route("/", get(list_transactions))
        .route("/balance", get(get_balance))
        .route("/send", post(send_coins))
        .route("/credit", post(grant_credit))
        .with_state((service, engine))
}
