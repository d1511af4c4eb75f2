use axum::http::HeaderMap;

use super::auth::{AuthService, AuthUser};
use crate::error::AppError;

#[inline]
pub fn validate_auth_token(headers: &HeaderMap, service: &AuthService) -> Result<AuthUser, AppError> {
    let header = match headers.get("Authorization").map(|token| token.to_str()) {
        Some(Ok(value)) => value,
        _ => {
            return Err(AppError::Unauthorized);
        }
    };
    let token = header.strip_prefix("Bearer ").unwrap_or(header);

    service.verify_token(token)
}

#[inline]
pub fn check_password(password: &str) -> Result<(), AppError> {
    if password.len() < 8 {
        return Err(AppError::validation("password must be at least 8 characters"));
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(AppError::validation("password must contain at least one uppercase letter"));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(AppError::validation("password must contain at least one lowercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AppError::validation("password must contain at least one digit"));
    }
    if !password.chars().any(|c| !c.is_alphanumeric()) {
        return Err(AppError::validation("password must contain at least one special character"));
    }
    Ok(())
}

/// CPF check-digit validation. Accepts the punctuated form and returns
/// the 11 bare digits.
pub fn validate_cpf(cpf: &str) -> Result<String, AppError> {
    let digits: Vec<u32> = cpf.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 11 || cpf.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::validation("invalid CPF"));
    }
    if digits.iter().all(|&d| d == digits[0]) {
        return Err(AppError::validation("invalid CPF"));
    }

    for (take, check) in [(9usize, 9usize), (10, 10)] {
        let sum: u32 = digits[..take]
            .iter()
            .zip((2..=(take as u32 + 1)).rev())
            .map(|(d, weight)| d * weight)
            .sum();
        if (sum * 10) % 11 % 10 != digits[check] {
            return Err(AppError::validation("invalid CPF"));
        }
    }

    Ok(digits.iter().map(|d| d.to_string()).collect())
}

/// CNPJ check-digit validation. Accepts the punctuated form and returns
/// the 14 bare digits.
pub fn validate_cnpj(cnpj: &str) -> Result<String, AppError> {
    let digits: Vec<u32> = cnpj.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 14 || cnpj.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::validation("invalid CNPJ"));
    }
    if digits.iter().all(|&d| d == digits[0]) {
        return Err(AppError::validation("invalid CNPJ"));
    }

    let weights_one = [5u32, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    let weights_two = [6u32, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

    for (weights, check) in [(&weights_one[..], 12usize), (&weights_two[..], 13)] {
        let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
        let expected = match sum % 11 {
            0 | 1 => 0,
            rest => 11 - rest,
        };
        if expected != digits[check] {
            return Err(AppError::validation("invalid CNPJ"));
        }
    }

    Ok(digits.iter().map(|d| d.to_string()).collect())
}
