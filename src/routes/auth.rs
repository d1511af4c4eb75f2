use std::sync::Arc;
use std::time::Duration;

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_email::Email;
use serde_json::json;

use crate::db::companies::{CompanyProfile, CompanyRepository};
use crate::db::students::{StudentProfile, StudentRepository};
use crate::db::users::{User, UserRepository, UserType};
use crate::error::AppError;
use crate::routes::utils;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    sub: i64,           // user id
    typ: UserType,      // account role
    exp: i64,           // expiration timestamp
    iat: i64,           // issued at timestamp
}

/// The authenticated caller, as extracted from a verified token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: i64,
    pub user_type: UserType,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    email: Email,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterStudentRequest {
    pub name: String,
    pub email: Email,
    pub password: String,
    pub cpf: String,
    pub rg: Option<String>,
    pub address: Option<String>,
    pub institution_id: i64,
    pub course: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterCompanyRequest {
    pub name: String,
    pub email: Email,
    pub password: String,
    pub cnpj: String,
    pub address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    token: String,
    user: UserSummary,
}

#[derive(Debug, Serialize)]
struct UserSummary {
    id: i64,
    email: String,
    user_type: UserType,
}

// Authentication service
pub struct AuthService {
    users: UserRepository,
    students: StudentRepository,
    companies: CompanyRepository,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(
        users: UserRepository,
        students: StudentRepository,
        companies: CompanyRepository,
        jwt_secret: String,
    ) -> Self {
        Self {
            users,
            students,
            companies,
            jwt_secret,
        }
    }

    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, AppError> {
        let user = self
            .users
            .find_by_email(req.email.as_str())
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !user.is_active {
            tracing::warn!("login attempt on deactivated account: {}", user.id);
            return Err(AppError::InvalidCredentials);
        }

        // Verify password
        let parsed_hash =
            PasswordHash::new(&user.password_hash).map_err(|_err| AppError::InvalidCredentials)?;
        if Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .is_err()
        {
            tracing::warn!("invalid credentials for user: {}", user.id);
            return Err(AppError::InvalidCredentials);
        }

        let token = self.generate_token(&user)?;
        tracing::info!("user {} logged in", user.id);

        Ok(AuthResponse {
            token,
            user: UserSummary {
                id: user.id,
                email: user.email,
                user_type: user.user_type,
            },
        })
    }

    pub async fn register_student(
        &self,
        req: RegisterStudentRequest,
    ) -> Result<StudentProfile, AppError> {
        utils::check_password(&req.password)?;
        let cpf = utils::validate_cpf(&req.cpf)?;

        if self.users.find_by_email(req.email.as_str()).await?.is_some() {
            return Err(AppError::validation("email already registered"));
        }
        if self.students.find_by_cpf(&cpf).await?.is_some() {
            return Err(AppError::validation("CPF already registered"));
        }
        if !self.students.institution_exists(req.institution_id).await? {
            return Err(AppError::validation("institution does not exist"));
        }

        let password_hash = self.hash_password(&req.password)?;
        let user = self
            .users
            .create(req.email.as_str(), &password_hash, UserType::Student)
            .await?;

        let student = self
            .students
            .create(
                user.id,
                &req.name,
                &cpf,
                req.rg.as_deref(),
                req.address.as_deref(),
                req.institution_id,
                req.course.as_deref(),
            )
            .await?;
        tracing::info!("student {} registered for user {}", student.id, user.id);

        Ok(student)
    }

    pub async fn register_company(
        &self,
        req: RegisterCompanyRequest,
    ) -> Result<CompanyProfile, AppError> {
        utils::check_password(&req.password)?;
        let cnpj = utils::validate_cnpj(&req.cnpj)?;

        if self.users.find_by_email(req.email.as_str()).await?.is_some() {
            return Err(AppError::validation("email already registered"));
        }
        if self.companies.find_by_cnpj(&cnpj).await?.is_some() {
            return Err(AppError::validation("CNPJ already registered"));
        }

        let password_hash = self.hash_password(&req.password)?;
        let user = self
            .users
            .create(req.email.as_str(), &password_hash, UserType::Company)
            .await?;

        let company = self
            .companies
            .create(user.id, &req.name, &cnpj, req.address.as_deref())
            .await?;
        tracing::info!("company {} registered for user {}", company.id, user.id);

        Ok(company)
    }

    /// Bootstraps the admin account at startup when missing.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<(), AppError> {
        if self.users.find_by_email(email).await?.is_some() {
            return Ok(());
        }

        let password_hash = self.hash_password(password)?;
        let admin = self.users.create(email, &password_hash, UserType::Admin).await?;
        tracing::info!("admin account bootstrapped: {}", admin.id);
        Ok(())
    }

    pub fn verify_token(&self, token: &str) -> Result<AuthUser, AppError> {
        let mut validation = jsonwebtoken::Validation::default();

        validation.leeway = 10;
        validation.validate_exp = true;
        validation.algorithms = vec![jsonwebtoken::Algorithm::HS256];

        let token_data = jsonwebtoken::decode::<Claims>(
            token,
            &jsonwebtoken::DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|err| {
            tracing::error!("error decoding token: {:?}", err);
            AppError::Unauthorized
        })?;

        Ok(AuthUser {
            id: token_data.claims.sub,
            user_type: token_data.claims.typ,
        })
    }

    fn generate_token(&self, user: &User) -> Result<String, AppError> {
        let now = Utc::now();

        // 24h access token
        let claims = Claims {
            sub: user.id,
            typ: user.user_type,
            exp: (now + Duration::from_secs(24 * 60 * 60)).timestamp(),
            iat: now.timestamp(),
        };

        jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|err| {
            tracing::error!("error encoding token: {:?}", err);
            AppError::Unauthorized
        })
    }

    fn hash_password(&self, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut rand::thread_rng());
        let argon2 = Argon2::default();
        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|_err| AppError::validation("unable to hash password"))?
            .to_string();
        Ok(hash)
    }
}

// Route for handling user login
pub async fn login_handler(
    State(service): State<Arc<AuthService>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = service.login(req).await?;
    Ok((StatusCode::OK, Json(response)))
}

// Route for handling new student registration
pub async fn register_student_handler(
    State(service): State<Arc<AuthService>>,
    Json(req): Json<RegisterStudentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student = service.register_student(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "student registered", "student": student })),
    ))
}

// Route for handling new company registration
pub async fn register_company_handler(
    State(service): State<Arc<AuthService>>,
    Json(req): Json<RegisterCompanyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let company = service.register_company(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "company registered", "company": company })),
    ))
}

// Role-dispatched profile lookup for the logged-in account
pub async fn profile_handler(
    headers: HeaderMap,
    State(service): State<Arc<AuthService>>,
) -> Result<impl IntoResponse, AppError> {
    let auth = utils::validate_auth_token(&headers, &service)?;

    let profile = match auth.user_type {
        UserType::Student => service
            .students
            .find_by_user_id(auth.id)
            .await?
            .map(|student| json!({ "profile": student })),
        UserType::Company => service
            .companies
            .find_by_user_id(auth.id)
            .await?
            .map(|company| json!({ "profile": company })),
        UserType::Admin => None,
    }
    .ok_or(AppError::NotFound("profile"))?;

    Ok((StatusCode::OK, Json(profile)))
}

pub fn auth_routes(service: Arc<AuthService>) -> Router {
    Router::new()
        .route("/login", post(login_handler))
        .route("/register/student", post(register_student_handler))
        .route("/register/company", post(register_company_handler))
        .route("/profile", get(profile_handler))
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_pool;

    async fn service() -> Arc<AuthService> {
        let pool = memory_pool().await;
        Arc::new(AuthService::new(
            UserRepository::new(pool.clone()),
            StudentRepository::new(pool.clone()),
            CompanyRepository::new(pool),
            "test-secret".to_string(),
        ))
    }

    fn student_request(email: &str, cpf: &str) -> RegisterStudentRequest {
        RegisterStudentRequest {
            name: "Ana Souza".to_string(),
            email: Email::from_string(email.to_string()).unwrap(),
            password: "Str0ng!pass".to_string(),
            cpf: cpf.to_string(),
            rg: None,
            address: None,
            institution_id: 1,
            course: Some("Engineering".to_string()),
        }
    }

    #[tokio::test]
    async fn register_then_login_round_trip() {
        let service = service().await;

        let student = service
            .register_student(student_request("ana@university.edu", "111.444.777-35"))
            .await
            .unwrap();
        assert_eq!(student.cpf, "11144477735");

        let response = service
            .login(LoginRequest {
                email: Email::from_string("ana@university.edu".to_string()).unwrap(),
                password: "Str0ng!pass".to_string(),
            })
            .await
            .unwrap();

        let auth = service.verify_token(&response.token).unwrap();
        assert_eq!(auth.id, student.user_id);
        assert!(matches!(auth.user_type, UserType::Student));
    }

    #[tokio::test]
    async fn login_rejects_wrong_password() {
        let service = service().await;
        service
            .register_student(student_request("ana@university.edu", "111.444.777-35"))
            .await
            .unwrap();

        let err = service
            .login(LoginRequest {
                email: Email::from_string("ana@university.edu".to_string()).unwrap(),
                password: "Wr0ng!pass".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn duplicate_email_and_cpf_are_rejected() {
        let service = service().await;
        service
            .register_student(student_request("ana@university.edu", "111.444.777-35"))
            .await
            .unwrap();

        let err = service
            .register_student(student_request("ana@university.edu", "111.444.777-35"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn verify_token_rejects_garbage() {
        let service = service().await;
        assert!(matches!(
            service.verify_token("not-a-token").unwrap_err(),
            AppError::Unauthorized
        ));
    }

    #[tokio::test]
    async fn ensure_admin_is_idempotent() {
        let service = service().await;
        service.ensure_admin("admin@merit.edu", "Adm1n!pass").await.unwrap();
        service.ensure_admin("admin@merit.edu", "Adm1n!pass").await.unwrap();

        let response = service
            .login(LoginRequest {
                email: Email::from_string("admin@merit.edu".to_string()).unwrap(),
                password: "Adm1n!pass".to_string(),
            })
            .await
            .unwrap();
        let auth = service.verify_token(&response.token).unwrap();
        assert!(matches!(auth.user_type, UserType::Admin));
    }
}
