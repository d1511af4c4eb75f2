use std::process;
use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tokio::net::TcpListener;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer};
use tracing_subscriber::{fmt::{writer::BoxMakeWriter, Layer}, layer::SubscriberExt, EnvFilter, Registry};

use db::companies::CompanyRepository;
use db::ledger::LedgerStore;
use db::students::StudentRepository;
use db::users::UserRepository;
use engine::CoinEngine;
use routes::auth::AuthService;

mod db;
mod engine;
mod error;
mod routes;

#[tokio::main]
async fn main() {

    // all fields are optional; defaults suit local development
    let db_url = dotenv::var("DATABASE_URL").unwrap_or("sqlite:merit.db?mode=rwc".to_string());
    let jwt_secret = dotenv::var("JWT_SECRET").unwrap_or("academic-merit-secret-key".to_string());
    let admin_email = dotenv::var("ADMIN_EMAIL").unwrap_or("admin@merit.edu".to_string());
    let admin_password = dotenv::var("ADMIN_PASSWORD").unwrap_or("Adm1n!merit".to_string());
    let max_connection_pooling = dotenv::var("MAX_CONNECTION_POOLING").unwrap_or("5".to_string()).parse::<u32>().unwrap();
    let port = dotenv::var("PORT").unwrap_or("3000".to_string()).parse::<u16>().unwrap();
    let log_file = dotenv::var("LOG_FILE").unwrap_or("app.log".to_string());

    // add tracing layer
    let file_appender = tracing_appender::rolling::never(".", &log_file);
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, _guard) = tracing_appender::non_blocking(std::io::stdout());

    let file_layer = Layer::new().json().with_writer(BoxMakeWriter::new(move || file_writer.clone()));
    let stdout_layer = Layer::new().with_writer(BoxMakeWriter::new(move || stdout_writer.clone()));

    let subscriber = Registry::default()
        .with(EnvFilter::from_default_env())
        .with(file_layer)
        .with(stdout_layer);

    tracing::subscriber::set_global_default(subscriber).expect("Unable to set global subscriber");

    let database_pool = match process_database(&db_url, max_connection_pooling).await {
        Ok(db) => {
            tracing::info!("Connected to database");
            db
        },
        Err(err) => {
            tracing::error!("Failed to connect to database: {}", err);
            process::exit(1);
        }
    };

    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(port) => {
            tracing::info!("Listening on port: {}", port.local_addr().unwrap().port());
            port
        }
        Err(err) => {
            tracing::error!("Failed to bind to port: {}", err);
            process::exit(1);
        }
    };

    let router = match process_begin(database_pool, jwt_secret, &admin_email, &admin_password).await {
        Ok(router) => {
            tracing::info!("Routes constructed successfully");
            router
        }
        Err(err) => {
            tracing::error!("Failed to construct routes: {}", err);
            process::exit(1);
        }
    };

    //start the http service
    let http_service = axum::serve(listener, router);
    if let Err(err) = http_service.await {
        tracing::error!("Failed to start server: {}", err);
        process::exit(1);
    }
}

async fn process_begin(
    db_pool: SqlitePool,
    jwt_secret: String,
    admin_email: &str,
    admin_password: &str,
) -> Result<Router, String> {
    let users = UserRepository::new(db_pool.clone());
    let students = StudentRepository::new(db_pool.clone());
    let companies = CompanyRepository::new(db_pool.clone());
    let ledger = LedgerStore::new(db_pool);

    let service = Arc::new(AuthService::new(
        users.clone(),
        students.clone(),
        companies.clone(),
        jwt_secret,
    ));
    let engine = Arc::new(CoinEngine::new(users.clone(), ledger));

    service
        .ensure_admin(admin_email, admin_password)
        .await
        .map_err(|err| format!("Failed to bootstrap admin account: {err}"))?;

    let auth_routes = routes::auth::auth_routes(service.clone());
    let student_routes = routes::students::student_routes(service.clone(), students);
    let company_routes = routes::companies::company_routes(service.clone(), companies, users);
    let tx_routes = routes::tx::tx_routes(service, engine)
        .route_layer(CompressionLayer::new().gzip(true));

    let router = Router::new()
        .route("/api/health", get(health))
        .nest("/api/auth", auth_routes)
        .nest("/api/students", student_routes)
        .nest("/api/companies", company_routes)
        .nest("/api/transactions", tx_routes)
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .route_layer(RequestBodyLimitLayer::new(1024 * 1024)); //1MB limit

    Ok(router)
}

async fn process_database(url: &str, max_conn_pool: u32) -> Result<SqlitePool, String> {
    // create a connection pool
    let db_pool = SqlitePoolOptions::new()
        .max_connections(max_conn_pool)
        .connect(url)
        .await
        .map_err(|err| format!("Failed to connect to database: {}", err))?;

    db::schema::init(&db_pool)
        .await
        .map_err(|err| format!("Failed to create schema: {}", err))?;
    tracing::info!("Schema created successfully");

    db::schema::seed(&db_pool)
        .await
        .map_err(|err| format!("Failed to seed institutions: {}", err))?;
    tracing::info!("Institutions seeded successfully");

    Ok(db_pool)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "message": "academic merit coin service running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "route not found" })))
}
