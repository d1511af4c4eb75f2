use sqlx::SqlitePool;

// Schema is created at startup instead of through a migrations directory;
// the store is a single-file (or in-memory) SQLite database.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS institutions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL,
    address TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    user_type TEXT NOT NULL CHECK (user_type IN ('student', 'company', 'admin')),
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS students (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    cpf TEXT UNIQUE NOT NULL,
    rg TEXT,
    address TEXT,
    institution_id INTEGER NOT NULL REFERENCES institutions(id),
    course TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS companies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    cnpj TEXT UNIQUE NOT NULL,
    address TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_user_id INTEGER REFERENCES users(id),
    to_user_id INTEGER NOT NULL REFERENCES users(id),
    amount INTEGER NOT NULL CHECK (amount > 0),
    reason TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('transfer', 'semester_credit', 'redemption')),
    created_at TEXT NOT NULL
);
"#;

pub async fn init(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

/// Seeds the partner institutions. Idempotent, so it runs on every startup.
pub async fn seed(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let institutions = [
        ("Federal University of Technology", "123 University St"),
        ("National Institute of Technology", "456 Technology Ave"),
        ("College of Applied Sciences", "789 Sciences St"),
    ];

    for (name, address) in institutions {
        sqlx::query(
            "INSERT OR IGNORE INTO institutions (name, address, created_at) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(address)
        .bind(chrono::Utc::now())
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn institution_exists(pool: &SqlitePool, institution_id: i64) -> Result<bool, sqlx::Error> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM institutions WHERE id = ?")
        .bind(institution_id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}
