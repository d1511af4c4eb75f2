use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TransactionKind {
    Transfer,
    SemesterCredit,
    Redemption,
}

/// One ledger entry. Rows are append-only: nothing in the crate updates
/// or deletes a transaction once it is stored.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Transaction {
    pub id: i64,
    pub from_user_id: Option<i64>,
    pub to_user_id: i64,
    pub amount: i64,
    pub reason: String,
    pub kind: TransactionKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewTransaction {
    pub from_user_id: Option<i64>,
    pub to_user_id: i64,
    pub amount: i64,
    pub reason: String,
    pub kind: TransactionKind,
}

/// Append-only transaction log. Balances are derived from it and never
/// stored, so there is no separate balance column that could drift.
#[derive(Clone)]
pub struct LedgerStore {
    pool: SqlitePool,
}

impl LedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Validates and stores a fully-populated entry, assigning its id and
    /// timestamp. The checks and the insert run inside one database
    /// transaction, so a failed append leaves the ledger unchanged.
    pub async fn append(&self, entry: NewTransaction) -> Result<Transaction, AppError> {
        if entry.amount <= 0 {
            return Err(AppError::validation("amount must be positive"));
        }

        let mut tx = self.pool.begin().await?;

        let recipient_exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
            .bind(entry.to_user_id)
            .fetch_one(&mut *tx)
            .await?;
        if recipient_exists == 0 {
            return Err(AppError::validation("recipient user does not exist"));
        }

        if entry.kind == TransactionKind::Transfer {
            let from_user_id = entry
                .from_user_id
                .ok_or_else(|| AppError::validation("transfer requires a sender"))?;
            if from_user_id == entry.to_user_id {
                return Err(AppError::validation("sender and recipient must differ"));
            }
            let sender_exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
                .bind(from_user_id)
                .fetch_one(&mut *tx)
                .await?;
            if sender_exists == 0 {
                return Err(AppError::validation("sender user does not exist"));
            }
        }

        let result = sqlx::query(
            r#"
            INSERT INTO transactions (from_user_id, to_user_id, amount, reason, kind, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.from_user_id)
        .bind(entry.to_user_id)
        .bind(entry.amount)
        .bind(&entry.reason)
        .bind(entry.kind)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let stored = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, from_user_id, to_user_id, amount, reason, kind, created_at
            FROM transactions
            WHERE id = ?
            "#,
        )
        .bind(result.last_insert_rowid())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    /// Everything the user sent or received, newest first. An unknown user
    /// simply has no history.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Transaction>, AppError> {
        let transactions = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, from_user_id, to_user_id, amount, reason, kind, created_at
            FROM transactions
            WHERE to_user_id = ?1 OR from_user_id = ?1
            ORDER BY id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(transactions)
    }

    /// Signed sum over the full ledger: incoming minus outgoing.
    pub async fn balance_of(&self, user_id: i64) -> Result<i64, AppError> {
        let balance = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE((SELECT SUM(amount) FROM transactions WHERE to_user_id = ?1), 0)
                 - COALESCE((SELECT SUM(amount) FROM transactions WHERE from_user_id = ?1), 0)
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(balance)
    }

    #[cfg(test)]
    pub async fn len(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM transactions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_pool;
    use crate::db::users::{UserRepository, UserType};

    async fn store_with_users() -> (LedgerStore, i64, i64) {
        let pool = memory_pool().await;
        let users = UserRepository::new(pool.clone());
        let a = users
            .create("a@university.edu", "hash", UserType::Student)
            .await
            .unwrap();
        let b = users
            .create("b@university.edu", "hash", UserType::Student)
            .await
            .unwrap();
        (LedgerStore::new(pool), a.id, b.id)
    }

    fn credit(to: i64, amount: i64) -> NewTransaction {
        NewTransaction {
            from_user_id: None,
            to_user_id: to,
            amount,
            reason: "semester allocation".to_string(),
            kind: TransactionKind::SemesterCredit,
        }
    }

    #[tokio::test]
    async fn append_assigns_monotonic_ids() {
        let (store, a, _) = store_with_users().await;

        let first = store.append(credit(a, 10)).await.unwrap();
        let second = store.append(credit(a, 20)).await.unwrap();
        assert!(second.id > first.id);
        assert_eq!(second.kind, TransactionKind::SemesterCredit);
        assert!(second.from_user_id.is_none());
    }

    #[tokio::test]
    async fn append_rejects_non_positive_amount() {
        let (store, a, _) = store_with_users().await;

        let err = store.append(credit(a, 0)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn append_rejects_unknown_recipient() {
        let (store, _, _) = store_with_users().await;

        let err = store.append(credit(9999, 10)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn append_rejects_self_transfer() {
        let (store, a, _) = store_with_users().await;

        let err = store
            .append(NewTransaction {
                from_user_id: Some(a),
                to_user_id: a,
                amount: 5,
                reason: "self".to_string(),
                kind: TransactionKind::Transfer,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_empty_for_unknown_users() {
        let (store, a, b) = store_with_users().await;

        store.append(credit(a, 10)).await.unwrap();
        store
            .append(NewTransaction {
                from_user_id: Some(a),
                to_user_id: b,
                amount: 4,
                reason: "helping with the lab".to_string(),
                kind: TransactionKind::Transfer,
            })
            .await
            .unwrap();

        let history = store.list_for_user(a).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].id > history[1].id);
        assert_eq!(history[0].kind, TransactionKind::Transfer);

        assert!(store.list_for_user(12345).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn balance_is_the_signed_sum_of_the_ledger() {
        let (store, a, b) = store_with_users().await;

        store.append(credit(a, 100)).await.unwrap();
        store.append(credit(b, 5)).await.unwrap();
        store
            .append(NewTransaction {
                from_user_id: Some(a),
                to_user_id: b,
                amount: 30,
                reason: "group project".to_string(),
                kind: TransactionKind::Transfer,
            })
            .await
            .unwrap();

        assert_eq!(store.balance_of(a).await.unwrap(), 70);
        assert_eq!(store.balance_of(b).await.unwrap(), 35);
        assert_eq!(store.balance_of(999).await.unwrap(), 0);
    }
}
