use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::ledger::{LedgerStore, NewTransaction, Transaction, TransactionKind};
use crate::db::users::UserRepository;
use crate::error::AppError;

/// Balance and transfer rules on top of the append-only ledger.
///
/// Balances are recomputed from the ledger on every read rather than kept
/// in a mutable column, so they cannot drift from the transaction history.
/// The funds check and the append of a transfer run under a per-sender
/// lock: two concurrent transfers from the same account cannot both pass
/// the check against a stale balance. Transfers from different senders
/// proceed concurrently.
pub struct CoinEngine {
    users: UserRepository,
    ledger: LedgerStore,
    sender_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl CoinEngine {
    pub fn new(users: UserRepository, ledger: LedgerStore) -> Self {
        Self {
            users,
            ledger,
            sender_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn balance(&self, user_id: i64) -> Result<i64, AppError> {
        self.ledger.balance_of(user_id).await
    }

    pub async fn history(&self, user_id: i64) -> Result<Vec<Transaction>, AppError> {
        self.ledger.list_for_user(user_id).await
    }

    /// Moves coins between two accounts, recipient addressed by email.
    pub async fn transfer(
        &self,
        from_user_id: i64,
        to_email: &str,
        amount: i64,
        reason: &str,
    ) -> Result<Transaction, AppError> {
        let recipient = self
            .users
            .find_by_email(to_email)
            .await?
            .ok_or(AppError::NotFound("recipient"))?;

        if amount <= 0 {
            return Err(AppError::validation("amount must be positive"));
        }
        if reason.trim().is_empty() {
            return Err(AppError::validation("reason is required"));
        }
        if recipient.id == from_user_id {
            return Err(AppError::validation("cannot send coins to yourself"));
        }

        // Funds check and append are serialized per sender.
        let lock = self.sender_lock(from_user_id).await;
        let _guard = lock.lock().await;

        let balance = self.ledger.balance_of(from_user_id).await?;
        if balance < amount {
            tracing::warn!(
                "transfer rejected for user {from_user_id}: balance {balance} < amount {amount}"
            );
            return Err(AppError::InsufficientFunds);
        }

        let transaction = self
            .ledger
            .append(NewTransaction {
                from_user_id: Some(from_user_id),
                to_user_id: recipient.id,
                amount,
                reason: reason.to_string(),
                kind: TransactionKind::Transfer,
            })
            .await?;

        tracing::info!(
            "transfer {} completed: {from_user_id} -> {} ({amount} coins)",
            transaction.id,
            recipient.id
        );
        Ok(transaction)
    }

    /// Institutional issuance: credits coins out of thin air, no sender
    /// and no funds check.
    pub async fn grant_semester_credit(
        &self,
        to_email: &str,
        amount: i64,
        reason: &str,
    ) -> Result<Transaction, AppError> {
        let recipient = self
            .users
            .find_by_email(to_email)
            .await?
            .ok_or(AppError::NotFound("recipient"))?;

        if amount <= 0 {
            return Err(AppError::validation("amount must be positive"));
        }
        if reason.trim().is_empty() {
            return Err(AppError::validation("reason is required"));
        }

        let transaction = self
            .ledger
            .append(NewTransaction {
                from_user_id: None,
                to_user_id: recipient.id,
                amount,
                reason: reason.to_string(),
                kind: TransactionKind::SemesterCredit,
            })
            .await?;

        tracing::info!(
            "semester credit {} issued to user {} ({amount} coins)",
            transaction.id,
            recipient.id
        );
        Ok(transaction)
    }

    async fn sender_lock(&self, user_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.sender_locks.lock().await;
        locks.entry(user_id).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_pool;
    use crate::db::users::UserType;

    async fn engine_with_users() -> (Arc<CoinEngine>, i64, i64) {
        let pool = memory_pool().await;
        let users = UserRepository::new(pool.clone());
        let a = users
            .create("alice@university.edu", "hash", UserType::Student)
            .await
            .unwrap();
        let b = users
            .create("bob@university.edu", "hash", UserType::Student)
            .await
            .unwrap();
        let engine = Arc::new(CoinEngine::new(users, LedgerStore::new(pool)));
        (engine, a.id, b.id)
    }

    #[tokio::test]
    async fn balance_is_zero_without_history() {
        let (engine, a, _) = engine_with_users().await;
        assert_eq!(engine.balance(a).await.unwrap(), 0);
        assert!(engine.history(a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transfer_moves_coins_and_shows_in_both_histories() {
        let (engine, a, b) = engine_with_users().await;
        engine
            .grant_semester_credit("alice@university.edu", 100, "semester start")
            .await
            .unwrap();

        let tx = engine
            .transfer(a, "bob@university.edu", 30, "code review help")
            .await
            .unwrap();
        assert_eq!(tx.kind, TransactionKind::Transfer);
        assert_eq!(tx.from_user_id, Some(a));
        assert_eq!(tx.to_user_id, b);

        assert_eq!(engine.balance(a).await.unwrap(), 70);
        assert_eq!(engine.balance(b).await.unwrap(), 30);

        let in_a = engine.history(a).await.unwrap();
        let in_b = engine.history(b).await.unwrap();
        assert_eq!(in_a.iter().filter(|t| t.id == tx.id).count(), 1);
        assert_eq!(in_b.iter().filter(|t| t.id == tx.id).count(), 1);
    }

    #[tokio::test]
    async fn transfer_rejects_bad_input_without_touching_the_ledger() {
        let (engine, a, _) = engine_with_users().await;
        engine
            .grant_semester_credit("alice@university.edu", 100, "semester start")
            .await
            .unwrap();

        let err = engine
            .transfer(a, "bob@university.edu", 0, "nothing")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = engine
            .transfer(a, "bob@university.edu", -5, "nothing")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = engine
            .transfer(a, "bob@university.edu", 10, "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = engine
            .transfer(a, "alice@university.edu", 10, "to myself")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        assert_eq!(engine.history(a).await.unwrap().len(), 1);
        assert_eq!(engine.balance(a).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn transfer_rejects_unknown_recipient() {
        let (engine, a, _) = engine_with_users().await;
        engine
            .grant_semester_credit("alice@university.edu", 100, "semester start")
            .await
            .unwrap();

        let err = engine
            .transfer(a, "ghost@university.edu", 10, "who are you")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(engine.history(a).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transfer_rejects_insufficient_funds() {
        let (engine, a, _) = engine_with_users().await;
        engine
            .grant_semester_credit("alice@university.edu", 50, "semester start")
            .await
            .unwrap();

        let err = engine
            .transfer(a, "bob@university.edu", 100, "too much")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientFunds));
        assert_eq!(engine.history(a).await.unwrap().len(), 1);
        assert_eq!(engine.balance(a).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn concurrent_transfers_cannot_overdraw() {
        let (engine, a, b) = engine_with_users().await;
        engine
            .grant_semester_credit("alice@university.edu", 100, "semester start")
            .await
            .unwrap();

        // Each transfer is valid against the starting balance, but only
        // one may go through.
        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.transfer(a, "bob@university.edu", 60, "lab help").await }
        });
        let second = tokio::spawn({
            let engine = engine.clone();
            async move { engine.transfer(a, "bob@university.edu", 60, "lab help").await }
        });

        let results = [first.await.unwrap(), second.await.unwrap()];
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(succeeded, 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AppError::InsufficientFunds))));

        assert_eq!(engine.balance(a).await.unwrap(), 40);
        assert_eq!(engine.balance(b).await.unwrap(), 60);
    }
}
