use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::models::{Order, OrderStatus};

use super::{Store, StoreError, Transition};

/// In-process [`Store`]: the dev-mode default and the test harness backing.
/// Same row semantics as the spreadsheet store — append-only, ids equal to
/// row position.
#[derive(Default)]
pub struct MemStore {
    rows: RwLock<Vec<Order>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn insert(&self, mut order: Order) -> Result<Order, StoreError> {
        let mut rows = self.rows.write().await;

        if rows.iter().any(|r| r.hash == order.hash) {
            return Err(StoreError::DuplicateHash(order.hash));
        }

        order.id = rows.len() as u64 + 1;
        rows.push(order.clone());
        Ok(order)
    }

    async fn get(&self, hash: &str) -> Result<Option<Order>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.iter().find(|r| r.hash == hash).cloned())
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.rows.read().await.clone())
    }

    async fn transition(
        &self,
        hash: &str,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Transition, StoreError> {
        debug_assert!(
            expected.can_transition_to(next),
            "illegal transition {expected} -> {next}"
        );

        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| r.hash == hash)
            .ok_or_else(|| StoreError::NotFound(hash.to_string()))?;

        if row.status != expected {
            return Ok(Transition::Conflict(row.clone()));
        }

        row.status = next;
        row.updated_at = Utc::now();
        Ok(Transition::Applied(row.clone()))
    }

    async fn record_confirmations(
        &self,
        hash: &str,
        confirmations: u32,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| r.hash == hash)
            .ok_or_else(|| StoreError::NotFound(hash.to_string()))?;

        row.confirmations_observed = confirmations;
        row.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderKind;
    use rust_decimal::Decimal;

    fn order(hash: &str) -> Order {
        let now = Utc::now();
        Order {
            id: 0,
            hash: hash.into(),
            kind: OrderKind::Sell,
            amount_token: Decimal::from(10),
            amount_fiat: Decimal::from(950),
            deposit_address: Some("TDepositAddr".into()),
            deposit_secret: Some("secret".into()),
            payout_address: None,
            status: OrderStatus::Pending,
            confirmations_observed: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let store = MemStore::new();
        let a = store.insert(order("aaa")).await.unwrap();
        let b = store.insert(order("bbb")).await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }

    #[tokio::test]
    async fn duplicate_hash_is_rejected() {
        let store = MemStore::new();
        store.insert(order("aaa")).await.unwrap();
        let err = store.insert(order("aaa")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateHash(_)));
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let store = MemStore::new();
        store.insert(order("aaa")).await.unwrap();

        let applied = store
            .transition("aaa", OrderStatus::Pending, OrderStatus::Confirming)
            .await
            .unwrap();
        assert!(matches!(applied, Transition::Applied(_)));

        // A second writer that still believes the order is pending loses.
        let conflict = store
            .transition("aaa", OrderStatus::Pending, OrderStatus::Confirming)
            .await
            .unwrap();
        match conflict {
            Transition::Conflict(current) => {
                assert_eq!(current.status, OrderStatus::Confirming)
            }
            Transition::Applied(_) => panic!("stale expected status must not apply"),
        }
    }

    #[tokio::test]
    async fn transition_on_unknown_hash_is_not_found() {
        let store = MemStore::new();
        let err = store
            .transition("missing", OrderStatus::Pending, OrderStatus::Confirming)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
