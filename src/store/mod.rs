pub mod memory;
pub mod sheet;

pub use memory::MemStore;
pub use sheet::SheetStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Order, OrderStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order hash already exists: {0}")]
    DuplicateHash(String),

    #[error("order not found: {0}")]
    NotFound(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Outcome of a compare-and-set status transition.
#[derive(Debug, Clone)]
pub enum Transition {
    /// The expected status matched; the returned order carries the new one.
    Applied(Order),
    /// Another writer got there first; the current record is returned
    /// unchanged.
    Conflict(Order),
}

/// Order persistence with audit-log semantics: one row per order, appended
/// at creation, cells overwritten in place on mutation, never deleted.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a new order, assigning its 1-based row id.
    /// Rejects a duplicate hash — hash collision is a correctness violation.
    async fn insert(&self, order: Order) -> Result<Order, StoreError>;

    async fn get(&self, hash: &str) -> Result<Option<Order>, StoreError>;

    async fn list(&self) -> Result<Vec<Order>, StoreError>;

    /// Move `hash` from `expected` to `next` if and only if its current
    /// status equals `expected`, refreshing `updated_at`.
    async fn transition(
        &self,
        hash: &str,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Transition, StoreError>;

    /// Record the latest observed confirmation depth for an order.
    async fn record_confirmations(&self, hash: &str, confirmations: u32)
        -> Result<(), StoreError>;
}
