pub mod order;

pub use order::{Order, OrderView};

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// OrderKind
// ---------------------------------------------------------------------------

/// Direction of an exchange order. `Sell` means the user sends USDT to a
/// generated deposit address and receives RUB; `Buy` means the user pays RUB
/// off-chain and receives USDT at their own address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Sell,
    Buy,
}

impl OrderKind {
    pub fn from_api_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sell" => Some(OrderKind::Sell),
            "buy" => Some(OrderKind::Buy),
            _ => None,
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Sell => write!(f, "sell"),
            OrderKind::Buy => write!(f, "buy"),
        }
    }
}

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an order. Statuses only move forward:
/// `Pending → Confirming → Completed` for ledger-settled sell orders,
/// `Pending → Completed` for operator-attested buy orders, and `Failed`
/// from any non-final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirming,
    Completed,
    Failed,
}

impl OrderStatus {
    pub fn from_api_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(OrderStatus::Pending),
            "confirming" => Some(OrderStatus::Confirming),
            "completed" => Some(OrderStatus::Completed),
            "failed" => Some(OrderStatus::Failed),
            _ => None,
        }
    }

    /// Final states accept no further transitions.
    pub fn is_final(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Failed)
    }

    /// Whether moving to `next` is a legal forward transition.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirming)
                | (Confirming, Completed)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Confirming, Failed)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "pending"),
            OrderStatus::Confirming => write!(f, "confirming"),
            OrderStatus::Completed => write!(f, "completed"),
            OrderStatus::Failed => write!(f, "failed"),
        }
    }
}
