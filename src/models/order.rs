use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{OrderKind, OrderStatus};

/// Header row of the orders worksheet. Column order is load-bearing:
/// `to_row`/`from_row` and the store's cell updates index into it.
pub const COLUMNS: [&str; 12] = [
    "id",
    "hash",
    "kind",
    "amount_token",
    "amount_fiat",
    "deposit_address",
    "deposit_secret",
    "payout_address",
    "status",
    "confirmations",
    "created_at",
    "updated_at",
];

/// Persisted order record. One row per order; rows are appended at creation
/// and individual cells overwritten in place on status changes, so the sheet
/// doubles as an audit log. Orders are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// 1-based sequence matching row position in the store.
    pub id: u64,
    /// Globally unique identifier, assigned at creation, immutable.
    pub hash: String,
    pub kind: OrderKind,
    pub amount_token: Decimal,
    pub amount_fiat: Decimal,
    /// Sell only: the generated one-time deposit address.
    pub deposit_address: Option<String>,
    /// Sell only: hex private key authorizing a later sweep. Opaque to the
    /// engine; never exposed through any public read path.
    pub deposit_secret: Option<String>,
    /// Buy only: user-supplied address the purchased USDT is sent to.
    pub payout_address: Option<String>,
    pub status: OrderStatus,
    /// Last observed confirmation depth; 0 until funds are seen.
    pub confirmations_observed: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Serialize for a RAW-valued worksheet append.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.hash.clone(),
            self.kind.to_string(),
            self.amount_token.to_string(),
            self.amount_fiat.to_string(),
            self.deposit_address.clone().unwrap_or_default(),
            self.deposit_secret.clone().unwrap_or_default(),
            self.payout_address.clone().unwrap_or_default(),
            self.status.to_string(),
            self.confirmations_observed.to_string(),
            self.created_at.to_rfc3339(),
            self.updated_at.to_rfc3339(),
        ]
    }

    /// Parse a worksheet row. Malformed rows yield `None` and are skipped by
    /// callers rather than failing the whole read.
    pub fn from_row(row: &[String]) -> Option<Self> {
        let cell = |i: usize| row.get(i).map(|s| s.trim()).unwrap_or_default();
        let opt = |i: usize| {
            let v = cell(i);
            (!v.is_empty()).then(|| v.to_string())
        };

        Some(Order {
            id: cell(0).parse().ok()?,
            hash: {
                let h = cell(1);
                if h.is_empty() {
                    return None;
                }
                h.to_string()
            },
            kind: OrderKind::from_api_str(cell(2))?,
            amount_token: cell(3).parse().ok()?,
            amount_fiat: cell(4).parse().ok()?,
            deposit_address: opt(5),
            deposit_secret: opt(6),
            payout_address: opt(7),
            status: OrderStatus::from_api_str(cell(8))?,
            confirmations_observed: cell(9).parse().unwrap_or(0),
            created_at: DateTime::parse_from_rfc3339(cell(10))
                .ok()?
                .with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(cell(11))
                .ok()?
                .with_timezone(&Utc),
        })
    }
}

/// Public projection of [`Order`]: everything a caller may see. The deposit
/// secret never leaves the store boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderView {
    pub id: u64,
    pub hash: String,
    pub kind: OrderKind,
    pub amount_token: Decimal,
    pub amount_fiat: Decimal,
    pub deposit_address: Option<String>,
    pub payout_address: Option<String>,
    pub status: OrderStatus,
    pub confirmations_observed: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderView {
    fn from(o: &Order) -> Self {
        OrderView {
            id: o.id,
            hash: o.hash.clone(),
            kind: o.kind,
            amount_token: o.amount_token,
            amount_fiat: o.amount_fiat,
            deposit_address: o.deposit_address.clone(),
            payout_address: o.payout_address.clone(),
            status: o.status,
            confirmations_observed: o.confirmations_observed,
            created_at: o.created_at,
            updated_at: o.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn sample_order() -> Order {
        let now = Utc::now();
        Order {
            id: 3,
            hash: "a".repeat(32),
            kind: OrderKind::Sell,
            amount_token: Decimal::new(10_500_000, 6),
            amount_fiat: Decimal::new(96_712, 2),
            deposit_address: Some("TXYZa2B3c4D5e6F7g8H9i0JkLmNoPqRsTu".into()),
            deposit_secret: Some("ff".repeat(32)),
            payout_address: None,
            status: OrderStatus::Pending,
            confirmations_observed: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn row_round_trip() {
        let order = sample_order();
        let row = order.to_row();
        assert_eq!(row.len(), COLUMNS.len());

        let parsed = Order::from_row(&row).expect("row should parse");
        assert_eq!(parsed.hash, order.hash);
        assert_eq!(parsed.kind, order.kind);
        assert_eq!(parsed.amount_token, order.amount_token);
        assert_eq!(parsed.amount_fiat, order.amount_fiat);
        assert_eq!(parsed.deposit_address, order.deposit_address);
        assert_eq!(parsed.status, order.status);
    }

    #[test]
    fn malformed_row_is_rejected() {
        assert!(Order::from_row(&[]).is_none());
        let mut row = sample_order().to_row();
        row[8] = "garbage-status".into();
        assert!(Order::from_row(&row).is_none());
    }

    #[test]
    fn view_never_carries_deposit_secret() {
        let view = OrderView::from(&sample_order());
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("deposit_secret").is_none());
        assert!(json.get("deposit_address").is_some());
    }
}
