use serde_json::json;

use crate::models::{Order, OrderKind};

/// Telegram notification service. Failures are logged but never block the
/// main flow.
#[derive(Debug, Clone)]
pub struct Notifier {
    http: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl Notifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token,
            chat_id,
        }
    }

    /// Send a Telegram message. Failures are logged as warnings.
    pub async fn send(&self, message: &str) {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.bot_token
        );

        let body = json!({
            "chat_id": self.chat_id,
            "text": message,
            "parse_mode": "Markdown",
        });

        match self.http.post(&url).json(&body).send().await {
            Ok(resp) => {
                if !resp.status().is_success() {
                    tracing::warn!(
                        status = %resp.status(),
                        "Telegram sendMessage returned non-2xx"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to send Telegram notification");
            }
        }
    }
}

/// Format the new-order alert. The deposit secret never appears here.
pub fn format_order_created(order: &Order) -> String {
    let mut message = format!(
        "*New Order*\nID: {}\nHash: `{}`\nType: {}\nUSDT: {}\nRUB: {}\nStatus: {}",
        order.id,
        order.hash,
        order.kind.to_string().to_uppercase(),
        order.amount_token,
        order.amount_fiat,
        order.status,
    );

    match order.kind {
        OrderKind::Sell => {
            if let Some(address) = &order.deposit_address {
                message.push_str(&format!("\nDeposit: `{address}`"));
            }
        }
        OrderKind::Buy => {
            if let Some(address) = &order.payout_address {
                message.push_str(&format!("\nPayout: `{address}`"));
            }
        }
    }

    message
}

/// Format a settlement alert for a completed order.
pub fn format_order_completed(order: &Order) -> String {
    format!(
        "*Order Settled*\nID: {}\nHash: `{}`\nType: {}\nUSDT: {}\nRUB: {}",
        order.id,
        order.hash,
        order.kind.to_string().to_uppercase(),
        order.amount_token,
        order.amount_fiat,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;
    use chrono::Utc;
    use rust_decimal::Decimal;

    #[test]
    fn created_message_omits_the_deposit_secret() {
        let now = Utc::now();
        let order = Order {
            id: 7,
            hash: "deadbeef".repeat(4),
            kind: OrderKind::Sell,
            amount_token: Decimal::from(10),
            amount_fiat: Decimal::from(950),
            deposit_address: Some("TDepositAddress".into()),
            deposit_secret: Some("topsecretkey".into()),
            payout_address: None,
            status: OrderStatus::Pending,
            confirmations_observed: 0,
            created_at: now,
            updated_at: now,
        };

        let message = format_order_created(&order);
        assert!(message.contains("TDepositAddress"));
        assert!(!message.contains("topsecretkey"));
    }
}
