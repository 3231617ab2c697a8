use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{Order, OrderKind, OrderStatus};
use crate::pricing::PricingEngine;
use crate::services::notifier::{self, Notifier};
use crate::store::{Store, StoreError, Transition};
use crate::tron::{wallet, Ledger, REQUIRED_CONFIRMATIONS, USDT_DECIMALS};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("order not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<EngineError> for crate::errors::AppError {
    fn from(e: EngineError) -> Self {
        use crate::errors::AppError;
        match e {
            EngineError::Validation(msg) => AppError::BadRequest(msg),
            EngineError::NotFound(msg) => AppError::NotFound(msg),
            EngineError::Internal(msg) => AppError::Internal(anyhow::anyhow!(msg)),
            EngineError::Store(err) => AppError::Internal(err.into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub kind: String,
    pub amount_token: Option<Decimal>,
    pub amount_fiat: Option<Decimal>,
    pub payout_address: Option<String>,
}

/// Result of one `advance` poll, reported back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct AdvanceOutcome {
    pub status: OrderStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u32>,
    /// True when an upstream reading backing this outcome was degraded;
    /// the caller must not treat it as a confirmed negative.
    pub degraded: bool,
}

/// The order lifecycle state machine.
///
/// Owns the transition rules `Pending → Confirming → Completed` (ledger
/// driven, sell orders), `Pending → Completed` (operator attested, buy
/// orders) and `→ Failed`. All transitions go through the store's
/// compare-and-set, and mutating entry points serialize per order hash, so
/// concurrent polls can never regress a status or double-fire a transition.
pub struct OrderEngine {
    store: Arc<dyn Store>,
    ledger: Arc<dyn Ledger>,
    pricing: Arc<PricingEngine>,
    notifier: Option<Arc<Notifier>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl OrderEngine {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Arc<dyn Ledger>,
        pricing: Arc<PricingEngine>,
        notifier: Option<Arc<Notifier>>,
    ) -> Self {
        Self {
            store,
            ledger,
            pricing,
            notifier,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a new order: validate, derive the missing amount from the
    /// current quote, generate deposit credentials for sell orders, persist,
    /// and alert the notifier (best effort).
    pub async fn create(&self, request: CreateOrderRequest) -> Result<Order, EngineError> {
        let kind = OrderKind::from_api_str(&request.kind).ok_or_else(|| {
            EngineError::Validation(format!("unknown order type: {}", request.kind))
        })?;

        let (amount_token, amount_fiat) = self
            .resolve_amounts(kind, request.amount_token, request.amount_fiat)
            .await?;

        let payout_address = match kind {
            OrderKind::Buy => {
                let address = request
                    .payout_address
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        EngineError::Validation("buy orders require a payout address".into())
                    })?;
                if !wallet::is_valid_address(address) {
                    return Err(EngineError::Validation(format!(
                        "malformed payout address: {address}"
                    )));
                }
                Some(address.to_string())
            }
            OrderKind::Sell => None,
        };

        let (deposit_address, deposit_secret) = match kind {
            OrderKind::Sell => {
                let creds = self.ledger.generate_deposit_credentials();
                (Some(creds.address), Some(creds.secret))
            }
            OrderKind::Buy => (None, None),
        };

        let now = Utc::now();
        let order = Order {
            id: 0,
            hash: Uuid::new_v4().simple().to_string(),
            kind,
            amount_token,
            amount_fiat,
            deposit_address,
            deposit_secret,
            payout_address,
            status: OrderStatus::Pending,
            confirmations_observed: 0,
            created_at: now,
            updated_at: now,
        };

        let order = self.store.insert(order).await?;
        counter!("orders_created_total").increment(1);
        tracing::info!(
            order_hash = %order.hash,
            kind = %order.kind,
            amount_token = %order.amount_token,
            amount_fiat = %order.amount_fiat,
            "Order created"
        );

        if let Some(notifier) = &self.notifier {
            notifier.send(&notifier::format_order_created(&order)).await;
        }

        Ok(order)
    }

    pub async fn get(&self, hash: &str) -> Result<Order, EngineError> {
        self.store
            .get(hash)
            .await?
            .ok_or_else(|| EngineError::NotFound(hash.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<Order>, EngineError> {
        Ok(self.store.list().await?)
    }

    /// Poll the ledger and advance the order if warranted. Idempotent:
    /// repeat calls with unchanged upstream state report the same status.
    /// Triggered externally (a user check or an operator command) — the
    /// engine runs no scheduler of its own.
    pub async fn advance(&self, hash: &str) -> Result<AdvanceOutcome, EngineError> {
        let lock = self.lock_for(hash).await;
        let _guard = lock.lock().await;

        let order = self.get(hash).await?;

        if order.status.is_final() {
            let message = match order.status {
                OrderStatus::Completed => "Order settled".to_string(),
                _ => "Order failed".to_string(),
            };
            return Ok(AdvanceOutcome {
                status: order.status,
                message,
                balance: None,
                confirmations: None,
                degraded: false,
            });
        }

        match order.kind {
            OrderKind::Buy => Ok(AdvanceOutcome {
                status: order.status,
                message: "Waiting for operator confirmation of fiat payment".into(),
                balance: None,
                confirmations: None,
                degraded: false,
            }),
            OrderKind::Sell => self.advance_sell(order).await,
        }
    }

    async fn advance_sell(&self, order: Order) -> Result<AdvanceOutcome, EngineError> {
        let deposit = order.deposit_address.clone().ok_or_else(|| {
            EngineError::Internal(format!("sell order {} has no deposit address", order.hash))
        })?;

        let check_confirmations = order.status == OrderStatus::Confirming;
        let result = self
            .ledger
            .check_incoming(&deposit, order.amount_token, check_confirmations)
            .await;

        if !result.received {
            let message = if result.degraded {
                "Balance check degraded — try again later"
            } else {
                "Waiting for payment"
            };
            return Ok(AdvanceOutcome {
                status: order.status,
                message: message.into(),
                balance: Some(result.amount),
                confirmations: None,
                degraded: result.degraded,
            });
        }

        let depth = result.confirmations.unwrap_or(0);

        match order.status {
            OrderStatus::Pending => {
                let current = match self
                    .store
                    .transition(&order.hash, OrderStatus::Pending, OrderStatus::Confirming)
                    .await?
                {
                    Transition::Applied(o) => {
                        counter!("orders_confirming_total").increment(1);
                        tracing::info!(
                            order_hash = %o.hash,
                            balance = %result.amount,
                            "Payment received — awaiting confirmations"
                        );
                        o
                    }
                    // A concurrent poll already applied this transition.
                    Transition::Conflict(o) => o,
                };
                self.store.record_confirmations(&order.hash, depth).await?;

                Ok(AdvanceOutcome {
                    status: current.status,
                    message: "Payment received, awaiting confirmations".into(),
                    balance: Some(result.amount),
                    confirmations: Some(depth),
                    degraded: result.degraded,
                })
            }
            OrderStatus::Confirming => {
                self.store.record_confirmations(&order.hash, depth).await?;

                if result.confirmed {
                    let current = match self
                        .store
                        .transition(&order.hash, OrderStatus::Confirming, OrderStatus::Completed)
                        .await?
                    {
                        Transition::Applied(o) => {
                            counter!("orders_completed_total").increment(1);
                            tracing::info!(order_hash = %o.hash, "Order settled");
                            if let Some(notifier) = &self.notifier {
                                notifier.send(&notifier::format_order_completed(&o)).await;
                            }
                            o
                        }
                        Transition::Conflict(o) => o,
                    };

                    Ok(AdvanceOutcome {
                        status: current.status,
                        message: "Order settled".into(),
                        balance: Some(result.amount),
                        confirmations: Some(depth),
                        degraded: result.degraded,
                    })
                } else {
                    let message = if result.degraded {
                        "Confirmation check degraded — try again later".to_string()
                    } else {
                        format!("Confirmations {depth}/{REQUIRED_CONFIRMATIONS}")
                    };
                    Ok(AdvanceOutcome {
                        status: OrderStatus::Confirming,
                        message,
                        balance: Some(result.amount),
                        confirmations: Some(depth),
                        degraded: result.degraded,
                    })
                }
            }
            // Final states returned early in `advance`.
            _ => Err(EngineError::Internal(format!(
                "unexpected status {} in advance_sell",
                order.status
            ))),
        }
    }

    /// Operator attestation that the off-chain fiat payment for a buy order
    /// arrived. Not ledger derived. Rejects non-buy orders and any order
    /// already settled or failed — the idempotency guard against replayed
    /// operator commands.
    pub async fn mark_paid(&self, hash: &str) -> Result<Order, EngineError> {
        let lock = self.lock_for(hash).await;
        let _guard = lock.lock().await;

        let order = self.get(hash).await?;

        if order.kind != OrderKind::Buy {
            return Err(EngineError::Validation(
                "only buy orders can be marked paid".into(),
            ));
        }
        if order.status != OrderStatus::Pending {
            return Err(EngineError::Validation(format!(
                "order already {}",
                order.status
            )));
        }

        match self
            .store
            .transition(hash, OrderStatus::Pending, OrderStatus::Completed)
            .await?
        {
            Transition::Applied(order) => {
                counter!("orders_completed_total").increment(1);
                tracing::info!(order_hash = %order.hash, "Buy order marked paid by operator");
                if let Some(notifier) = &self.notifier {
                    notifier.send(&notifier::format_order_completed(&order)).await;
                }
                Ok(order)
            }
            Transition::Conflict(current) => Err(EngineError::Validation(format!(
                "order already {}",
                current.status
            ))),
        }
    }

    /// Operator-declared unrecoverable failure. Legal from any non-final
    /// state.
    pub async fn mark_failed(&self, hash: &str) -> Result<Order, EngineError> {
        let lock = self.lock_for(hash).await;
        let _guard = lock.lock().await;

        let order = self.get(hash).await?;

        if order.status.is_final() {
            return Err(EngineError::Validation(format!(
                "order already {}",
                order.status
            )));
        }

        match self
            .store
            .transition(hash, order.status, OrderStatus::Failed)
            .await?
        {
            Transition::Applied(order) => {
                counter!("orders_failed_total").increment(1);
                tracing::warn!(order_hash = %order.hash, "Order marked failed");
                Ok(order)
            }
            Transition::Conflict(current) => Err(EngineError::Validation(format!(
                "order already {}",
                current.status
            ))),
        }
    }

    /// Derive the missing amount from the current quote. Exactly one of the
    /// two amounts must be supplied; buy orders price at the buy price, sell
    /// orders at the sell price.
    async fn resolve_amounts(
        &self,
        kind: OrderKind,
        amount_token: Option<Decimal>,
        amount_fiat: Option<Decimal>,
    ) -> Result<(Decimal, Decimal), EngineError> {
        if let Some(amount) = amount_token.or(amount_fiat) {
            if amount <= Decimal::ZERO {
                return Err(EngineError::Validation("amounts must be positive".into()));
            }
        }
        if let (Some(t), Some(f)) = (amount_token, amount_fiat) {
            if t <= Decimal::ZERO || f <= Decimal::ZERO {
                return Err(EngineError::Validation("amounts must be positive".into()));
            }
            return Err(EngineError::Validation(
                "supply exactly one of amount_token and amount_fiat".into(),
            ));
        }

        let (rate, _) = self.pricing.market_rate().await;
        let price = match kind {
            OrderKind::Buy => self.pricing.buy_price(rate),
            OrderKind::Sell => self.pricing.sell_price(rate),
        };
        if price <= Decimal::ZERO {
            return Err(EngineError::Internal("market price unavailable".into()));
        }

        match (amount_token, amount_fiat) {
            (Some(token), None) => Ok((round_token(token), round_fiat(token * price))),
            (None, Some(fiat)) => Ok((round_token(fiat / price), round_fiat(fiat))),
            _ => Err(EngineError::Validation(
                "either a token or a fiat amount is required".into(),
            )),
        }
    }

    async fn lock_for(&self, hash: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(hash.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn round_token(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(USDT_DECIMALS, RoundingStrategy::MidpointNearestEven)
}

fn round_fiat(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}
