pub mod client;
pub mod wallet;

pub use client::TronClient;
pub use wallet::DepositCredentials;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// Confirmation depth at which an incoming transfer is considered final.
pub const REQUIRED_CONFIRMATIONS: u32 = 20;

/// Decimal places of USDT's native integer unit on Tron.
pub const USDT_DECIMALS: u32 = 6;

#[derive(Debug, Error)]
pub enum TronError {
    #[error("rate limited by upstream")]
    RateLimited,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

impl TronError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TronError::RateLimited)
    }
}

/// Balance reading with an explicit degradation marker. `degraded == true`
/// means the upstream query failed after retries and the zero amount must
/// not be read as a confirmed empty balance.
#[derive(Debug, Clone, Copy)]
pub struct BalanceReading {
    pub amount: Decimal,
    pub degraded: bool,
}

/// Result of checking a deposit address for expected incoming funds.
///
/// `received` compares on `>=` so an exact-amount payment is never rejected.
/// `confirmations` is populated only when depth was requested and resolvable.
#[derive(Debug, Clone, Copy)]
pub struct CheckIncoming {
    pub received: bool,
    pub amount: Decimal,
    pub confirmed: bool,
    pub confirmations: Option<u32>,
    pub degraded: bool,
}

/// Read-only ledger operations the order engine depends on.
///
/// [`TronClient`] is the production implementation; tests drive the engine
/// with a fake.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Generate a fresh address/secret pair for a sell-order deposit.
    fn generate_deposit_credentials(&self) -> DepositCredentials;

    /// USDT balance of `address`, scaled from native units to a decimal.
    async fn usdt_balance(&self, address: &str) -> BalanceReading;

    /// Whether `address` holds at least `expected` USDT; when
    /// `check_confirmations` is set, also the minimum confirmation depth
    /// across inbound transfers.
    async fn check_incoming(
        &self,
        address: &str,
        expected: Decimal,
        check_confirmations: bool,
    ) -> CheckIncoming;
}
