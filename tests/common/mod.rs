use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use coinbridge::engine::OrderEngine;
use coinbridge::pricing::{PricingEngine, PricingError, RateFeed};
use coinbridge::store::MemStore;
use coinbridge::tron::{
    wallet, BalanceReading, CheckIncoming, DepositCredentials, Ledger, REQUIRED_CONFIRMATIONS,
};

/// Ledger fake: balances and confirmation depths are set per address by the
/// test; credential generation uses the real wallet code.
#[derive(Default)]
pub struct FakeLedger {
    balances: Mutex<HashMap<String, Decimal>>,
    confirmations: Mutex<HashMap<String, u32>>,
    pub degraded: AtomicBool,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub async fn set_balance(&self, address: &str, amount: Decimal) {
        self.balances
            .lock()
            .await
            .insert(address.to_string(), amount);
    }

    #[allow(dead_code)]
    pub async fn set_confirmations(&self, address: &str, depth: u32) {
        self.confirmations
            .lock()
            .await
            .insert(address.to_string(), depth);
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    fn generate_deposit_credentials(&self) -> DepositCredentials {
        wallet::generate_credentials()
    }

    async fn usdt_balance(&self, address: &str) -> BalanceReading {
        if self.degraded.load(Ordering::SeqCst) {
            return BalanceReading {
                amount: Decimal::ZERO,
                degraded: true,
            };
        }

        let balances = self.balances.lock().await;
        BalanceReading {
            amount: balances.get(address).copied().unwrap_or(Decimal::ZERO),
            degraded: false,
        }
    }

    async fn check_incoming(
        &self,
        address: &str,
        expected: Decimal,
        check_confirmations: bool,
    ) -> CheckIncoming {
        let reading = self.usdt_balance(address).await;
        let received = reading.amount >= expected;

        let mut confirmations = None;
        let mut confirmed = false;
        if received && check_confirmations {
            let depth = self
                .confirmations
                .lock()
                .await
                .get(address)
                .copied()
                .unwrap_or(0);
            confirmations = Some(depth);
            confirmed = depth >= REQUIRED_CONFIRMATIONS;
        }

        CheckIncoming {
            received,
            amount: reading.amount,
            confirmed,
            confirmations,
            degraded: reading.degraded,
        }
    }
}

/// Rate feed fake returning a fixed market rate and no P2P data.
pub struct FixedFeed {
    pub rate: Decimal,
    pub calls: AtomicU32,
}

impl FixedFeed {
    pub fn new(rate: Decimal) -> Self {
        Self {
            rate,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl RateFeed for FixedFeed {
    async fn market_rate(&self) -> Result<Decimal, PricingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rate)
    }

    async fn p2p_price_sides(&self) -> (Vec<Decimal>, Vec<Decimal>) {
        (Vec::new(), Vec::new())
    }
}

#[allow(dead_code)]
pub struct TestHarness {
    pub engine: Arc<OrderEngine>,
    pub store: Arc<MemStore>,
    pub ledger: Arc<FakeLedger>,
    pub pricing: Arc<PricingEngine>,
}

/// Engine over the in-memory store and fakes: market rate 95.00,
/// 5% buy margin, 3% sell margin.
#[allow(dead_code)]
pub fn setup() -> TestHarness {
    let store = Arc::new(MemStore::new());
    let ledger = Arc::new(FakeLedger::new());
    let feed = Arc::new(FixedFeed::new(Decimal::from(95)));
    let pricing = Arc::new(PricingEngine::new(
        feed,
        Decimal::new(5, 2),
        Decimal::new(3, 2),
        Duration::from_secs(300),
    ));

    let engine = Arc::new(OrderEngine::new(
        store.clone(),
        ledger.clone(),
        pricing.clone(),
        None,
    ));

    TestHarness {
        engine,
        store,
        ledger,
        pricing,
    }
}
