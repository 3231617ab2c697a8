pub mod feed;

pub use feed::HttpRateFeed;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Served when the upstream rate source is unreachable; always paired with
/// the `Fallback` marker so callers can tell it apart from a live reading.
const FALLBACK_RATE_RUB: i64 = 95;

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// Where a quoted market rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateSource {
    Live,
    Cached,
    Fallback,
}

/// Upstream price source: the market rate plus the raw price lists of the
/// two P2P order-book sides. Implemented over HTTP in production and by
/// counting fakes in tests.
#[async_trait]
pub trait RateFeed: Send + Sync {
    async fn market_rate(&self) -> Result<Decimal, PricingError>;

    /// Raw prices of both P2P sides. Failures yield empty lists, never errors.
    async fn p2p_price_sides(&self) -> (Vec<Decimal>, Vec<Decimal>);
}

/// Best-effort peer-to-peer reference prices.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct P2pSnapshot {
    pub p2p_buy: Option<Decimal>,
    pub p2p_sell: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub market_rate: Decimal,
    pub rate_source: RateSource,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub buy_margin_pct: Decimal,
    pub sell_margin_pct: Decimal,
    pub spread: Decimal,
    pub p2p_buy: Option<Decimal>,
    pub p2p_sell: Option<Decimal>,
}

struct CachedRate {
    rate: Decimal,
    fetched_at: Instant,
}

struct CachedP2p {
    snapshot: P2pSnapshot,
    fetched_at: Instant,
}

/// Derives quoted buy/sell prices from the market rate with fixed margins.
///
/// Both the market rate and the P2P snapshot are cached in single time-boxed
/// slots. Concurrent callers during a cache miss may each refresh upstream;
/// acceptable at this call volume.
pub struct PricingEngine {
    feed: Arc<dyn RateFeed>,
    buy_margin: Decimal,
    sell_margin: Decimal,
    ttl: Duration,
    rate_cache: RwLock<Option<CachedRate>>,
    p2p_cache: RwLock<Option<CachedP2p>>,
}

impl PricingEngine {
    pub fn new(
        feed: Arc<dyn RateFeed>,
        buy_margin: Decimal,
        sell_margin: Decimal,
        ttl: Duration,
    ) -> Self {
        Self {
            feed,
            buy_margin,
            sell_margin,
            ttl,
            rate_cache: RwLock::new(None),
            p2p_cache: RwLock::new(None),
        }
    }

    pub fn from_config(feed: Arc<dyn RateFeed>, config: &crate::config::AppConfig) -> Self {
        Self::new(
            feed,
            config.buy_margin,
            config.sell_margin,
            Duration::from_secs(config.rate_cache_ttl_secs),
        )
    }

    /// Current USDT/RUB market rate with its provenance marker.
    ///
    /// A cache entry younger than the TTL short-circuits the upstream call.
    /// An upstream failure degrades to the fixed fallback rate, flagged as
    /// `Fallback`, and is never written into the cache.
    pub async fn market_rate(&self) -> (Decimal, RateSource) {
        if let Some(cached) = self.rate_cache.read().await.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return (cached.rate, RateSource::Cached);
            }
        }

        match self.feed.market_rate().await {
            Ok(rate) => {
                *self.rate_cache.write().await = Some(CachedRate {
                    rate,
                    fetched_at: Instant::now(),
                });
                tracing::info!(rate = %rate, "Fetched USDT/RUB market rate");
                (rate, RateSource::Live)
            }
            Err(e) => {
                counter!("pricing_fallback_total").increment(1);
                tracing::warn!(error = %e, "Rate source unavailable — serving fallback rate");
                (Decimal::from(FALLBACK_RATE_RUB), RateSource::Fallback)
            }
        }
    }

    /// Price per USDT charged when the user buys from us:
    /// `rate * (1 + buy_margin)`, rounded half-to-even to the cent.
    pub fn buy_price(&self, rate: Decimal) -> Decimal {
        round_cents(rate * (Decimal::ONE + self.buy_margin))
    }

    /// Price per USDT paid when the user sells to us:
    /// `rate * (1 - sell_margin)`, rounded half-to-even to the cent.
    pub fn sell_price(&self, rate: Decimal) -> Decimal {
        round_cents(rate * (Decimal::ONE - self.sell_margin))
    }

    /// Full pricing view: rate, both quoted prices, spread, and the
    /// best-effort P2P snapshot.
    pub async fn quote(&self) -> Quote {
        let (rate, source) = self.market_rate().await;
        let buy_price = self.buy_price(rate);
        let sell_price = self.sell_price(rate);
        let p2p = self.p2p_snapshot().await;

        Quote {
            market_rate: rate,
            rate_source: source,
            buy_price,
            sell_price,
            buy_margin_pct: self.buy_margin * Decimal::ONE_HUNDRED,
            sell_margin_pct: self.sell_margin * Decimal::ONE_HUNDRED,
            spread: buy_price - sell_price,
            p2p_buy: p2p.p2p_buy,
            p2p_sell: p2p.p2p_sell,
        }
    }

    /// P2P reference prices: the buy reference is the smallest minimum ask
    /// across sides, the sell reference the largest maximum bid. An empty
    /// side is excluded rather than failing the snapshot.
    pub async fn p2p_snapshot(&self) -> P2pSnapshot {
        if let Some(cached) = self.p2p_cache.read().await.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return cached.snapshot;
            }
        }

        let (side_a, side_b) = self.feed.p2p_price_sides().await;

        let p2p_buy = [side_a.iter().min(), side_b.iter().min()]
            .into_iter()
            .flatten()
            .min()
            .copied();
        let p2p_sell = [side_a.iter().max(), side_b.iter().max()]
            .into_iter()
            .flatten()
            .max()
            .copied();

        let snapshot = P2pSnapshot { p2p_buy, p2p_sell };
        *self.p2p_cache.write().await = Some(CachedP2p {
            snapshot,
            fetched_at: Instant::now(),
        });

        snapshot
    }
}

fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingFeed {
        rate: Decimal,
        calls: AtomicU32,
        fail: bool,
        side_a: Vec<Decimal>,
        side_b: Vec<Decimal>,
    }

    impl CountingFeed {
        fn returning(rate: Decimal) -> Self {
            Self {
                rate,
                calls: AtomicU32::new(0),
                fail: false,
                side_a: vec![],
                side_b: vec![],
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::returning(Decimal::ZERO)
            }
        }
    }

    #[async_trait]
    impl RateFeed for CountingFeed {
        async fn market_rate(&self) -> Result<Decimal, PricingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PricingError::Unexpected("boom".into()))
            } else {
                Ok(self.rate)
            }
        }

        async fn p2p_price_sides(&self) -> (Vec<Decimal>, Vec<Decimal>) {
            (self.side_a.clone(), self.side_b.clone())
        }
    }

    fn engine_with(feed: Arc<CountingFeed>) -> PricingEngine {
        PricingEngine::new(
            feed,
            Decimal::new(5, 2),
            Decimal::new(3, 2),
            Duration::from_secs(300),
        )
    }

    #[tokio::test]
    async fn second_call_within_ttl_hits_the_cache() {
        let feed = Arc::new(CountingFeed::returning(Decimal::from(95)));
        let engine = engine_with(feed.clone());

        let (first, source_first) = engine.market_rate().await;
        let (second, source_second) = engine.market_rate().await;

        assert_eq!(first, second);
        assert_eq!(source_first, RateSource::Live);
        assert_eq!(source_second, RateSource::Cached);
        assert_eq!(feed.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_triggers_exactly_one_refresh() {
        let feed = Arc::new(CountingFeed::returning(Decimal::from(95)));
        let engine = engine_with(feed.clone());

        engine.market_rate().await;
        tokio::time::advance(Duration::from_secs(301)).await;
        let (_, source) = engine.market_rate().await;

        assert_eq!(source, RateSource::Live);
        assert_eq!(feed.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fallback_rate_is_marked_and_not_cached() {
        let feed = Arc::new(CountingFeed::failing());
        let engine = engine_with(feed.clone());

        let (rate, source) = engine.market_rate().await;
        assert_eq!(rate, Decimal::from(95));
        assert_eq!(source, RateSource::Fallback);

        // A second call must retry upstream rather than serve the fallback
        // from cache.
        let (_, source) = engine.market_rate().await;
        assert_eq!(source, RateSource::Fallback);
        assert_eq!(feed.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn buy_above_market_above_sell() {
        let feed = Arc::new(CountingFeed::returning(Decimal::from(95)));
        let engine = engine_with(feed);

        let rate = Decimal::new(9_512, 2); // 95.12
        let buy = engine.buy_price(rate);
        let sell = engine.sell_price(rate);

        assert!(buy > rate, "{buy} should exceed {rate}");
        assert!(rate > sell, "{rate} should exceed {sell}");
        assert!(buy - sell >= Decimal::ZERO);
    }

    #[tokio::test]
    async fn prices_round_half_to_even() {
        let feed = Arc::new(CountingFeed::returning(Decimal::ZERO));
        // Zero margins make the quoted price the rounded rate itself.
        let engine = PricingEngine::new(
            feed,
            Decimal::ZERO,
            Decimal::ZERO,
            Duration::from_secs(300),
        );

        assert_eq!(engine.buy_price(Decimal::new(1_005, 3)), Decimal::new(100, 2)); // 1.005 → 1.00
        assert_eq!(engine.buy_price(Decimal::new(1_015, 3)), Decimal::new(102, 2)); // 1.015 → 1.02
        assert_eq!(engine.buy_price(Decimal::new(1_0151, 4)), Decimal::new(102, 2));
    }

    #[tokio::test]
    async fn p2p_heuristic_takes_min_of_minimums_and_max_of_maximums() {
        let mut feed = CountingFeed::returning(Decimal::from(95));
        feed.side_a = vec![Decimal::from(96), Decimal::from(98)];
        feed.side_b = vec![Decimal::from(94), Decimal::from(97)];
        let engine = engine_with(Arc::new(feed));

        let snap = engine.p2p_snapshot().await;
        assert_eq!(snap.p2p_buy, Some(Decimal::from(94)));
        assert_eq!(snap.p2p_sell, Some(Decimal::from(98)));
    }

    #[tokio::test]
    async fn empty_p2p_side_is_excluded_not_fatal() {
        let mut feed = CountingFeed::returning(Decimal::from(95));
        feed.side_a = vec![];
        feed.side_b = vec![Decimal::from(97)];
        let engine = engine_with(Arc::new(feed));

        let snap = engine.p2p_snapshot().await;
        assert_eq!(snap.p2p_buy, Some(Decimal::from(97)));
        assert_eq!(snap.p2p_sell, Some(Decimal::from(97)));

        let empty = CountingFeed::returning(Decimal::from(95));
        let engine = engine_with(Arc::new(empty));
        let snap = engine.p2p_snapshot().await;
        assert_eq!(snap.p2p_buy, None);
        assert_eq!(snap.p2p_sell, None);
    }
}
