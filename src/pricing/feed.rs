use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use super::{PricingError, RateFeed};
use crate::config::AppConfig;

/// Production [`RateFeed`]: CoinGecko for the market rate, the Bybit P2P
/// public order book for the auxiliary snapshot.
pub struct HttpRateFeed {
    http: Client,
    coingecko_url: String,
    bybit_url: String,
}

impl HttpRateFeed {
    pub fn new(config: &AppConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            http,
            coingecko_url: config.coingecko_url.clone(),
            bybit_url: config.bybit_p2p_url.clone(),
        }
    }

    /// Fetch the raw price list for one P2P side. The endpoint is not
    /// officially stable; any unexpected shape yields an empty list.
    async fn fetch_p2p_side(&self, side: &str) -> Vec<Decimal> {
        let payload = json!({
            "userId": "",
            "tokenId": "USDT",
            "currencyId": "RUB",
            "payment": [],
            "side": side,
            "size": "10",
            "page": "1",
            "amount": "",
            "authMaker": false,
            "canTrade": false,
        });

        let body: Value = match self
            .http
            .post(&self.bybit_url)
            .json(&payload)
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(resp) => match resp.json().await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(side, error = %e, "P2P response was not JSON");
                    return Vec::new();
                }
            },
            Err(e) => {
                tracing::warn!(side, error = %e, "P2P side query failed");
                return Vec::new();
            }
        };

        // Observed shapes: {"result": {"items": [...]}} and {"result": {"data": [...]}}.
        let items = body
            .get("result")
            .and_then(|r| r.get("items").or_else(|| r.get("data")))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        items
            .iter()
            .filter_map(|item| item.get("price"))
            .filter_map(parse_decimal)
            .collect()
    }
}

#[async_trait]
impl RateFeed for HttpRateFeed {
    async fn market_rate(&self) -> Result<Decimal, PricingError> {
        let resp = self
            .http
            .get(&self.coingecko_url)
            .query(&[("ids", "tether"), ("vs_currencies", "rub")])
            .send()
            .await?
            .error_for_status()?;

        let body: Value = resp.json().await?;

        body.get("tether")
            .and_then(|t| t.get("rub"))
            .and_then(parse_decimal)
            .ok_or_else(|| PricingError::Unexpected("missing tether.rub in rate response".into()))
    }

    async fn p2p_price_sides(&self) -> (Vec<Decimal>, Vec<Decimal>) {
        // Side semantics vary; fetch both and let the engine apply its
        // min/max heuristic.
        (
            self.fetch_p2p_side("0").await,
            self.fetch_p2p_side("1").await,
        )
    }
}

fn parse_decimal(value: &Value) -> Option<Decimal> {
    value
        .as_str()
        .and_then(|s| s.parse::<Decimal>().ok())
        .or_else(|| value.as_f64().and_then(|f| Decimal::try_from(f).ok()))
}
