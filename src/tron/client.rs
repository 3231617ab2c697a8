use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use crate::config::AppConfig;
use crate::retry::RetryPolicy;

use super::{
    wallet, BalanceReading, CheckIncoming, DepositCredentials, Ledger, TronError,
    REQUIRED_CONFIRMATIONS, USDT_DECIMALS,
};

/// TronGrid client for deposit-address balance and confirmation queries.
///
/// The HTTP handle is initialized lazily at most once and shared across all
/// callers; the initialization probe runs under the retry policy because
/// TronGrid can rate-limit before any business call is made.
pub struct TronClient {
    http: OnceCell<Client>,
    base_url: String,
    api_key: Option<String>,
    usdt_contract: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl TronClient {
    pub fn new(config: &AppConfig, retry: RetryPolicy) -> Self {
        Self {
            http: OnceCell::new(),
            base_url: config.trongrid_base_url.trim_end_matches('/').to_string(),
            api_key: config.trongrid_api_key.clone(),
            usdt_contract: config.usdt_contract.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            retry,
        }
    }

    /// Build and probe the shared HTTP handle on first use.
    async fn handle(&self) -> Result<&Client, TronError> {
        self.http
            .get_or_try_init(|| async {
                let client = Client::builder().timeout(self.timeout).build()?;

                self.retry
                    .run("trongrid_probe", TronError::is_rate_limited, || async {
                        self.post_json(&client, "/wallet/getnowblock", json!({})).await?;
                        Ok::<(), TronError>(())
                    })
                    .await?;

                tracing::debug!(base_url = %self.base_url, "TronGrid handle initialized");
                Ok(client)
            })
            .await
    }

    async fn get_json(&self, client: &Client, url: &str) -> Result<Value, TronError> {
        let mut req = client.get(url);
        if let Some(key) = &self.api_key {
            req = req.header("TRON-PRO-API-KEY", key);
        }

        let resp = req.send().await?;
        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(TronError::RateLimited);
        }
        let resp = resp.error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn post_json(
        &self,
        client: &Client,
        path: &str,
        body: Value,
    ) -> Result<Value, TronError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("TRON-PRO-API-KEY", key);
        }

        let resp = req.send().await?;
        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(TronError::RateLimited);
        }
        let resp = resp.error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn try_usdt_balance(&self, address: &str) -> Result<Decimal, TronError> {
        let client = self.handle().await?;
        let url = format!("{}/v1/accounts/{}", self.base_url, address);

        let body = self
            .retry
            .run("usdt_balance", TronError::is_rate_limited, || {
                self.get_json(client, &url)
            })
            .await?;

        // Account payload: {"data": [{"trc20": [{"<contract>": "<units>"}], ...}]}.
        // A missing account (never funded) legitimately reads as zero.
        let units = body
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|accounts| accounts.first())
            .and_then(|account| account.get("trc20"))
            .and_then(|t| t.as_array())
            .and_then(|entries| {
                entries
                    .iter()
                    .find_map(|entry| entry.get(self.usdt_contract.as_str()))
            })
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<i128>().ok())
            .unwrap_or(0);

        Ok(Decimal::from_i128_with_scale(units, USDT_DECIMALS))
    }

    async fn current_block(&self, client: &Client) -> Result<u64, TronError> {
        let body = self
            .retry
            .run("now_block", TronError::is_rate_limited, || {
                self.post_json(client, "/wallet/getnowblock", json!({}))
            })
            .await?;

        body.get("block_header")
            .and_then(|h| h.get("raw_data"))
            .and_then(|r| r.get("number"))
            .and_then(|n| n.as_u64())
            .ok_or_else(|| TronError::Unexpected("getnowblock: missing block number".into()))
    }

    /// Minimum confirmation depth across inbound USDT transfers to `address`.
    /// `None` when no inbound transfer is visible yet.
    async fn try_confirmation_depth(&self, address: &str) -> Result<Option<u32>, TronError> {
        let client = self.handle().await?;
        let url = format!(
            "{}/v1/accounts/{}/transactions/trc20?only_to=true&contract_address={}&limit=20",
            self.base_url, address, self.usdt_contract
        );

        let body = self
            .retry
            .run("trc20_transfers", TronError::is_rate_limited, || {
                self.get_json(client, &url)
            })
            .await?;

        let txids: Vec<String> = body
            .get("data")
            .and_then(|d| d.as_array())
            .map(|transfers| {
                transfers
                    .iter()
                    .filter_map(|t| t.get("transaction_id"))
                    .filter_map(|v| v.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if txids.is_empty() {
            return Ok(None);
        }

        let now = self.current_block(client).await?;

        let mut min_depth: Option<u64> = None;
        for txid in txids {
            let info = self
                .retry
                .run("transaction_info", TronError::is_rate_limited, || {
                    self.post_json(
                        client,
                        "/wallet/gettransactioninfobyid",
                        json!({ "value": txid }),
                    )
                })
                .await?;

            if let Some(block) = info.get("blockNumber").and_then(|v| v.as_u64()) {
                let depth = now.saturating_sub(block);
                min_depth = Some(min_depth.map_or(depth, |d| d.min(depth)));
            }
        }

        Ok(min_depth.map(|d| d.min(u32::MAX as u64) as u32))
    }
}

#[async_trait]
impl Ledger for TronClient {
    fn generate_deposit_credentials(&self) -> DepositCredentials {
        wallet::generate_credentials()
    }

    async fn usdt_balance(&self, address: &str) -> BalanceReading {
        match self.try_usdt_balance(address).await {
            Ok(amount) => BalanceReading {
                amount,
                degraded: false,
            },
            Err(e) => {
                counter!("degraded_balance_reads_total").increment(1);
                tracing::warn!(address, error = %e, "Balance query failed — reporting degraded zero");
                BalanceReading {
                    amount: Decimal::ZERO,
                    degraded: true,
                }
            }
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
        let mut degraded = reading.degraded;

        if received && check_confirmations {
            match self.try_confirmation_depth(address).await {
                Ok(Some(depth)) => {
                    confirmations = Some(depth);
                    confirmed = depth >= REQUIRED_CONFIRMATIONS;
                }
                Ok(None) => {
                    // Balance present but no transfer indexed yet.
                    confirmations = Some(0);
                }
                Err(e) => {
                    tracing::warn!(address, error = %e, "Confirmation query failed");
                    degraded = true;
                }
            }
        }

        CheckIncoming {
            received,
            amount: reading.amount,
            confirmed,
            confirmations,
            degraded,
        }
    }
}
