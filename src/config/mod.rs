use rust_decimal::Decimal;
use std::env;

const DEFAULT_TRONGRID_URL: &str = "https://api.trongrid.io";
const DEFAULT_USDT_CONTRACT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
const DEFAULT_COINGECKO_URL: &str = "https://api.coingecko.com/api/v3/simple/price";
const DEFAULT_BYBIT_P2P_URL: &str = "https://api2.bybit.com/fiat/otc/item/online";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,

    // Tron network (TronGrid public API; key is optional but raises limits)
    pub trongrid_base_url: String,
    pub trongrid_api_key: Option<String>,
    pub usdt_contract: String,
    pub request_timeout_secs: u64,

    // Upstream retry
    pub retry_max_attempts: u32,
    pub retry_base_delay_secs: u64,
    pub retry_on_rate_limit: bool,

    // Pricing
    pub buy_margin: Decimal,
    pub sell_margin: Decimal,
    pub rate_cache_ttl_secs: u64,
    pub coingecko_url: String,
    pub bybit_p2p_url: String,

    // Telegram notifications (optional — required for outbound alerts)
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,

    // Spreadsheet store (optional — falls back to the in-memory store)
    pub sheets_spreadsheet_id: Option<String>,
    pub sheets_access_token: Option<String>,
    pub sheets_worksheet: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,

            trongrid_base_url: env::var("TRONGRID_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_TRONGRID_URL.into()),
            trongrid_api_key: env::var("TRONGRID_API_KEY").ok().filter(|s| !s.is_empty()),
            usdt_contract: env::var("USDT_TRC20_CONTRACT")
                .unwrap_or_else(|_| DEFAULT_USDT_CONTRACT.into()),
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".into())
                .parse()
                .unwrap_or(10),

            retry_max_attempts: env::var("RETRY_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".into())
                .parse()
                .unwrap_or(3),
            retry_base_delay_secs: env::var("RETRY_BASE_DELAY_SECS")
                .unwrap_or_else(|_| "2".into())
                .parse()
                .unwrap_or(2),
            retry_on_rate_limit: env::var("RETRY_ON_RATE_LIMIT")
                .unwrap_or_else(|_| "true".into())
                .parse()
                .unwrap_or(true),

            buy_margin: env::var("BUY_MARGIN")
                .unwrap_or_else(|_| "0.05".into())
                .parse()
                .unwrap_or(Decimal::new(5, 2)),
            sell_margin: env::var("SELL_MARGIN")
                .unwrap_or_else(|_| "0.03".into())
                .parse()
                .unwrap_or(Decimal::new(3, 2)),
            rate_cache_ttl_secs: env::var("RATE_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "300".into())
                .parse()
                .unwrap_or(300),
            coingecko_url: env::var("COINGECKO_URL")
                .unwrap_or_else(|_| DEFAULT_COINGECKO_URL.into()),
            bybit_p2p_url: env::var("BYBIT_P2P_URL")
                .unwrap_or_else(|_| DEFAULT_BYBIT_P2P_URL.into()),

            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok().filter(|s| !s.is_empty()),
            telegram_chat_id: env::var("TELEGRAM_CHAT_ID").ok().filter(|s| !s.is_empty()),

            sheets_spreadsheet_id: env::var("SHEETS_SPREADSHEET_ID")
                .ok()
                .filter(|s| !s.is_empty()),
            sheets_access_token: env::var("SHEETS_ACCESS_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            sheets_worksheet: env::var("SHEETS_WORKSHEET").unwrap_or_else(|_| "Orders".into()),
        })
    }

    /// Returns true if Telegram notification credentials are configured.
    pub fn has_telegram(&self) -> bool {
        self.telegram_bot_token.is_some() && self.telegram_chat_id.is_some()
    }

    /// Returns true if the spreadsheet store is configured.
    pub fn has_sheet_store(&self) -> bool {
        self.sheets_spreadsheet_id.is_some() && self.sheets_access_token.is_some()
    }
}
