//! Environment-driven configuration.

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub port: u16,
    /// How often the expiry sweeper wakes up.
    pub sweep_interval: Duration,
    /// Formation window for new groups, in hours.
    pub group_lifetime_hours: i64,
    /// Default cap on followers, also the last-but-one fallback for the
    /// expected friend count.
    pub default_max_friends: i64,
    pub gateway_base_url: String,
    pub gateway_merchant_id: String,
    /// Where the gateway redirects after a settlement payment attempt.
    pub settlement_callback_url: String,
    pub nats_url: Option<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://bahamm.db".to_string()),
            port: env_parse("PORT", 8086),
            sweep_interval: Duration::from_secs(env_parse("SWEEP_INTERVAL_SECS", 600)),
            group_lifetime_hours: env_parse("GROUP_LIFETIME_HOURS", 24),
            default_max_friends: env_parse("DEFAULT_MAX_FRIENDS", 3),
            gateway_base_url: std::env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "https://api.zarinpal.com/pg/v4".to_string()),
            gateway_merchant_id: std::env::var("GATEWAY_MERCHANT_ID").unwrap_or_default(),
            settlement_callback_url: std::env::var("SETTLEMENT_CALLBACK_URL")
                .unwrap_or_else(|_| "http://localhost:8086/api/v1/settlement/verify".to_string()),
            nats_url: std::env::var("NATS_URL").ok(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
