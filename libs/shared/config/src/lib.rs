use std::env;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_TOKEN_TTL_SECONDS: u32 = 3600;
pub const DEFAULT_SESSION_RETENTION_HOURS: i64 = 72;
pub const DEFAULT_RETENTION_SWEEP_INTERVAL_SECONDS: u64 = 300;
pub const DEFAULT_SERVER_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub relay_app_id: String,
    pub relay_app_certificate: String,
    pub call_link_base_url: String,
    pub relay_token_ttl_seconds: u32,
    pub session_retention_hours: i64,
    pub retention_sweep_interval_seconds: u64,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            relay_app_id: env::var("RELAY_APP_ID")
                .unwrap_or_else(|_| {
                    warn!("RELAY_APP_ID not set, using empty value");
                    String::new()
                }),
            relay_app_certificate: env::var("RELAY_APP_CERTIFICATE")
                .unwrap_or_else(|_| {
                    warn!("RELAY_APP_CERTIFICATE not set, using empty value");
                    String::new()
                }),
            call_link_base_url: env::var("CALL_LINK_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| {
                    warn!("CALL_LINK_BASE_URL not set, shareable call links are disabled");
                    String::new()
                }),
            relay_token_ttl_seconds: parse_or_default(
                "RELAY_TOKEN_TTL_SECONDS",
                DEFAULT_TOKEN_TTL_SECONDS,
            ),
            session_retention_hours: parse_or_default(
                "SESSION_RETENTION_HOURS",
                DEFAULT_SESSION_RETENTION_HOURS,
            ),
            retention_sweep_interval_seconds: parse_or_default(
                "RETENTION_SWEEP_INTERVAL_SECONDS",
                DEFAULT_RETENTION_SWEEP_INTERVAL_SECONDS,
            ),
            server_port: parse_or_default("SERVER_PORT", DEFAULT_SERVER_PORT),
        };

        if !config.is_relay_configured() {
            warn!("Media relay signing credentials missing - token issuance will fail");
        }

        config
    }

    pub fn is_relay_configured(&self) -> bool {
        !self.relay_app_id.is_empty() && !self.relay_app_certificate.is_empty()
    }

    pub fn is_call_links_configured(&self) -> bool {
        !self.call_link_base_url.is_empty()
    }
}

impl Default for AppConfig {
    /// Unconfigured relay and links with every tunable at its default.
    fn default() -> Self {
        Self {
            relay_app_id: String::new(),
            relay_app_certificate: String::new(),
            call_link_base_url: String::new(),
            relay_token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            session_retention_hours: DEFAULT_SESSION_RETENTION_HOURS,
            retention_sweep_interval_seconds: DEFAULT_RETENTION_SWEEP_INTERVAL_SECONDS,
            server_port: DEFAULT_SERVER_PORT,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
