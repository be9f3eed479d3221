use std::env;

use chrono::Duration;
use cpg_common::Secret;
use log::*;
use partner_tools::{EasyCreditConfig, IuteConfig, MicroinvestConfig, SimlaConfig};

const DEFAULT_CPG_HOST: &str = "127.0.0.1";
const DEFAULT_CPG_PORT: u16 = 8370;
const DEFAULT_STATUS_CHECK_INTERVAL: Duration = Duration::minutes(1);
/// Give the HTTP server a head start before the first full feed sync hits the partners.
const DEFAULT_INITIAL_SYNC_DELAY: Duration = Duration::seconds(5);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// How often the reconciliation worker runs a full pass.
    pub status_check_interval: Duration,
    pub initial_sync_delay: Duration,
    /// Shared secret for Iute webhook signatures. Verification is skipped (with a warning) when
    /// unset.
    pub webhook_secret: Option<Secret<String>>,
    pub simla: SimlaConfig,
    pub microinvest: MicroinvestConfig,
    pub easycredit: EasyCreditConfig,
    pub iute: IuteConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_CPG_HOST.to_string(),
            port: DEFAULT_CPG_PORT,
            database_url: String::default(),
            status_check_interval: DEFAULT_STATUS_CHECK_INTERVAL,
            initial_sync_delay: DEFAULT_INITIAL_SYNC_DELAY,
            webhook_secret: None,
            simla: SimlaConfig::default(),
            microinvest: MicroinvestConfig::default(),
            easycredit: EasyCreditConfig::default(),
            iute: IuteConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("CPG_HOST").ok().unwrap_or_else(|| DEFAULT_CPG_HOST.into());
        let port = env::var("CPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for CPG_PORT. {e} Using the default, {DEFAULT_CPG_PORT}, instead."
                    );
                    DEFAULT_CPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_CPG_PORT);
        let database_url = env::var("CPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ CPG_DATABASE_URL is not set. Please set it to the URL for the feed database.");
            String::default()
        });
        let status_check_interval = env::var("CPG_STATUS_CHECK_INTERVAL")
            .map_err(|_| {
                info!(
                    "🪛️ CPG_STATUS_CHECK_INTERVAL is not set. Using the default of {} min.",
                    DEFAULT_STATUS_CHECK_INTERVAL.num_minutes()
                )
            })
            .and_then(|s| {
                s.parse::<i64>()
                    .map(Duration::minutes)
                    .map_err(|e| warn!("🪛️ Invalid configuration value for CPG_STATUS_CHECK_INTERVAL. {e}"))
            })
            .ok()
            .unwrap_or(DEFAULT_STATUS_CHECK_INTERVAL);
        let webhook_secret = match env::var("CPG_IUTE_WEBHOOK_SECRET") {
            Ok(s) if !s.is_empty() => Some(Secret::new(s)),
            _ => {
                warn!(
                    "🪛️ CPG_IUTE_WEBHOOK_SECRET is not set. Iute webhook calls will be accepted without \
                     signature verification."
                );
                None
            },
        };
        Self {
            host,
            port,
            database_url,
            status_check_interval,
            initial_sync_delay: DEFAULT_INITIAL_SYNC_DELAY,
            webhook_secret,
            simla: SimlaConfig::from_env_or_default(),
            microinvest: MicroinvestConfig::from_env_or_default(),
            easycredit: EasyCreditConfig::from_env_or_default(),
            iute: IuteConfig::from_env_or_default(),
        }
    }
}
