use cpg_common::Secret;
use log::*;

/// Simla CRM access. The API key travels as a query/form parameter, not a header.
#[derive(Debug, Clone, Default)]
pub struct SimlaConfig {
    /// e.g. "https://my-shop.simla.com/api/v5"
    pub api_url: String,
    pub api_key: Secret<String>,
}

impl SimlaConfig {
    pub fn from_env_or_default() -> Self {
        let api_url = std::env::var("CPG_SIMLA_API_URL").unwrap_or_else(|_| {
            error!("🪛️ CPG_SIMLA_API_URL is not set. Please set it to your Simla API base URL.");
            String::default()
        });
        let api_key = Secret::new(std::env::var("CPG_SIMLA_API_KEY").unwrap_or_else(|_| {
            error!("🪛️ CPG_SIMLA_API_KEY is not set. CRM calls will be rejected.");
            String::default()
        }));
        Self { api_url, api_key }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MicroinvestConfig {
    pub api_url: String,
    pub partner_id: String,
    pub api_key: Secret<String>,
}

impl MicroinvestConfig {
    pub fn from_env_or_default() -> Self {
        let api_url = std::env::var("CPG_MICROINVEST_API_URL").unwrap_or_else(|_| {
            warn!("🪛️ CPG_MICROINVEST_API_URL is not set.");
            String::default()
        });
        let partner_id = std::env::var("CPG_MICROINVEST_PARTNER_ID").unwrap_or_else(|_| {
            warn!("🪛️ CPG_MICROINVEST_PARTNER_ID is not set.");
            String::default()
        });
        let api_key = Secret::new(std::env::var("CPG_MICROINVEST_API_KEY").unwrap_or_default());
        Self { api_url, partner_id, api_key }
    }
}

/// Easy Credit routes all calls through an environment segment (`TEST` or `PROD`) and uses HTTP
/// basic auth plus in-body credentials. File uploads go to a separate host.
#[derive(Debug, Clone, Default)]
pub struct EasyCreditConfig {
    pub api_url: String,
    pub files_url: String,
    pub login: String,
    pub password: Secret<String>,
    pub environment: String,
}

impl EasyCreditConfig {
    pub fn from_env_or_default() -> Self {
        let api_url = std::env::var("CPG_EASYCREDIT_API_URL").unwrap_or_else(|_| {
            warn!("🪛️ CPG_EASYCREDIT_API_URL is not set.");
            String::default()
        });
        let files_url = std::env::var("CPG_EASYCREDIT_FILES_URL").unwrap_or_else(|_| {
            warn!("🪛️ CPG_EASYCREDIT_FILES_URL is not set. File uploads will fail.");
            String::default()
        });
        let login = std::env::var("CPG_EASYCREDIT_LOGIN").unwrap_or_default();
        let password = Secret::new(std::env::var("CPG_EASYCREDIT_PASSWORD").unwrap_or_default());
        let environment = std::env::var("CPG_EASYCREDIT_ENVIRONMENT").unwrap_or_else(|_| {
            info!("🪛️ CPG_EASYCREDIT_ENVIRONMENT is not set. Using TEST.");
            "TEST".to_string()
        });
        Self { api_url, files_url, login, password, environment }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IuteConfig {
    pub api_url: String,
    pub api_key: Secret<String>,
    pub pos_id: String,
    pub salesman_id: String,
    /// Base URL Iute redirects customers back to after confirming or cancelling.
    pub webhook_base_url: String,
}

impl IuteConfig {
    pub fn from_env_or_default() -> Self {
        let api_url = std::env::var("CPG_IUTE_API_URL").unwrap_or_else(|_| {
            warn!("🪛️ CPG_IUTE_API_URL is not set.");
            String::default()
        });
        let api_key = Secret::new(std::env::var("CPG_IUTE_API_KEY").unwrap_or_default());
        let pos_id = std::env::var("CPG_IUTE_POS_ID").unwrap_or_default();
        let salesman_id = std::env::var("CPG_IUTE_SALESMAN_ID").ok().unwrap_or_else(|| pos_id.clone());
        let webhook_base_url = std::env::var("CPG_IUTE_WEBHOOK_BASE_URL")
            .unwrap_or_else(|_| "https://credit.pandashop.md".to_string());
        Self { api_url, api_key, pos_id, salesman_id, webhook_base_url }
    }
}
