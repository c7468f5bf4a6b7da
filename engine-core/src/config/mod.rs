use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;
use std::time::Duration;

/// Engine configuration.
///
/// The company fields describe the counterparty side of every payment:
/// the organization engaging the freelancers.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_company_country")]
    pub company_country: String,
    #[serde(default = "default_company_currency")]
    pub company_currency: String,
    /// Upper bound for any call to an external collaborator.
    #[serde(default = "default_external_call_timeout_ms")]
    pub external_call_timeout_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_company_country() -> String {
    "NL".to_string()
}

fn default_company_currency() -> String {
    "EUR".to_string()
}

fn default_external_call_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn external_call_timeout(&self) -> Duration {
        Duration::from_millis(self.external_call_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            company_country: default_company_country(),
            company_currency: default_company_currency(),
            external_call_timeout_ms: default_external_call_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}
