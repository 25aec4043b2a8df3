//! Runtime configuration.
//!
//! Settings come from an optional TOML file, then a small set of environment
//! variables override the values that differ per deployment (credentials,
//! callback URL, bind address). Every field has a default so the binary runs
//! against the Daraja sandbox with no file at all.

use crate::error::{BillingError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;

pub const ENV_CONSUMER_KEY: &str = "RENTBILL_MPESA_CONSUMER_KEY";
pub const ENV_CONSUMER_SECRET: &str = "RENTBILL_MPESA_CONSUMER_SECRET";
pub const ENV_PASSKEY: &str = "RENTBILL_MPESA_PASSKEY";
pub const ENV_SHORTCODE: &str = "RENTBILL_MPESA_SHORTCODE";
pub const ENV_CALLBACK_URL: &str = "RENTBILL_CALLBACK_URL";
pub const ENV_API_KEY: &str = "RENTBILL_API_KEY";
pub const ENV_BIND: &str = "RENTBILL_BIND";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerSettings,
    pub billing: BillingSettings,
    pub water: WaterSettings,
    pub mpesa: MpesaSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    /// When set, every route except `/health` and the gateway callback
    /// requires `Authorization: Bearer <api_key>`.
    pub api_key: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BillingSettings {
    pub currency: String,
    /// Days between issuing an invoice and its due date.
    pub due_days: u32,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            currency: "KES".to_string(),
            due_days: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WaterSettings {
    pub rate_per_unit: Decimal,
}

impl Default for WaterSettings {
    fn default() -> Self {
        Self {
            rate_per_unit: dec!(150),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MpesaEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox.safaricom.co.ke",
            Self::Production => "https://api.safaricom.co.ke",
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MpesaSettings {
    pub environment: MpesaEnvironment,
    /// Overrides the environment's base URL.
    pub base_url: Option<String>,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub callback_url: String,
    pub timeout_secs: u64,
    /// A pending payment with no callback after this long is expired.
    pub pending_timeout_minutes: u32,
    /// How often `serve` sweeps for expired pending payments.
    pub expiry_sweep_secs: u64,
}

impl Default for MpesaSettings {
    fn default() -> Self {
        Self {
            environment: MpesaEnvironment::Sandbox,
            base_url: None,
            consumer_key: String::new(),
            consumer_secret: String::new(),
            shortcode: "174379".to_string(),
            passkey: String::new(),
            callback_url: "http://localhost:8080/payments/callback".to_string(),
            timeout_secs: 30,
            pending_timeout_minutes: 10,
            expiry_sweep_secs: 60,
        }
    }
}

impl MpesaSettings {
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.environment.base_url().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn pending_max_age(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.pending_timeout_minutes))
    }

    pub fn expiry_sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.expiry_sweep_secs)
    }

    /// Whether enough credentials are present to talk to Daraja.
    pub fn is_configured(&self) -> bool {
        !self.consumer_key.is_empty() && !self.consumer_secret.is_empty() && !self.passkey.is_empty()
    }
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| BillingError::validation(format!("Invalid config: {e}")))
    }

    /// Reads `path` (if given), then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_str(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from `lookup`, which is `std::env::var` in production.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get(ENV_CONSUMER_KEY) {
            self.mpesa.consumer_key = v;
        }
        if let Some(v) = get(ENV_CONSUMER_SECRET) {
            self.mpesa.consumer_secret = v;
        }
        if let Some(v) = get(ENV_PASSKEY) {
            self.mpesa.passkey = v;
        }
        if let Some(v) = get(ENV_SHORTCODE) {
            self.mpesa.shortcode = v;
        }
        if let Some(v) = get(ENV_CALLBACK_URL) {
            self.mpesa.callback_url = v;
        }
        if let Some(v) = get(ENV_API_KEY) {
            self.server.api_key = Some(v);
        }
        if let Some(v) = get(ENV_BIND) {
            self.server.bind = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.water.rate_per_unit < Decimal::ZERO {
            return Err(BillingError::validation(
                "water.rate_per_unit must not be negative",
            ));
        }
        if self.billing.currency.trim().is_empty() {
            return Err(BillingError::validation("billing.currency must be set"));
        }
        if self.mpesa.timeout_secs == 0 {
            return Err(BillingError::validation(
                "mpesa.timeout_secs must be greater than zero",
            ));
        }
        if self.mpesa.pending_timeout_minutes == 0 || self.mpesa.expiry_sweep_secs == 0 {
            return Err(BillingError::validation(
                "mpesa.pending_timeout_minutes and mpesa.expiry_sweep_secs must be greater than zero",
            ));
        }
        Ok(())
    }
}
