//! Safaricom Daraja (M-Pesa Express / STK push) client.
//!
//! Two calls are involved: an OAuth client-credentials token fetch, and the
//! STK push itself. The payment result is not part of the push response; it is
//! POSTed later to the callback URL, which [`parse_callback`] decodes.

use crate::config::MpesaSettings;
use crate::domain::payment::{PaymentOutcome, PushAcceptance};
use crate::domain::ports::{MobileMoneyGateway, PushRequest};
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Daraja timestamps are East Africa Time.
const EAT_OFFSET_SECS: i32 = 3 * 3600;
/// Refresh the token this long before Daraja says it expires.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;
/// Upper bound on how long a token is cached, whatever `expires_in` says.
const MAX_TOKEN_LIFETIME_SECS: i64 = 24 * 3600;

pub const ACCEPTED_RESPONSE_CODE: &str = "0";

/// `YYYYMMDDHHMMSS` in East Africa Time.
pub fn daraja_timestamp(now: DateTime<Utc>) -> String {
    const FORMAT: &str = "%Y%m%d%H%M%S";
    match FixedOffset::east_opt(EAT_OFFSET_SECS) {
        Some(eat) => now.with_timezone(&eat).format(FORMAT).to_string(),
        None => now.format(FORMAT).to_string(),
    }
}

/// `base64(shortcode + passkey + timestamp)`.
pub fn stk_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{shortcode}{passkey}{timestamp}"))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Daraja sends this as a string.
    #[serde(deserialize_with = "de_string_or_number")]
    expires_in: i64,
}

/// How long to cache a token that Daraja says lives `expires_in` seconds.
fn token_lifetime(expires_in: i64) -> Duration {
    Duration::seconds(
        expires_in
            .saturating_sub(TOKEN_EXPIRY_MARGIN_SECS)
            .clamp(0, MAX_TOKEN_LIFETIME_SECS),
    )
}

fn de_string_or_number<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Str(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushBody<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    transaction_type: &'static str,
    amount: u64,
    party_a: &'a str,
    party_b: &'a str,
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    callback_url: &'a str,
    account_reference: &'a str,
    transaction_desc: &'a str,
}

#[derive(Debug, Deserialize)]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    customer_message: String,
}

#[derive(Debug, Deserialize)]
struct DarajaErrorBody {
    #[serde(rename = "errorCode", default)]
    error_code: String,
    #[serde(rename = "errorMessage", default)]
    error_message: String,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// HTTP client for the Daraja API.
pub struct DarajaClient {
    http: reqwest::Client,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
    shortcode: String,
    passkey: String,
    token: Mutex<Option<CachedToken>>,
}

impl DarajaClient {
    pub fn new(settings: &MpesaSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: settings.resolved_base_url(),
            consumer_key: settings.consumer_key.clone(),
            consumer_secret: settings.consumer_secret.clone(),
            shortcode: settings.shortcode.clone(),
            passkey: settings.passkey.clone(),
            token: Mutex::new(None),
        })
    }

    /// Returns a cached access token, fetching a fresh one when needed.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.expires_at > Utc::now()
        {
            return Ok(token.value.clone());
        }

        let url = format!("{}/oauth/v1/generate", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("grant_type", "client_credentials")])
            .basic_auth(&self.consumer_key, Some(&self.consumer_secret))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Daraja token request rejected");
            return Err(BillingError::Gateway(format!(
                "token request failed ({status}): {body}"
            )));
        }

        let token: TokenResponse = resp.json().await?;
        tracing::debug!(expires_in = token.expires_in, "Fetched Daraja access token");
        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            value: token.access_token,
            expires_at: Utc::now() + token_lifetime(token.expires_in),
        });
        Ok(value)
    }
}

#[async_trait]
impl MobileMoneyGateway for DarajaClient {
    async fn stk_push(&self, request: PushRequest) -> Result<PushAcceptance> {
        let token = self.access_token().await?;
        let timestamp = daraja_timestamp(Utc::now());
        let amount = request
            .amount
            .ceil_whole()
            .value()
            .to_u64()
            .ok_or_else(|| BillingError::validation("Amount out of range for STK push"))?;

        let body = StkPushBody {
            business_short_code: &self.shortcode,
            password: stk_password(&self.shortcode, &self.passkey, &timestamp),
            timestamp,
            transaction_type: "CustomerPayBillOnline",
            amount,
            party_a: request.phone.as_str(),
            party_b: &self.shortcode,
            phone_number: request.phone.as_str(),
            callback_url: &request.callback_url,
            account_reference: &request.account_reference,
            transaction_desc: &request.description,
        };

        let url = format!("{}/mpesa/stkpush/v1/processrequest", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<DarajaErrorBody>(&raw)
                .map(|e| format!("{} {}", e.error_code, e.error_message))
                .unwrap_or(raw);
            return Err(BillingError::Gateway(format!(
                "STK push rejected ({status}): {}",
                reason.trim()
            )));
        }

        let parsed: StkPushResponse = resp.json().await?;
        if parsed.response_code != ACCEPTED_RESPONSE_CODE {
            return Err(BillingError::Gateway(format!(
                "STK push not accepted (code {}): {}",
                parsed.response_code, parsed.response_description
            )));
        }

        tracing::info!(
            checkout_request_id = %parsed.checkout_request_id,
            account_reference = %request.account_reference,
            amount,
            "STK push accepted"
        );

        Ok(PushAcceptance {
            merchant_request_id: parsed.merchant_request_id,
            checkout_request_id: parsed.checkout_request_id,
            customer_message: parsed.customer_message,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CallbackEnvelope {
    #[serde(rename = "Body")]
    body: CallbackBody,
}

#[derive(Debug, Deserialize)]
struct CallbackBody {
    #[serde(rename = "stkCallback")]
    stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    result_desc: String,
    #[serde(rename = "CallbackMetadata")]
    metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    items: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
struct MetadataItem {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Value")]
    value: Option<serde_json::Value>,
}

impl CallbackMetadata {
    fn value(&self, name: &str) -> Option<&serde_json::Value> {
        self.items
            .iter()
            .find(|item| item.name == name)
            .and_then(|item| item.value.as_ref())
    }

    fn text(&self, name: &str) -> Option<String> {
        match self.value(name)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Decodes a Daraja STK callback body.
pub fn parse_callback(body: &[u8]) -> Result<PaymentOutcome> {
    let envelope: CallbackEnvelope = serde_json::from_slice(body)?;
    let cb = envelope.body.stk_callback;

    let (amount, receipt) = match &cb.metadata {
        Some(meta) => {
            let amount = meta
                .text("Amount")
                .map(|raw| {
                    raw.parse::<Decimal>().map_err(|e| {
                        BillingError::validation(format!("Invalid callback amount '{raw}': {e}"))
                    })
                })
                .transpose()?;
            (amount, meta.text("MpesaReceiptNumber"))
        }
        None => (None, None),
    };

    Ok(PaymentOutcome {
        merchant_request_id: cb.merchant_request_id,
        checkout_request_id: cb.checkout_request_id,
        result_code: cb.result_code,
        result_desc: cb.result_desc,
        amount,
        receipt,
    })
}
