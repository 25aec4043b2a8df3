//! JSON bodies for the HTTP API. Domain types that already serialize
//! cleanly (ledgers, invoices, transactions) are returned as-is.

use crate::application::invoicing::BillingRunSummary;
use crate::domain::invoice::{BillingPeriod, InvoiceId};
use crate::domain::phone::PhoneNumber;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub gateway: bool,
}

impl HealthResponse {
    pub fn ok(gateway: bool) -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            gateway,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterTenantRequest {
    pub tenant: u32,
    pub name: String,
    pub phone: PhoneNumber,
    pub property: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateInvoicesRequest {
    pub period: BillingPeriod,
    /// Defaults to today.
    #[serde(default)]
    pub issued_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedTenant {
    pub tenant: u32,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateInvoicesResponse {
    pub period: BillingPeriod,
    pub issued: Vec<InvoiceId>,
    pub skipped: Vec<InvoiceId>,
    pub failed: Vec<FailedTenant>,
}

impl GenerateInvoicesResponse {
    pub fn new(period: BillingPeriod, summary: BillingRunSummary) -> Self {
        Self {
            period,
            issued: summary.issued,
            skipped: summary.skipped,
            failed: summary
                .failed
                .into_iter()
                .map(|(tenant, error)| FailedTenant { tenant, error })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkPushRequest {
    pub invoice: InvoiceId,
    /// Defaults to the phone on the tenant's ledger.
    #[serde(default)]
    pub phone: Option<PhoneNumber>,
}

/// The acknowledgement Daraja expects from a callback URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackAck {
    pub result_code: i32,
    pub result_desc: String,
}

impl CallbackAck {
    pub fn accepted() -> Self {
        Self {
            result_code: 0,
            result_desc: "Accepted".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
