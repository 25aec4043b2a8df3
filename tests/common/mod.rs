#![allow(dead_code)]

use async_trait::async_trait;
use rentbill::application::engine::{BillingEngine, EngineSettings, Stores};
use rentbill::domain::payment::PushAcceptance;
use rentbill::domain::ports::{MobileMoneyGateway, PushRequest};
use rentbill::error::{BillingError, Result};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// In-process stand-in for Daraja. Records every push it receives.
#[derive(Clone, Default)]
pub struct FakeGateway {
    pub requests: Arc<Mutex<Vec<PushRequest>>>,
    counter: Arc<AtomicU32>,
    reject: bool,
}

impl FakeGateway {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl MobileMoneyGateway for FakeGateway {
    async fn stk_push(&self, request: PushRequest) -> Result<PushAcceptance> {
        self.requests.lock().unwrap().push(request);
        if self.reject {
            return Err(BillingError::Gateway("400.002.02 Invalid PhoneNumber".into()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PushAcceptance {
            merchant_request_id: format!("29115-{n}"),
            checkout_request_id: format!("ws_CO_{n}"),
            customer_message: "Success. Request accepted for processing".into(),
        })
    }
}

pub fn engine_with(gateway: Option<FakeGateway>) -> BillingEngine {
    let engine = BillingEngine::new(Stores::in_memory(), EngineSettings::default());
    match gateway {
        Some(gateway) => engine.with_gateway(Box::new(gateway)),
        None => engine,
    }
}

pub fn success_callback(checkout: &str, amount: u64, receipt: &str) -> Value {
    json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-1",
                "CheckoutRequestID": checkout,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        { "Name": "Amount", "Value": amount },
                        { "Name": "MpesaReceiptNumber", "Value": receipt },
                        { "Name": "Balance" },
                        { "Name": "TransactionDate", "Value": 20241001102115u64 },
                        { "Name": "PhoneNumber", "Value": 254712345678u64 }
                    ]
                }
            }
        }
    })
}

pub fn cancelled_callback(checkout: &str) -> Value {
    json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-1",
                "CheckoutRequestID": checkout,
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user"
            }
        }
    })
}
