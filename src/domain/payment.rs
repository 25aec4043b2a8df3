use super::invoice::InvoiceId;
use super::money::Amount;
use super::phone::PhoneNumber;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Success,
    Failed,
    /// No callback arrived within the allowed window.
    Expired,
}

/// A mobile-money collection attempt against an invoice.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub invoice: InvoiceId,
    pub tenant: u32,
    pub phone: PhoneNumber,
    pub amount: Amount,
    pub status: TransactionStatus,
    pub merchant_request_id: Option<String>,
    pub checkout_request_id: Option<String>,
    pub receipt: Option<String>,
    pub result_desc: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PaymentTransaction {
    pub fn pending(
        invoice: InvoiceId,
        tenant: u32,
        phone: PhoneNumber,
        amount: Amount,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            invoice,
            tenant,
            phone,
            amount,
            status: TransactionStatus::Pending,
            merchant_request_id: None,
            checkout_request_id: None,
            receipt: None,
            result_desc: None,
            created_at,
            completed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    /// Leaves `Pending` for `status`. Returns `false` (and changes nothing)
    /// when the transaction was already settled.
    pub fn settle(
        &mut self,
        status: TransactionStatus,
        result_desc: Option<String>,
        at: DateTime<Utc>,
    ) -> bool {
        if !self.is_pending() || status == TransactionStatus::Pending {
            return false;
        }
        self.status = status;
        self.result_desc = result_desc;
        self.completed_at = Some(at);
        true
    }
}

/// The gateway's acknowledgement of an STK push request.
#[derive(Debug, Clone, PartialEq)]
pub struct PushAcceptance {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub customer_message: String,
}

/// Final result of an STK push, as delivered by the gateway callback.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOutcome {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub result_code: i64,
    pub result_desc: String,
    pub amount: Option<Decimal>,
    pub receipt: Option<String>,
}

impl PaymentOutcome {
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pending() -> PaymentTransaction {
        PaymentTransaction::pending(
            InvoiceId::from("INV-1-202410"),
            1,
            PhoneNumber::parse("0712345678").unwrap(),
            Amount::new(dec!(100)).unwrap(),
            Utc::now(),
        )
    }

    #[test]
    fn test_transaction_settles_once() {
        let mut tx = pending();
        assert!(tx.settle(TransactionStatus::Success, None, Utc::now()));
        assert_eq!(tx.status, TransactionStatus::Success);
        assert!(tx.completed_at.is_some());

        assert!(!tx.settle(TransactionStatus::Failed, Some("late".into()), Utc::now()));
        assert_eq!(tx.status, TransactionStatus::Success);
        assert_eq!(tx.result_desc, None);
    }

    #[test]
    fn test_cannot_settle_back_to_pending() {
        let mut tx = pending();
        assert!(!tx.settle(TransactionStatus::Pending, None, Utc::now()));
        assert!(tx.completed_at.is_none());
    }
}
