use super::engine::BillingEngine;
use crate::domain::invoice::{InvoiceId, RentInvoice};
use crate::domain::money::{Amount, Money};
use crate::domain::notification::NotificationKind;
use crate::domain::payment::{PaymentOutcome, PaymentTransaction, TransactionStatus};
use crate::domain::phone::PhoneNumber;
use crate::domain::ports::PushRequest;
use crate::error::{BillingError, Result};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const TRANSACTION_DESC: &str = "Rent Payment";

/// What a gateway callback did to the books.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackDisposition {
    /// Payment confirmed and credited.
    Applied(PaymentTransaction),
    /// Payment failed or was cancelled; nothing credited.
    Declined(PaymentTransaction),
    /// The transaction had already been settled by an earlier delivery.
    Duplicate(PaymentTransaction),
    /// No transaction matches the callback's checkout request id.
    Unknown,
}

impl BillingEngine {
    /// Prompts the tenant's handset to pay the outstanding balance of an
    /// open invoice.
    ///
    /// The pending transaction is stored before the gateway is called. A
    /// successful return means the prompt was accepted, not that money moved;
    /// that is decided by [`handle_callback`](Self::handle_callback).
    ///
    /// The gateway call runs outside the ledger lock. When it returns, the
    /// stored transaction is re-read under the lock and only updated if it is
    /// still pending, so an expiry that raced the call is kept.
    pub async fn initiate_payment(
        &self,
        invoice_id: &InvoiceId,
        phone: Option<PhoneNumber>,
    ) -> Result<PaymentTransaction> {
        let invoice = self
            .stores
            .invoices
            .get(invoice_id)
            .await?
            .ok_or_else(|| BillingError::not_found(format!("invoice {invoice_id}")))?;
        if !invoice.is_open() {
            return Err(BillingError::validation(format!(
                "Invoice {invoice_id} is {:?}; nothing to pay",
                invoice.status
            )));
        }
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| BillingError::Gateway("No mobile-money gateway configured".into()))?;

        let amount = invoice
            .outstanding()
            .to_amount()
            .ok_or_else(|| BillingError::validation(format!("Invoice {invoice_id} has no balance")))?
            .ceil_whole();

        let phone = match phone {
            Some(phone) => phone,
            None => self.ledger(invoice.tenant).await?.phone,
        };

        let pending =
            PaymentTransaction::pending(invoice.id.clone(), invoice.tenant, phone, amount, Utc::now());
        self.stores.payments.store(pending.clone()).await?;

        let request = PushRequest {
            phone: pending.phone.clone(),
            amount,
            account_reference: invoice.id.to_string(),
            description: TRANSACTION_DESC.to_string(),
            callback_url: self.settings.callback_url.clone(),
        };
        let pushed = gateway.stk_push(request).await;

        let _guard = self.ledger_lock.lock().await;
        let mut tx = self.stores.payments.get(pending.id).await?.unwrap_or(pending);
        if !tx.is_pending() {
            tracing::warn!(
                transaction = %tx.id,
                status = ?tx.status,
                "Transaction settled while the payment prompt was in flight"
            );
            return pushed.map(|_| tx);
        }

        match pushed {
            Ok(acceptance) => {
                tracing::debug!(customer_message = %acceptance.customer_message, "Gateway accepted prompt");
                tx.merchant_request_id = Some(acceptance.merchant_request_id);
                tx.checkout_request_id = Some(acceptance.checkout_request_id);
                self.stores.payments.store(tx.clone()).await?;
                tracing::info!(
                    transaction = %tx.id,
                    invoice = %invoice.id,
                    amount = %amount,
                    "Payment prompt sent"
                );
                Ok(tx)
            }
            Err(e) => {
                tx.settle(TransactionStatus::Failed, Some(e.to_string()), Utc::now());
                self.stores.payments.store(tx.clone()).await?;
                tracing::warn!(transaction = %tx.id, invoice = %invoice.id, error = %e, "Payment prompt failed");
                Err(e)
            }
        }
    }

    /// Reconciles a gateway callback against its pending transaction.
    ///
    /// Only a `Pending` transaction is ever settled, so a redelivered callback
    /// credits nothing the second time. Invoice and ledger changes are worked
    /// out first; the settled transaction is then written before either.
    pub async fn handle_callback(&self, outcome: PaymentOutcome) -> Result<CallbackDisposition> {
        let _guard = self.ledger_lock.lock().await;

        let Some(mut tx) = self
            .stores
            .payments
            .find_by_checkout(&outcome.checkout_request_id)
            .await?
        else {
            tracing::warn!(
                checkout_request_id = %outcome.checkout_request_id,
                "Callback for unknown transaction"
            );
            return Ok(CallbackDisposition::Unknown);
        };

        if !tx.is_pending() {
            tracing::info!(transaction = %tx.id, status = ?tx.status, "Duplicate callback ignored");
            return Ok(CallbackDisposition::Duplicate(tx));
        }

        let now = Utc::now();
        if !outcome.is_success() {
            tx.settle(TransactionStatus::Failed, Some(outcome.result_desc.clone()), now);
            self.stores.payments.store(tx.clone()).await?;
            tracing::info!(
                transaction = %tx.id,
                result_code = outcome.result_code,
                result_desc = %outcome.result_desc,
                "Payment declined"
            );
            let message = format!(
                "Your payment of {} {} for invoice {} was not completed: {}.",
                self.settings.currency, tx.amount, tx.invoice, outcome.result_desc
            );
            self.notify(tx.tenant, NotificationKind::Warning, "Payment Failed", message)
                .await?;
            return Ok(CallbackDisposition::Declined(tx));
        }

        let received = match outcome.amount.map(Amount::new) {
            Some(Ok(amount)) => amount,
            Some(Err(_)) | None => tx.amount,
        };
        if received != tx.amount {
            tracing::warn!(
                transaction = %tx.id,
                requested = %tx.amount,
                received = %received,
                "Callback amount differs from requested amount"
            );
        }
        tx.amount = received;
        tx.receipt = outcome.receipt.clone();
        tx.settle(TransactionStatus::Success, Some(outcome.result_desc.clone()), now);

        let mut ledger = self.ledger(tx.tenant).await?;
        let target = match self.payment_target(&tx).await? {
            Some(mut invoice) => {
                invoice.apply_payment(received.into())?;
                Some(invoice)
            }
            None => None,
        };
        ledger.credit(received)?;

        self.stores.payments.store(tx.clone()).await?;
        if let Some(target) = target {
            tracing::debug!(invoice = %target.id, status = ?target.status, "Applied payment to invoice");
            self.stores.invoices.store(target).await?;
        }
        let current_paid = self
            .stores
            .invoices
            .for_tenant(tx.tenant)
            .await?
            .last()
            .map(|inv| inv.amount_paid)
            .unwrap_or(Money::ZERO);
        ledger.refresh_status(current_paid);
        self.stores.tenants.store(ledger.clone()).await?;

        tracing::info!(
            transaction = %tx.id,
            tenant = tx.tenant,
            amount = %received,
            receipt = tx.receipt.as_deref().unwrap_or("-"),
            outstanding = %ledger.outstanding(),
            "Payment reconciled"
        );

        let message = format!(
            "We have received your payment of {currency} {received} (receipt {}). Outstanding balance: {currency} {}.",
            tx.receipt.as_deref().unwrap_or("n/a"),
            ledger.outstanding().non_negative(),
            currency = self.settings.currency,
        );
        self.notify(tx.tenant, NotificationKind::Info, "Payment Received", message)
            .await?;

        Ok(CallbackDisposition::Applied(tx))
    }

    /// The invoice a confirmed payment is booked against: the one it was
    /// initiated for while that is still open, otherwise the tenant's current
    /// open invoice, otherwise the original invoice.
    async fn payment_target(&self, tx: &PaymentTransaction) -> Result<Option<RentInvoice>> {
        let original = self.stores.invoices.get(&tx.invoice).await?;
        if original.as_ref().is_some_and(RentInvoice::is_open) {
            return Ok(original);
        }
        let latest_open = self
            .stores
            .invoices
            .for_tenant(tx.tenant)
            .await?
            .into_iter()
            .rev()
            .find(RentInvoice::is_open);
        Ok(latest_open.or(original))
    }

    /// Marks pending transactions older than `max_age` as expired. They never
    /// touch the ledger; a callback arriving afterwards is treated as a duplicate.
    pub async fn expire_pending(
        &self,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Result<Vec<PaymentTransaction>> {
        let _guard = self.ledger_lock.lock().await;
        let mut expired = Vec::new();

        for mut tx in self.stores.payments.pending().await? {
            if now - tx.created_at <= max_age {
                continue;
            }
            let reason = format!(
                "No payment confirmation received within {} minutes",
                max_age.num_minutes()
            );
            if tx.settle(TransactionStatus::Expired, Some(reason), now) {
                self.stores.payments.store(tx.clone()).await?;
                tracing::info!(transaction = %tx.id, invoice = %tx.invoice, "Expired pending payment");
                expired.push(tx);
            }
        }
        Ok(expired)
    }

    /// Runs [`expire_pending`](Self::expire_pending) every `every` until the
    /// returned task is aborted.
    pub fn spawn_expiry_sweep(
        self: Arc<Self>,
        max_age: Duration,
        every: std::time::Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.expire_pending(Utc::now(), max_age).await {
                    Ok(expired) if !expired.is_empty() => {
                        tracing::info!(count = expired.len(), "Expired stale pending payments");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Pending payment sweep failed"),
                }
            }
        })
    }
}
