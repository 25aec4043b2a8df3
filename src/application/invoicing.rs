use super::engine::BillingEngine;
use crate::domain::invoice::{BillingPeriod, InvoiceId, RentInvoice};
use crate::domain::notification::NotificationKind;
use crate::error::{BillingError, Result};
use chrono::{Days, NaiveDate};

#[derive(Debug, Clone, PartialEq)]
pub enum InvoiceOutcome {
    Issued(RentInvoice),
    /// An invoice for this tenant and period already existed; it is returned unchanged.
    AlreadyIssued(RentInvoice),
}

impl InvoiceOutcome {
    pub fn invoice(&self) -> &RentInvoice {
        match self {
            Self::Issued(invoice) | Self::AlreadyIssued(invoice) => invoice,
        }
    }

    pub fn into_invoice(self) -> RentInvoice {
        match self {
            Self::Issued(invoice) | Self::AlreadyIssued(invoice) => invoice,
        }
    }
}

/// Result of billing every tenant for one period.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BillingRunSummary {
    pub issued: Vec<InvoiceId>,
    pub skipped: Vec<InvoiceId>,
    pub failed: Vec<(u32, String)>,
}

impl BillingEngine {
    /// Issues the rent invoice for `tenant` and `period`.
    ///
    /// The invoice bills the property rent plus water accrued since the last
    /// invoice, and carries the ledger's outstanding balance as arrears. Any
    /// older open invoice is marked carried-forward so its balance is only
    /// collected once.
    pub async fn generate_invoice(
        &self,
        tenant: u32,
        period: BillingPeriod,
        issued_on: NaiveDate,
    ) -> Result<InvoiceOutcome> {
        let _guard = self.ledger_lock.lock().await;

        let id = InvoiceId::for_period(tenant, period);
        if let Some(existing) = self.stores.invoices.get(&id).await? {
            tracing::debug!(invoice = %id, "Invoice already issued");
            return Ok(InvoiceOutcome::AlreadyIssued(existing));
        }

        let mut ledger = self
            .stores
            .tenants
            .get(tenant)
            .await?
            .ok_or_else(|| BillingError::not_found(format!("tenant {tenant}")))?;

        if let Some(last) = ledger.last_billed_period
            && period < last
        {
            return Err(BillingError::validation(format!(
                "Tenant {tenant} was already billed for {last}; cannot bill earlier period {period}"
            )));
        }

        let property = self
            .stores
            .properties
            .get(ledger.property)
            .await?
            .ok_or_else(|| BillingError::not_found(format!("property {}", ledger.property)))?;

        let arrears = ledger.outstanding();
        let water = ledger.take_water_bill();
        let due_on = issued_on
            .checked_add_days(Days::new(u64::from(self.settings.due_days)))
            .unwrap_or(issued_on);
        let invoice = RentInvoice::new(
            tenant,
            period,
            property.rent_price.into(),
            water,
            arrears,
            issued_on,
            due_on,
        )?;
        ledger.bill(invoice.charges()?, arrears, invoice.total_amount, period)?;
        ledger.refresh_status(invoice.amount_paid);

        for mut open in self
            .stores
            .invoices
            .for_tenant(tenant)
            .await?
            .into_iter()
            .filter(RentInvoice::is_open)
        {
            open.carry_forward();
            tracing::debug!(invoice = %open.id, into = %invoice.id, "Carrying invoice balance forward");
            self.stores.invoices.store(open).await?;
        }

        self.stores.invoices.store(invoice.clone()).await?;
        self.stores.tenants.store(ledger.clone()).await?;

        tracing::info!(
            invoice = %invoice.id,
            tenant,
            rent = %invoice.rent,
            water = %invoice.water,
            arrears = %invoice.arrears_brought_forward,
            total = %invoice.total_amount,
            "Issued rent invoice"
        );

        let currency = &self.settings.currency;
        let message = if invoice.total_amount.is_positive() {
            format!(
                "Hello {},\nThis is a reminder that your rent of {currency} {} for {period} is due on {}.\nPlease make your payment on time to avoid any late fees.\nThank you!",
                ledger.name, invoice.total_amount, invoice.due_on
            )
        } else {
            format!(
                "Hello {},\nYour rent for {period} is {currency} {}: it is fully covered by your account credit. Remaining credit: {currency} {}.",
                ledger.name,
                invoice.total_amount,
                (-ledger.outstanding()).non_negative()
            )
        };
        self.notify(tenant, NotificationKind::Reminder, "Monthly Rent Reminder", message)
            .await?;

        Ok(InvoiceOutcome::Issued(invoice))
    }

    /// Bills every tenant for `period`. A failure for one tenant is logged and
    /// does not stop the run.
    pub async fn generate_monthly_invoices(
        &self,
        period: BillingPeriod,
        issued_on: NaiveDate,
    ) -> Result<BillingRunSummary> {
        let mut summary = BillingRunSummary::default();
        tracing::info!(%period, "Generating monthly invoices");

        for ledger in self.stores.tenants.get_all().await? {
            match self.generate_invoice(ledger.tenant, period, issued_on).await {
                Ok(InvoiceOutcome::Issued(invoice)) => summary.issued.push(invoice.id),
                Ok(InvoiceOutcome::AlreadyIssued(invoice)) => summary.skipped.push(invoice.id),
                Err(e) => {
                    tracing::error!(tenant = ledger.tenant, error = %e, "Failed to bill tenant");
                    summary.failed.push((ledger.tenant, e.to_string()));
                }
            }
        }

        tracing::info!(
            %period,
            issued = summary.issued.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "Monthly invoicing finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::engine::tests::engine_with_tenant;
    use crate::domain::invoice::InvoiceStatus;
    use crate::domain::ledger::RentStatus;
    use crate::domain::meter::ReadingSubmission;
    use crate::domain::money::{Amount, Money};
    use crate::domain::notification::NotificationKind;
    use crate::domain::phone::PhoneNumber;
    use rust_decimal_macros::dec;

    fn period(s: &str) -> BillingPeriod {
        s.parse().unwrap()
    }

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_invoice_bills_rent_and_water() {
        let engine = engine_with_tenant().await;
        for (reading, d) in [(dec!(100), 1), (dec!(104), 30)] {
            engine
                .record_meter_reading(ReadingSubmission {
                    tenant: 1,
                    reading,
                    read_on: day(9, d),
                })
                .await
                .unwrap();
        }

        let invoice = engine
            .generate_invoice(1, period("2024-10"), day(10, 1))
            .await
            .unwrap()
            .into_invoice();

        assert_eq!(invoice.id.as_str(), "INV-1-202410");
        assert_eq!(invoice.rent, Money::new(dec!(12000)));
        assert_eq!(invoice.water, Money::new(dec!(600)));
        assert_eq!(invoice.total_amount, Money::new(dec!(12600)));
        assert_eq!(invoice.due_on, day(10, 6));

        let ledger = engine.ledger(1).await.unwrap();
        assert_eq!(ledger.water_bill, Money::ZERO);
        assert_eq!(ledger.total_billed, Money::new(dec!(12600)));
        assert_eq!(ledger.total_monthly_bill, Money::new(dec!(12600)));
        assert_eq!(ledger.rent_status, RentStatus::Unpaid);

        let notes = engine.notifications(1).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::Reminder);
        assert!(notes[0].message.contains("KES 12600.00"));
    }

    #[tokio::test]
    async fn test_invoicing_is_idempotent_per_period() {
        let engine = engine_with_tenant().await;
        let first = engine
            .generate_invoice(1, period("2024-10"), day(10, 1))
            .await
            .unwrap();
        let second = engine
            .generate_invoice(1, period("2024-10"), day(10, 2))
            .await
            .unwrap();

        assert!(matches!(first, InvoiceOutcome::Issued(_)));
        assert!(matches!(second, InvoiceOutcome::AlreadyIssued(_)));
        assert_eq!(first.invoice(), second.invoice());
        assert_eq!(
            engine.ledger(1).await.unwrap().total_billed,
            Money::new(dec!(12000))
        );
        assert_eq!(engine.notifications(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unpaid_balance_carries_forward() {
        let engine = engine_with_tenant().await;
        engine
            .generate_invoice(1, period("2024-10"), day(10, 1))
            .await
            .unwrap();
        let november = engine
            .generate_invoice(1, period("2024-11"), day(11, 1))
            .await
            .unwrap()
            .into_invoice();

        assert_eq!(november.arrears_brought_forward, Money::new(dec!(12000)));
        assert_eq!(november.total_amount, Money::new(dec!(24000)));

        let invoices = engine.invoices(1).await.unwrap();
        assert_eq!(invoices[0].status, InvoiceStatus::CarriedForward);
        assert_eq!(invoices[1].status, InvoiceStatus::Unpaid);
        assert_eq!(invoices.iter().filter(|i| i.is_open()).count(), 1);

        let ledger = engine.ledger(1).await.unwrap();
        assert_eq!(ledger.arrears, Money::new(dec!(12000)));
        assert_eq!(ledger.total_billed, Money::new(dec!(24000)));
        assert_eq!(ledger.outstanding(), november.total_amount);
    }

    #[tokio::test]
    async fn test_credit_covers_invoice() {
        let engine = engine_with_tenant().await;
        let mut ledger = engine.ledger(1).await.unwrap();
        ledger.credit(Amount::new(dec!(20000)).unwrap()).unwrap();
        engine.stores.tenants.store(ledger).await.unwrap();

        let invoice = engine
            .generate_invoice(1, period("2024-10"), day(10, 1))
            .await
            .unwrap()
            .into_invoice();

        assert_eq!(invoice.arrears_brought_forward, Money::new(dec!(-20000)));
        assert_eq!(invoice.total_amount, Money::ZERO);
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(engine.ledger(1).await.unwrap().rent_status, RentStatus::Paid);
        let notes = engine.notifications(1).await.unwrap();
        assert_eq!(notes[0].kind, NotificationKind::Reminder);
        assert_eq!(notes[0].title, "Monthly Rent Reminder");
        assert!(notes[0].message.contains("Remaining credit: KES 8000.00"));
    }

    #[tokio::test]
    async fn test_overflowing_invoice_fails_without_side_effects() {
        let engine = engine_with_tenant().await;
        engine
            .register_property(crate::domain::ledger::Property {
                id: 20,
                title: "Penthouse".into(),
                landlord: "landlord@example.com".into(),
                rent_price: Amount::new(rust_decimal::Decimal::MAX).unwrap(),
            })
            .await
            .unwrap();
        engine
            .register_tenant(2, "Kamau", PhoneNumber::parse("0722000000").unwrap(), 20)
            .await
            .unwrap();
        engine
            .generate_invoice(2, period("2024-10"), day(10, 1))
            .await
            .unwrap();
        let before = engine.ledger(2).await.unwrap();

        let summary = engine
            .generate_monthly_invoices(period("2024-11"), day(11, 1))
            .await
            .unwrap();
        assert_eq!(summary.issued, vec![InvoiceId::from("INV-1-202411")]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, 2);

        assert_eq!(engine.ledger(2).await.unwrap(), before);
        let invoices = engine.invoices(2).await.unwrap();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].status, InvoiceStatus::Unpaid);
    }

    #[tokio::test]
    async fn test_cannot_bill_earlier_period() {
        let engine = engine_with_tenant().await;
        engine
            .generate_invoice(1, period("2024-11"), day(11, 1))
            .await
            .unwrap();
        let err = engine
            .generate_invoice(1, period("2024-10"), day(11, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
    }

    #[tokio::test]
    async fn test_monthly_run_continues_past_failures() {
        let engine = engine_with_tenant().await;
        engine
            .register_tenant(2, "Kamau", PhoneNumber::parse("0722000000").unwrap(), 10)
            .await
            .unwrap();
        // Tenant 3 points at a property that no longer exists.
        let orphan = crate::domain::ledger::TenantLedger::new(
            3,
            "Chebet",
            PhoneNumber::parse("0733000000").unwrap(),
            404,
        );
        engine.stores.tenants.store(orphan).await.unwrap();

        engine
            .generate_invoice(2, period("2024-10"), day(10, 1))
            .await
            .unwrap();
        let summary = engine
            .generate_monthly_invoices(period("2024-10"), day(10, 1))
            .await
            .unwrap();

        assert_eq!(summary.issued, vec![InvoiceId::from("INV-1-202410")]);
        assert_eq!(summary.skipped, vec![InvoiceId::from("INV-2-202410")]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, 3);
    }
}
