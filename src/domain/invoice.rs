use super::money::Money;
use crate::error::BillingError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A calendar month that rent is billed for, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BillingPeriod {
    year: i32,
    month: u32,
}

impl BillingPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, BillingError> {
        if (1..=12).contains(&month) && (1970..=9999).contains(&year) {
            Ok(Self { year, month })
        } else {
            Err(BillingError::validation(format!(
                "Invalid billing period {year}-{month}"
            )))
        }
    }

    /// `YYYYMM`, used in invoice ids so they sort by period.
    pub fn compact(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for BillingPeriod {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BillingError::validation(format!("Billing period must be YYYY-MM, got '{s}'"));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse().map_err(|_| invalid())?;
        let month = month.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for BillingPeriod {
    type Error = BillingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BillingPeriod> for String {
    fn from(period: BillingPeriod) -> Self {
        period.to_string()
    }
}

/// Invoice identifier, `INV-<tenant>-<YYYYMM>`. One invoice per tenant and
/// period, so the id doubles as the idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(String);

impl InvoiceId {
    pub fn for_period(tenant: u32, period: BillingPeriod) -> Self {
        Self(format!("{}{}", Self::tenant_prefix(tenant), period.compact()))
    }

    /// Common prefix of every invoice id belonging to `tenant`.
    pub fn tenant_prefix(tenant: u32) -> String {
        format!("INV-{tenant}-")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InvoiceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
    /// Superseded by a newer invoice that carries this one's balance as arrears.
    CarriedForward,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct RentInvoice {
    pub id: InvoiceId,
    pub tenant: u32,
    pub period: BillingPeriod,
    pub rent: Money,
    pub water: Money,
    pub arrears_brought_forward: Money,
    pub total_amount: Money,
    pub amount_paid: Money,
    pub status: InvoiceStatus,
    pub issued_on: NaiveDate,
    pub due_on: NaiveDate,
}

impl RentInvoice {
    pub fn new(
        tenant: u32,
        period: BillingPeriod,
        rent: Money,
        water: Money,
        arrears_brought_forward: Money,
        issued_on: NaiveDate,
        due_on: NaiveDate,
    ) -> Result<Self, BillingError> {
        let total_amount = rent
            .checked_add(water)?
            .checked_add(arrears_brought_forward)?
            .non_negative();
        let status = if total_amount.is_positive() {
            InvoiceStatus::Unpaid
        } else {
            InvoiceStatus::Paid
        };
        Ok(Self {
            id: InvoiceId::for_period(tenant, period),
            tenant,
            period,
            rent,
            water,
            arrears_brought_forward,
            total_amount,
            amount_paid: Money::ZERO,
            status,
            issued_on,
            due_on,
        })
    }

    /// New charges this invoice adds to the ledger. Arrears are excluded since
    /// they were billed on an earlier invoice.
    pub fn charges(&self) -> Result<Money, BillingError> {
        self.rent.checked_add(self.water)
    }

    pub fn outstanding(&self) -> Money {
        (self.total_amount - self.amount_paid).non_negative()
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            InvoiceStatus::Unpaid | InvoiceStatus::PartiallyPaid
        )
    }

    /// Records a payment against the invoice. Overpayment is accepted; the
    /// surplus shows up as ledger credit.
    pub fn apply_payment(&mut self, amount: Money) -> Result<(), BillingError> {
        self.amount_paid = self.amount_paid.checked_add(amount)?;
        if self.status == InvoiceStatus::CarriedForward {
            return Ok(());
        }
        self.status = if self.amount_paid >= self.total_amount {
            InvoiceStatus::Paid
        } else if self.amount_paid.is_positive() {
            InvoiceStatus::PartiallyPaid
        } else {
            InvoiceStatus::Unpaid
        };
        Ok(())
    }

    pub fn carry_forward(&mut self) {
        if self.is_open() {
            self.status = InvoiceStatus::CarriedForward;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_period_parsing() {
        let period: BillingPeriod = "2024-03".parse().unwrap();
        assert_eq!(period, BillingPeriod::new(2024, 3).unwrap());
        assert_eq!(period.to_string(), "2024-03");
        assert_eq!(period.compact(), "202403");

        for bad in ["2024-13", "2024-3", "24-03", "2024/03", "abcd-ef", ""] {
            assert!(bad.parse::<BillingPeriod>().is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn test_periods_order_chronologically() {
        let a: BillingPeriod = "2023-12".parse().unwrap();
        let b: BillingPeriod = "2024-01".parse().unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_invoice_id_is_deterministic() {
        let period: BillingPeriod = "2024-10".parse().unwrap();
        let id = InvoiceId::for_period(7, period);
        assert_eq!(id.as_str(), "INV-7-202410");
        assert!(id.as_str().starts_with(&InvoiceId::tenant_prefix(7)));
        assert!(!id.as_str().starts_with(&InvoiceId::tenant_prefix(77)));
    }

    #[test]
    fn test_invoice_total_includes_arrears_and_clamps_credit() {
        let period: BillingPeriod = "2024-10".parse().unwrap();
        let invoice = RentInvoice::new(
            1,
            period,
            Money::new(dec!(10000)),
            Money::new(dec!(450)),
            Money::new(dec!(2000)),
            date(2024, 10, 1),
            date(2024, 10, 5),
        )
        .unwrap();
        assert_eq!(invoice.total_amount, Money::new(dec!(12450)));
        assert_eq!(invoice.charges().unwrap(), Money::new(dec!(10450)));
        assert_eq!(invoice.status, InvoiceStatus::Unpaid);

        let covered = RentInvoice::new(
            1,
            period,
            Money::new(dec!(10000)),
            Money::ZERO,
            Money::new(dec!(-12000)),
            date(2024, 10, 1),
            date(2024, 10, 5),
        )
        .unwrap();
        assert_eq!(covered.total_amount, Money::ZERO);
        assert_eq!(covered.status, InvoiceStatus::Paid);
        assert!(!covered.is_open());
    }

    #[test]
    fn test_payment_progression() {
        let period: BillingPeriod = "2024-10".parse().unwrap();
        let mut invoice = RentInvoice::new(
            1,
            period,
            Money::new(dec!(10000)),
            Money::ZERO,
            Money::ZERO,
            date(2024, 10, 1),
            date(2024, 10, 5),
        )
        .unwrap();
        invoice.apply_payment(Money::new(dec!(4000))).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::PartiallyPaid);
        assert_eq!(invoice.outstanding(), Money::new(dec!(6000)));

        invoice.apply_payment(Money::new(dec!(7000))).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.outstanding(), Money::ZERO);
    }

    #[test]
    fn test_carried_forward_stays_closed() {
        let period: BillingPeriod = "2024-10".parse().unwrap();
        let mut invoice = RentInvoice::new(
            1,
            period,
            Money::new(dec!(10000)),
            Money::ZERO,
            Money::ZERO,
            date(2024, 10, 1),
            date(2024, 10, 5),
        )
        .unwrap();
        invoice.carry_forward();
        assert_eq!(invoice.status, InvoiceStatus::CarriedForward);

        invoice.apply_payment(Money::new(dec!(10000))).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::CarriedForward);
        assert_eq!(invoice.amount_paid, Money::new(dec!(10000)));
    }

    #[test]
    fn test_total_overflow_is_an_error() {
        let period: BillingPeriod = "2024-10".parse().unwrap();
        let result = RentInvoice::new(
            1,
            period,
            Money::new(rust_decimal::Decimal::MAX),
            Money::ZERO,
            Money::new(dec!(1)),
            date(2024, 10, 1),
            date(2024, 10, 5),
        );
        assert!(matches!(result, Err(BillingError::Validation(_))));
    }
}
