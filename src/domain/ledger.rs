use super::invoice::BillingPeriod;
use super::money::{Amount, Money};
use super::phone::PhoneNumber;
use crate::error::BillingError;
use serde::{Deserialize, Serialize};

/// A rentable unit. Only the fields billing needs are kept.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Property {
    pub id: u32,
    pub title: String,
    pub landlord: String,
    pub rent_price: Amount,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum RentStatus {
    Paid,
    Partial,
    #[default]
    Unpaid,
}

/// The running account of a tenant: everything billed, everything paid, and
/// what is still owed.
///
/// `total_billed - total_paid` is the outstanding balance. A negative
/// outstanding balance is credit that the next invoice absorbs.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TenantLedger {
    pub tenant: u32,
    pub name: String,
    pub phone: PhoneNumber,
    pub property: u32,
    /// Water charges accrued since the last invoice.
    pub water_bill: Money,
    /// Balance carried into the latest invoice.
    pub arrears: Money,
    /// Total of the latest invoice.
    pub total_monthly_bill: Money,
    pub total_billed: Money,
    pub total_paid: Money,
    pub rent_status: RentStatus,
    pub last_billed_period: Option<BillingPeriod>,
}

impl TenantLedger {
    pub fn new(tenant: u32, name: impl Into<String>, phone: PhoneNumber, property: u32) -> Self {
        Self {
            tenant,
            name: name.into(),
            phone,
            property,
            water_bill: Money::ZERO,
            arrears: Money::ZERO,
            total_monthly_bill: Money::ZERO,
            total_billed: Money::ZERO,
            total_paid: Money::ZERO,
            rent_status: RentStatus::Paid,
            last_billed_period: None,
        }
    }

    pub fn outstanding(&self) -> Money {
        self.total_billed - self.total_paid
    }

    /// Adds a metered water charge to the next invoice.
    pub fn accrue_water(&mut self, charge: Money) -> Result<(), BillingError> {
        self.water_bill = self.water_bill.checked_add(charge)?;
        Ok(())
    }

    /// Moves accrued water charges out of the ledger, leaving zero behind.
    pub fn take_water_bill(&mut self) -> Money {
        std::mem::take(&mut self.water_bill)
    }

    /// Records a newly issued invoice.
    pub fn bill(
        &mut self,
        charges: Money,
        arrears: Money,
        total: Money,
        period: BillingPeriod,
    ) -> Result<(), BillingError> {
        self.total_billed = self.total_billed.checked_add(charges)?;
        self.arrears = arrears;
        self.total_monthly_bill = total;
        self.last_billed_period = Some(period);
        Ok(())
    }

    /// Credits a confirmed payment.
    pub fn credit(&mut self, amount: Amount) -> Result<(), BillingError> {
        self.total_paid = self.total_paid.checked_add(amount.into())?;
        Ok(())
    }

    /// Derives the rent status from the outstanding balance and whether the
    /// current invoice has received anything yet.
    pub fn refresh_status(&mut self, current_invoice_paid: Money) {
        self.rent_status = if !self.outstanding().is_positive() {
            RentStatus::Paid
        } else if current_invoice_paid.is_positive() {
            RentStatus::Partial
        } else {
            RentStatus::Unpaid
        };
    }
}
