use super::money::Money;
use crate::error::BillingError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A cumulative water-meter reading as submitted, before it is priced.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ReadingSubmission {
    pub tenant: u32,
    pub reading: Decimal,
    pub read_on: NaiveDate,
}

/// A recorded reading together with the consumption and charge it produced.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct MeterReading {
    pub tenant: u32,
    pub reading: Decimal,
    pub read_on: NaiveDate,
    pub consumption: Decimal,
    pub charge: Money,
}

impl MeterReading {
    /// The first reading for a tenant. It only sets the baseline.
    pub fn baseline(submission: ReadingSubmission) -> Self {
        Self {
            tenant: submission.tenant,
            reading: submission.reading,
            read_on: submission.read_on,
            consumption: Decimal::ZERO,
            charge: Money::ZERO,
        }
    }

    /// A reading that follows `previous`, priced at `rate_per_unit`.
    /// The caller has already checked that the meter did not go backwards.
    pub fn following(
        previous: &MeterReading,
        submission: ReadingSubmission,
        rate_per_unit: Decimal,
    ) -> Result<Self, BillingError> {
        let out_of_range = || {
            BillingError::validation(format!(
                "Meter reading {} for tenant {} is out of range",
                submission.reading, submission.tenant
            ))
        };
        let consumption = submission
            .reading
            .checked_sub(previous.reading)
            .ok_or_else(out_of_range)?;
        let charge = consumption
            .checked_mul(rate_per_unit)
            .ok_or_else(out_of_range)?;
        Ok(Self {
            tenant: submission.tenant,
            reading: submission.reading,
            read_on: submission.read_on,
            consumption,
            charge: Money::new(charge).round_cents(),
        })
    }
}
