use super::engine::BillingEngine;
use crate::domain::meter::{MeterReading, ReadingSubmission};
use crate::error::{BillingError, Result};
use rust_decimal::Decimal;

/// Counts from a bulk reading import.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub recorded: usize,
    pub rejected: usize,
}

impl BillingEngine {
    /// Records a cumulative meter reading and accrues its water charge on the
    /// tenant's ledger.
    ///
    /// The first reading for a tenant only sets the baseline. A reading lower
    /// than, or dated before, the previous one is rejected.
    pub async fn record_meter_reading(&self, submission: ReadingSubmission) -> Result<MeterReading> {
        if submission.reading < Decimal::ZERO {
            return Err(BillingError::validation(format!(
                "Meter reading must not be negative, got {}",
                submission.reading
            )));
        }

        let _guard = self.ledger_lock.lock().await;
        let tenant = submission.tenant;
        let mut ledger = self
            .stores
            .tenants
            .get(tenant)
            .await?
            .ok_or_else(|| BillingError::not_found(format!("tenant {tenant}")))?;

        let reading = match self.stores.readings.latest(tenant).await? {
            None => MeterReading::baseline(submission),
            Some(previous) => {
                if submission.reading < previous.reading {
                    return Err(BillingError::validation(format!(
                        "Meter reading {} for tenant {tenant} is lower than previous reading {}",
                        submission.reading, previous.reading
                    )));
                }
                if submission.read_on < previous.read_on {
                    return Err(BillingError::validation(format!(
                        "Meter reading dated {} for tenant {tenant} predates previous reading on {}",
                        submission.read_on, previous.read_on
                    )));
                }
                MeterReading::following(&previous, submission, self.settings.water_rate_per_unit)?
            }
        };

        if reading.charge.is_positive() {
            ledger.accrue_water(reading.charge)?;
            self.stores.tenants.store(ledger).await?;
        }
        self.stores.readings.store(reading.clone()).await?;

        tracing::info!(
            tenant,
            reading = %reading.reading,
            consumption = %reading.consumption,
            charge = %reading.charge,
            "Recorded meter reading"
        );
        Ok(reading)
    }

    /// Records readings one by one. Unreadable or rejected rows are logged
    /// and skipped.
    pub async fn ingest_readings<I>(&self, submissions: I) -> IngestSummary
    where
        I: IntoIterator<Item = Result<ReadingSubmission>>,
    {
        let mut summary = IngestSummary::default();
        for submission in submissions {
            let outcome = match submission {
                Ok(submission) => self.record_meter_reading(submission).await.map(|_| ()),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => summary.recorded += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping meter reading");
                    summary.rejected += 1;
                }
            }
        }
        summary
    }
}
