use crate::domain::meter::ReadingSubmission;
use crate::error::{BillingError, Result};
use std::io::Read;

/// Reads meter readings from a CSV source with a `tenant,reading,read_on`
/// header. Dates are `YYYY-MM-DD`.
///
/// Whitespace is trimmed and short rows are tolerated, so one bad row fails
/// on its own instead of aborting the file.
pub struct MeterReadingReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> MeterReadingReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes one submission per row.
    pub fn readings(self) -> impl Iterator<Item = Result<ReadingSubmission>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(BillingError::from))
    }
}
