//! CSV import and export for batch runs of the CLI.

pub mod directory_reader;
pub mod ledger_writer;
pub mod meter_reading_reader;
