//! Application layer: the billing workflow on top of the domain ports.
//!
//! [`engine::BillingEngine`] is the single entry point. Its operations are
//! split by concern across the sibling modules, each adding an `impl` block.

pub mod engine;
pub mod invoicing;
pub mod metering;
pub mod payments;
