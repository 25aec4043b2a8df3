//! Adapters between the outside world and the billing engine.

pub mod csv;
pub mod http;
