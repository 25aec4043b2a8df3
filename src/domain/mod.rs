//! Billing domain: value objects, entities and the storage/gateway ports the
//! application layer depends on.

pub mod invoice;
pub mod ledger;
pub mod meter;
pub mod money;
pub mod notification;
pub mod payment;
pub mod phone;
pub mod ports;
