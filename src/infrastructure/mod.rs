//! Adapters for the domain ports: storage backends and the M-Pesa gateway.

pub mod in_memory;
pub mod mpesa;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
