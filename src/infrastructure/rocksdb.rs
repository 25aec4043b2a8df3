use crate::domain::invoice::{InvoiceId, RentInvoice};
use crate::domain::ledger::{Property, TenantLedger};
use crate::domain::meter::MeterReading;
use crate::domain::notification::Notification;
use crate::domain::payment::PaymentTransaction;
use crate::domain::ports::{
    InvoiceStore, MeterReadingStore, NotificationStore, PaymentStore, PropertyStore, TenantStore,
};
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

pub const CF_PROPERTIES: &str = "properties";
pub const CF_TENANTS: &str = "tenants";
pub const CF_METER_READINGS: &str = "meter_readings";
pub const CF_INVOICES: &str = "invoices";
pub const CF_PAYMENTS: &str = "payments";
/// Secondary index: gateway `CheckoutRequestID` -> payment id.
pub const CF_CHECKOUT_INDEX: &str = "payment_checkouts";
pub const CF_NOTIFICATIONS: &str = "notifications";

const COLUMN_FAMILIES: [&str; 7] = [
    CF_PROPERTIES,
    CF_TENANTS,
    CF_METER_READINGS,
    CF_INVOICES,
    CF_PAYMENTS,
    CF_CHECKOUT_INDEX,
    CF_NOTIFICATIONS,
];

/// A persistent store implementation using RocksDB.
///
/// Every entity lives in its own column family as JSON. Keys are chosen so a
/// forward prefix scan returns a tenant's records in the order the ports
/// promise:
///
/// - meter readings: `tenant (u32 BE) ++ sequence (u32 BE)`
/// - invoices: the invoice id, `INV-<tenant>-<YYYYMM>`
/// - notifications: `tenant (u32 BE) ++ created_at micros (u64 BE) ++ uuid`
///
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at `path`, creating any missing
    /// column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            BillingError::Internal(Box::new(std::io::Error::other(format!(
                "Column family '{name}' not found"
            ))))
        })
    }

    fn put_json<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(self.cf(cf)?, key, bytes)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_pinned_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Decodes every value whose key starts with `prefix`, in key order.
    fn scan_prefix<T: DeserializeOwned>(&self, cf: &str, prefix: &[u8]) -> Result<Vec<T>> {
        let iter = self
            .db
            .iterator_cf(self.cf(cf)?, IteratorMode::From(prefix, Direction::Forward));

        let mut values = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn count_prefix(&self, cf: &str, prefix: &[u8]) -> Result<u32> {
        let iter = self
            .db
            .iterator_cf(self.cf(cf)?, IteratorMode::From(prefix, Direction::Forward));

        let mut count = 0u32;
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }
}

fn notification_key(notification: &Notification) -> Vec<u8> {
    let micros = notification.created_at.timestamp_micros().max(0) as u64;
    let mut key = Vec::with_capacity(4 + 8 + 16);
    key.extend_from_slice(&notification.recipient.to_be_bytes());
    key.extend_from_slice(&micros.to_be_bytes());
    key.extend_from_slice(notification.id.as_bytes());
    key
}

#[async_trait]
impl PropertyStore for RocksDBStore {
    async fn store(&self, property: Property) -> Result<()> {
        self.put_json(CF_PROPERTIES, &property.id.to_be_bytes(), &property)
    }

    async fn get(&self, id: u32) -> Result<Option<Property>> {
        self.get_json(CF_PROPERTIES, &id.to_be_bytes())
    }
}

#[async_trait]
impl TenantStore for RocksDBStore {
    async fn store(&self, ledger: TenantLedger) -> Result<()> {
        self.put_json(CF_TENANTS, &ledger.tenant.to_be_bytes(), &ledger)
    }

    async fn get(&self, tenant: u32) -> Result<Option<TenantLedger>> {
        self.get_json(CF_TENANTS, &tenant.to_be_bytes())
    }

    async fn get_all(&self) -> Result<Vec<TenantLedger>> {
        self.scan_prefix(CF_TENANTS, &[])
    }
}

#[async_trait]
impl MeterReadingStore for RocksDBStore {
    async fn store(&self, reading: MeterReading) -> Result<()> {
        let prefix = reading.tenant.to_be_bytes();
        let sequence = self.count_prefix(CF_METER_READINGS, &prefix)?;
        let mut key = prefix.to_vec();
        key.extend_from_slice(&sequence.to_be_bytes());
        self.put_json(CF_METER_READINGS, &key, &reading)
    }

    async fn latest(&self, tenant: u32) -> Result<Option<MeterReading>> {
        let readings: Vec<MeterReading> =
            self.scan_prefix(CF_METER_READINGS, &tenant.to_be_bytes())?;
        Ok(readings.into_iter().last())
    }

    async fn for_tenant(&self, tenant: u32) -> Result<Vec<MeterReading>> {
        self.scan_prefix(CF_METER_READINGS, &tenant.to_be_bytes())
    }
}

#[async_trait]
impl InvoiceStore for RocksDBStore {
    async fn store(&self, invoice: RentInvoice) -> Result<()> {
        self.put_json(CF_INVOICES, invoice.id.as_str().as_bytes(), &invoice)
    }

    async fn get(&self, id: &InvoiceId) -> Result<Option<RentInvoice>> {
        self.get_json(CF_INVOICES, id.as_str().as_bytes())
    }

    async fn for_tenant(&self, tenant: u32) -> Result<Vec<RentInvoice>> {
        let prefix = InvoiceId::tenant_prefix(tenant);
        self.scan_prefix(CF_INVOICES, prefix.as_bytes())
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn store(&self, tx: PaymentTransaction) -> Result<()> {
        if let Some(checkout) = &tx.checkout_request_id {
            self.db
                .put_cf(self.cf(CF_CHECKOUT_INDEX)?, checkout.as_bytes(), tx.id.as_bytes())?;
        }
        self.put_json(CF_PAYMENTS, tx.id.as_bytes(), &tx)
    }

    async fn get(&self, id: Uuid) -> Result<Option<PaymentTransaction>> {
        self.get_json(CF_PAYMENTS, id.as_bytes())
    }

    async fn find_by_checkout(&self, checkout_request_id: &str) -> Result<Option<PaymentTransaction>> {
        let Some(id_bytes) = self
            .db
            .get_pinned_cf(self.cf(CF_CHECKOUT_INDEX)?, checkout_request_id.as_bytes())?
        else {
            return Ok(None);
        };
        let id = Uuid::from_slice(&id_bytes).map_err(|e| BillingError::Internal(Box::new(e)))?;
        PaymentStore::get(self, id).await
    }

    async fn pending(&self) -> Result<Vec<PaymentTransaction>> {
        let all: Vec<PaymentTransaction> = self.scan_prefix(CF_PAYMENTS, &[])?;
        Ok(all.into_iter().filter(|tx| tx.is_pending()).collect())
    }

    async fn for_tenant(&self, tenant: u32) -> Result<Vec<PaymentTransaction>> {
        let all: Vec<PaymentTransaction> = self.scan_prefix(CF_PAYMENTS, &[])?;
        let mut found: Vec<PaymentTransaction> =
            all.into_iter().filter(|tx| tx.tenant == tenant).collect();
        found.sort_by_key(|tx| tx.created_at);
        Ok(found)
    }
}

#[async_trait]
impl NotificationStore for RocksDBStore {
    async fn store(&self, notification: Notification) -> Result<()> {
        self.put_json(CF_NOTIFICATIONS, &notification_key(&notification), &notification)
    }

    async fn for_recipient(&self, recipient: u32) -> Result<Vec<Notification>> {
        self.scan_prefix(CF_NOTIFICATIONS, &recipient.to_be_bytes())
    }
}
