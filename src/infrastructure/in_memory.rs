use crate::domain::invoice::{InvoiceId, RentInvoice};
use crate::domain::ledger::{Property, TenantLedger};
use crate::domain::meter::MeterReading;
use crate::domain::notification::Notification;
use crate::domain::payment::PaymentTransaction;
use crate::domain::ports::{
    InvoiceStore, MeterReadingStore, NotificationStore, PaymentStore, PropertyStore, TenantStore,
};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default, Clone)]
pub struct InMemoryPropertyStore {
    properties: Arc<RwLock<HashMap<u32, Property>>>,
}

impl InMemoryPropertyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PropertyStore for InMemoryPropertyStore {
    async fn store(&self, property: Property) -> Result<()> {
        self.properties.write().await.insert(property.id, property);
        Ok(())
    }

    async fn get(&self, id: u32) -> Result<Option<Property>> {
        Ok(self.properties.read().await.get(&id).cloned())
    }
}

/// A thread-safe in-memory store for tenant ledgers.
///
/// Backed by a `BTreeMap` so `get_all` returns ledgers ordered by tenant id.
#[derive(Default, Clone)]
pub struct InMemoryTenantStore {
    ledgers: Arc<RwLock<BTreeMap<u32, TenantLedger>>>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn store(&self, ledger: TenantLedger) -> Result<()> {
        self.ledgers.write().await.insert(ledger.tenant, ledger);
        Ok(())
    }

    async fn get(&self, tenant: u32) -> Result<Option<TenantLedger>> {
        Ok(self.ledgers.read().await.get(&tenant).cloned())
    }

    async fn get_all(&self) -> Result<Vec<TenantLedger>> {
        Ok(self.ledgers.read().await.values().cloned().collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryMeterReadingStore {
    readings: Arc<RwLock<HashMap<u32, Vec<MeterReading>>>>,
}

impl InMemoryMeterReadingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MeterReadingStore for InMemoryMeterReadingStore {
    async fn store(&self, reading: MeterReading) -> Result<()> {
        self.readings
            .write()
            .await
            .entry(reading.tenant)
            .or_default()
            .push(reading);
        Ok(())
    }

    async fn latest(&self, tenant: u32) -> Result<Option<MeterReading>> {
        let readings = self.readings.read().await;
        Ok(readings.get(&tenant).and_then(|r| r.last()).cloned())
    }

    async fn for_tenant(&self, tenant: u32) -> Result<Vec<MeterReading>> {
        let readings = self.readings.read().await;
        Ok(readings.get(&tenant).cloned().unwrap_or_default())
    }
}

/// In-memory invoice store. Invoice ids sort by period within a tenant, so a
/// `BTreeMap` keyed by `(tenant, id)` gives `for_tenant` its ordering for free.
#[derive(Default, Clone)]
pub struct InMemoryInvoiceStore {
    invoices: Arc<RwLock<BTreeMap<(u32, InvoiceId), RentInvoice>>>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvoiceStore for InMemoryInvoiceStore {
    async fn store(&self, invoice: RentInvoice) -> Result<()> {
        self.invoices
            .write()
            .await
            .insert((invoice.tenant, invoice.id.clone()), invoice);
        Ok(())
    }

    async fn get(&self, id: &InvoiceId) -> Result<Option<RentInvoice>> {
        let invoices = self.invoices.read().await;
        Ok(invoices.values().find(|inv| &inv.id == id).cloned())
    }

    async fn for_tenant(&self, tenant: u32) -> Result<Vec<RentInvoice>> {
        let invoices = self.invoices.read().await;
        let mut found: Vec<RentInvoice> = invoices
            .range((tenant, InvoiceId::from(""))..)
            .take_while(|((t, _), _)| *t == tenant)
            .map(|(_, inv)| inv.clone())
            .collect();
        found.sort_by_key(|inv| inv.period);
        Ok(found)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    transactions: Arc<RwLock<HashMap<Uuid, PaymentTransaction>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn store(&self, tx: PaymentTransaction) -> Result<()> {
        self.transactions.write().await.insert(tx.id, tx);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PaymentTransaction>> {
        Ok(self.transactions.read().await.get(&id).cloned())
    }

    async fn find_by_checkout(&self, checkout_request_id: &str) -> Result<Option<PaymentTransaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .find(|tx| tx.checkout_request_id.as_deref() == Some(checkout_request_id))
            .cloned())
    }

    async fn pending(&self) -> Result<Vec<PaymentTransaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .filter(|tx| tx.is_pending())
            .cloned()
            .collect())
    }

    async fn for_tenant(&self, tenant: u32) -> Result<Vec<PaymentTransaction>> {
        let transactions = self.transactions.read().await;
        let mut found: Vec<PaymentTransaction> = transactions
            .values()
            .filter(|tx| tx.tenant == tenant)
            .cloned()
            .collect();
        found.sort_by_key(|tx| tx.created_at);
        Ok(found)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryNotificationStore {
    notifications: Arc<RwLock<HashMap<u32, Vec<Notification>>>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn store(&self, notification: Notification) -> Result<()> {
        self.notifications
            .write()
            .await
            .entry(notification.recipient)
            .or_default()
            .push(notification);
        Ok(())
    }

    async fn for_recipient(&self, recipient: u32) -> Result<Vec<Notification>> {
        let notifications = self.notifications.read().await;
        Ok(notifications.get(&recipient).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::invoice::BillingPeriod;
    use crate::domain::money::{Amount, Money};
    use crate::domain::phone::PhoneNumber;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn invoice(tenant: u32, period: &str) -> RentInvoice {
        let issued = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
        RentInvoice::new(
            tenant,
            period.parse::<BillingPeriod>().unwrap(),
            Money::new(dec!(1000)),
            Money::ZERO,
            Money::ZERO,
            issued,
            issued,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_tenant_store() {
        let store = InMemoryTenantStore::new();
        let phone = PhoneNumber::parse("0712345678").unwrap();
        store
            .store(TenantLedger::new(2, "B", phone.clone(), 1))
            .await
            .unwrap();
        store
            .store(TenantLedger::new(1, "A", phone, 1))
            .await
            .unwrap();

        assert_eq!(store.get(1).await.unwrap().unwrap().name, "A");
        assert!(store.get(3).await.unwrap().is_none());

        let all = store.get_all().await.unwrap();
        assert_eq!(all.iter().map(|l| l.tenant).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_invoices_are_scoped_and_ordered_per_tenant() {
        let store = InMemoryInvoiceStore::new();
        store.store(invoice(1, "2024-11")).await.unwrap();
        store.store(invoice(1, "2024-10")).await.unwrap();
        store.store(invoice(12, "2024-10")).await.unwrap();
        store.store(invoice(2, "2024-10")).await.unwrap();

        let ones = store.for_tenant(1).await.unwrap();
        let periods: Vec<String> = ones.iter().map(|i| i.period.to_string()).collect();
        assert_eq!(periods, vec!["2024-10", "2024-11"]);

        let id = InvoiceId::from("INV-12-202410");
        assert_eq!(store.get(&id).await.unwrap().unwrap().tenant, 12);
        assert!(store.for_tenant(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_payment_lookup_by_checkout() {
        let store = InMemoryPaymentStore::new();
        let mut tx = PaymentTransaction::pending(
            InvoiceId::from("INV-1-202410"),
            1,
            PhoneNumber::parse("0712345678").unwrap(),
            Amount::new(dec!(10)).unwrap(),
            Utc::now(),
        );
        tx.checkout_request_id = Some("ws_CO_1".into());
        store.store(tx.clone()).await.unwrap();

        assert_eq!(store.find_by_checkout("ws_CO_1").await.unwrap(), Some(tx.clone()));
        assert!(store.find_by_checkout("ws_CO_2").await.unwrap().is_none());
        assert_eq!(store.pending().await.unwrap().len(), 1);
        assert_eq!(store.get(tx.id).await.unwrap(), Some(tx));
    }
}
