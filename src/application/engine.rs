use crate::config::Config;
use crate::domain::invoice::RentInvoice;
use crate::domain::ledger::{Property, TenantLedger};
use crate::domain::meter::MeterReading;
use crate::domain::notification::{Notification, NotificationKind};
use crate::domain::payment::PaymentTransaction;
use crate::domain::phone::PhoneNumber;
use crate::domain::ports::{
    GatewayBox, InvoiceStoreBox, MeterReadingStoreBox, NotificationStoreBox, PaymentStoreBox,
    PropertyStoreBox, TenantStoreBox,
};
use crate::error::{BillingError, Result};
use crate::infrastructure::in_memory::{
    InMemoryInvoiceStore, InMemoryMeterReadingStore, InMemoryNotificationStore,
    InMemoryPaymentStore, InMemoryPropertyStore, InMemoryTenantStore,
};
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

/// The storage backends the engine works against, one per port.
pub struct Stores {
    pub properties: PropertyStoreBox,
    pub tenants: TenantStoreBox,
    pub readings: MeterReadingStoreBox,
    pub invoices: InvoiceStoreBox,
    pub payments: PaymentStoreBox,
    pub notifications: NotificationStoreBox,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            properties: Box::new(InMemoryPropertyStore::new()),
            tenants: Box::new(InMemoryTenantStore::new()),
            readings: Box::new(InMemoryMeterReadingStore::new()),
            invoices: Box::new(InMemoryInvoiceStore::new()),
            payments: Box::new(InMemoryPaymentStore::new()),
            notifications: Box::new(InMemoryNotificationStore::new()),
        }
    }

    /// Every port backed by the same RocksDB instance.
    #[cfg(feature = "storage-rocksdb")]
    pub fn rocksdb(store: crate::infrastructure::rocksdb::RocksDBStore) -> Self {
        Self {
            properties: Box::new(store.clone()),
            tenants: Box::new(store.clone()),
            readings: Box::new(store.clone()),
            invoices: Box::new(store.clone()),
            payments: Box::new(store.clone()),
            notifications: Box::new(store),
        }
    }
}

/// The parts of [`Config`] the engine reads.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub currency: String,
    pub due_days: u32,
    pub water_rate_per_unit: Decimal,
    pub callback_url: String,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            currency: config.billing.currency.clone(),
            due_days: config.billing.due_days,
            water_rate_per_unit: config.water.rate_per_unit,
            callback_url: config.mpesa.callback_url.clone(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Entry point for the billing workflow: meter readings, invoices, payment
/// initiation and callback reconciliation.
///
/// Every operation that mutates a tenant ledger runs under `ledger_lock`, so
/// concurrent callbacks and billing runs cannot interleave their
/// read-modify-write cycles. The gateway call in payment initiation happens
/// outside the lock.
pub struct BillingEngine {
    pub(super) stores: Stores,
    pub(super) settings: EngineSettings,
    pub(super) gateway: Option<GatewayBox>,
    pub(super) ledger_lock: Mutex<()>,
}

impl BillingEngine {
    pub fn new(stores: Stores, settings: EngineSettings) -> Self {
        Self {
            stores,
            settings,
            gateway: None,
            ledger_lock: Mutex::new(()),
        }
    }

    pub fn with_gateway(mut self, gateway: GatewayBox) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn has_gateway(&self) -> bool {
        self.gateway.is_some()
    }

    pub async fn register_property(&self, property: Property) -> Result<Property> {
        if property.title.trim().is_empty() {
            return Err(BillingError::validation("Property title must not be empty"));
        }
        self.stores.properties.store(property.clone()).await?;
        tracing::info!(property = property.id, rent = %property.rent_price, "Registered property");
        Ok(property)
    }

    /// Opens a ledger for a tenant moving into `property`. A tenant that
    /// already has a ledger keeps its balances and is moved to the new unit.
    pub async fn register_tenant(
        &self,
        tenant: u32,
        name: &str,
        phone: PhoneNumber,
        property: u32,
    ) -> Result<TenantLedger> {
        if self.stores.properties.get(property).await?.is_none() {
            return Err(BillingError::not_found(format!("property {property}")));
        }

        let _guard = self.ledger_lock.lock().await;
        let ledger = match self.stores.tenants.get(tenant).await? {
            Some(mut existing) => {
                existing.name = name.to_string();
                existing.phone = phone;
                existing.property = property;
                existing
            }
            None => TenantLedger::new(tenant, name, phone, property),
        };
        self.stores.tenants.store(ledger.clone()).await?;
        tracing::info!(tenant, property, "Registered tenant");
        Ok(ledger)
    }

    pub async fn ledger(&self, tenant: u32) -> Result<TenantLedger> {
        self.stores
            .tenants
            .get(tenant)
            .await?
            .ok_or_else(|| BillingError::not_found(format!("tenant {tenant}")))
    }

    pub async fn ledgers(&self) -> Result<Vec<TenantLedger>> {
        self.stores.tenants.get_all().await
    }

    pub async fn invoices(&self, tenant: u32) -> Result<Vec<RentInvoice>> {
        self.ledger(tenant).await?;
        self.stores.invoices.for_tenant(tenant).await
    }

    pub async fn meter_readings(&self, tenant: u32) -> Result<Vec<MeterReading>> {
        self.ledger(tenant).await?;
        self.stores.readings.for_tenant(tenant).await
    }

    pub async fn payment(&self, id: Uuid) -> Result<PaymentTransaction> {
        self.stores
            .payments
            .get(id)
            .await?
            .ok_or_else(|| BillingError::not_found(format!("payment {id}")))
    }

    pub async fn payments(&self, tenant: u32) -> Result<Vec<PaymentTransaction>> {
        self.ledger(tenant).await?;
        self.stores.payments.for_tenant(tenant).await
    }

    pub async fn notifications(&self, tenant: u32) -> Result<Vec<Notification>> {
        self.ledger(tenant).await?;
        self.stores.notifications.for_recipient(tenant).await
    }

    pub(super) async fn notify(
        &self,
        recipient: u32,
        kind: NotificationKind,
        title: &str,
        message: String,
    ) -> Result<()> {
        let notification = Notification::new(recipient, kind, title, message, Utc::now());
        self.stores.notifications.store(notification).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::money::Amount;
    use rust_decimal_macros::dec;

    pub(crate) async fn engine_with_tenant() -> BillingEngine {
        let engine = BillingEngine::new(Stores::in_memory(), EngineSettings::default());
        engine
            .register_property(Property {
                id: 10,
                title: "Block A, House 4".into(),
                landlord: "landlord@example.com".into(),
                rent_price: Amount::new(dec!(12000)).unwrap(),
            })
            .await
            .unwrap();
        engine
            .register_tenant(1, "Wanjiku", PhoneNumber::parse("0712345678").unwrap(), 10)
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_register_tenant_requires_property() {
        let engine = BillingEngine::new(Stores::in_memory(), EngineSettings::default());
        let err = engine
            .register_tenant(1, "Otieno", PhoneNumber::parse("0712345678").unwrap(), 99)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_re_registering_tenant_keeps_balances() {
        let engine = engine_with_tenant().await;
        let mut ledger = engine.ledger(1).await.unwrap();
        ledger.total_billed = crate::domain::money::Money::new(dec!(500));
        engine.stores.tenants.store(ledger).await.unwrap();

        engine
            .register_property(Property {
                id: 11,
                title: "Block B, House 1".into(),
                landlord: "landlord@example.com".into(),
                rent_price: Amount::new(dec!(9000)).unwrap(),
            })
            .await
            .unwrap();
        let moved = engine
            .register_tenant(1, "Wanjiku", PhoneNumber::parse("0799000000").unwrap(), 11)
            .await
            .unwrap();

        assert_eq!(moved.property, 11);
        assert_eq!(moved.phone.as_str(), "254799000000");
        assert_eq!(moved.total_billed.value(), dec!(500));
    }

    #[tokio::test]
    async fn test_lookups_for_unknown_tenant() {
        let engine = engine_with_tenant().await;
        assert!(matches!(
            engine.invoices(42).await,
            Err(BillingError::NotFound(_))
        ));
        assert!(engine.invoices(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_property_title_rejected() {
        let engine = BillingEngine::new(Stores::in_memory(), EngineSettings::default());
        let err = engine
            .register_property(Property {
                id: 1,
                title: "  ".into(),
                landlord: "x".into(),
                rent_price: Amount::new(dec!(1)).unwrap(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
    }
}
