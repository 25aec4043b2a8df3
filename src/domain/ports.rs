use super::invoice::{InvoiceId, RentInvoice};
use super::ledger::{Property, TenantLedger};
use super::meter::MeterReading;
use super::notification::Notification;
use super::payment::{PaymentTransaction, PushAcceptance};
use super::phone::PhoneNumber;
use super::money::Amount;
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait PropertyStore: Send + Sync {
    async fn store(&self, property: Property) -> Result<()>;
    async fn get(&self, id: u32) -> Result<Option<Property>>;
}

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn store(&self, ledger: TenantLedger) -> Result<()>;
    async fn get(&self, tenant: u32) -> Result<Option<TenantLedger>>;
    async fn get_all(&self) -> Result<Vec<TenantLedger>>;
}

#[async_trait]
pub trait MeterReadingStore: Send + Sync {
    async fn store(&self, reading: MeterReading) -> Result<()>;
    /// Most recently recorded reading for the tenant.
    async fn latest(&self, tenant: u32) -> Result<Option<MeterReading>>;
    /// All readings for the tenant in recording order.
    async fn for_tenant(&self, tenant: u32) -> Result<Vec<MeterReading>>;
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn store(&self, invoice: RentInvoice) -> Result<()>;
    async fn get(&self, id: &InvoiceId) -> Result<Option<RentInvoice>>;
    /// All invoices for the tenant, oldest period first.
    async fn for_tenant(&self, tenant: u32) -> Result<Vec<RentInvoice>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn store(&self, tx: PaymentTransaction) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<PaymentTransaction>>;
    async fn find_by_checkout(&self, checkout_request_id: &str) -> Result<Option<PaymentTransaction>>;
    async fn pending(&self) -> Result<Vec<PaymentTransaction>>;
    async fn for_tenant(&self, tenant: u32) -> Result<Vec<PaymentTransaction>>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn store(&self, notification: Notification) -> Result<()>;
    /// Notifications for the recipient, oldest first.
    async fn for_recipient(&self, recipient: u32) -> Result<Vec<Notification>>;
}

/// What the payment service needs to send an STK push.
#[derive(Debug, Clone, PartialEq)]
pub struct PushRequest {
    pub phone: PhoneNumber,
    pub amount: Amount,
    pub account_reference: String,
    pub description: String,
    pub callback_url: String,
}

/// A mobile-money provider that can prompt a customer's handset for payment.
///
/// The outcome is not returned here; it arrives later as a
/// [`PaymentOutcome`](super::payment::PaymentOutcome) through the callback endpoint.
#[async_trait]
pub trait MobileMoneyGateway: Send + Sync {
    async fn stk_push(&self, request: PushRequest) -> Result<PushAcceptance>;
}

pub type PropertyStoreBox = Box<dyn PropertyStore>;
pub type TenantStoreBox = Box<dyn TenantStore>;
pub type MeterReadingStoreBox = Box<dyn MeterReadingStore>;
pub type InvoiceStoreBox = Box<dyn InvoiceStore>;
pub type PaymentStoreBox = Box<dyn PaymentStore>;
pub type NotificationStoreBox = Box<dyn NotificationStore>;
pub type GatewayBox = Box<dyn MobileMoneyGateway>;
