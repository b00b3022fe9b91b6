//! Storage ports. Every state change that two concurrent callers could race
//! on is expressed as a conditional update keyed by the expected current state.

use {
    super::audit::NewAuditEntry,
    super::error::EngineError,
    super::id::{CustomerId, GuestId, OrderId, OrderNo, PaymentId, RefundId, RestaurantId},
    super::order::{InsertOrder, NewOrder, Order, OrderRefundSummary, OrderStatus},
    super::payment::{
        GatewayKind, NewPayment, Payment, PaymentLookup, PaymentSettlement, PaymentStatus,
        SettleResult,
    },
    super::refund::{Refund, RefundStatus},
    super::wallet::{CreditReceipt, WalletCredit},
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
};

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Next `O<n>` for the restaurant. Atomic increment of the restaurant's
    /// counter, created on first use.
    async fn next_order_number(&self, restaurant_id: RestaurantId) -> Result<OrderNo, EngineError>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, EngineError>;

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>, EngineError>;

    async fn find_payment(&self, lookup: &PaymentLookup) -> Result<Option<Payment>, EngineError>;

    /// Most recent paid payment for the guest at this restaurant, created at
    /// or after `since` when given.
    async fn latest_paid_payment(
        &self,
        restaurant_id: RestaurantId,
        guest_id: &GuestId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<Payment>, EngineError>;

    /// Most recent paid payment through `gateway`, any age.
    async fn latest_gateway_payment(
        &self,
        restaurant_id: RestaurantId,
        guest_id: &GuestId,
        gateway: GatewayKind,
    ) -> Result<Option<Payment>, EngineError>;

    /// pending→paid, order insert with the next order number, and the
    /// `order_id` link, as one guarded region. Only one caller per payment
    /// can observe `Settled`.
    async fn settle_payment(
        &self,
        settlement: PaymentSettlement,
    ) -> Result<SettleResult, EngineError>;

    /// pending→failed. False if the payment was no longer pending.
    async fn fail_payment(
        &self,
        id: PaymentId,
        transaction_id: Option<&str>,
    ) -> Result<bool, EngineError>;

    /// paid→refunded. False if the payment was not paid.
    async fn mark_payment_refunded(&self, id: PaymentId) -> Result<bool, EngineError>;

    /// pending→failed for every payment created before `cutoff`.
    async fn expire_pending_payments(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PaymentId>, EngineError>;
}

#[async_trait]
pub trait OrderStore: CounterStore {
    /// Assigns the next order number. Idempotent on `request_id`.
    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrder, EngineError>;

    async fn order(&self, id: OrderId) -> Result<Option<Order>, EngineError>;

    async fn has_orders_for_guest(
        &self,
        restaurant_id: RestaurantId,
        guest_id: &GuestId,
    ) -> Result<bool, EngineError>;

    async fn orders_for_restaurant(
        &self,
        restaurant_id: RestaurantId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, EngineError>;

    async fn orders_for_guest(
        &self,
        restaurant_id: RestaurantId,
        guest_id: &GuestId,
    ) -> Result<Vec<Order>, EngineError>;

    /// Compare-and-set on status. `None` if the order is missing or its
    /// status is no longer `expected`.
    async fn update_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        cancellation_reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<Order>, EngineError>;

    async fn set_order_refund(
        &self,
        id: OrderId,
        refund: Option<&OrderRefundSummary>,
    ) -> Result<(), EngineError>;

    async fn set_order_payment_status(
        &self,
        id: OrderId,
        status: PaymentStatus,
    ) -> Result<(), EngineError>;

    async fn delete_orders(
        &self,
        restaurant_id: RestaurantId,
        ids: &[OrderId],
    ) -> Result<u64, EngineError>;
}

#[async_trait]
pub trait RefundStore: Send + Sync {
    /// Fails with `Conflict` when the order already has a refund that is
    /// not cancelled.
    async fn insert_refund(&self, refund: &Refund) -> Result<(), EngineError>;

    async fn refund(&self, id: RefundId) -> Result<Option<Refund>, EngineError>;

    async fn refunds_for_order(&self, order_id: OrderId) -> Result<Vec<Refund>, EngineError>;

    /// Writes the whole refund if its stored status is still `expected`.
    async fn update_refund(
        &self,
        refund: &Refund,
        expected: RefundStatus,
    ) -> Result<bool, EngineError>;

    /// Deletes only if the stored status is one of `allowed`.
    async fn delete_refund(
        &self,
        id: RefundId,
        allowed: &[RefundStatus],
    ) -> Result<bool, EngineError>;
}

#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Balance increment plus ledger entry. Idempotent per refund id.
    async fn credit_wallet(&self, credit: WalletCredit) -> Result<CreditReceipt, EngineError>;

    async fn wallet_balance(&self, customer_id: &CustomerId) -> Result<Decimal, EngineError>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn record_audit(&self, entry: NewAuditEntry) -> Result<(), EngineError>;
}

pub trait Store: PaymentStore + OrderStore + RefundStore + WalletStore + AuditStore {}

impl<T> Store for T where T: PaymentStore + OrderStore + RefundStore + WalletStore + AuditStore {}
