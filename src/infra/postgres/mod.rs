//! Postgres-backed [`Store`](crate::domain::store::Store) and [`Catalog`].
//!
//! Each repo module is a set of free functions over a pool or connection;
//! [`PgStore`] only delegates. Multi-row state changes (settle, accept,
//! wallet credit) run in a single transaction with a short lock timeout.

pub mod audit_repo;
pub mod catalog_repo;
pub mod counter_repo;
pub mod order_repo;
pub mod payment_repo;
pub mod refund_repo;
pub mod wallet_repo;

use {
    crate::domain::{
        audit::NewAuditEntry,
        catalog::{Catalog, CommonAddOn, Product, Restaurant, Table},
        error::EngineError,
        id::{
            CustomerId, GuestId, OrderId, OrderNo, PaymentId, ProductId, RefundId, RestaurantId,
            TableId,
        },
        money::Currency,
        order::{InsertOrder, NewOrder, Order, OrderRefundSummary, OrderStatus},
        payment::{
            GatewayKind, NewPayment, Payment, PaymentLookup, PaymentSettlement, PaymentStatus,
            SettleResult,
        },
        refund::{Refund, RefundStatus},
        store::{AuditStore, CounterStore, OrderStore, PaymentStore, RefundStore, WalletStore},
        wallet::{CreditReceipt, WalletCredit},
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    sqlx::PgPool,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    default_currency: Currency,
}

impl PgStore {
    pub fn new(pool: PgPool, default_currency: Currency) -> Self {
        Self {
            pool,
            default_currency,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Catalog for PgStore {
    async fn restaurant(&self, id: RestaurantId) -> Result<Option<Restaurant>, EngineError> {
        catalog_repo::restaurant(&self.pool, id, self.default_currency).await
    }

    async fn table(&self, id: TableId) -> Result<Option<Table>, EngineError> {
        catalog_repo::table(&self.pool, id).await
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>, EngineError> {
        catalog_repo::product(&self.pool, id).await
    }

    async fn common_add_on(&self, name: &str) -> Result<Option<CommonAddOn>, EngineError> {
        catalog_repo::common_add_on(&self.pool, name).await
    }
}

#[async_trait]
impl CounterStore for PgStore {
    async fn next_order_number(&self, restaurant_id: RestaurantId) -> Result<OrderNo, EngineError> {
        let mut conn = self.pool.acquire().await?;
        counter_repo::next_order_no(&mut conn, restaurant_id).await
    }
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, EngineError> {
        payment_repo::insert(&self.pool, &payment).await
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>, EngineError> {
        payment_repo::find_by_id(&self.pool, id).await
    }

    async fn find_payment(&self, lookup: &PaymentLookup) -> Result<Option<Payment>, EngineError> {
        payment_repo::find(&self.pool, lookup).await
    }

    async fn latest_paid_payment(
        &self,
        restaurant_id: RestaurantId,
        guest_id: &GuestId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<Payment>, EngineError> {
        payment_repo::latest_paid(&self.pool, restaurant_id, guest_id, since).await
    }

    async fn latest_gateway_payment(
        &self,
        restaurant_id: RestaurantId,
        guest_id: &GuestId,
        gateway: GatewayKind,
    ) -> Result<Option<Payment>, EngineError> {
        payment_repo::latest_paid_through(&self.pool, restaurant_id, guest_id, gateway).await
    }

    async fn settle_payment(
        &self,
        settlement: PaymentSettlement,
    ) -> Result<SettleResult, EngineError> {
        payment_repo::settle(&self.pool, &settlement).await
    }

    async fn fail_payment(
        &self,
        id: PaymentId,
        transaction_id: Option<&str>,
    ) -> Result<bool, EngineError> {
        payment_repo::fail(&self.pool, id, transaction_id).await
    }

    async fn mark_payment_refunded(&self, id: PaymentId) -> Result<bool, EngineError> {
        payment_repo::mark_refunded(&self.pool, id).await
    }

    async fn expire_pending_payments(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PaymentId>, EngineError> {
        payment_repo::expire_pending(&self.pool, cutoff).await
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrder, EngineError> {
        order_repo::insert(&self.pool, &order).await
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, EngineError> {
        order_repo::find(&self.pool, id).await
    }

    async fn has_orders_for_guest(
        &self,
        restaurant_id: RestaurantId,
        guest_id: &GuestId,
    ) -> Result<bool, EngineError> {
        order_repo::exists_for_guest(&self.pool, restaurant_id, guest_id).await
    }

    async fn orders_for_restaurant(
        &self,
        restaurant_id: RestaurantId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, EngineError> {
        order_repo::for_restaurant(&self.pool, restaurant_id, status).await
    }

    async fn orders_for_guest(
        &self,
        restaurant_id: RestaurantId,
        guest_id: &GuestId,
    ) -> Result<Vec<Order>, EngineError> {
        order_repo::for_guest(&self.pool, restaurant_id, guest_id).await
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        cancellation_reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<Order>, EngineError> {
        order_repo::update_status(&self.pool, id, expected, next, cancellation_reason, at).await
    }

    async fn set_order_refund(
        &self,
        id: OrderId,
        refund: Option<&OrderRefundSummary>,
    ) -> Result<(), EngineError> {
        order_repo::set_refund(&self.pool, id, refund).await
    }

    async fn set_order_payment_status(
        &self,
        id: OrderId,
        status: PaymentStatus,
    ) -> Result<(), EngineError> {
        order_repo::set_payment_status(&self.pool, id, status).await
    }

    async fn delete_orders(
        &self,
        restaurant_id: RestaurantId,
        ids: &[OrderId],
    ) -> Result<u64, EngineError> {
        order_repo::delete_many(&self.pool, restaurant_id, ids).await
    }
}

#[async_trait]
impl RefundStore for PgStore {
    async fn insert_refund(&self, refund: &Refund) -> Result<(), EngineError> {
        refund_repo::insert(&self.pool, refund).await
    }

    async fn refund(&self, id: RefundId) -> Result<Option<Refund>, EngineError> {
        refund_repo::find(&self.pool, id).await
    }

    async fn refunds_for_order(&self, order_id: OrderId) -> Result<Vec<Refund>, EngineError> {
        refund_repo::for_order(&self.pool, order_id).await
    }

    async fn update_refund(
        &self,
        refund: &Refund,
        expected: RefundStatus,
    ) -> Result<bool, EngineError> {
        refund_repo::update(&self.pool, refund, expected).await
    }

    async fn delete_refund(
        &self,
        id: RefundId,
        allowed: &[RefundStatus],
    ) -> Result<bool, EngineError> {
        refund_repo::delete(&self.pool, id, allowed).await
    }
}

#[async_trait]
impl WalletStore for PgStore {
    async fn credit_wallet(&self, credit: WalletCredit) -> Result<CreditReceipt, EngineError> {
        wallet_repo::credit(&self.pool, &credit).await
    }

    async fn wallet_balance(&self, customer_id: &CustomerId) -> Result<Decimal, EngineError> {
        wallet_repo::balance(&self.pool, customer_id).await
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn record_audit(&self, entry: NewAuditEntry) -> Result<(), EngineError> {
        let mut conn = self.pool.acquire().await?;
        audit_repo::insert_audit_entry(&mut conn, &entry).await
    }
}
