//! In-process store and catalog. Every port method runs under one mutex, so
//! each conditional update is atomic in the same way a single-row
//! `UPDATE .. WHERE status = ..` is in Postgres.

use {
    crate::domain::{
        audit::NewAuditEntry,
        catalog::{Catalog, CommonAddOn, Product, Restaurant, Table},
        error::EngineError,
        id::{
            CustomerId, GuestId, OrderId, OrderNo, PaymentId, ProductId, RefundId, RestaurantId,
            TableId,
        },
        order::{InsertOrder, NewOrder, Order, OrderRefundSummary, OrderStatus},
        payment::{
            GatewayKind, NewPayment, Payment, PaymentLookup, PaymentSettlement, PaymentStatus,
            SettleResult,
        },
        refund::{Refund, RefundStatus},
        store::{AuditStore, CounterStore, OrderStore, PaymentStore, RefundStore, WalletStore},
        wallet::{CreditReceipt, WalletCredit, WalletTransaction},
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    std::{
        collections::{BTreeMap, HashMap},
        sync::{Mutex, MutexGuard},
    },
    uuid::Uuid,
};

#[derive(Default)]
struct Inner {
    restaurants: HashMap<RestaurantId, Restaurant>,
    tables: HashMap<TableId, Table>,
    products: HashMap<ProductId, Product>,
    common_add_ons: HashMap<String, CommonAddOn>,
    counters: HashMap<RestaurantId, i64>,
    payments: BTreeMap<PaymentId, Payment>,
    last_payment_id: i64,
    orders: HashMap<OrderId, Order>,
    refunds: HashMap<RefundId, Refund>,
    balances: HashMap<CustomerId, Decimal>,
    wallet_transactions: Vec<WalletTransaction>,
    audit: Vec<NewAuditEntry>,
}

impl Inner {
    fn next_order_no(&mut self, restaurant_id: RestaurantId) -> Result<OrderNo, EngineError> {
        let seq = self.counters.entry(restaurant_id).or_insert(0);
        *seq += 1;
        OrderNo::from_sequence(*seq)
    }

    fn insert_new_order(&mut self, order: NewOrder) -> Result<Order, EngineError> {
        let order_no = self.next_order_no(order.restaurant_id)?;
        let order = order.into_order(order_no, Utc::now());
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    fn order(&self, id: OrderId) -> Result<Order, EngineError> {
        self.orders
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("order {id} not found")))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic elsewhere must not wedge every later request.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_restaurant(&self, restaurant: Restaurant) {
        self.lock().restaurants.insert(restaurant.id, restaurant);
    }

    pub fn add_table(&self, table: Table) {
        self.lock().tables.insert(table.id, table);
    }

    pub fn add_product(&self, product: Product) {
        self.lock().products.insert(product.id, product);
    }

    pub fn add_common_add_on(&self, add_on: CommonAddOn) {
        self.lock().common_add_ons.insert(add_on.name.clone(), add_on);
    }

    pub fn audit_entries(&self) -> Vec<NewAuditEntry> {
        self.lock().audit.clone()
    }

    pub fn order_count(&self) -> usize {
        self.lock().orders.len()
    }

    pub fn wallet_transactions(&self, customer_id: &CustomerId) -> Vec<WalletTransaction> {
        self.lock()
            .wallet_transactions
            .iter()
            .filter(|t| t.customer_id == *customer_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Catalog for MemoryStore {
    async fn restaurant(&self, id: RestaurantId) -> Result<Option<Restaurant>, EngineError> {
        Ok(self.lock().restaurants.get(&id).cloned())
    }

    async fn table(&self, id: TableId) -> Result<Option<Table>, EngineError> {
        Ok(self.lock().tables.get(&id).cloned())
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>, EngineError> {
        Ok(self.lock().products.get(&id).cloned())
    }

    async fn common_add_on(&self, name: &str) -> Result<Option<CommonAddOn>, EngineError> {
        Ok(self
            .lock()
            .common_add_ons
            .get(name)
            .filter(|a| a.is_available)
            .cloned())
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn next_order_number(&self, restaurant_id: RestaurantId) -> Result<OrderNo, EngineError> {
        self.lock().next_order_no(restaurant_id)
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, EngineError> {
        let mut inner = self.lock();
        if inner
            .payments
            .values()
            .any(|p| p.session_id == payment.session_id())
        {
            return Err(EngineError::Conflict(format!(
                "payment session {} already exists",
                payment.session_id()
            )));
        }
        inner.last_payment_id += 1;
        let id = PaymentId::new(inner.last_payment_id);
        let payment = payment.into_payment(id, Utc::now());
        inner.payments.insert(id, payment.clone());
        Ok(payment)
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>, EngineError> {
        Ok(self.lock().payments.get(&id).cloned())
    }

    async fn find_payment(&self, lookup: &PaymentLookup) -> Result<Option<Payment>, EngineError> {
        let inner = self.lock();
        let found = inner.payments.values().find(|p| match lookup {
            PaymentLookup::Session(id) => p.session_id == *id,
            PaymentLookup::Transaction(id) => p.transaction_id.as_deref() == Some(id.as_str()),
            PaymentLookup::Reference(id) => p.special_reference.as_deref() == Some(id.as_str()),
        });
        Ok(found.cloned())
    }

    async fn latest_paid_payment(
        &self,
        restaurant_id: RestaurantId,
        guest_id: &GuestId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<Payment>, EngineError> {
        let inner = self.lock();
        Ok(inner
            .payments
            .values()
            .filter(|p| {
                p.restaurant_id == restaurant_id
                    && p.guest_id == *guest_id
                    && p.status == PaymentStatus::Paid
                    && since.is_none_or(|since| p.created_at >= since)
            })
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn latest_gateway_payment(
        &self,
        restaurant_id: RestaurantId,
        guest_id: &GuestId,
        gateway: GatewayKind,
    ) -> Result<Option<Payment>, EngineError> {
        let inner = self.lock();
        Ok(inner
            .payments
            .values()
            .filter(|p| {
                p.restaurant_id == restaurant_id
                    && p.guest_id == *guest_id
                    && p.gateway == gateway
                    && p.status == PaymentStatus::Paid
            })
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn settle_payment(
        &self,
        settlement: PaymentSettlement,
    ) -> Result<SettleResult, EngineError> {
        let mut inner = self.lock();
        let id = settlement.payment_id;
        let payment = inner
            .payments
            .get(&id)
            .ok_or_else(|| EngineError::not_found(format!("payment {id} not found")))?;

        if let Some(order_id) = payment.order_id {
            return inner.order(order_id).map(SettleResult::AlreadySettled);
        }
        if payment.status != PaymentStatus::Pending {
            return Ok(SettleResult::NotPending(payment.status));
        }

        let order = inner.insert_new_order(settlement.order)?;
        if let Some(payment) = inner.payments.get_mut(&id) {
            payment.status = PaymentStatus::Paid;
            payment.transaction_id = settlement.transaction_id.or(payment.transaction_id.take());
            payment.paid_at = Some(settlement.paid_at);
            payment.order_id = Some(order.id);
            payment.updated_at = Utc::now();
        }
        Ok(SettleResult::Settled(order))
    }

    async fn fail_payment(
        &self,
        id: PaymentId,
        transaction_id: Option<&str>,
    ) -> Result<bool, EngineError> {
        let mut inner = self.lock();
        match inner.payments.get_mut(&id) {
            Some(payment) if payment.status == PaymentStatus::Pending => {
                payment.status = PaymentStatus::Failed;
                if let Some(txn) = transaction_id {
                    payment.transaction_id = Some(txn.to_string());
                }
                payment.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_payment_refunded(&self, id: PaymentId) -> Result<bool, EngineError> {
        let mut inner = self.lock();
        match inner.payments.get_mut(&id) {
            Some(payment) if payment.status == PaymentStatus::Paid => {
                payment.status = PaymentStatus::Refunded;
                payment.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_pending_payments(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PaymentId>, EngineError> {
        let mut inner = self.lock();
        let now = Utc::now();
        let mut expired = Vec::new();
        for payment in inner.payments.values_mut() {
            if payment.status == PaymentStatus::Pending
                && payment.order_id.is_none()
                && payment.created_at < cutoff
            {
                payment.status = PaymentStatus::Failed;
                payment.updated_at = now;
                expired.push(payment.id);
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrder, EngineError> {
        let mut inner = self.lock();
        if let Some(request_id) = order.request_id {
            if let Some(existing) = inner
                .orders
                .values()
                .find(|o| o.request_id == Some(request_id))
            {
                return Ok(InsertOrder::Existing(existing.clone()));
            }
        }
        inner.insert_new_order(order).map(InsertOrder::Created)
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, EngineError> {
        Ok(self.lock().orders.get(&id).cloned())
    }

    async fn has_orders_for_guest(
        &self,
        restaurant_id: RestaurantId,
        guest_id: &GuestId,
    ) -> Result<bool, EngineError> {
        Ok(self
            .lock()
            .orders
            .values()
            .any(|o| o.restaurant_id == restaurant_id && o.guest_id == *guest_id))
    }

    async fn orders_for_restaurant(
        &self,
        restaurant_id: RestaurantId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, EngineError> {
        let inner = self.lock();
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.restaurant_id == restaurant_id)
            .filter(|o| status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn orders_for_guest(
        &self,
        restaurant_id: RestaurantId,
        guest_id: &GuestId,
    ) -> Result<Vec<Order>, EngineError> {
        let inner = self.lock();
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.restaurant_id == restaurant_id && o.guest_id == *guest_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        cancellation_reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<Order>, EngineError> {
        let mut inner = self.lock();
        match inner.orders.get_mut(&id) {
            Some(order) if order.status == expected => {
                order.status = next;
                if next == OrderStatus::Cancelled {
                    order.cancellation_reason = cancellation_reason.map(str::to_string);
                    order.cancelled_at = Some(at);
                }
                order.updated_at = at;
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn set_order_refund(
        &self,
        id: OrderId,
        refund: Option<&OrderRefundSummary>,
    ) -> Result<(), EngineError> {
        let mut inner = self.lock();
        let order = inner
            .orders
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found(format!("order {id} not found")))?;
        order.refund = refund.cloned();
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn set_order_payment_status(
        &self,
        id: OrderId,
        status: PaymentStatus,
    ) -> Result<(), EngineError> {
        let mut inner = self.lock();
        let order = inner
            .orders
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found(format!("order {id} not found")))?;
        order.payment_status = Some(status);
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_orders(
        &self,
        restaurant_id: RestaurantId,
        ids: &[OrderId],
    ) -> Result<u64, EngineError> {
        let mut inner = self.lock();
        let mut deleted = 0;
        for id in ids {
            if inner
                .orders
                .get(id)
                .is_some_and(|o| o.restaurant_id == restaurant_id)
            {
                inner.orders.remove(id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[async_trait]
impl RefundStore for MemoryStore {
    async fn insert_refund(&self, refund: &Refund) -> Result<(), EngineError> {
        let mut inner = self.lock();
        let open = inner.refunds.values().any(|r| {
            r.order_id == refund.order_id
                && r.id != refund.id
                && r.status != RefundStatus::Cancelled
        });
        if open {
            return Err(EngineError::Conflict(format!(
                "order {} already has a refund",
                refund.order_id
            )));
        }
        inner.refunds.insert(refund.id, refund.clone());
        Ok(())
    }

    async fn refund(&self, id: RefundId) -> Result<Option<Refund>, EngineError> {
        Ok(self.lock().refunds.get(&id).cloned())
    }

    async fn refunds_for_order(&self, order_id: OrderId) -> Result<Vec<Refund>, EngineError> {
        let inner = self.lock();
        let mut refunds: Vec<Refund> = inner
            .refunds
            .values()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect();
        refunds.sort_by_key(|r| r.created_at);
        Ok(refunds)
    }

    async fn update_refund(
        &self,
        refund: &Refund,
        expected: RefundStatus,
    ) -> Result<bool, EngineError> {
        let mut inner = self.lock();
        match inner.refunds.get_mut(&refund.id) {
            Some(stored) if stored.status == expected => {
                *stored = refund.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_refund(
        &self,
        id: RefundId,
        allowed: &[RefundStatus],
    ) -> Result<bool, EngineError> {
        let mut inner = self.lock();
        if inner
            .refunds
            .get(&id)
            .is_some_and(|r| allowed.contains(&r.status))
        {
            inner.refunds.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn credit_wallet(&self, credit: WalletCredit) -> Result<CreditReceipt, EngineError> {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .wallet_transactions
            .iter()
            .find(|t| t.refund_id == credit.refund_id)
            .cloned()
        {
            let balance = inner
                .balances
                .get(&existing.customer_id)
                .copied()
                .unwrap_or_default();
            return Ok(CreditReceipt {
                transaction: existing,
                new_balance: balance,
                newly_applied: false,
            });
        }

        let balance = inner.balances.entry(credit.customer_id.clone()).or_default();
        *balance += credit.amount;
        let new_balance = *balance;

        let transaction = WalletTransaction {
            id: Uuid::now_v7(),
            customer_id: credit.customer_id,
            amount: credit.amount,
            currency: credit.currency,
            reason: credit.reason,
            order_id: credit.order_id,
            refund_id: credit.refund_id,
            balance_after: new_balance,
            created_at: Utc::now(),
        };
        inner.wallet_transactions.push(transaction.clone());

        Ok(CreditReceipt {
            transaction,
            new_balance,
            newly_applied: true,
        })
    }

    async fn wallet_balance(&self, customer_id: &CustomerId) -> Result<Decimal, EngineError> {
        Ok(self
            .lock()
            .balances
            .get(customer_id)
            .copied()
            .unwrap_or_default())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn record_audit(&self, entry: NewAuditEntry) -> Result<(), EngineError> {
        self.lock().audit.push(entry);
        Ok(())
    }
}
