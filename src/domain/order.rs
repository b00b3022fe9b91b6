use {
    super::audit::NewAuditEntry,
    super::cart::{DeliveryAddress, PricedCommonAddOn, PricedLineItem, TableRef, ValidatedCart},
    super::error::EngineError,
    super::id::{GuestId, OrderId, OrderNo, PaymentId, RefundId, RequestId, RestaurantId},
    super::money::Currency,
    super::payment::{Payment, PaymentStatus},
    super::refund::RefundStatus,
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    #[serde(rename = "Dine-In")]
    DineIn,
    #[serde(rename = "Home-Delivery")]
    HomeDelivery,
    #[serde(rename = "Take-Away")]
    TakeAway,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DineIn => "Dine-In",
            Self::HomeDelivery => "Home-Delivery",
            Self::TakeAway => "Take-Away",
        }
    }

    pub fn allowed_payment_options(&self) -> &'static [PaymentOption] {
        match self {
            Self::DineIn => &[PaymentOption::PayNow, PaymentOption::PayLater],
            Self::HomeDelivery => &[PaymentOption::PayNow, PaymentOption::CashOnDelivery],
            Self::TakeAway => &[PaymentOption::PayNow, PaymentOption::PayLater],
        }
    }

    /// Lifecycle path for this type, starting at `Order Received`.
    pub fn status_path(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Self::DineIn => &[OrderReceived, Preparing, ReadyToServe, Served],
            Self::HomeDelivery => &[OrderReceived, Preparing, OutForDelivery, Delivered],
            Self::TakeAway => &[OrderReceived, Preparing, ReadyForCollection, Collected],
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderType {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "Dine-In" => Ok(Self::DineIn),
            "Home-Delivery" => Ok(Self::HomeDelivery),
            "Take-Away" => Ok(Self::TakeAway),
            other => Err(EngineError::Validation(format!("invalid order type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOption {
    PayNow,
    PayLater,
    CashOnDelivery,
}

impl PaymentOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PayNow => "pay_now",
            Self::PayLater => "pay_later",
            Self::CashOnDelivery => "cash_on_delivery",
        }
    }
}

impl fmt::Display for PaymentOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentOption {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pay_now" => Ok(Self::PayNow),
            "pay_later" => Ok(Self::PayLater),
            "cash_on_delivery" => Ok(Self::CashOnDelivery),
            other => Err(EngineError::Validation(format!(
                "invalid payment option: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "Order Received")]
    OrderReceived,
    #[serde(rename = "Preparing")]
    Preparing,
    #[serde(rename = "Ready for Collection")]
    ReadyForCollection,
    #[serde(rename = "Collected")]
    Collected,
    #[serde(rename = "Ready to Serve")]
    ReadyToServe,
    #[serde(rename = "Served")]
    Served,
    #[serde(rename = "Out for Delivery")]
    OutForDelivery,
    #[serde(rename = "Delivered")]
    Delivered,
    #[serde(rename = "Cancelled")]
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        Self::OrderReceived,
        Self::Preparing,
        Self::ReadyForCollection,
        Self::Collected,
        Self::ReadyToServe,
        Self::Served,
        Self::OutForDelivery,
        Self::Delivered,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderReceived => "Order Received",
            Self::Preparing => "Preparing",
            Self::ReadyForCollection => "Ready for Collection",
            Self::Collected => "Collected",
            Self::ReadyToServe => "Ready to Serve",
            Self::Served => "Served",
            Self::OutForDelivery => "Out for Delivery",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Collected | Self::Served | Self::Delivered | Self::Cancelled
        )
    }

    /// Forward moves along the order type's path, or cancellation from any
    /// non-terminal state. Skipping intermediate steps is allowed.
    pub fn can_transition_to(&self, order_type: OrderType, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Self::Cancelled {
            return true;
        }
        let path = order_type.status_path();
        match (
            path.iter().position(|s| s == self),
            path.iter().position(|s| *s == next),
        ) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderStatus {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| EngineError::Validation(format!("invalid order status: {s}")))
    }
}

/// Refund fields mirrored onto the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRefundSummary {
    pub refund_id: RefundId,
    pub status: RefundStatus,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_no: OrderNo,
    pub restaurant_id: RestaurantId,
    pub guest_id: GuestId,
    pub order_type: OrderType,
    pub table: Option<TableRef>,
    pub delivery_address: Option<DeliveryAddress>,
    pub line_items: Vec<PricedLineItem>,
    pub add_ons_line_items: Vec<PricedCommonAddOn>,
    pub total_amount: Decimal,
    pub currency: Currency,
    pub payment_id: Option<PaymentId>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_option: Option<PaymentOption>,
    pub is_paid: bool,
    pub status: OrderStatus,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub request_id: Option<RequestId>,
    pub refund: Option<OrderRefundSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn customer_name(&self) -> Option<&str> {
        self.delivery_address.as_ref().map(|a| a.name.as_str())
    }

    pub fn customer_phone(&self) -> Option<String> {
        self.delivery_address.as_ref().map(|a| a.phone.display())
    }

    pub fn table_no(&self) -> Option<&str> {
        self.table.as_ref().map(|t| t.table_no.as_str())
    }

    pub fn audit_entry(&self, actor: &str, action: &str, detail: serde_json::Value) -> NewAuditEntry {
        NewAuditEntry {
            id: Uuid::now_v7(),
            entity_type: "order".to_string(),
            entity_id: self.id.to_string(),
            action: action.to_string(),
            actor: actor.to_string(),
            detail,
        }
    }

    /// Checks a status change against the type's path and the
    /// cancellation-reason rule. Returns the trimmed reason when cancelling.
    pub fn check_transition(
        &self,
        next: OrderStatus,
        reason: Option<&str>,
    ) -> Result<Option<String>, EngineError> {
        if !self.status.can_transition_to(self.order_type, next) {
            return Err(EngineError::Conflict(format!(
                "invalid order status transition for {}: {} → {}",
                self.order_type, self.status, next
            )));
        }
        if next != OrderStatus::Cancelled {
            return Ok(None);
        }
        match reason.map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => Ok(Some(reason.to_string())),
            None => Err(EngineError::validation("cancellation reason is required")),
        }
    }
}

/// For INSERT. The store assigns `order_no` from the restaurant counter.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub id: OrderId,
    pub restaurant_id: RestaurantId,
    pub guest_id: GuestId,
    pub order_type: OrderType,
    pub table: Option<TableRef>,
    pub delivery_address: Option<DeliveryAddress>,
    pub line_items: Vec<PricedLineItem>,
    pub add_ons_line_items: Vec<PricedCommonAddOn>,
    pub total_amount: Decimal,
    pub currency: Currency,
    pub payment_id: Option<PaymentId>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_option: Option<PaymentOption>,
    pub is_paid: bool,
    pub request_id: Option<RequestId>,
}

impl NewOrder {
    fn from_cart(cart: &ValidatedCart) -> Self {
        Self {
            id: OrderId::generate(),
            restaurant_id: cart.restaurant_id,
            guest_id: cart.guest_id.clone(),
            order_type: cart.order_type,
            table: cart.table.clone(),
            delivery_address: cart.delivery_address.clone(),
            line_items: cart.line_items.clone(),
            add_ons_line_items: cart.add_ons_line_items.clone(),
            total_amount: cart.total_amount,
            currency: cart.currency,
            payment_id: None,
            payment_status: None,
            payment_option: Some(cart.payment_option),
            is_paid: false,
            request_id: None,
        }
    }

    /// Order materialized by reconciliation: already paid.
    pub fn from_paid_payment(payment: &Payment) -> Self {
        Self {
            payment_id: Some(payment.id),
            payment_status: Some(PaymentStatus::Paid),
            payment_option: Some(PaymentOption::PayNow),
            is_paid: true,
            ..Self::from_cart(&payment.cart)
        }
    }

    /// Order created by a restaurant accepting a pay-later/COD request.
    pub fn from_request(request: &OrderRequest) -> Self {
        Self {
            payment_status: Some(PaymentStatus::Pending),
            request_id: Some(request.request_id),
            ..Self::from_cart(&request.cart)
        }
    }

    pub fn into_order(self, order_no: OrderNo, now: DateTime<Utc>) -> Order {
        Order {
            id: self.id,
            order_no,
            restaurant_id: self.restaurant_id,
            guest_id: self.guest_id,
            order_type: self.order_type,
            table: self.table,
            delivery_address: self.delivery_address,
            line_items: self.line_items,
            add_ons_line_items: self.add_ons_line_items,
            total_amount: self.total_amount,
            currency: self.currency,
            payment_id: self.payment_id,
            payment_status: self.payment_status,
            payment_option: self.payment_option,
            is_paid: self.is_paid,
            status: OrderStatus::OrderReceived,
            cancellation_reason: None,
            cancelled_at: None,
            request_id: self.request_id,
            refund: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Unpersisted pay-later/COD order awaiting restaurant accept or decline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub request_id: RequestId,
    pub requested_at: DateTime<Utc>,
    pub cart: ValidatedCart,
}

impl OrderRequest {
    pub fn new(cart: ValidatedCart, now: DateTime<Utc>) -> Self {
        Self {
            request_id: RequestId::generate(),
            requested_at: now,
            cart,
        }
    }

    pub fn audit_entry(&self, actor: &str, action: &str, detail: serde_json::Value) -> NewAuditEntry {
        NewAuditEntry {
            id: Uuid::now_v7(),
            entity_type: "order_request".to_string(),
            entity_id: self.request_id.to_string(),
            action: action.to_string(),
            actor: actor.to_string(),
            detail,
        }
    }

    /// Headline shown on the restaurant dashboard.
    pub fn headline(&self) -> String {
        match (self.cart.order_type, self.cart.table_no()) {
            (OrderType::DineIn, Some(table_no)) => {
                format!("New Order Request from Table {table_no}")
            }
            (order_type, _) => format!("New {order_type} Order Request"),
        }
    }
}

/// Outcome of an insert keyed by `request_id`.
#[derive(Debug, Clone)]
pub enum InsertOrder {
    Created(Order),
    /// A previous accept for the same request already created this order.
    Existing(Order),
}
