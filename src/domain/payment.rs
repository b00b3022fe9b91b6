use {
    super::audit::NewAuditEntry,
    super::cart::ValidatedCart,
    super::error::EngineError,
    super::id::{GuestId, OrderId, PaymentId, RestaurantId},
    super::money::Currency,
    super::order::{NewOrder, Order},
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    pub fn can_transition_to(&self, next: &PaymentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid) | (Self::Pending, Self::Failed) | (Self::Paid, Self::Refunded)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(EngineError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    Stripe,
    Paymob,
}

impl GatewayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Paymob => "paymob",
        }
    }
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for GatewayKind {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "stripe" => Ok(Self::Stripe),
            "paymob" => Ok(Self::Paymob),
            other => Err(EngineError::Validation(format!("unknown gateway: {other}"))),
        }
    }
}

/// Full payment record from the store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    pub restaurant_id: RestaurantId,
    pub guest_id: GuestId,
    pub gateway: GatewayKind,
    pub session_id: String,
    pub transaction_id: Option<String>,
    pub special_reference: Option<String>,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub currency: Currency,
    pub cart: ValidatedCart,
    /// Once set, no further order may be created for this payment.
    pub order_id: Option<OrderId>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_reconciled(&self) -> bool {
        self.order_id.is_some()
    }

    pub fn audit_entry(&self, actor: &str, action: &str, detail: serde_json::Value) -> NewAuditEntry {
        NewAuditEntry {
            id: Uuid::now_v7(),
            entity_type: "payment".to_string(),
            entity_id: self.id.to_string(),
            action: action.to_string(),
            actor: actor.to_string(),
            detail,
        }
    }
}

/// For INSERT. `paymentId` is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewPayment {
    restaurant_id: RestaurantId,
    guest_id: GuestId,
    gateway: GatewayKind,
    session_id: String,
    special_reference: Option<String>,
    cart: ValidatedCart,
}

impl NewPayment {
    pub fn new(
        cart: ValidatedCart,
        gateway: GatewayKind,
        session_id: String,
        special_reference: Option<String>,
    ) -> Self {
        Self {
            restaurant_id: cart.restaurant_id,
            guest_id: cart.guest_id.clone(),
            gateway,
            session_id,
            special_reference,
            cart,
        }
    }

    pub fn restaurant_id(&self) -> RestaurantId {
        self.restaurant_id
    }

    pub fn guest_id(&self) -> &GuestId {
        &self.guest_id
    }

    pub fn gateway(&self) -> GatewayKind {
        self.gateway
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn special_reference(&self) -> Option<&str> {
        self.special_reference.as_deref()
    }

    pub fn amount(&self) -> Decimal {
        self.cart.total_amount
    }

    pub fn currency(&self) -> Currency {
        self.cart.currency
    }

    pub fn cart(&self) -> &ValidatedCart {
        &self.cart
    }

    pub fn into_payment(self, id: PaymentId, now: DateTime<Utc>) -> Payment {
        Payment {
            id,
            restaurant_id: self.restaurant_id,
            guest_id: self.guest_id,
            gateway: self.gateway,
            session_id: self.session_id,
            transaction_id: None,
            special_reference: self.special_reference,
            status: PaymentStatus::Pending,
            amount: self.cart.total_amount,
            currency: self.cart.currency,
            cart: self.cart,
            order_id: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// How a gateway callback identifies its payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentLookup {
    Session(String),
    Transaction(String),
    Reference(String),
}

impl fmt::Display for PaymentLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(id) => write!(f, "session:{id}"),
            Self::Transaction(id) => write!(f, "transaction:{id}"),
            Self::Reference(id) => write!(f, "reference:{id}"),
        }
    }
}

/// Normalized gateway verdict for one payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded { transaction_id: Option<String> },
    Failed { transaction_id: Option<String>, reason: String },
    /// Gateway still processing. No state change.
    Pending,
}

/// Pending→paid claim plus the order to materialize if the claim wins.
#[derive(Debug, Clone)]
pub struct PaymentSettlement {
    pub payment_id: PaymentId,
    pub transaction_id: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub order: NewOrder,
}

#[derive(Debug, Clone)]
pub enum SettleResult {
    /// This call flipped pending→paid and created the order.
    Settled(Order),
    /// Another reconciliation already linked an order.
    AlreadySettled(Order),
    /// Payment was not pending and has no order.
    NotPending(PaymentStatus),
}

#[derive(Debug, Clone)]
pub enum ReconcileResult {
    Materialized(Order),
    AlreadyReconciled(Order),
    Declined { payment_id: PaymentId, reason: String },
    Pending(PaymentId),
}

impl ReconcileResult {
    pub fn order(&self) -> Option<&Order> {
        match self {
            Self::Materialized(order) | Self::AlreadyReconciled(order) => Some(order),
            Self::Declined { .. } | Self::Pending(_) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Materialized(_) => "created",
            Self::AlreadyReconciled(_) => "already_created",
            Self::Declined { .. } => "declined",
            Self::Pending(_) => "pending",
        }
    }
}
