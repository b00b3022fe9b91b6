use {
    super::cart::ValidatedCart,
    super::error::EngineError,
    super::id::RefundId,
    super::money::Money,
    super::payment::{GatewayKind, Payment, PaymentLookup, PaymentOutcome},
    std::{
        collections::{BTreeMap, HashMap},
        fmt,
        future::Future,
        pin::Pin,
        sync::Arc,
    },
};

pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EngineError>> + Send + 'a>>;

#[derive(Clone)]
pub struct StripeCredentials {
    pub secret_key: String,
    pub webhook_secret: String,
}

#[derive(Clone)]
pub struct PaymobCredentials {
    pub api_key: String,
    pub secret_key: String,
    pub public_key: String,
    pub integration_id: String,
    pub hmac_secret: String,
}

/// Decrypted per-restaurant secrets. Lives only for the duration of a call.
#[derive(Clone)]
pub enum GatewayCredentials {
    Stripe(StripeCredentials),
    Paymob(PaymobCredentials),
}

impl GatewayCredentials {
    pub fn kind(&self) -> GatewayKind {
        match self {
            Self::Stripe(_) => GatewayKind::Stripe,
            Self::Paymob(_) => GatewayKind::Paymob,
        }
    }

    pub fn stripe(&self) -> Result<&StripeCredentials, EngineError> {
        match self {
            Self::Stripe(creds) => Ok(creds),
            Self::Paymob(_) => Err(EngineError::Gateway(
                "expected stripe credentials, got paymob".into(),
            )),
        }
    }

    pub fn paymob(&self) -> Result<&PaymobCredentials, EngineError> {
        match self {
            Self::Paymob(creds) => Ok(creds),
            Self::Stripe(_) => Err(EngineError::Gateway(
                "expected paymob credentials, got stripe".into(),
            )),
        }
    }
}

impl fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GatewayCredentials({}, <redacted>)", self.kind())
    }
}

pub struct IntentRequest {
    pub cart: ValidatedCart,
    pub restaurant_slug: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Browser return target for gateways that redirect back with query params.
    pub redirect_url: String,
    pub webhook_url: String,
}

/// What the gateway hands back after creating a hosted session/intention.
#[derive(Debug, Clone)]
pub struct CreatedIntent {
    pub session_id: String,
    pub redirect_url: String,
    pub special_reference: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackSource {
    Redirect,
    Webhook,
}

impl CallbackSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redirect => "redirect",
            Self::Webhook => "webhook",
        }
    }
}

/// Raw inbound callback before authenticity is checked.
#[derive(Debug, Clone)]
pub struct GatewayCallback {
    pub source: CallbackSource,
    pub signature: Option<String>,
    pub query: BTreeMap<String, String>,
    pub body: String,
}

impl GatewayCallback {
    pub fn redirect(query: BTreeMap<String, String>) -> Self {
        Self {
            source: CallbackSource::Redirect,
            signature: query.get("hmac").cloned(),
            query,
            body: String::new(),
        }
    }

    pub fn webhook(body: String, signature: Option<String>) -> Self {
        Self {
            source: CallbackSource::Webhook,
            signature,
            query: BTreeMap::new(),
            body,
        }
    }
}

pub struct GatewayRefundRequest {
    pub refund_id: RefundId,
    pub transaction_id: String,
    pub amount: Money,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayRefundStatus {
    Succeeded,
    Pending,
    /// Gateway refused the refund outright.
    Declined(String),
}

#[derive(Debug, Clone)]
pub struct GatewayRefundReceipt {
    pub gateway_refund_id: String,
    pub status: GatewayRefundStatus,
}

pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    fn create_intent<'a>(
        &'a self,
        credentials: &'a GatewayCredentials,
        request: &'a IntentRequest,
    ) -> GatewayFuture<'a, CreatedIntent>;

    /// Identifiers in the (still unverified) callback, most specific first.
    fn locate(&self, callback: &GatewayCallback) -> Result<Vec<PaymentLookup>, EngineError>;

    /// Authenticates the callback and normalizes its verdict.
    fn verify<'a>(
        &'a self,
        credentials: &'a GatewayCredentials,
        callback: &'a GatewayCallback,
        payment: &'a Payment,
    ) -> GatewayFuture<'a, PaymentOutcome>;

    fn refund<'a>(
        &'a self,
        credentials: &'a GatewayCredentials,
        request: &'a GatewayRefundRequest,
    ) -> GatewayFuture<'a, GatewayRefundReceipt>;
}

#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<GatewayKind, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.kind(), gateway);
        self
    }

    pub fn get(&self, kind: GatewayKind) -> Result<Arc<dyn PaymentGateway>, EngineError> {
        self.gateways
            .get(&kind)
            .cloned()
            .ok_or_else(|| EngineError::Gateway(format!("gateway {kind} is not configured")))
    }
}
