use {
    super::error::EngineError,
    super::id::{ProductId, RestaurantId, TableId},
    super::money::Currency,
    super::payment::GatewayKind,
    async_trait::async_trait,
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Basic,
    Advanced,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Advanced => "advanced",
        }
    }

    pub fn allows_online_payment(&self) -> bool {
        matches!(self, Self::Advanced)
    }
}

impl TryFrom<&str> for SubscriptionTier {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "basic" => Ok(Self::Basic),
            "advanced" => Ok(Self::Advanced),
            other => Err(EngineError::Validation(format!(
                "unknown subscription tier: {other}"
            ))),
        }
    }
}

/// Stripe secrets as stored. Values are `enc:` ciphertexts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
}

/// Paymob secrets as stored. Values are `enc:` ciphertexts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymobSettings {
    pub api_key: String,
    pub secret_key: String,
    pub public_key: String,
    pub integration_id: String,
    pub hmac_secret: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSettings {
    #[serde(default)]
    pub is_payment_enabled: bool,
    #[serde(default)]
    pub selected_gateway: Option<GatewayKind>,
    #[serde(default)]
    pub stripe: Option<StripeSettings>,
    #[serde(default)]
    pub paymob: Option<PaymobSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    pub id: RestaurantId,
    pub name: String,
    pub slug: String,
    pub subscription: SubscriptionTier,
    pub currency: Currency,
    pub payment_settings: PaymentSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub id: TableId,
    pub restaurant_id: RestaurantId,
    pub table_no: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSize {
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub offer_price: Option<Decimal>,
    #[serde(default = "available")]
    pub is_available: bool,
}

impl ProductSize {
    pub fn effective_price(&self) -> Decimal {
        offer_or(self.offer_price, self.price)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductAddOn {
    pub name: String,
    pub price: Decimal,
    #[serde(default = "available")]
    pub is_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub restaurant_id: RestaurantId,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub offer_price: Option<Decimal>,
    pub is_available: bool,
    #[serde(default)]
    pub sizes: Vec<ProductSize>,
    #[serde(default)]
    pub add_ons: Vec<ProductAddOn>,
}

impl Product {
    /// Offer price when set above zero, list price otherwise.
    pub fn effective_price(&self) -> Decimal {
        offer_or(self.offer_price, self.price)
    }

    pub fn size(&self, name: &str) -> Option<&ProductSize> {
        self.sizes.iter().find(|s| s.name == name)
    }

    pub fn add_on(&self, name: &str) -> Option<&ProductAddOn> {
        self.add_ons.iter().find(|a| a.name == name)
    }
}

/// Globally defined extra, not tied to a product or restaurant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonAddOn {
    pub name: String,
    pub price: Decimal,
    pub is_available: bool,
}

fn offer_or(offer: Option<Decimal>, price: Decimal) -> Decimal {
    match offer {
        Some(offer) if offer > Decimal::ZERO => offer,
        _ => price,
    }
}

fn available() -> bool {
    true
}

/// Read-only catalog snapshot consulted on every cart validation.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn restaurant(&self, id: RestaurantId) -> Result<Option<Restaurant>, EngineError>;

    async fn table(&self, id: TableId) -> Result<Option<Table>, EngineError>;

    async fn product(&self, id: ProductId) -> Result<Option<Product>, EngineError>;

    /// Only available common add-ons are returned.
    async fn common_add_on(&self, name: &str) -> Result<Option<CommonAddOn>, EngineError>;
}
