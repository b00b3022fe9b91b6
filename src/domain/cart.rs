use {
    super::error::EngineError,
    super::id::{GuestId, ProductId, RestaurantId, TableId},
    super::money::{Currency, require_non_negative},
    super::order::{OrderType, PaymentOption},
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
};

pub const MAX_QUANTITY: i64 = 999;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneNumber {
    #[serde(default)]
    pub country_code: String,
    pub number: String,
}

impl PhoneNumber {
    pub fn display(&self) -> String {
        format!("{}{}", self.country_code, self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAddress {
    pub name: String,
    pub phone: PhoneNumber,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

// ── Guest-submitted cart (untrusted) ───────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedOption {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineInput {
    pub product_id: ProductId,
    pub quantity: i64,
    #[serde(default)]
    pub selected_size: Option<SelectedOption>,
    #[serde(default, alias = "productAddOns")]
    pub product_addons: Vec<SelectedOption>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub base_price: Option<Decimal>,
    #[serde(default)]
    pub item_subtotal: Option<Decimal>,
    #[serde(default)]
    pub item_total: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOnLineInput {
    #[serde(alias = "commonAddOnName")]
    pub name: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestCart {
    pub order_type: String,
    #[serde(default)]
    pub table_id: Option<TableId>,
    #[serde(default)]
    pub delivery_address: Option<DeliveryAddress>,
    #[serde(default)]
    pub line_items: Vec<CartLineInput>,
    #[serde(default)]
    pub add_ons_line_items: Vec<AddOnLineInput>,
    pub total_amount: Decimal,
}

impl GuestCart {
    pub fn is_empty(&self) -> bool {
        self.line_items.is_empty() && self.add_ons_line_items.is_empty()
    }
}

// ── Normalized cart lines ──────────────────────────────────────────────────

/// Client-attached totals for a line. Trusted and re-summed when complete.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientPricing {
    pub base_price: Decimal,
    pub item_subtotal: Decimal,
    pub item_total: Decimal,
}

/// Pricing shape of a product line, decided once at normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum CartLine {
    /// Carries its own base/subtotal/total computed client-side.
    LegacyPriced {
        product_id: ProductId,
        quantity: u32,
        size: Option<String>,
        add_ons: Vec<String>,
        comments: Option<String>,
        pricing: ClientPricing,
    },
    /// Priced from the catalog: size or product price plus add-ons.
    SizedWithAddOns {
        product_id: ProductId,
        quantity: u32,
        size: Option<String>,
        add_ons: Vec<String>,
        comments: Option<String>,
    },
}

impl CartLine {
    pub fn product_id(&self) -> ProductId {
        match self {
            Self::LegacyPriced { product_id, .. } | Self::SizedWithAddOns { product_id, .. } => {
                *product_id
            }
        }
    }

    pub fn quantity(&self) -> u32 {
        match self {
            Self::LegacyPriced { quantity, .. } | Self::SizedWithAddOns { quantity, .. } => {
                *quantity
            }
        }
    }

    pub fn size(&self) -> Option<&str> {
        match self {
            Self::LegacyPriced { size, .. } | Self::SizedWithAddOns { size, .. } => {
                size.as_deref()
            }
        }
    }

    pub fn add_ons(&self) -> &[String] {
        match self {
            Self::LegacyPriced { add_ons, .. } | Self::SizedWithAddOns { add_ons, .. } => add_ons,
        }
    }

    pub fn comments(&self) -> Option<&str> {
        match self {
            Self::LegacyPriced { comments, .. } | Self::SizedWithAddOns { comments, .. } => {
                comments.as_deref()
            }
        }
    }
}

impl TryFrom<CartLineInput> for CartLine {
    type Error = EngineError;

    fn try_from(input: CartLineInput) -> Result<Self, Self::Error> {
        let quantity = parse_quantity(input.quantity)?;
        let size = input
            .selected_size
            .map(|s| s.name.trim().to_string())
            .filter(|s| !s.is_empty());
        let add_ons = input
            .product_addons
            .into_iter()
            .map(|a| a.name.trim().to_string())
            .collect();
        let comments = input
            .comments
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        match (input.base_price, input.item_subtotal, input.item_total) {
            (Some(base_price), Some(item_subtotal), Some(item_total)) => Ok(Self::LegacyPriced {
                product_id: input.product_id,
                quantity,
                size,
                add_ons,
                comments,
                pricing: ClientPricing {
                    base_price: require_non_negative(base_price, "basePrice")?,
                    item_subtotal: require_non_negative(item_subtotal, "itemSubtotal")?,
                    item_total: require_non_negative(item_total, "itemTotal")?,
                },
            }),
            _ => Ok(Self::SizedWithAddOns {
                product_id: input.product_id,
                quantity,
                size,
                add_ons,
                comments,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonAddOnLine {
    pub name: String,
    pub quantity: u32,
}

impl TryFrom<AddOnLineInput> for CommonAddOnLine {
    type Error = EngineError;

    fn try_from(input: AddOnLineInput) -> Result<Self, Self::Error> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(EngineError::validation("common add-on name is required"));
        }
        Ok(Self {
            name,
            quantity: parse_quantity(input.quantity)?,
        })
    }
}

fn parse_quantity(quantity: i64) -> Result<u32, EngineError> {
    if !(1..=MAX_QUANTITY).contains(&quantity) {
        return Err(EngineError::Validation(format!(
            "invalid quantity: {quantity} (must be between 1 and {MAX_QUANTITY})"
        )));
    }
    Ok(quantity as u32)
}

// ── Server-priced cart ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedAddOn {
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedLineItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub selected_size: Option<String>,
    pub add_ons: Vec<PricedAddOn>,
    pub comments: Option<String>,
    pub base_price: Decimal,
    pub item_subtotal: Decimal,
    pub item_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedCommonAddOn {
    pub name: String,
    pub quantity: u32,
    pub price: Decimal,
    pub item_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRef {
    pub id: TableId,
    pub table_no: String,
}

/// Normalized, server-priced cart. Snapshotted onto payments and order requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedCart {
    pub restaurant_id: RestaurantId,
    pub guest_id: GuestId,
    pub order_type: OrderType,
    pub payment_option: PaymentOption,
    pub table: Option<TableRef>,
    pub delivery_address: Option<DeliveryAddress>,
    pub line_items: Vec<PricedLineItem>,
    pub add_ons_line_items: Vec<PricedCommonAddOn>,
    pub total_amount: Decimal,
    pub original_amount: Decimal,
    pub discount_amount: Decimal,
    pub shipping_charge: Decimal,
    pub currency: Currency,
    pub skip_payment: bool,
}

impl ValidatedCart {
    /// Σ itemTotal over both item arrays.
    pub fn items_total(&self) -> Decimal {
        let lines: Decimal = self.line_items.iter().map(|l| l.item_total).sum();
        let add_ons: Decimal = self.add_ons_line_items.iter().map(|a| a.item_total).sum();
        lines + add_ons
    }

    pub fn customer_name(&self) -> Option<&str> {
        self.delivery_address.as_ref().map(|a| a.name.as_str())
    }

    pub fn customer_phone(&self) -> Option<String> {
        self.delivery_address.as_ref().map(|a| a.phone.display())
    }

    pub fn table_no(&self) -> Option<&str> {
        self.table.as_ref().map(|t| t.table_no.as_str())
    }
}
