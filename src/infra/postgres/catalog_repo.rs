use {
    crate::domain::{
        catalog::{
            CommonAddOn, PaymentSettings, Product, ProductAddOn, ProductSize, Restaurant,
            SubscriptionTier, Table,
        },
        error::EngineError,
        id::{ProductId, RestaurantId, TableId},
        money::Currency,
    },
    rust_decimal::Decimal,
    sqlx::{PgPool, types::Json},
    uuid::Uuid,
};

#[derive(sqlx::FromRow)]
struct RestaurantRow {
    id: Uuid,
    name: String,
    slug: String,
    subscription: String,
    currency: Option<String>,
    payment_settings: Json<PaymentSettings>,
}

impl RestaurantRow {
    fn into_restaurant(row: Self, default_currency: Currency) -> Result<Restaurant, EngineError> {
        let currency = match row.currency.as_deref() {
            Some(code) => Currency::try_from(code)?,
            None => default_currency,
        };
        Ok(Restaurant {
            id: RestaurantId::from_uuid(row.id),
            name: row.name,
            slug: row.slug,
            subscription: SubscriptionTier::try_from(row.subscription.as_str())?,
            currency,
            payment_settings: row.payment_settings.0,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    restaurant_id: Uuid,
    name: String,
    price: Decimal,
    offer_price: Option<Decimal>,
    is_available: bool,
    sizes: Json<Vec<ProductSize>>,
    add_ons: Json<Vec<ProductAddOn>>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: ProductId::from_uuid(row.id),
            restaurant_id: RestaurantId::from_uuid(row.restaurant_id),
            name: row.name,
            price: row.price,
            offer_price: row.offer_price,
            is_available: row.is_available,
            sizes: row.sizes.0,
            add_ons: row.add_ons.0,
        }
    }
}

/// Restaurants without a currency of their own bill in `default_currency`.
pub async fn restaurant(
    pool: &PgPool,
    id: RestaurantId,
    default_currency: Currency,
) -> Result<Option<Restaurant>, EngineError> {
    sqlx::query_as::<_, RestaurantRow>("SELECT * FROM restaurants WHERE id = $1")
        .bind(id.as_uuid())
        .fetch_optional(pool)
        .await?
        .map(|row| RestaurantRow::into_restaurant(row, default_currency))
        .transpose()
}

pub async fn table(pool: &PgPool, id: TableId) -> Result<Option<Table>, EngineError> {
    let row: Option<(Uuid, Uuid, String)> =
        sqlx::query_as("SELECT id, restaurant_id, table_no FROM restaurant_tables WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(id, restaurant_id, table_no)| Table {
        id: TableId::from_uuid(id),
        restaurant_id: RestaurantId::from_uuid(restaurant_id),
        table_no,
    }))
}

pub async fn product(pool: &PgPool, id: ProductId) -> Result<Option<Product>, EngineError> {
    let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
        .bind(id.as_uuid())
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Product::from))
}

pub async fn common_add_on(pool: &PgPool, name: &str) -> Result<Option<CommonAddOn>, EngineError> {
    let row: Option<(String, Decimal, bool)> = sqlx::query_as(
        "SELECT name, price, is_available FROM common_add_ons WHERE name = $1 AND is_available",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(name, price, is_available)| CommonAddOn {
        name,
        price,
        is_available,
    }))
}
