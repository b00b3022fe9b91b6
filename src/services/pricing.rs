//! Cart validation and authoritative pricing.
//!
//! Every product line is re-resolved against the catalog snapshot, and the
//! recomputed grand total must agree with the client's total within
//! [`MONEY_TOLERANCE`]. A mismatch is always a hard rejection.

use {
    crate::domain::{
        cart::{
            CartLine, CommonAddOnLine, DeliveryAddress, GuestCart, PricedAddOn,
            PricedCommonAddOn, PricedLineItem, TableRef, ValidatedCart,
        },
        catalog::{Catalog, ProductSize, Restaurant},
        error::EngineError,
        id::{GuestId, RestaurantId, TableId},
        money::{MONEY_TOLERANCE, within_tolerance},
        order::{OrderType, PaymentOption},
    },
    rust_decimal::Decimal,
};

pub struct PricingRequest {
    pub restaurant_id: RestaurantId,
    pub guest_id: GuestId,
    pub payment_option: PaymentOption,
    pub cart: GuestCart,
}

pub async fn validate_cart(
    catalog: &dyn Catalog,
    request: PricingRequest,
) -> Result<ValidatedCart, EngineError> {
    let restaurant = catalog
        .restaurant(request.restaurant_id)
        .await?
        .ok_or_else(|| EngineError::not_found(format!("restaurant {} not found", request.restaurant_id)))?;
    price_cart(catalog, &restaurant, request).await
}

/// Same as [`validate_cart`] for a restaurant the caller already loaded.
pub async fn price_cart(
    catalog: &dyn Catalog,
    restaurant: &Restaurant,
    request: PricingRequest,
) -> Result<ValidatedCart, EngineError> {
    let PricingRequest {
        guest_id,
        payment_option,
        cart,
        ..
    } = request;

    if payment_option == PaymentOption::PayNow {
        ensure_online_payment(restaurant)?;
    }
    if cart.is_empty() {
        return Err(EngineError::validation("cart is empty"));
    }

    let order_type = OrderType::try_from(cart.order_type.as_str())?;
    let (table, delivery_address) =
        resolve_destination(catalog, restaurant.id, order_type, cart.table_id, cart.delivery_address)
            .await?;

    if !order_type.allowed_payment_options().contains(&payment_option) {
        return Err(EngineError::Validation(format!(
            "payment option {payment_option} is not available for {order_type} orders"
        )));
    }

    let mut line_items = Vec::with_capacity(cart.line_items.len());
    for input in cart.line_items {
        let line = CartLine::try_from(input)?;
        line_items.push(price_line(catalog, restaurant.id, line).await?);
    }

    let mut add_ons_line_items = Vec::with_capacity(cart.add_ons_line_items.len());
    for input in cart.add_ons_line_items {
        let line = CommonAddOnLine::try_from(input)?;
        add_ons_line_items.push(price_common_add_on(catalog, line).await?);
    }

    let calculated: Decimal = line_items.iter().map(|l| l.item_total).sum::<Decimal>()
        + add_ons_line_items.iter().map(|a| a.item_total).sum::<Decimal>();

    if !within_tolerance(calculated, cart.total_amount) {
        tracing::warn!(
            restaurant_id = %restaurant.id,
            %calculated,
            submitted = %cart.total_amount,
            tolerance = %MONEY_TOLERANCE,
            "cart total mismatch"
        );
        return Err(EngineError::Conflict(format!(
            "Total amount mismatch. Calculated: {calculated}, Cart total: {}",
            cart.total_amount
        )));
    }

    Ok(ValidatedCart {
        restaurant_id: restaurant.id,
        guest_id,
        order_type,
        payment_option,
        table,
        delivery_address,
        line_items,
        add_ons_line_items,
        total_amount: calculated,
        original_amount: calculated,
        discount_amount: Decimal::ZERO,
        shipping_charge: Decimal::ZERO,
        currency: restaurant.currency,
        skip_payment: payment_option != PaymentOption::PayNow,
    })
}

fn ensure_online_payment(restaurant: &Restaurant) -> Result<(), EngineError> {
    if !restaurant.subscription.allows_online_payment() {
        return Err(EngineError::validation(
            "online payment is only available on the advanced plan",
        ));
    }
    let settings = &restaurant.payment_settings;
    if !settings.is_payment_enabled {
        return Err(EngineError::validation(
            "online payment is not enabled for this restaurant",
        ));
    }
    if settings.selected_gateway.is_none() {
        return Err(EngineError::validation(
            "no payment gateway selected for this restaurant",
        ));
    }
    Ok(())
}

async fn resolve_destination(
    catalog: &dyn Catalog,
    restaurant_id: RestaurantId,
    order_type: OrderType,
    table_id: Option<TableId>,
    delivery_address: Option<DeliveryAddress>,
) -> Result<(Option<TableRef>, Option<DeliveryAddress>), EngineError> {
    match order_type {
        OrderType::DineIn => {
            let table_id = table_id
                .ok_or_else(|| EngineError::validation("table is required for Dine-In orders"))?;
            let table = catalog
                .table(table_id)
                .await?
                .filter(|t| t.restaurant_id == restaurant_id)
                .ok_or_else(|| EngineError::validation("table does not belong to this restaurant"))?;
            let table = TableRef {
                id: table.id,
                table_no: table.table_no,
            };
            Ok((Some(table), delivery_address))
        }
        OrderType::HomeDelivery | OrderType::TakeAway => {
            let address = delivery_address
                .filter(|a| !a.name.trim().is_empty() && !a.phone.number.trim().is_empty())
                .ok_or_else(|| {
                    EngineError::Validation(format!(
                        "delivery address with name and phone is required for {order_type} orders"
                    ))
                })?;
            Ok((None, Some(address)))
        }
    }
}

async fn price_line(
    catalog: &dyn Catalog,
    restaurant_id: RestaurantId,
    line: CartLine,
) -> Result<PricedLineItem, EngineError> {
    let product_id = line.product_id();
    let product = catalog
        .product(product_id)
        .await?
        .ok_or_else(|| EngineError::not_found(format!("product {product_id} not found")))?;

    if product.restaurant_id != restaurant_id {
        return Err(EngineError::Validation(format!(
            "product {} does not belong to this restaurant",
            product.name
        )));
    }
    if !product.is_available {
        return Err(EngineError::Validation(format!(
            "product {} is not available",
            product.name
        )));
    }

    let size: Option<&ProductSize> = match line.size() {
        Some(name) => {
            let size = product.size(name).ok_or_else(|| {
                EngineError::Validation(format!("size {name} is not offered for {}", product.name))
            })?;
            if !size.is_available {
                return Err(EngineError::Validation(format!(
                    "size {name} of {} is not available",
                    product.name
                )));
            }
            Some(size)
        }
        None => None,
    };

    let add_ons = line
        .add_ons()
        .iter()
        .map(|name| {
            let add_on = product.add_on(name).ok_or_else(|| {
                EngineError::Validation(format!("add-on {name} is not offered for {}", product.name))
            })?;
            if !add_on.is_available {
                return Err(EngineError::Validation(format!(
                    "add-on {name} of {} is not available",
                    product.name
                )));
            }
            Ok(PricedAddOn {
                name: add_on.name.clone(),
                price: add_on.price,
            })
        })
        .collect::<Result<Vec<_>, EngineError>>()?;

    let (base_price, item_subtotal, item_total) = match &line {
        CartLine::LegacyPriced { pricing, .. } => {
            (pricing.base_price, pricing.item_subtotal, pricing.item_total)
        }
        CartLine::SizedWithAddOns { quantity, .. } => {
            let base = size
                .map(ProductSize::effective_price)
                .unwrap_or_else(|| product.effective_price());
            let subtotal = base + add_ons.iter().map(|a| a.price).sum::<Decimal>();
            (base, subtotal, subtotal * Decimal::from(*quantity))
        }
    };

    Ok(PricedLineItem {
        product_id,
        product_name: product.name.clone(),
        quantity: line.quantity(),
        selected_size: line.size().map(str::to_string),
        add_ons,
        comments: line.comments().map(str::to_string),
        base_price,
        item_subtotal,
        item_total,
    })
}

async fn price_common_add_on(
    catalog: &dyn Catalog,
    line: CommonAddOnLine,
) -> Result<PricedCommonAddOn, EngineError> {
    let add_on = catalog
        .common_add_on(&line.name)
        .await?
        .filter(|a| a.is_available)
        .ok_or_else(|| {
            EngineError::Validation(format!("common add-on {} is not available", line.name))
        })?;

    Ok(PricedCommonAddOn {
        name: add_on.name,
        quantity: line.quantity,
        price: add_on.price,
        item_total: add_on.price * Decimal::from(line.quantity),
    })
}
