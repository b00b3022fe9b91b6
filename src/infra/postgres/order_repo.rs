use {
    super::counter_repo::next_order_no,
    crate::domain::{
        cart::{DeliveryAddress, PricedCommonAddOn, PricedLineItem, TableRef},
        error::EngineError,
        id::{GuestId, OrderId, OrderNo, PaymentId, RequestId, RestaurantId},
        money::Currency,
        order::{
            InsertOrder, NewOrder, Order, OrderRefundSummary, OrderStatus, OrderType,
            PaymentOption,
        },
        payment::PaymentStatus,
    },
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    sqlx::{PgConnection, PgPool, types::Json},
    uuid::Uuid,
};

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_no: String,
    restaurant_id: Uuid,
    guest_id: String,
    order_type: String,
    table_ref: Option<Json<TableRef>>,
    delivery_address: Option<Json<DeliveryAddress>>,
    line_items: Json<Vec<PricedLineItem>>,
    add_ons_line_items: Json<Vec<PricedCommonAddOn>>,
    total_amount: Decimal,
    currency: String,
    payment_id: Option<i64>,
    payment_status: Option<String>,
    payment_option: Option<String>,
    is_paid: bool,
    status: String,
    cancellation_reason: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    request_id: Option<Uuid>,
    refund: Option<Json<OrderRefundSummary>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = EngineError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: OrderId::from_uuid(row.id),
            order_no: OrderNo::try_from(row.order_no)?,
            restaurant_id: RestaurantId::from_uuid(row.restaurant_id),
            guest_id: GuestId::new(row.guest_id)?,
            order_type: OrderType::try_from(row.order_type.as_str())?,
            table: row.table_ref.map(|Json(t)| t),
            delivery_address: row.delivery_address.map(|Json(a)| a),
            line_items: row.line_items.0,
            add_ons_line_items: row.add_ons_line_items.0,
            total_amount: row.total_amount,
            currency: Currency::try_from(row.currency.as_str())?,
            payment_id: row.payment_id.map(PaymentId::new),
            payment_status: row
                .payment_status
                .as_deref()
                .map(PaymentStatus::try_from)
                .transpose()?,
            payment_option: row
                .payment_option
                .as_deref()
                .map(PaymentOption::try_from)
                .transpose()?,
            is_paid: row.is_paid,
            status: OrderStatus::try_from(row.status.as_str())?,
            cancellation_reason: row.cancellation_reason,
            cancelled_at: row.cancelled_at,
            request_id: row.request_id.map(RequestId::from_uuid),
            refund: row.refund.map(|Json(r)| r),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Inserts inside the caller's transaction with an already-allocated number.
pub async fn insert_with_number(
    conn: &mut PgConnection,
    order: &NewOrder,
    order_no: &OrderNo,
) -> Result<Order, EngineError> {
    let row = sqlx::query_as::<_, OrderRow>(
        r#"
        INSERT INTO orders
            (id, order_no, restaurant_id, guest_id, order_type, table_ref, delivery_address,
             line_items, add_ons_line_items, total_amount, currency, payment_id,
             payment_status, payment_option, is_paid, status, request_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        RETURNING *
        "#,
    )
    .bind(order.id.as_uuid())
    .bind(order_no.as_str())
    .bind(order.restaurant_id.as_uuid())
    .bind(order.guest_id.as_str())
    .bind(order.order_type.as_str())
    .bind(order.table.as_ref().map(Json))
    .bind(order.delivery_address.as_ref().map(Json))
    .bind(Json(&order.line_items))
    .bind(Json(&order.add_ons_line_items))
    .bind(order.total_amount)
    .bind(order.currency.as_str())
    .bind(order.payment_id.map(|p| p.value()))
    .bind(order.payment_status.map(|s| s.as_str()))
    .bind(order.payment_option.map(|o| o.as_str()))
    .bind(order.is_paid)
    .bind(OrderStatus::OrderReceived.as_str())
    .bind(order.request_id.map(|r| r.as_uuid()))
    .fetch_one(&mut *conn)
    .await?;

    row.try_into()
}

/// Accept-path insert. A second accept of the same request, sequential or
/// concurrent, resolves to the first order via the unique `request_id`.
pub async fn insert(pool: &PgPool, order: &NewOrder) -> Result<InsertOrder, EngineError> {
    if let Some(request_id) = order.request_id {
        if let Some(existing) = find_by_request(pool, request_id).await? {
            return Ok(InsertOrder::Existing(existing));
        }
    }

    let mut tx = pool.begin().await?;
    sqlx::query("SET LOCAL lock_timeout = '5s'")
        .execute(&mut *tx)
        .await?;

    let order_no = next_order_no(&mut tx, order.restaurant_id).await?;
    match insert_with_number(&mut tx, order, &order_no).await {
        Ok(created) => {
            tx.commit().await?;
            Ok(InsertOrder::Created(created))
        }
        Err(EngineError::Database(sqlx::Error::Database(db))) if db.is_unique_violation() => {
            // Rolls back the counter increment along with the insert.
            drop(tx);
            let existing = match order.request_id {
                Some(request_id) => find_by_request(pool, request_id).await?,
                None => None,
            };
            existing
                .map(InsertOrder::Existing)
                .ok_or_else(|| EngineError::Conflict(format!("duplicate order number {order_no}")))
        }
        Err(e) => Err(e),
    }
}

async fn find_by_request(
    pool: &PgPool,
    request_id: RequestId,
) -> Result<Option<Order>, EngineError> {
    sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE request_id = $1")
        .bind(request_id.as_uuid())
        .fetch_optional(pool)
        .await?
        .map(Order::try_from)
        .transpose()
}

pub async fn find(pool: &PgPool, id: OrderId) -> Result<Option<Order>, EngineError> {
    sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
        .bind(id.as_uuid())
        .fetch_optional(pool)
        .await?
        .map(Order::try_from)
        .transpose()
}

pub async fn exists_for_guest(
    pool: &PgPool,
    restaurant_id: RestaurantId,
    guest_id: &GuestId,
) -> Result<bool, EngineError> {
    let exists = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM orders WHERE restaurant_id = $1 AND guest_id = $2)",
    )
    .bind(restaurant_id.as_uuid())
    .bind(guest_id.as_str())
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

pub async fn for_restaurant(
    pool: &PgPool,
    restaurant_id: RestaurantId,
    status: Option<OrderStatus>,
) -> Result<Vec<Order>, EngineError> {
    let rows = sqlx::query_as::<_, OrderRow>(
        r#"
        SELECT * FROM orders
        WHERE restaurant_id = $1 AND ($2::text IS NULL OR status = $2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(restaurant_id.as_uuid())
    .bind(status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Order::try_from).collect()
}

pub async fn for_guest(
    pool: &PgPool,
    restaurant_id: RestaurantId,
    guest_id: &GuestId,
) -> Result<Vec<Order>, EngineError> {
    let rows = sqlx::query_as::<_, OrderRow>(
        r#"
        SELECT * FROM orders
        WHERE restaurant_id = $1 AND guest_id = $2
        ORDER BY created_at DESC
        "#,
    )
    .bind(restaurant_id.as_uuid())
    .bind(guest_id.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Order::try_from).collect()
}

pub async fn update_status(
    pool: &PgPool,
    id: OrderId,
    expected: OrderStatus,
    next: OrderStatus,
    cancellation_reason: Option<&str>,
    at: DateTime<Utc>,
) -> Result<Option<Order>, EngineError> {
    sqlx::query_as::<_, OrderRow>(
        r#"
        UPDATE orders
        SET status = $3,
            cancellation_reason = CASE WHEN $3 = 'Cancelled' THEN $4 ELSE cancellation_reason END,
            cancelled_at = CASE WHEN $3 = 'Cancelled' THEN $5 ELSE cancelled_at END,
            updated_at = $5
        WHERE id = $1 AND status = $2
        RETURNING *
        "#,
    )
    .bind(id.as_uuid())
    .bind(expected.as_str())
    .bind(next.as_str())
    .bind(cancellation_reason)
    .bind(at)
    .fetch_optional(pool)
    .await?
    .map(Order::try_from)
    .transpose()
}

pub async fn set_refund(
    pool: &PgPool,
    id: OrderId,
    refund: Option<&OrderRefundSummary>,
) -> Result<(), EngineError> {
    let result = sqlx::query("UPDATE orders SET refund = $2, updated_at = now() WHERE id = $1")
        .bind(id.as_uuid())
        .bind(refund.map(Json))
        .execute(pool)
        .await?;
    ensure_updated(result.rows_affected(), id)
}

pub async fn set_payment_status(
    pool: &PgPool,
    id: OrderId,
    status: PaymentStatus,
) -> Result<(), EngineError> {
    let result =
        sqlx::query("UPDATE orders SET payment_status = $2, updated_at = now() WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .execute(pool)
            .await?;
    ensure_updated(result.rows_affected(), id)
}

pub async fn delete_many(
    pool: &PgPool,
    restaurant_id: RestaurantId,
    ids: &[OrderId],
) -> Result<u64, EngineError> {
    let ids: Vec<Uuid> = ids.iter().map(OrderId::as_uuid).collect();
    let result = sqlx::query("DELETE FROM orders WHERE restaurant_id = $1 AND id = ANY($2)")
        .bind(restaurant_id.as_uuid())
        .bind(ids)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

fn ensure_updated(rows: u64, id: OrderId) -> Result<(), EngineError> {
    if rows == 0 {
        return Err(EngineError::not_found(format!("order {id} not found")));
    }
    Ok(())
}
