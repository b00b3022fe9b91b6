use {
    super::{counter_repo::next_order_no, order_repo},
    crate::domain::{
        cart::ValidatedCart,
        error::EngineError,
        id::{GuestId, OrderId, PaymentId, RestaurantId},
        money::Currency,
        payment::{
            GatewayKind, NewPayment, Payment, PaymentLookup, PaymentSettlement, PaymentStatus,
            SettleResult,
        },
    },
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    sqlx::{PgPool, types::Json},
    uuid::Uuid,
};

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    restaurant_id: Uuid,
    guest_id: String,
    gateway: String,
    session_id: String,
    transaction_id: Option<String>,
    special_reference: Option<String>,
    status: String,
    amount: Decimal,
    currency: String,
    cart: Json<ValidatedCart>,
    order_id: Option<Uuid>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = EngineError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: PaymentId::new(row.id),
            restaurant_id: RestaurantId::from_uuid(row.restaurant_id),
            guest_id: GuestId::new(row.guest_id)?,
            gateway: GatewayKind::try_from(row.gateway.as_str())?,
            session_id: row.session_id,
            transaction_id: row.transaction_id,
            special_reference: row.special_reference,
            status: PaymentStatus::try_from(row.status.as_str())?,
            amount: row.amount,
            currency: Currency::try_from(row.currency.as_str())?,
            cart: row.cart.0,
            order_id: row.order_id.map(OrderId::from_uuid),
            paid_at: row.paid_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_payment(row: Option<PaymentRow>) -> Result<Option<Payment>, EngineError> {
    row.map(Payment::try_from).transpose()
}

pub async fn insert(pool: &PgPool, payment: &NewPayment) -> Result<Payment, EngineError> {
    let row = sqlx::query_as::<_, PaymentRow>(
        r#"
        INSERT INTO payments
            (restaurant_id, guest_id, gateway, session_id, special_reference,
             status, amount, currency, cart)
        VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(payment.restaurant_id().as_uuid())
    .bind(payment.guest_id().as_str())
    .bind(payment.gateway().as_str())
    .bind(payment.session_id())
    .bind(payment.special_reference())
    .bind(payment.amount())
    .bind(payment.currency().as_str())
    .bind(Json(payment.cart()))
    .fetch_one(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => EngineError::Conflict(format!(
            "payment session {} already exists",
            payment.session_id()
        )),
        other => EngineError::Database(other),
    })?;

    row.try_into()
}

pub async fn find_by_id(pool: &PgPool, id: PaymentId) -> Result<Option<Payment>, EngineError> {
    let row = sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE id = $1")
        .bind(id.value())
        .fetch_optional(pool)
        .await?;
    into_payment(row)
}

pub async fn find(pool: &PgPool, lookup: &PaymentLookup) -> Result<Option<Payment>, EngineError> {
    let (sql, value) = match lookup {
        PaymentLookup::Session(id) => ("SELECT * FROM payments WHERE session_id = $1", id),
        PaymentLookup::Transaction(id) => (
            "SELECT * FROM payments WHERE transaction_id = $1 ORDER BY created_at DESC LIMIT 1",
            id,
        ),
        PaymentLookup::Reference(id) => (
            "SELECT * FROM payments WHERE special_reference = $1 ORDER BY created_at DESC LIMIT 1",
            id,
        ),
    };
    let row = sqlx::query_as::<_, PaymentRow>(sql)
        .bind(value.as_str())
        .fetch_optional(pool)
        .await?;
    into_payment(row)
}

pub async fn latest_paid(
    pool: &PgPool,
    restaurant_id: RestaurantId,
    guest_id: &GuestId,
    since: Option<DateTime<Utc>>,
) -> Result<Option<Payment>, EngineError> {
    let row = sqlx::query_as::<_, PaymentRow>(
        r#"
        SELECT * FROM payments
        WHERE restaurant_id = $1 AND guest_id = $2 AND status = 'paid'
          AND ($3::timestamptz IS NULL OR created_at >= $3)
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(restaurant_id.as_uuid())
    .bind(guest_id.as_str())
    .bind(since)
    .fetch_optional(pool)
    .await?;
    into_payment(row)
}

pub async fn latest_paid_through(
    pool: &PgPool,
    restaurant_id: RestaurantId,
    guest_id: &GuestId,
    gateway: GatewayKind,
) -> Result<Option<Payment>, EngineError> {
    let row = sqlx::query_as::<_, PaymentRow>(
        r#"
        SELECT * FROM payments
        WHERE restaurant_id = $1 AND guest_id = $2 AND gateway = $3 AND status = 'paid'
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(restaurant_id.as_uuid())
    .bind(guest_id.as_str())
    .bind(gateway.as_str())
    .fetch_optional(pool)
    .await?;
    into_payment(row)
}

/// Mark paid, allocate the order number, insert the order and link it, all
/// in one transaction. The conditional UPDATE takes the row lock: a
/// concurrent settle for the same payment waits, then matches zero rows and
/// reads the order this one linked.
pub async fn settle(
    pool: &PgPool,
    settlement: &PaymentSettlement,
) -> Result<SettleResult, EngineError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SET LOCAL lock_timeout = '5s'")
        .execute(&mut *tx)
        .await?;

    let claimed: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE payments
        SET status = 'paid',
            transaction_id = COALESCE($2, transaction_id),
            paid_at = $3,
            updated_at = now()
        WHERE id = $1 AND status = 'pending' AND order_id IS NULL
        RETURNING id
        "#,
    )
    .bind(settlement.payment_id.value())
    .bind(settlement.transaction_id.as_deref())
    .bind(settlement.paid_at)
    .fetch_optional(&mut *tx)
    .await?;

    if claimed.is_none() {
        drop(tx);
        return settled_elsewhere(pool, settlement.payment_id).await;
    }

    let order_no = next_order_no(&mut tx, settlement.order.restaurant_id).await?;
    let order = order_repo::insert_with_number(&mut tx, &settlement.order, &order_no).await?;

    sqlx::query("UPDATE payments SET order_id = $2 WHERE id = $1")
        .bind(settlement.payment_id.value())
        .bind(order.id.as_uuid())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(SettleResult::Settled(order))
}

async fn settled_elsewhere(pool: &PgPool, id: PaymentId) -> Result<SettleResult, EngineError> {
    let current: Option<(String, Option<Uuid>)> =
        sqlx::query_as("SELECT status, order_id FROM payments WHERE id = $1")
            .bind(id.value())
            .fetch_optional(pool)
            .await?;

    match current {
        None => Err(EngineError::not_found(format!("payment {id} not found"))),
        Some((_, Some(order_id))) => order_repo::find(pool, OrderId::from_uuid(order_id))
            .await?
            .map(SettleResult::AlreadySettled)
            .ok_or_else(|| EngineError::not_found(format!("order {order_id} not found"))),
        Some((status, None)) => Ok(SettleResult::NotPending(PaymentStatus::try_from(
            status.as_str(),
        )?)),
    }
}

pub async fn fail(
    pool: &PgPool,
    id: PaymentId,
    transaction_id: Option<&str>,
) -> Result<bool, EngineError> {
    let result = sqlx::query(
        r#"
        UPDATE payments
        SET status = 'failed', transaction_id = COALESCE($2, transaction_id), updated_at = now()
        WHERE id = $1 AND status = 'pending' AND order_id IS NULL
        "#,
    )
    .bind(id.value())
    .bind(transaction_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn mark_refunded(pool: &PgPool, id: PaymentId) -> Result<bool, EngineError> {
    let result = sqlx::query(
        "UPDATE payments SET status = 'refunded', updated_at = now() WHERE id = $1 AND status = 'paid'",
    )
    .bind(id.value())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn expire_pending(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<PaymentId>, EngineError> {
    let ids: Vec<i64> = sqlx::query_scalar(
        r#"
        UPDATE payments
        SET status = 'failed', updated_at = now()
        WHERE status = 'pending' AND order_id IS NULL AND created_at < $1
        RETURNING id
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;
    Ok(ids.into_iter().map(PaymentId::new).collect())
}
