use {
    crate::domain::{
        error::EngineError,
        id::{OrderId, RefundId},
        refund::{Refund, RefundStatus},
    },
    sqlx::{PgPool, types::Json},
};

// The document is authoritative; `status` is mirrored into a column so
// updates can compare-and-set on it.

pub async fn insert(pool: &PgPool, refund: &Refund) -> Result<(), EngineError> {
    sqlx::query(
        r#"
        INSERT INTO refunds (id, order_id, restaurant_id, customer_id, status, body, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(refund.id.as_uuid())
    .bind(refund.order_id.as_uuid())
    .bind(refund.restaurant_id.as_uuid())
    .bind(refund.customer_id.as_str())
    .bind(refund.status.as_str())
    .bind(Json(refund))
    .bind(refund.created_at)
    .bind(refund.updated_at)
    .execute(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => EngineError::Conflict(format!(
            "order {} already has a refund",
            refund.order_id
        )),
        other => EngineError::Database(other),
    })?;
    Ok(())
}

pub async fn find(pool: &PgPool, id: RefundId) -> Result<Option<Refund>, EngineError> {
    let body: Option<Json<Refund>> = sqlx::query_scalar("SELECT body FROM refunds WHERE id = $1")
        .bind(id.as_uuid())
        .fetch_optional(pool)
        .await?;
    Ok(body.map(|Json(refund)| refund))
}

pub async fn for_order(pool: &PgPool, order_id: OrderId) -> Result<Vec<Refund>, EngineError> {
    let bodies: Vec<Json<Refund>> =
        sqlx::query_scalar("SELECT body FROM refunds WHERE order_id = $1 ORDER BY created_at")
            .bind(order_id.as_uuid())
            .fetch_all(pool)
            .await?;
    Ok(bodies.into_iter().map(|Json(refund)| refund).collect())
}

pub async fn update(
    pool: &PgPool,
    refund: &Refund,
    expected: RefundStatus,
) -> Result<bool, EngineError> {
    let result = sqlx::query(
        r#"
        UPDATE refunds
        SET status = $2, body = $3, updated_at = $4
        WHERE id = $1 AND status = $5
        "#,
    )
    .bind(refund.id.as_uuid())
    .bind(refund.status.as_str())
    .bind(Json(refund))
    .bind(refund.updated_at)
    .bind(expected.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete(
    pool: &PgPool,
    id: RefundId,
    allowed: &[RefundStatus],
) -> Result<bool, EngineError> {
    let allowed: Vec<&str> = allowed.iter().map(RefundStatus::as_str).collect();
    let result = sqlx::query("DELETE FROM refunds WHERE id = $1 AND status = ANY($2)")
        .bind(id.as_uuid())
        .bind(allowed)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
