use {
    crate::domain::{
        error::EngineError,
        id::{OrderNo, RestaurantId},
    },
    sqlx::PgConnection,
};

/// Upsert-increment. The first order for a restaurant creates the row; two
/// concurrent first orders serialize on the conflict target instead of failing.
pub async fn next_order_no(
    conn: &mut PgConnection,
    restaurant_id: RestaurantId,
) -> Result<OrderNo, EngineError> {
    let seq: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO order_counters (restaurant_id, seq)
        VALUES ($1, 1)
        ON CONFLICT (restaurant_id) DO UPDATE SET seq = order_counters.seq + 1
        RETURNING seq
        "#,
    )
    .bind(restaurant_id.as_uuid())
    .fetch_one(&mut *conn)
    .await?;

    OrderNo::from_sequence(seq)
}
