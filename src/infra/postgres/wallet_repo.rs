use {
    crate::domain::{
        error::EngineError,
        id::{CustomerId, OrderId, RefundId},
        money::Currency,
        wallet::{CreditReceipt, WalletCredit, WalletTransaction},
    },
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    sqlx::PgPool,
    uuid::Uuid,
};

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    customer_id: String,
    amount: Decimal,
    currency: String,
    reason: String,
    order_id: Uuid,
    refund_id: Uuid,
    balance_after: Decimal,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for WalletTransaction {
    type Error = EngineError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(WalletTransaction {
            id: row.id,
            customer_id: CustomerId::new(row.customer_id)?,
            amount: row.amount,
            currency: Currency::try_from(row.currency.as_str())?,
            reason: row.reason,
            order_id: OrderId::from_uuid(row.order_id),
            refund_id: RefundId::from_uuid(row.refund_id),
            balance_after: row.balance_after,
            created_at: row.created_at,
        })
    }
}

/// Balance increment and ledger insert in one transaction. The unique
/// `refund_id` makes a second credit for the same refund a no-op: the
/// loser rolls back its increment and gets the first transaction back.
pub async fn credit(pool: &PgPool, credit: &WalletCredit) -> Result<CreditReceipt, EngineError> {
    if let Some(existing) = by_refund(pool, credit.refund_id).await? {
        return already_applied(pool, existing).await;
    }

    let mut tx = pool.begin().await?;
    sqlx::query("SET LOCAL lock_timeout = '5s'")
        .execute(&mut *tx)
        .await?;

    let balance: Decimal = sqlx::query_scalar(
        r#"
        INSERT INTO wallets (customer_id, balance, updated_at)
        VALUES ($1, $2, now())
        ON CONFLICT (customer_id)
        DO UPDATE SET balance = wallets.balance + EXCLUDED.balance, updated_at = now()
        RETURNING balance
        "#,
    )
    .bind(credit.customer_id.as_str())
    .bind(credit.amount)
    .fetch_one(&mut *tx)
    .await?;

    let inserted = sqlx::query_as::<_, TransactionRow>(
        r#"
        INSERT INTO wallet_transactions
            (id, customer_id, amount, currency, reason, order_id, refund_id, balance_after)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (refund_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(credit.customer_id.as_str())
    .bind(credit.amount)
    .bind(credit.currency.as_str())
    .bind(&credit.reason)
    .bind(credit.order_id.as_uuid())
    .bind(credit.refund_id.as_uuid())
    .bind(balance)
    .fetch_optional(&mut *tx)
    .await?;

    match inserted {
        Some(row) => {
            tx.commit().await?;
            Ok(CreditReceipt {
                transaction: row.try_into()?,
                new_balance: balance,
                newly_applied: true,
            })
        }
        None => {
            tx.rollback().await?;
            let existing = by_refund(pool, credit.refund_id)
                .await?
                .ok_or_else(|| {
                    EngineError::conflict(format!(
                        "wallet credit for refund {} vanished",
                        credit.refund_id
                    ))
                })?;
            already_applied(pool, existing).await
        }
    }
}

async fn already_applied(
    pool: &PgPool,
    transaction: WalletTransaction,
) -> Result<CreditReceipt, EngineError> {
    let new_balance = balance(pool, &transaction.customer_id).await?;
    Ok(CreditReceipt {
        transaction,
        new_balance,
        newly_applied: false,
    })
}

async fn by_refund(
    pool: &PgPool,
    refund_id: RefundId,
) -> Result<Option<WalletTransaction>, EngineError> {
    sqlx::query_as::<_, TransactionRow>("SELECT * FROM wallet_transactions WHERE refund_id = $1")
        .bind(refund_id.as_uuid())
        .fetch_optional(pool)
        .await?
        .map(WalletTransaction::try_from)
        .transpose()
}

pub async fn balance(pool: &PgPool, customer_id: &CustomerId) -> Result<Decimal, EngineError> {
    let balance: Option<Decimal> =
        sqlx::query_scalar("SELECT balance FROM wallets WHERE customer_id = $1")
            .bind(customer_id.as_str())
            .fetch_optional(pool)
            .await?;
    Ok(balance.unwrap_or(Decimal::ZERO))
}
