use {
    super::id::{CustomerId, OrderId, RefundId},
    super::money::Currency,
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

#[derive(Debug, Clone)]
pub struct WalletCredit {
    pub customer_id: CustomerId,
    pub amount: Decimal,
    pub currency: Currency,
    pub reason: String,
    pub order_id: OrderId,
    pub refund_id: RefundId,
}

/// Append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    pub id: Uuid,
    pub customer_id: CustomerId,
    pub amount: Decimal,
    pub currency: Currency,
    pub reason: String,
    pub order_id: OrderId,
    pub refund_id: RefundId,
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreditReceipt {
    pub transaction: WalletTransaction,
    pub new_balance: Decimal,
    /// False when the refund had already been credited.
    pub newly_applied: bool,
}
