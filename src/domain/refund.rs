use {
    super::audit::NewAuditEntry,
    super::error::EngineError,
    super::id::{CustomerId, OrderId, RefundId, RestaurantId},
    super::money::Currency,
    super::payment::GatewayKind,
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Processing,
    PaymentInitiated,
    PaymentFailed,
    Completed,
    Failed,
    Cancelled,
}

impl RefundStatus {
    pub const ALL: [RefundStatus; 7] = [
        Self::Pending,
        Self::Processing,
        Self::PaymentInitiated,
        Self::PaymentFailed,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::PaymentInitiated => "payment_initiated",
            Self::PaymentFailed => "payment_failed",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn is_deletable(&self) -> bool {
        matches!(self, Self::Pending | Self::Cancelled)
    }

    /// `payment_failed` may retry initiation or go back to processing;
    /// `failed` may only be re-processed.
    pub fn can_transition_to(&self, next: &RefundStatus) -> bool {
        use RefundStatus::*;
        if *next == Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, PaymentInitiated)
                | (Processing, PaymentFailed)
                | (Processing, Failed)
                | (PaymentFailed, PaymentInitiated)
                | (PaymentFailed, PaymentFailed)
                | (PaymentFailed, Processing)
                | (PaymentFailed, Failed)
                | (Failed, Processing)
                | (PaymentInitiated, Completed)
        )
    }
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for RefundStatus {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| EngineError::Validation(format!("unknown refund status: {s}")))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RefundMethod {
    Stripe,
    Paymob,
    Wallet,
    Manual,
    BankTransfer,
}

impl RefundMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Paymob => "paymob",
            Self::Wallet => "wallet",
            Self::Manual => "manual",
            Self::BankTransfer => "bank_transfer",
        }
    }

    /// The card gateway this method refunds through, if any.
    pub fn gateway(&self) -> Option<GatewayKind> {
        match self {
            Self::Stripe => Some(GatewayKind::Stripe),
            Self::Paymob => Some(GatewayKind::Paymob),
            Self::Wallet | Self::Manual | Self::BankTransfer => None,
        }
    }
}

impl fmt::Display for RefundMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for RefundMethod {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "stripe" => Ok(Self::Stripe),
            "paymob" => Ok(Self::Paymob),
            "wallet" => Ok(Self::Wallet),
            "manual" => Ok(Self::Manual),
            "bank_transfer" => Ok(Self::BankTransfer),
            other => Err(EngineError::Validation(format!(
                "unknown refund method: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefundType {
    Full,
    Partial,
}

impl RefundType {
    pub fn for_amount(refund_amount: Decimal, order_total: Decimal) -> Self {
        if refund_amount < order_total {
            Self::Partial
        } else {
            Self::Full
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Partial => "partial",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankDetails {
    #[serde(default)]
    pub bank_name: String,
    #[serde(default)]
    pub account_holder_name: String,
    #[serde(default)]
    pub account_number: String,
    #[serde(default)]
    pub iban: Option<String>,
    #[serde(default)]
    pub swift_code: Option<String>,
    #[serde(default)]
    pub branch_code: Option<String>,
    #[serde(default)]
    pub routing_number: Option<String>,
}

impl BankDetails {
    pub fn ensure_complete(&self) -> Result<(), EngineError> {
        let missing: Vec<&str> = [
            ("bankName", &self.bank_name),
            ("accountHolderName", &self.account_holder_name),
            ("accountNumber", &self.account_number),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Validation(format!(
                "incomplete bank details, missing: {}",
                missing.join(", ")
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationKind {
    Email,
    Sms,
    Notification,
    AdminNote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationEntry {
    pub kind: CommunicationKind,
    pub message: String,
    pub sent_by: String,
    pub sent_at: DateTime<Utc>,
}

/// Correlation ids returned by the gateway or wallet for a refund.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundReferences {
    pub gateway_refund_id: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub wallet_transaction_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Refund {
    pub id: RefundId,
    pub order_id: OrderId,
    pub restaurant_id: RestaurantId,
    pub customer_id: CustomerId,
    pub refund_type: RefundType,
    pub refund_method: Option<RefundMethod>,
    pub original_amount: Decimal,
    pub refund_amount: Decimal,
    pub currency: Currency,
    pub status: RefundStatus,
    pub reason: String,
    pub references: RefundReferences,
    pub bank_details: Option<BankDetails>,
    pub admin_notes: Option<String>,
    pub failure_reason: Option<String>,
    pub communication_log: Vec<CommunicationEntry>,
    pub processed_by: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Refund {
    pub fn transition_status(
        &mut self,
        new: RefundStatus,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if !self.status.can_transition_to(&new) {
            return Err(EngineError::Conflict(format!(
                "invalid refund status transition: {} → {}",
                self.status, new
            )));
        }

        self.status = new;
        self.updated_at = now;
        if new == RefundStatus::Completed {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    pub fn log(
        &mut self,
        kind: CommunicationKind,
        message: impl Into<String>,
        sent_by: &str,
        now: DateTime<Utc>,
    ) {
        self.communication_log.push(CommunicationEntry {
            kind,
            message: message.into(),
            sent_by: sent_by.to_string(),
            sent_at: now,
        });
    }

    pub fn audit_entry(&self, actor: &str, action: &str, from: RefundStatus) -> NewAuditEntry {
        NewAuditEntry {
            id: Uuid::now_v7(),
            entity_type: "refund".to_string(),
            entity_id: self.id.to_string(),
            action: action.to_string(),
            actor: actor.to_string(),
            detail: serde_json::json!({
                "order_id": self.order_id,
                "old_status": from.as_str(),
                "new_status": self.status.as_str(),
                "method": self.refund_method.map(|m| m.as_str()),
                "amount": self.refund_amount,
            }),
        }
    }
}
