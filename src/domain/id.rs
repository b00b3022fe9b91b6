use {
    super::error::EngineError,
    derive_more::{Display, From},
    serde::{Deserialize, Serialize},
    std::str::FromStr,
    uuid::Uuid,
};

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Fresh time-ordered id.
            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl FromStr for $name {
            type Err = EngineError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self).map_err(|_| {
                    EngineError::Validation(format!(concat!("invalid ", $label, ": {}"), s))
                })
            }
        }
    };
}

uuid_id!(RestaurantId, "restaurant id");
uuid_id!(OrderId, "order id");
uuid_id!(RefundId, "refund id");
uuid_id!(TableId, "table id");
uuid_id!(ProductId, "product id");
uuid_id!(
    /// Correlates an unpersisted pay-later request with the order created on accept.
    RequestId,
    "request id"
);

/// Auto-incrementing payment identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PaymentId(i64);

impl PaymentId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

const MAX_SESSION_ID_LEN: usize = 128;

/// Ephemeral guest session identity. Not a registered account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GuestId(String);

impl GuestId {
    pub fn new(id: impl Into<String>) -> Result<Self, EngineError> {
        let id = id.into().trim().to_string();
        if id.is_empty() || id.len() > MAX_SESSION_ID_LEN {
            return Err(EngineError::Validation(format!("invalid guest id: {id:?}")));
        }
        Ok(Self(id))
    }

    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for GuestId {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GuestId> for String {
    fn from(id: GuestId) -> Self {
        id.0
    }
}

/// Identity a refund or wallet credit is owed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CustomerId(String);

impl CustomerId {
    pub fn new(id: impl Into<String>) -> Result<Self, EngineError> {
        let id = id.into().trim().to_string();
        if id.is_empty() || id.len() > MAX_SESSION_ID_LEN {
            return Err(EngineError::Validation(format!("invalid customer id: {id:?}")));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&GuestId> for CustomerId {
    fn from(guest: &GuestId) -> Self {
        Self(guest.as_str().to_string())
    }
}

impl TryFrom<String> for CustomerId {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CustomerId> for String {
    fn from(id: CustomerId) -> Self {
        id.0
    }
}

/// Restaurant-scoped human-readable order number, `O<seq>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNo(String);

impl OrderNo {
    pub fn from_sequence(seq: i64) -> Result<Self, EngineError> {
        if seq < 1 {
            return Err(EngineError::Validation(format!(
                "order sequence must be positive, got: {seq}"
            )));
        }
        Ok(Self(format!("O{seq}")))
    }

    pub fn sequence(&self) -> i64 {
        // Constructors guarantee the `O<digits>` shape.
        self.0[1..].parse().unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OrderNo {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let seq = value
            .strip_prefix('O')
            .and_then(|digits| digits.parse::<i64>().ok())
            .ok_or_else(|| EngineError::Validation(format!("invalid order number: {value}")))?;
        Self::from_sequence(seq)
    }
}

impl From<OrderNo> for String {
    fn from(no: OrderNo) -> Self {
        no.0
    }
}
