use {
    super::error::EngineError,
    rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive},
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Totals are compared within one hundredth of a currency unit.
pub const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

pub fn within_tolerance(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= MONEY_TOLERANCE
}

/// Amount in the gateway's minor unit (fils, piastres, cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MoneyAmount(i64);

impl MoneyAmount {
    pub fn new(minor: i64) -> Result<Self, EngineError> {
        if minor < 0 {
            return Err(EngineError::Validation(format!(
                "MoneyAmount cannot be negative, got: {minor}"
            )));
        }
        Ok(Self(minor))
    }

    /// Major units to minor units, rounding half away from zero.
    pub fn from_major(amount: Decimal, currency: Currency) -> Result<Self, EngineError> {
        let scaled = (amount * currency.minor_units_per_major())
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        let minor = scaled
            .to_i64()
            .ok_or_else(|| EngineError::Validation(format!("amount out of range: {amount}")))?;
        Self::new(minor)
    }

    pub fn minor(&self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: MoneyAmount) -> Option<MoneyAmount> {
        self.0.checked_add(other.0).map(MoneyAmount)
    }

    pub fn checked_mul(self, factor: i64) -> Option<MoneyAmount> {
        self.0
            .checked_mul(factor)
            .filter(|&v| v >= 0)
            .map(MoneyAmount)
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Aed,
    Egp,
    Sar,
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    /// ISO 4217 code, uppercase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aed => "AED",
            Self::Egp => "EGP",
            Self::Sar => "SAR",
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
        }
    }

    pub fn minor_units_per_major(&self) -> Decimal {
        Decimal::ONE_HUNDRED
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Currency {
    type Error = EngineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_uppercase().as_str() {
            "AED" => Ok(Self::Aed),
            "EGP" => Ok(Self::Egp),
            "SAR" => Ok(Self::Sar),
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            "GBP" => Ok(Self::Gbp),
            other => Err(EngineError::Validation(format!("unknown currency: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: MoneyAmount,
    currency: Currency,
}

impl Money {
    pub fn new(amount: MoneyAmount, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn from_major(amount: Decimal, currency: Currency) -> Result<Self, EngineError> {
        Ok(Self::new(MoneyAmount::from_major(amount, currency)?, currency))
    }

    pub fn amount(&self) -> MoneyAmount {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }
}

/// Rejects negative money input.
pub fn require_non_negative(value: Decimal, field: &str) -> Result<Decimal, EngineError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(EngineError::Validation(format!(
            "{field} cannot be negative, got: {value}"
        )));
    }
    Ok(value)
}
