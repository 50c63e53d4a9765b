//! Payment method vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// How a subscription is paid.
///
/// `Gratuito` marks free-plan subscriptions that never touch the payment
/// provider; the other three are the methods the provider accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    Pix,
    Boleto,
    Gratuito,
}

impl PaymentMethod {
    /// Returns the wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::Pix => "pix",
            PaymentMethod::Boleto => "boleto",
            PaymentMethod::Gratuito => "gratuito",
        }
    }

    /// True for methods that require a tokenized card.
    pub fn requires_card_token(&self) -> bool {
        matches!(self, PaymentMethod::CreditCard)
    }

    /// True for methods that can be charged through the gateway.
    pub fn is_chargeable(&self) -> bool {
        !matches!(self, PaymentMethod::Gratuito)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "pix" => Ok(PaymentMethod::Pix),
            "boleto" => Ok(PaymentMethod::Boleto),
            "gratuito" => Ok(PaymentMethod::Gratuito),
            other => Err(ValidationError::invalid_format(
                "payment_method",
                format!("unknown payment method '{}'", other),
            )),
        }
    }
}
