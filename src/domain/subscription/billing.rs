//! Billing cycles and pro-ration math.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{Money, MoneyError, Timestamp, ValidationError};

/// How often a subscription is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Annual,
}

impl BillingCycle {
    /// Length of one billed period in days.
    pub fn period_days(&self) -> i64 {
        match self {
            BillingCycle::Monthly => 30,
            BillingCycle::Annual => 365,
        }
    }

    /// Returns the wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Annual => "annual",
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BillingCycle {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(BillingCycle::Monthly),
            "annual" => Ok(BillingCycle::Annual),
            other => Err(ValidationError::invalid_format(
                "billing_cycle",
                format!("unknown billing cycle '{}'", other),
            )),
        }
    }
}

/// Credit for the unused remainder of the current period.
///
/// Whole days between `now` and `period_end`, clamped to the cycle length,
/// scaled against what was paid for the period. A period already past yields
/// zero credit.
pub fn proration_credit(
    amount_paid: Money,
    period_end: &Timestamp,
    now: &Timestamp,
    cycle: BillingCycle,
) -> Result<Money, MoneyError> {
    let remaining = now.days_until(period_end).clamp(0, cycle.period_days());
    amount_paid.prorated(remaining, cycle.period_days())
}
