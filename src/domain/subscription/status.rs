//! Subscription status state machine.
//!
//! Defines all subscription states and valid transitions in the billing
//! lifecycle. The Portuguese wire names are the platform's canonical
//! vocabulary and are preserved in serialization and storage.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Subscription lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    /// Awaiting first payment confirmation. No access.
    #[serde(rename = "pendente")]
    Pending,

    /// Paid (or free plan) with full access.
    #[serde(rename = "ativa")]
    Active,

    /// Payment rejected or reversed. Access blocked until a retry succeeds.
    #[serde(rename = "suspensa")]
    Suspended,

    /// Explicitly cancelled by the tenant or an operator. Absorbing.
    #[serde(rename = "cancelada")]
    Cancelled,

    /// Grace period elapsed with no successful renewal. Absorbing.
    #[serde(rename = "expirada")]
    Expired,
}

impl SubscriptionStatus {
    /// Returns the canonical wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pendente",
            SubscriptionStatus::Active => "ativa",
            SubscriptionStatus::Suspended => "suspensa",
            SubscriptionStatus::Cancelled => "cancelada",
            SubscriptionStatus::Expired => "expirada",
        }
    }

    /// Returns true if this status grants access to the platform.
    ///
    /// Only `ativa` grants access; the stored status is advisory, so callers
    /// gating tenants must combine this with the time-based expiry predicate
    /// on the aggregate.
    pub fn has_access(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            // From PENDENTE
            (Pending, Active) // first payment approved
                | (Pending, Suspended) // first payment rejected
            // From ATIVA
                | (Active, Active) // renewal extends the period
                | (Active, Suspended) // refund/chargeback reversal
                | (Active, Cancelled)
                | (Active, Expired) // grace elapsed
            // From SUSPENSA
                | (Suspended, Active) // retry succeeded
                | (Suspended, Cancelled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Pending => vec![Active, Suspended],
            Active => vec![Active, Suspended, Cancelled, Expired],
            Suspended => vec![Active, Cancelled],
            Cancelled => vec![],
            Expired => vec![],
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pendente" => Ok(SubscriptionStatus::Pending),
            "ativa" => Ok(SubscriptionStatus::Active),
            "suspensa" => Ok(SubscriptionStatus::Suspended),
            "cancelada" => Ok(SubscriptionStatus::Cancelled),
            "expirada" => Ok(SubscriptionStatus::Expired),
            other => Err(ValidationError::invalid_format(
                "subscription_status",
                format!("unknown subscription status '{}'", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SubscriptionStatus; 5] = [
        SubscriptionStatus::Pending,
        SubscriptionStatus::Active,
        SubscriptionStatus::Suspended,
        SubscriptionStatus::Cancelled,
        SubscriptionStatus::Expired,
    ];

    #[test]
    fn pending_can_activate_or_suspend() {
        let status = SubscriptionStatus::Pending;
        assert!(status.can_transition_to(&SubscriptionStatus::Active));
        assert!(status.can_transition_to(&SubscriptionStatus::Suspended));
    }

    #[test]
    fn pending_cannot_be_cancelled_or_expired() {
        let status = SubscriptionStatus::Pending;
        assert!(!status.can_transition_to(&SubscriptionStatus::Cancelled));
        assert!(!status.can_transition_to(&SubscriptionStatus::Expired));
    }

    #[test]
    fn active_can_renew_into_active() {
        assert!(SubscriptionStatus::Active.can_transition_to(&SubscriptionStatus::Active));
    }

    #[test]
    fn active_can_suspend_cancel_or_expire() {
        let status = SubscriptionStatus::Active;
        assert!(status.can_transition_to(&SubscriptionStatus::Suspended));
        assert!(status.can_transition_to(&SubscriptionStatus::Cancelled));
        assert!(status.can_transition_to(&SubscriptionStatus::Expired));
    }

    #[test]
    fn suspended_can_recover_or_be_cancelled() {
        let status = SubscriptionStatus::Suspended;
        assert!(status.can_transition_to(&SubscriptionStatus::Active));
        assert!(status.can_transition_to(&SubscriptionStatus::Cancelled));
        assert!(!status.can_transition_to(&SubscriptionStatus::Expired));
        assert!(!status.can_transition_to(&SubscriptionStatus::Pending));
    }

    #[test]
    fn cancelled_and_expired_are_absorbing() {
        for terminal in [SubscriptionStatus::Cancelled, SubscriptionStatus::Expired] {
            assert!(terminal.is_terminal());
            for target in ALL {
                assert!(
                    !terminal.can_transition_to(&target),
                    "{} must not leave terminal state for {}",
                    terminal,
                    target
                );
            }
        }
    }

    #[test]
    fn transition_to_rejects_unlisted_pairs() {
        assert!(SubscriptionStatus::Expired
            .transition_to(SubscriptionStatus::Active)
            .is_err());
        assert!(SubscriptionStatus::Cancelled
            .transition_to(SubscriptionStatus::Active)
            .is_err());
        assert!(SubscriptionStatus::Suspended
            .transition_to(SubscriptionStatus::Expired)
            .is_err());
    }

    #[test]
    fn only_active_grants_access() {
        assert!(SubscriptionStatus::Active.has_access());
        assert!(!SubscriptionStatus::Pending.has_access());
        assert!(!SubscriptionStatus::Suspended.has_access());
        assert!(!SubscriptionStatus::Cancelled.has_access());
        assert!(!SubscriptionStatus::Expired.has_access());
    }

    #[test]
    fn serde_uses_portuguese_wire_names() {
        assert_eq!(
            serde_json::to_string(&SubscriptionStatus::Active).unwrap(),
            "\"ativa\""
        );
        let parsed: SubscriptionStatus = serde_json::from_str("\"suspensa\"").unwrap();
        assert_eq!(parsed, SubscriptionStatus::Suspended);
    }

    #[test]
    fn wire_names_roundtrip_through_from_str() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<SubscriptionStatus>().unwrap(), status);
        }
    }

    #[test]
    fn can_transition_to_is_consistent_with_valid_transitions() {
        for status in ALL {
            for target in ALL {
                assert_eq!(
                    status.can_transition_to(&target),
                    status.valid_transitions().contains(&target),
                    "inconsistent tables for {:?} -> {:?}",
                    status,
                    target
                );
            }
        }
    }
}
