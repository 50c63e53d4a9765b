//! Normalized provider charge outcome.
//!
//! A `PaymentResult` is built from either the synchronous charge response or
//! a webhook payload; both paths produce the same shape so reconciliation
//! cannot tell them apart.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{Money, Timestamp, ValidationError};

use super::PaymentMethod;

/// Provider charge status, normalized to a closed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    InProcess,
    Approved,
    Rejected,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    /// Returns the wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::InProcess => "in_process",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// True once the provider will not move this charge on its own.
    ///
    /// Reversals (`cancelled`/`refunded`) can still follow a final
    /// settlement, which is why staleness uses [`rank`](Self::rank), not
    /// this flag alone.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Approved
                | PaymentStatus::Rejected
                | PaymentStatus::Cancelled
                | PaymentStatus::Refunded
        )
    }

    /// Freshness rank for out-of-order webhook delivery.
    ///
    /// Delivery order is not guaranteed, so "newer" is decided by rank, never
    /// by timestamps: in-flight statuses rank below settlements, settlements
    /// below reversals. `approved` and `rejected` share a rank on purpose —
    /// they are mutually exclusive settlements of the same charge, so a
    /// conflicting second settlement is stale by definition and gets
    /// discarded (and logged) instead of guessed at.
    pub fn rank(&self) -> u8 {
        match self {
            PaymentStatus::Pending => 0,
            PaymentStatus::InProcess => 1,
            PaymentStatus::Approved | PaymentStatus::Rejected => 2,
            PaymentStatus::Cancelled | PaymentStatus::Refunded => 3,
        }
    }

    /// True if this status should replace `recorded` for the same charge.
    pub fn supersedes(&self, recorded: &PaymentStatus) -> bool {
        self.rank() > recorded.rank()
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "in_process" => Ok(PaymentStatus::InProcess),
            "approved" => Ok(PaymentStatus::Approved),
            "rejected" => Ok(PaymentStatus::Rejected),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(ValidationError::invalid_format(
                "payment_status",
                format!("unknown payment status '{}'", other),
            )),
        }
    }
}

/// Normalized outcome of a charge, from sync response or webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResult {
    /// Provider's charge id.
    pub external_id: String,
    pub status: PaymentStatus,
    pub amount: Money,
    pub method: PaymentMethod,
    /// Payer identity echoed back by the provider, when present.
    pub payer_email: Option<String>,
    /// Provider's decline/failure reason, when present.
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    /// Set iff `status` is `approved`.
    pub approved_at: Option<Timestamp>,
    pub metadata: HashMap<String, String>,
}

impl PaymentResult {
    /// Creates a result, enforcing the approved-timestamp invariant.
    pub fn new(
        external_id: impl Into<String>,
        status: PaymentStatus,
        amount: Money,
        method: PaymentMethod,
        created_at: Timestamp,
        approved_at: Option<Timestamp>,
    ) -> Result<Self, ValidationError> {
        match (status, &approved_at) {
            (PaymentStatus::Approved, None) => {
                return Err(ValidationError::invalid_format(
                    "approved_at",
                    "approved results must carry the approval timestamp",
                ));
            }
            (status, Some(_)) if status != PaymentStatus::Approved => {
                return Err(ValidationError::invalid_format(
                    "approved_at",
                    format!("not allowed for status {}", status),
                ));
            }
            _ => {}
        }

        Ok(Self {
            external_id: external_id.into(),
            status,
            amount,
            method,
            payer_email: None,
            error_message: None,
            created_at,
            approved_at,
            metadata: HashMap::new(),
        })
    }

    /// Convenience constructor for an approved charge.
    pub fn approved(
        external_id: impl Into<String>,
        amount: Money,
        method: PaymentMethod,
        approved_at: Timestamp,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            status: PaymentStatus::Approved,
            amount,
            method,
            payer_email: None,
            error_message: None,
            created_at: approved_at,
            approved_at: Some(approved_at),
            metadata: HashMap::new(),
        }
    }

    /// Convenience constructor for a rejected charge with a decline reason.
    pub fn rejected(
        external_id: impl Into<String>,
        amount: Money,
        method: PaymentMethod,
        created_at: Timestamp,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            status: PaymentStatus::Rejected,
            amount,
            method,
            payer_email: None,
            error_message: Some(reason.into()),
            created_at,
            approved_at: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_payer_email(mut self, email: impl Into<String>) -> Self {
        self.payer_email = Some(email.into());
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_approved(&self) -> bool {
        self.status == PaymentStatus::Approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL_STATUSES: [PaymentStatus; 6] = [
        PaymentStatus::Pending,
        PaymentStatus::InProcess,
        PaymentStatus::Approved,
        PaymentStatus::Rejected,
        PaymentStatus::Cancelled,
        PaymentStatus::Refunded,
    ];

    #[test]
    fn status_wire_names_roundtrip() {
        for status in ALL_STATUSES {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
    }

    #[test]
    fn final_statuses_are_exactly_the_settled_and_reversed_ones() {
        assert!(!PaymentStatus::Pending.is_final());
        assert!(!PaymentStatus::InProcess.is_final());
        assert!(PaymentStatus::Approved.is_final());
        assert!(PaymentStatus::Rejected.is_final());
        assert!(PaymentStatus::Cancelled.is_final());
        assert!(PaymentStatus::Refunded.is_final());
    }

    #[test]
    fn pending_never_supersedes_approved() {
        assert!(!PaymentStatus::Pending.supersedes(&PaymentStatus::Approved));
        assert!(PaymentStatus::Approved.supersedes(&PaymentStatus::Pending));
    }

    #[test]
    fn refunded_supersedes_approved() {
        assert!(PaymentStatus::Refunded.supersedes(&PaymentStatus::Approved));
        assert!(!PaymentStatus::Approved.supersedes(&PaymentStatus::Refunded));
    }

    #[test]
    fn conflicting_settlements_do_not_supersede_each_other() {
        assert!(!PaymentStatus::Rejected.supersedes(&PaymentStatus::Approved));
        assert!(!PaymentStatus::Approved.supersedes(&PaymentStatus::Rejected));
    }

    #[test]
    fn redelivered_status_is_stale() {
        for status in ALL_STATUSES {
            assert!(!status.supersedes(&status), "{} superseded itself", status);
        }
    }

    #[test]
    fn approved_result_requires_timestamp() {
        let result = PaymentResult::new(
            "mp-1",
            PaymentStatus::Approved,
            Money::brl(9990),
            PaymentMethod::Pix,
            Timestamp::now(),
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn non_approved_result_rejects_approval_timestamp() {
        let result = PaymentResult::new(
            "mp-1",
            PaymentStatus::Pending,
            Money::brl(9990),
            PaymentMethod::Pix,
            Timestamp::now(),
            Some(Timestamp::now()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn approved_constructor_sets_both_timestamps() {
        let now = Timestamp::now();
        let result = PaymentResult::approved("mp-1", Money::brl(9990), PaymentMethod::CreditCard, now);
        assert!(result.is_approved());
        assert_eq!(result.approved_at, Some(now));
    }

    #[test]
    fn rejected_constructor_carries_reason() {
        let result = PaymentResult::rejected(
            "mp-2",
            Money::brl(9990),
            PaymentMethod::CreditCard,
            Timestamp::now(),
            "cc_rejected_insufficient_amount",
        );
        assert_eq!(
            result.error_message.as_deref(),
            Some("cc_rejected_insufficient_amount")
        );
        assert!(result.approved_at.is_none());
    }

    proptest! {
        /// supersedes is a strict partial order: irreflexive and asymmetric.
        #[test]
        fn supersedes_is_irreflexive_and_asymmetric(
            a in 0usize..ALL_STATUSES.len(),
            b in 0usize..ALL_STATUSES.len(),
        ) {
            let (sa, sb) = (ALL_STATUSES[a], ALL_STATUSES[b]);
            prop_assert!(!sa.supersedes(&sa));
            if sa.supersedes(&sb) {
                prop_assert!(!sb.supersedes(&sa));
            }
        }

        /// Non-final statuses never supersede final ones.
        #[test]
        fn non_final_never_supersedes_final(
            a in 0usize..ALL_STATUSES.len(),
            b in 0usize..ALL_STATUSES.len(),
        ) {
            let (sa, sb) = (ALL_STATUSES[a], ALL_STATUSES[b]);
            if !sa.is_final() && sb.is_final() {
                prop_assert!(!sa.supersedes(&sb));
            }
        }
    }
}
