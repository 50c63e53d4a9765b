//! Validated transitions for lifecycle status enums.

use super::ValidationError;

/// Implemented by status enums whose transitions form a closed table.
///
/// An implementor writes the transition table once (`can_transition_to` as a
/// `matches!` over `(from, to)` pairs, `valid_transitions` as the row listing)
/// and gets the checked `transition_to` and terminality for free. Everything
/// that changes a [`crate::domain::subscription::SubscriptionStatus`] goes
/// through `transition_to`, so an unlisted pair can only ever surface as a
/// `ValidationError`, never as a silent field write.
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// True when the table has a row `self -> target`.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// All targets reachable from `self` in one step.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Checked transition; the only sanctioned way to change status.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// A state with no outgoing rows is absorbing.
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}
