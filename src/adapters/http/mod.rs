//! HTTP adapters - REST API implementations.
//!
//! The billing module owns the whole HTTP surface: subscription API plus
//! the payment provider webhook ingress.

pub mod billing;

// Re-export key types for convenience
pub use billing::billing_router;
pub use billing::BillingAppState;
