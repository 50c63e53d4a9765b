//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, money, errors)
//! - `payment` - Charge requests, normalized gateway results, idempotency keys
//! - `subscription` - Subscription lifecycle, state machine, reconciliation

pub mod foundation;
pub mod payment;
pub mod subscription;
