//! Payment value objects: charge requests, normalized outcomes, idempotency.

mod idempotency;
mod method;
mod request;
mod result;

pub use idempotency::IdempotencyKey;
pub use method::PaymentMethod;
pub use request::{PaymentRequest, PaymentRequestBuilder};
pub use result::{PaymentResult, PaymentStatus};
