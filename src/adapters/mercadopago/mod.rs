//! Mercado Pago gateway integration.
//!
//! - [`MercadoPagoAdapter`] - HTTPS adapter implementing the
//!   [`PaymentGateway`](crate::ports::PaymentGateway) port
//! - [`MercadoPagoConfig`] - credentials, endpoint, and timeout settings
//! - [`FakeMercadoPago`] - scripted fake speaking the same wire format and
//!   signature scheme, for contract and end-to-end tests

mod adapter;
mod fake;
mod wire;

pub use adapter::{MercadoPagoAdapter, MercadoPagoConfig};
pub use fake::{FakeMercadoPago, ScriptedOutcome};
pub use wire::{SignatureHeader, SignatureParseError};
