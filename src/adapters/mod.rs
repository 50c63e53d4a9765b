//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `events` - Event publisher implementations
//! - `http` - Axum REST API and webhook ingress
//! - `memory` - In-memory repositories and a collecting publisher for tests
//! - `mercadopago` - Payment gateway over the Mercado Pago HTTP API, plus a
//!   scripted fake that signs its own webhook deliveries
//! - `postgres` - Database repositories

pub mod events;
pub mod http;
pub mod memory;
pub mod mercadopago;
pub mod postgres;
