//! LicitaGo Billing - Subscription and Payment Reconciliation Engine
//!
//! This crate implements the billing backbone of the LicitaGo procurement
//! platform: subscription lifecycle (pendente, ativa, suspensa, cancelada,
//! expirada), synchronous charges against the payment provider, and
//! asynchronous reconciliation of provider webhooks.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
