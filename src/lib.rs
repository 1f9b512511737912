//! Entitlements - Freemium premium-entitlement core
//!
//! Decides whether a user may start a trial, runs trials through their
//! lifecycle, mirrors paid subscriptions from the payment gateway's webhooks
//! and sweeps stale premium flags so `is_premium` always matches the
//! subscription state it is derived from.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
