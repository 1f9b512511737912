//! Domain layer: pure entitlement logic, no I/O.

pub mod billing;
pub mod entitlement;
pub mod foundation;
