//! Notification adapters.
//!
//! - `TracingNotifier` - writes notifications to the log only
//! - `PostgresNotifier` - inserts into the `notifications` queue table

mod postgres;
mod tracing_notifier;

pub use postgres::PostgresNotifier;
pub use tracing_notifier::TracingNotifier;
