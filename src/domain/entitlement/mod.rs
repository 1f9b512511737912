//! Entitlement domain: per-user premium state and the rules around it.

mod audit;
mod device;
mod eligibility;
mod errors;
mod notification;
mod record;
mod rejection;
mod status;

pub use audit::{AuditCause, AuditEntry};
pub use device::TrialDeviceBinding;
pub use eligibility::{Eligibility, EligibilityPolicy, IneligibleReason};
pub use errors::EntitlementError;
pub use notification::{Notification, NotificationKind};
pub use record::{normalize_email, EntitlementRecord, TrialStatusView, Transition};
pub use rejection::{SubscriptionRejection, TrialRejection};
pub use status::SubscriptionStatus;
