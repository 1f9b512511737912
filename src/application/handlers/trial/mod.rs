//! Trial handlers: eligibility, start, conversion, extension and status.

mod check_eligibility;
mod convert_trial;
mod ensure_entitlement;
mod extend_trial;
mod get_trial_status;
mod start_trial;

pub use check_eligibility::{CheckEligibilityHandler, CheckEligibilityQuery};
pub use convert_trial::{ConvertTrialCommand, ConvertTrialHandler, ConvertTrialOutcome};
pub use ensure_entitlement::{EnsureEntitlementCommand, EnsureEntitlementHandler};
pub use extend_trial::{ExtendTrialCommand, ExtendTrialHandler, ExtendTrialOutcome};
pub use get_trial_status::{GetTrialStatusHandler, GetTrialStatusQuery};
pub use start_trial::{StartTrialCommand, StartTrialHandler, StartTrialOutcome};
