/// Attempts at a conditional commit before giving up with a conflict.
pub(crate) const MAX_COMMIT_ATTEMPTS: u32 = 5;
