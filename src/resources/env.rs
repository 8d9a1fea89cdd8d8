use std::time::Duration;

use crate::constants::{DEFAULT_TAG_KEY_PREFIX, ENV_FORCE_RECONCILE_TIMEOUT, ENV_TAG_KEY_PREFIX};

/// Reconcile interval forced through `ENV_FORCE_RECONCILE_TIMEOUT`, else `default`
///
/// Read on every call so the override can be changed without a restart.
#[must_use]
pub fn forced_reconcile_time_or_default(default: Duration) -> Duration {
    parse_forced_reconcile_time(
        std::env::var(ENV_FORCE_RECONCILE_TIMEOUT).ok().as_deref(),
        default,
    )
}

/// Interpret a raw override value as whole seconds
///
/// Absent or unparseable values yield `default`.
#[must_use]
pub fn parse_forced_reconcile_time(raw: Option<&str>, default: Duration) -> Duration {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

/// Prefix for labels and tags written by the operator
#[must_use]
pub fn organization_tag() -> String {
    std::env::var(ENV_TAG_KEY_PREFIX).unwrap_or_else(|_| DEFAULT_TAG_KEY_PREFIX.to_string())
}
