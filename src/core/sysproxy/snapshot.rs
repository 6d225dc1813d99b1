//! Pre-change settings captured at enable time

use super::errors::StoreResult;
use std::fmt;

/// Display form of [`PriorValue::Absent`]
pub const ABSENCE_SENTINEL: &str = "<NotExist>";

/// Prior state of a string value: either absent, or present with its contents
///
/// Restore deletes an `Absent` value and rewrites a `Present` one, so an
/// empty string and a missing value survive a round trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PriorValue {
    #[default]
    Absent,
    Present(String),
}

impl PriorValue {
    /// Record the outcome of a read; any read failure counts as absent
    pub fn from_read(read: StoreResult<String>) -> Self {
        match read {
            Ok(value) => PriorValue::Present(value),
            Err(_) => PriorValue::Absent,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, PriorValue::Absent)
    }

    pub fn as_deref(&self) -> Option<&str> {
        match self {
            PriorValue::Absent => None,
            PriorValue::Present(v) => Some(v),
        }
    }
}

/// Renders `Absent` as [`ABSENCE_SENTINEL`]. A present value that happens to
/// equal the sentinel renders identically; only the variant is authoritative.
impl fmt::Display for PriorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorValue::Absent => f.write_str(ABSENCE_SENTINEL),
            PriorValue::Present(v) => f.write_str(v),
        }
    }
}

/// Settings as they were before the local proxy was applied
///
/// Owned by the caller for the duration the proxy is active, filled by the
/// enable operations and read back by the matching disable operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Previous `ProxyEnable` flag, 0 if unreadable
    pub proxy_enabled: u32,
    pub proxy_server_prior: PriorValue,
    pub proxy_override_prior: PriorValue,
    pub http_proxy_env_prior: PriorValue,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }
}
