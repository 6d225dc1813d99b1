//! Error types for settings store access and proxy toggling

use std::fmt;
use std::io;

use super::state::Mechanism;

/// Errors raised by a settings store backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Key or value does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller lacks permission to open or modify the key
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Value exists but holds a different type than requested
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Any other backend failure
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not_found",
            StoreError::AccessDenied(_) => "access_denied",
            StoreError::TypeMismatch(_) => "type_mismatch",
            StoreError::Backend(_) => "backend",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        let msg = err.to_string();
        match err.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(msg),
            io::ErrorKind::PermissionDenied => StoreError::AccessDenied(msg),
            io::ErrorKind::InvalidData => StoreError::TypeMismatch(msg),
            _ => StoreError::Backend(msg),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Kind of store mutation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    Set,
    Delete,
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationOp::Set => write!(f, "set"),
            MutationOp::Delete => write!(f, "delete"),
        }
    }
}

/// A single failed write or delete against the settings store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationFailure {
    pub key_path: String,
    pub value_name: String,
    pub op: MutationOp,
    pub error: StoreError,
}

impl fmt::Display for MutationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}\\{}: {}",
            self.op, self.key_path, self.value_name, self.error
        )
    }
}

/// Errors surfaced by the settings toggler
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SysProxyError {
    /// The settings key could not be opened; nothing was read or written
    #[error("settings key unavailable for {mechanism}: {path}: {source}")]
    StoreUnavailable {
        mechanism: Mechanism,
        path: String,
        #[source]
        source: StoreError,
    },

    /// One or more writes/deletes failed; the remaining mutations were still attempted
    #[error("{mechanism}: {} settings mutation(s) failed: {}", .failures.len(), join_failures(.failures))]
    MutationsFailed {
        mechanism: Mechanism,
        failures: Vec<MutationFailure>,
    },

    /// Enable requested while the mechanism is already applied
    #[error("{0} is already active")]
    AlreadyActive(Mechanism),

    /// Disable requested without a prior successful enable
    #[error("{0} is not active")]
    NotActive(Mechanism),
}

impl SysProxyError {
    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            SysProxyError::StoreUnavailable { .. } => "store_unavailable",
            SysProxyError::MutationsFailed { .. } => "mutations_failed",
            SysProxyError::AlreadyActive(_) => "already_active",
            SysProxyError::NotActive(_) => "not_active",
        }
    }

    pub fn mechanism(&self) -> Mechanism {
        match self {
            SysProxyError::StoreUnavailable { mechanism, .. }
            | SysProxyError::MutationsFailed { mechanism, .. } => *mechanism,
            SysProxyError::AlreadyActive(m) | SysProxyError::NotActive(m) => *m,
        }
    }
}

fn join_failures(failures: &[MutationFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type SysProxyResult<T> = Result<T, SysProxyError>;
