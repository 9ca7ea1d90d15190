//! Error handling for hipmem
//!
//! Every failure in this crate is returned as a [`MemoryError`]. Nothing here
//! aborts the process on its own: the host decides what a failed allocation
//! means through [`FailurePolicy`] and [`MemResultExt::or_fail`].
//!
//! Errors fall into three categories:
//! - Resource errors (the runtime could not allocate or release memory)
//! - Contract errors (a caller broke a precondition, e.g. resize past capacity)
//! - Internal errors (poisoned locks, bad configuration)

use std::fmt;

use crate::config::{FailurePolicy, MemoryConfig};

/// Source location of a checked runtime call.
///
/// Captured by [`check_runtime!`](crate::check_runtime) so a failed
/// allocation can be traced back to the exact expression that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
    pub expr: &'static str,
}

impl CallSite {
    pub const fn new(file: &'static str, line: u32, expr: &'static str) -> Self {
        Self { file, line, expr }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.expr)
    }
}

/// Memory layer error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum MemoryError {
    /// The runtime failed to allocate device or pinned host memory
    #[error("{kind} allocation of {bytes} bytes failed with code {code} ({site})")]
    AllocationFailed {
        kind: &'static str,
        bytes: usize,
        code: i32,
        site: CallSite,
    },

    /// The runtime failed to release an allocation
    #[error("{kind} free failed with code {code} ({site})")]
    FreeFailed {
        kind: &'static str,
        code: i32,
        site: CallSite,
    },

    /// Any other runtime call (stream creation, synchronization, init) failed
    #[error("runtime call failed with code {code} ({site})")]
    RuntimeCallFailed { code: i32, site: CallSite },

    /// `resize` asked for more bytes than the buffer currently holds
    #[error("{name} failed to resize memory to {requested} bytes, capacity = {capacity}")]
    CapacityExceeded {
        name: String,
        requested: usize,
        capacity: usize,
    },

    /// A typed view was used before a buffer was bound to it
    #[error("{operation} called on a view with no bound buffer")]
    UnboundAccess { operation: &'static str },

    /// Element count times element size does not fit in `usize`
    #[error("byte size overflow: {count} elements of {element_size} bytes")]
    SizeOverflow { count: usize, element_size: usize },

    #[error("Internal lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl<T> From<std::sync::PoisonError<T>> for MemoryError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        MemoryError::LockPoisoned(err.to_string())
    }
}

/// Result alias used throughout the crate
pub type MemResult<T> = Result<T, MemoryError>;

/// Error category for handling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The runtime ran out of memory or rejected a release
    Resource,
    /// The caller violated an API precondition
    Contract,
    /// Bug or misconfiguration inside the process
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Resource => write!(f, "Resource"),
            ErrorCategory::Contract => write!(f, "Contract"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

impl MemoryError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            MemoryError::AllocationFailed { .. }
            | MemoryError::FreeFailed { .. }
            | MemoryError::RuntimeCallFailed { .. } => ErrorCategory::Resource,
            MemoryError::CapacityExceeded { .. }
            | MemoryError::UnboundAccess { .. }
            | MemoryError::SizeOverflow { .. } => ErrorCategory::Contract,
            MemoryError::LockPoisoned(_) | MemoryError::InvalidConfiguration(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// True when the error means the caller skipped a required step
    /// (grow before resize, bind before use).
    pub fn is_contract_violation(&self) -> bool {
        self.category() == ErrorCategory::Contract
    }

    /// Call site of the failing runtime call, if this error came from one
    pub fn call_site(&self) -> Option<&CallSite> {
        match self {
            MemoryError::AllocationFailed { site, .. }
            | MemoryError::FreeFailed { site, .. }
            | MemoryError::RuntimeCallFailed { site, .. } => Some(site),
            _ => None,
        }
    }
}

/// Escalation of memory errors according to the host's [`FailurePolicy`].
pub trait MemResultExt<T> {
    /// Logs the error and, under [`FailurePolicy::Abort`], terminates the
    /// process. Under [`FailurePolicy::Report`] the error is handed back.
    fn or_fail(self, policy: FailurePolicy) -> MemResult<T>;

    /// [`or_fail`](Self::or_fail) with the policy configured in `config`
    fn or_fail_with(self, config: &MemoryConfig) -> MemResult<T>;
}

impl<T> MemResultExt<T> for MemResult<T> {
    fn or_fail(self, policy: FailurePolicy) -> MemResult<T> {
        self.map_err(|err| {
            match err.call_site() {
                Some(site) => tracing::error!(
                    file = site.file,
                    line = site.line,
                    category = %err.category(),
                    "{}",
                    err
                ),
                None => tracing::error!(category = %err.category(), "{}", err),
            }
            if policy == FailurePolicy::Abort {
                std::process::abort();
            }
            err
        })
    }

    fn or_fail_with(self, config: &MemoryConfig) -> MemResult<T> {
        self.or_fail(config.failure_policy)
    }
}

/// Wrap a raw runtime call that returns a status code.
///
/// On a non-zero status the call site (file, line, expression text) is
/// logged and the `on_error` closure builds the returned error. The closure
/// receives the status code and the [`CallSite`].
///
/// ```ignore
/// check_runtime!(unsafe { ffi::hipFree(ptr) }, |code, site| MemoryError::FreeFailed {
///     kind: "device",
///     code,
///     site,
/// })?;
/// ```
#[macro_export]
macro_rules! check_runtime {
    ($call:expr, |$code:ident, $site:ident| $on_error:expr) => {{
        let $code: i32 = $call;
        if $code == $crate::backend::RUNTIME_SUCCESS {
            Ok(())
        } else {
            let $site = $crate::error::CallSite::new(file!(), line!(), stringify!($call));
            $crate::__tracing::error!(
                file = $site.file,
                line = $site.line,
                code = $code,
                "Runtime call failed: {}",
                $site.expr
            );
            Err($on_error)
        }
    }};
}
