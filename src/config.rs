//! Runtime configuration for the memory layer
//!
//! [`MemoryConfig`] is shared by a runtime and every buffer it backs. It can
//! be built programmatically or read from `HIPMEM_*` environment variables.

use crate::error::{MemResult, MemoryError};

/// Environment variable selecting the failure policy (`abort` or `report`)
pub const FAILURE_POLICY_ENV: &str = "HIPMEM_FAILURE_POLICY";

/// Environment variable for the large allocation warning threshold in bytes
pub const LARGE_ALLOC_WARN_ENV: &str = "HIPMEM_LARGE_ALLOC_WARN";

/// Environment variable enabling stream-ordered device frees
pub const STREAM_ORDERED_FREE_ENV: &str = "HIPMEM_STREAM_ORDERED_FREE";

const DEFAULT_LARGE_ALLOCATION_WARN: usize = 1024 * 1024 * 1024;

/// What the host does with an allocation or contract failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log with call site, then terminate the process
    Abort,
    /// Log with call site and return the error to the caller
    #[default]
    Report,
}

impl FailurePolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "abort" | "fatal" => Some(FailurePolicy::Abort),
            "report" | "log" => Some(FailurePolicy::Report),
            _ => None,
        }
    }
}

/// Configuration for runtimes, buffers and pools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// How hosts escalate failures through `MemResultExt::or_fail_with`
    pub failure_policy: FailurePolicy,

    /// Grow requests at or above this many bytes are logged at warn level
    pub large_allocation_warn: usize,

    /// Release device memory with `hipFreeAsync` when a non-default stream
    /// is supplied
    pub stream_ordered_free: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            failure_policy: FailurePolicy::Report,
            large_allocation_warn: DEFAULT_LARGE_ALLOCATION_WARN,
            stream_ordered_free: false,
        }
    }
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn with_large_allocation_warn(mut self, bytes: usize) -> Self {
        self.large_allocation_warn = bytes;
        self
    }

    pub fn with_stream_ordered_free(mut self, enabled: bool) -> Self {
        self.stream_ordered_free = enabled;
        self
    }

    /// Build a configuration from `HIPMEM_*` environment variables.
    ///
    /// Unset variables keep their defaults; set but unparsable values are
    /// rejected.
    pub fn from_env() -> MemResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> MemResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(FAILURE_POLICY_ENV) {
            config.failure_policy = FailurePolicy::from_str(&raw).ok_or_else(|| {
                MemoryError::InvalidConfiguration(format!(
                    "{}: expected 'abort' or 'report', got '{}'",
                    FAILURE_POLICY_ENV, raw
                ))
            })?;
        }

        if let Some(raw) = lookup(LARGE_ALLOC_WARN_ENV) {
            config.large_allocation_warn = raw.trim().parse().map_err(|e| {
                MemoryError::InvalidConfiguration(format!(
                    "{}: '{}' is not a byte count: {}",
                    LARGE_ALLOC_WARN_ENV, raw, e
                ))
            })?;
        }

        if let Some(raw) = lookup(STREAM_ORDERED_FREE_ENV) {
            config.stream_ordered_free = parse_flag(&raw).ok_or_else(|| {
                MemoryError::InvalidConfiguration(format!(
                    "{}: expected a boolean, got '{}'",
                    STREAM_ORDERED_FREE_ENV, raw
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MemResult<()> {
        if self.large_allocation_warn == 0 {
            return Err(MemoryError::InvalidConfiguration(
                "large_allocation_warn must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = MemoryConfig::default();
        assert_eq!(config.failure_policy, FailurePolicy::Report);
        assert_eq!(config.large_allocation_warn, 1024 * 1024 * 1024);
        assert!(!config.stream_ordered_free);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = MemoryConfig::new()
            .with_failure_policy(FailurePolicy::Abort)
            .with_large_allocation_warn(4096)
            .with_stream_ordered_free(true);

        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.large_allocation_warn, 4096);
        assert!(config.stream_ordered_free);
    }

    #[test]
    fn test_from_lookup_empty_is_default() {
        let config = MemoryConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, MemoryConfig::default());
    }

    #[test]
    fn test_from_lookup_reads_all_keys() {
        let config = MemoryConfig::from_lookup(lookup_from(&[
            (FAILURE_POLICY_ENV, "ABORT"),
            (LARGE_ALLOC_WARN_ENV, " 65536 "),
            (STREAM_ORDERED_FREE_ENV, "on"),
        ]))
        .unwrap();

        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.large_allocation_warn, 65536);
        assert!(config.stream_ordered_free);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = MemoryConfig::from_lookup(lookup_from(&[(FAILURE_POLICY_ENV, "explode")]))
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidConfiguration(_)));

        let err = MemoryConfig::from_lookup(lookup_from(&[(LARGE_ALLOC_WARN_ENV, "lots")]))
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidConfiguration(_)));

        let err = MemoryConfig::from_lookup(lookup_from(&[(STREAM_ORDERED_FREE_ENV, "maybe")]))
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_zero_warn_threshold_invalid() {
        let err = MemoryConfig::from_lookup(lookup_from(&[(LARGE_ALLOC_WARN_ENV, "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("large_allocation_warn"));
    }

    #[test]
    fn test_failure_policy_from_str() {
        assert_eq!(FailurePolicy::from_str("abort"), Some(FailurePolicy::Abort));
        assert_eq!(FailurePolicy::from_str("fatal"), Some(FailurePolicy::Abort));
        assert_eq!(FailurePolicy::from_str("Report"), Some(FailurePolicy::Report));
        assert_eq!(FailurePolicy::from_str("log"), Some(FailurePolicy::Report));
        assert_eq!(FailurePolicy::from_str("nope"), None);
    }
}
