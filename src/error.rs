//! # Error Handling for the Feature Pipeline
//!
//! Hierarchical error types with rich context and classification traits for the
//! parallel feature-extraction pipeline.
//!
//! ## Error Taxonomy
//!
//! Every failure falls into one of three classes, and [`classify`] answers which:
//!
//! - **Fatal to the call**: partitioning, pool submission, result collection and
//!   per-region computation failures. The extraction returns an error and no partial
//!   feature map.
//! - **Degraded but successful**: the advanced-feature collaborator failed or timed out.
//!   The extraction still succeeds with local features only.
//! - **Cache-local**: a disk tier read or write failed. The tier behaves as a miss or a
//!   no-op and the error never reaches the extraction caller.
//!
//! ## Usage
//!
//! ```rust
//! use ballistic_features::error::{classify, ExtractError, HasSeverity, ErrorSeverity};
//!
//! let error = ExtractError::region(3, "region computation panicked")
//!     .with_context("sampling slice 3 of 8")
//!     .with_severity(ErrorSeverity::Critical);
//!
//! assert!(classify::is_fatal_to_call(&error));
//! assert_eq!(error.severity(), ErrorSeverity::Critical);
//! ```

use std::{collections::HashMap, error::Error as StdError, fmt, time::SystemTime};

/// Severity levels for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Debug,
    Info,
    /// Degraded operation, the call still succeeds
    Warning,
    /// The call fails
    Error,
    /// The component is unusable until reinitialised
    Critical,
}

/// Metadata about when and where an error occurred
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub timestamp: SystemTime,
    /// The operation being performed when the error occurred
    pub operation: Option<String>,
    pub context: Option<String>,
    pub recovery_suggestion: Option<String>,
    pub severity: ErrorSeverity,
    pub retryable: bool,
    pub metadata: HashMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            timestamp: SystemTime::now(),
            operation: None,
            context: None,
            recovery_suggestion: None,
            severity: ErrorSeverity::Error,
            retryable: false,
            metadata: HashMap::new(),
        }
    }
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }
}

/// Cache tier an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Memory,
    Disk,
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTier::Memory => write!(f, "memory"),
            CacheTier::Disk => write!(f, "disk"),
        }
    }
}

/// Base error type for the feature pipeline
#[derive(Debug)]
pub enum ExtractError {
    /// Configuration validation errors
    Config {
        field: String,
        value: String,
        reason: String,
        context: ErrorContext,
    },
    /// The image could not be split into regions
    Partition {
        width: u32,
        height: u32,
        regions: usize,
        reason: String,
        context: ErrorContext,
    },
    /// A job could not be handed to the worker pool
    Submission {
        job_id: usize,
        reason: String,
        context: ErrorContext,
    },
    /// A worker failed (or panicked) while computing one region
    Region {
        job_id: usize,
        reason: String,
        context: ErrorContext,
    },
    /// Fewer results arrived than jobs were submitted
    Collection {
        expected: usize,
        received: usize,
        reason: String,
        context: ErrorContext,
    },
    /// A cache tier failed; never surfaced to extraction callers
    Cache {
        tier: CacheTier,
        key: String,
        reason: String,
        context: ErrorContext,
    },
    /// I/O errors
    Io {
        operation: String,
        path: Option<String>,
        source: std::io::Error,
        context: ErrorContext,
    },
    /// The advanced-feature collaborator failed
    Advanced {
        reason: String,
        context: ErrorContext,
    },
    /// External library errors
    External {
        library: String,
        source: Box<dyn StdError + Send + Sync>,
        context: ErrorContext,
    },
    /// A caller-imposed deadline elapsed
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },
    /// Validation errors
    Validation {
        field: String,
        constraint: String,
        value: String,
        context: ErrorContext,
    },
    /// Invalid state transitions (e.g. using a pool after shutdown)
    State {
        current_state: String,
        attempted_operation: String,
        reason: String,
        context: ErrorContext,
    },
}

impl ExtractError {
    pub fn config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Config {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn partition(width: u32, height: u32, regions: usize, reason: impl Into<String>) -> Self {
        Self::Partition {
            width,
            height,
            regions,
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn submission(job_id: usize, reason: impl Into<String>) -> Self {
        Self::Submission {
            job_id,
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn region(job_id: usize, reason: impl Into<String>) -> Self {
        Self::Region {
            job_id,
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn collection(expected: usize, received: usize, reason: impl Into<String>) -> Self {
        Self::Collection {
            expected,
            received,
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Cache failures default to `Warning`: they only cost a recomputation.
    pub fn cache(tier: CacheTier, key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Cache {
            tier,
            key: key.into(),
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Warning),
        }
    }

    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: None,
            source,
            context: ErrorContext::new(),
        }
    }

    /// Create an I/O error tied to a path
    pub fn io_at(
        operation: impl Into<String>,
        path: impl AsRef<std::path::Path>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation: operation.into(),
            path: Some(path.as_ref().display().to_string()),
            source,
            context: ErrorContext::new(),
        }
    }

    /// Advanced-feature failures default to `Warning`: extraction degrades, not fails.
    pub fn advanced(reason: impl Into<String>) -> Self {
        Self::Advanced {
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Warning),
        }
    }

    pub fn external(
        library: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            library: library.into(),
            source: Box::new(source),
            context: ErrorContext::new(),
        }
    }

    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms,
            context: ErrorContext::new(),
        }
    }

    pub fn validation(
        field: impl Into<String>,
        constraint: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::Validation {
            field: field.into(),
            constraint: constraint.into(),
            value: value.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn state(
        current_state: impl Into<String>,
        attempted_operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::State {
            current_state: current_state.into(),
            attempted_operation: attempted_operation.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_mut().context = Some(context.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    pub fn with_recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context_mut().recovery_suggestion = Some(suggestion.into());
        self
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.context_mut().severity = severity;
        self
    }

    pub fn retryable(mut self) -> Self {
        self.context_mut().retryable = true;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context_mut().metadata.insert(key.into(), value.into());
        self
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Config { context, .. } => context,
            Self::Partition { context, .. } => context,
            Self::Submission { context, .. } => context,
            Self::Region { context, .. } => context,
            Self::Collection { context, .. } => context,
            Self::Cache { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::Advanced { context, .. } => context,
            Self::External { context, .. } => context,
            Self::Timeout { context, .. } => context,
            Self::Validation { context, .. } => context,
            Self::State { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Config { context, .. } => context,
            Self::Partition { context, .. } => context,
            Self::Submission { context, .. } => context,
            Self::Region { context, .. } => context,
            Self::Collection { context, .. } => context,
            Self::Cache { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::Advanced { context, .. } => context,
            Self::External { context, .. } => context,
            Self::Timeout { context, .. } => context,
            Self::Validation { context, .. } => context,
            Self::State { context, .. } => context,
        }
    }

    /// Error category as a string, used as a structured logging field
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Partition { .. } => "partition",
            Self::Submission { .. } => "submission",
            Self::Region { .. } => "region",
            Self::Collection { .. } => "collection",
            Self::Cache { .. } => "cache",
            Self::Io { .. } => "io",
            Self::Advanced { .. } => "advanced",
            Self::External { .. } => "external",
            Self::Timeout { .. } => "timeout",
            Self::Validation { .. } => "validation",
            Self::State { .. } => "state",
        }
    }
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::Config {
                field,
                value,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Configuration error in '{}': {} (value: {})",
                    field, reason, value
                )
            }
            ExtractError::Partition {
                width,
                height,
                regions,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Cannot partition {}x{} image into {} regions: {}",
                    width, height, regions, reason
                )
            }
            ExtractError::Submission { job_id, reason, .. } => {
                write!(f, "Failed to submit region job {}: {}", job_id, reason)
            }
            ExtractError::Region { job_id, reason, .. } => {
                write!(f, "Region job {} failed: {}", job_id, reason)
            }
            ExtractError::Collection {
                expected,
                received,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Collected {} of {} region results: {}",
                    received, expected, reason
                )
            }
            ExtractError::Cache {
                tier, key, reason, ..
            } => {
                write!(f, "Cache {} tier error for '{}': {}", tier, key, reason)
            }
            ExtractError::Io {
                operation,
                path,
                source,
                ..
            } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "I/O error during {} on '{}': {}",
                        operation, path, source
                    )
                } else {
                    write!(f, "I/O error during {}: {}", operation, source)
                }
            }
            ExtractError::Advanced { reason, .. } => {
                write!(f, "Advanced feature extraction failed: {}", reason)
            }
            ExtractError::External {
                library, source, ..
            } => {
                write!(f, "External library error in {}: {}", library, source)
            }
            ExtractError::Timeout {
                operation,
                duration_ms,
                ..
            } => {
                write!(f, "Timeout during {} after {}ms", operation, duration_ms)
            }
            ExtractError::Validation {
                field,
                constraint,
                value,
                ..
            } => {
                write!(
                    f,
                    "Validation failed for '{}': {} (value: {})",
                    field, constraint, value
                )
            }
            ExtractError::State {
                current_state,
                attempted_operation,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Cannot {} while {}: {}",
                    attempted_operation, current_state, reason
                )
            }
        }
    }
}

impl StdError for ExtractError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::External { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Result type alias using the pipeline error type
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Trait for errors that can be retried
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Recommended delay before retrying, in milliseconds
    fn retry_delay_ms(&self) -> Option<u64> {
        None
    }
}

impl Retryable for ExtractError {
    fn is_retryable(&self) -> bool {
        self.context().retryable
            || matches!(
                self,
                Self::Timeout { .. } | Self::Io { .. } | Self::Cache { .. }
            )
    }

    fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            Self::Timeout { .. } => Some(1000),
            Self::Io { .. } => Some(100),
            Self::Cache { .. } => Some(50),
            _ => None,
        }
    }
}

/// Trait for errors that can be recovered from
pub trait Recoverable {
    fn is_recoverable(&self) -> bool;

    fn recovery_strategies(&self) -> Vec<RecoveryStrategy>;
}

/// Recovery strategies for handling errors
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryStrategy {
    /// Retry the operation
    Retry { max_attempts: usize, delay_ms: u64 },
    /// Carry on without the failed contribution
    Degrade { description: String },
    /// Treat the lookup as a miss and recompute
    Recompute { description: String },
    /// Rebuild the component
    Reinitialize { component: String },
}

impl Recoverable for ExtractError {
    fn is_recoverable(&self) -> bool {
        !self.recovery_strategies().is_empty()
    }

    fn recovery_strategies(&self) -> Vec<RecoveryStrategy> {
        match self {
            Self::Advanced { .. } => vec![RecoveryStrategy::Degrade {
                description: "Return local features with an empty advanced map".to_string(),
            }],
            Self::Cache { .. } => vec![RecoveryStrategy::Recompute {
                description: "Treat the tier as a miss".to_string(),
            }],
            Self::Timeout { .. } => vec![RecoveryStrategy::Retry {
                max_attempts: 3,
                delay_ms: 1000,
            }],
            Self::Region { .. } | Self::Collection { .. } => vec![RecoveryStrategy::Retry {
                max_attempts: 1,
                delay_ms: 0,
            }],
            Self::State { .. } | Self::Submission { .. } => {
                vec![RecoveryStrategy::Reinitialize {
                    component: "worker_pool".to_string(),
                }]
            }
            _ => vec![],
        }
    }
}

/// Trait for errors with severity levels
pub trait HasSeverity {
    fn severity(&self) -> ErrorSeverity;
}

impl HasSeverity for ExtractError {
    fn severity(&self) -> ErrorSeverity {
        self.context().severity
    }
}

/// Trait for errors that provide recovery suggestions
pub trait HasRecoverySuggestion {
    fn recovery_suggestion(&self) -> Option<&str>;
}

impl HasRecoverySuggestion for ExtractError {
    fn recovery_suggestion(&self) -> Option<&str> {
        self.context().recovery_suggestion.as_deref()
    }
}

/// Error classification utilities
pub mod classify {
    use super::*;

    /// Errors that abort an extraction with no partial result.
    pub fn is_fatal_to_call(error: &ExtractError) -> bool {
        !is_degraded(error) && !is_cache_local(error)
    }

    /// Errors after which the extraction still succeeds with reduced output.
    pub fn is_degraded(error: &ExtractError) -> bool {
        matches!(error, ExtractError::Advanced { .. })
    }

    /// Errors confined to one cache tier.
    pub fn is_cache_local(error: &ExtractError) -> bool {
        matches!(error, ExtractError::Cache { .. })
    }

    /// Priority for log routing (higher numbers = louder)
    pub fn priority(error: &ExtractError) -> u8 {
        match error.severity() {
            ErrorSeverity::Debug => 0,
            ErrorSeverity::Info => 1,
            ErrorSeverity::Warning => 2,
            ErrorSeverity::Error => 3,
            ErrorSeverity::Critical => 4,
        }
    }
}

impl From<std::io::Error> for ExtractError {
    fn from(error: std::io::Error) -> Self {
        Self::io("unknown", error)
    }
}

impl From<serde_json::Error> for ExtractError {
    fn from(error: serde_json::Error) -> Self {
        Self::external("serde_json", error)
    }
}

impl From<image::ImageError> for ExtractError {
    fn from(error: image::ImageError) -> Self {
        Self::external("image", error)
    }
}

impl From<region_sample::SampleError> for ExtractError {
    fn from(error: region_sample::SampleError) -> Self {
        Self::external("region-sample", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = ExtractError::config("glcm_offset", "0", "must be between 1 and 3");
        assert_eq!(error.category(), "config");
        assert!(!error.is_retryable());
        assert!(classify::is_fatal_to_call(&error));
    }

    #[test]
    fn test_error_with_context() {
        let error = ExtractError::collection(8, 5, "result channel disconnected")
            .with_operation("collect_results")
            .with_recovery_suggestion("recreate the extractor")
            .with_metadata("identity", "case_17.png");

        assert_eq!(error.category(), "collection");
        assert_eq!(error.recovery_suggestion(), Some("recreate the extractor"));
        assert_eq!(
            error.context().metadata.get("identity").map(String::as_str),
            Some("case_17.png")
        );
        assert_eq!(
            error.to_string(),
            "Collected 5 of 8 region results: result channel disconnected"
        );
    }

    #[test]
    fn test_taxonomy() {
        let advanced = ExtractError::advanced("collaborator timed out");
        assert!(classify::is_degraded(&advanced));
        assert!(!classify::is_fatal_to_call(&advanced));
        assert_eq!(advanced.severity(), ErrorSeverity::Warning);

        let disk = ExtractError::cache(CacheTier::Disk, "a_1x1", "corrupt entry");
        assert!(classify::is_cache_local(&disk));
        assert!(!classify::is_fatal_to_call(&disk));
        assert!(disk.is_retryable());

        let region = ExtractError::region(2, "panicked");
        assert!(classify::is_fatal_to_call(&region));
        assert_eq!(classify::priority(&region), 3);
    }

    #[test]
    fn test_recovery_strategies() {
        let advanced = ExtractError::advanced("missing");
        assert!(advanced.is_recoverable());
        assert!(matches!(
            advanced.recovery_strategies()[0],
            RecoveryStrategy::Degrade { .. }
        ));

        let state = ExtractError::state("shut down", "submit", "job queue closed");
        assert_eq!(
            state.recovery_strategies(),
            vec![RecoveryStrategy::Reinitialize {
                component: "worker_pool".to_string()
            }]
        );

        let validation = ExtractError::validation("identity", "non-empty", "");
        assert!(!validation.is_recoverable());
    }

    #[test]
    fn test_timeout_retry_delay() {
        let timeout = ExtractError::timeout("extract", 5000);
        assert!(timeout.is_retryable());
        assert_eq!(timeout.retry_delay_ms(), Some(1000));
    }

    #[test]
    fn test_io_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error = ExtractError::io_at("read cache entry", "/tmp/x.cache", io);
        assert!(error.source().is_some());
        assert!(error.to_string().contains("/tmp/x.cache"));
    }
}
