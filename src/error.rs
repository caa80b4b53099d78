//! Error types for entbench.
//!
//! All errors are strongly typed using thiserror, one enum per concern,
//! folded into the top-level [`BenchError`]. This enables pattern matching
//! on specific error conditions and provides clear error messages.

use thiserror::Error;

/// Configuration errors raised while loading filter settings or building
/// the pipeline. These are fatal at startup and never deferred to first use.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Filter name cannot be empty")]
    EmptyFilterName,

    #[error("Duplicate filter name: {name}")]
    DuplicateFilterName { name: String },

    #[error("Filter '{name}' is a reserved name")]
    ReservedFilterName { name: String },

    #[error("Annotator name '{name}' collides with the gold standard sentinel")]
    ReservedAnnotatorName { name: String },

    #[error("Invalid predicate template for filter '{filter}': {reason}")]
    InvalidPredicateTemplate { filter: String, reason: String },

    #[error("Knowledge resource '{location}' could not be read: {reason}")]
    UnreachableResource { location: String, reason: String },

    #[error("Malformed settings file '{path}': {reason}")]
    MalformedSettings { path: String, reason: String },
}

/// Resolution errors raised while asking a knowledge source which entities
/// satisfy a filter predicate.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Resolution service '{location}' is unreachable: {reason}")]
    ServiceUnreachable { location: String, reason: String },

    #[error("Resolution service '{location}' returned malformed data: {reason}")]
    MalformedResponse { location: String, reason: String },

    #[error("Resolution timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Annotator name '{name}' is reserved for gold standard records")]
    ReservedAnnotator { name: String },

    #[error("Chunked resolution aborted at batch {batch}: {source}")]
    ChunkAborted {
        batch: usize,
        #[source]
        source: Box<ResolutionError>,
    },
}

/// Cache errors raised by the content-addressed filter cache backend.
///
/// A read failure is treated as a miss by the caching decorator; a write
/// failure is logged and never fails the resolution that produced the value.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error for '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("Cache record '{path}' could not be encoded: {reason}")]
    Encode { path: String, reason: String },

    #[error("Cache lock poisoned: {context}")]
    LockPoisoned { context: &'static str },
}

/// Task errors raised while executing one batch of experiment tasks.
///
/// Each variant maps to a numeric error code persisted as the task state in
/// the registry, so an errored task is distinguishable from a finished one.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Dataset '{dataset}' could not be loaded: {reason}")]
    DatasetLoadFailed { dataset: String, reason: String },

    #[error("Annotator '{annotator}' could not be loaded: {reason}")]
    AnnotatorLoadFailed { annotator: String, reason: String },

    #[error("Annotator '{annotator}' failed while annotating: {reason}")]
    AnnotatorRunFailed { annotator: String, reason: String },

    #[error("Filtering failed for filter '{filter}': {source}")]
    FilterFailed {
        filter: String,
        #[source]
        source: ResolutionError,
    },

    #[error("Evaluation failed for filter '{filter}': {reason}")]
    EvaluationFailed { filter: String, reason: String },

    #[error("Task registry error: {reason}")]
    Registry { reason: String },

    #[error("Unknown task id: {task_id}")]
    UnknownTask { task_id: u64 },

    #[error("Scheduler queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Scheduler has shut down")]
    SchedulerStopped,
}

impl TaskError {
    /// The numeric error code stored in the registry for this failure.
    #[must_use]
    pub const fn error_code(&self) -> i32 {
        match self {
            Self::DatasetLoadFailed { .. } => crate::task::ERROR_DATASET_LOAD,
            Self::AnnotatorLoadFailed { .. } => crate::task::ERROR_ANNOTATOR_LOAD,
            Self::AnnotatorRunFailed { .. } => crate::task::ERROR_ANNOTATOR_RUN,
            Self::FilterFailed { .. } => crate::task::ERROR_FILTER,
            Self::EvaluationFailed { .. } => crate::task::ERROR_EVALUATION,
            Self::Registry { .. }
            | Self::UnknownTask { .. }
            | Self::QueueFull { .. }
            | Self::SchedulerStopped => crate::task::ERROR_UNEXPECTED,
        }
    }

    /// Returns true when the failure happened before any per-filter work,
    /// i.e. while constructing the dataset or the annotator. Such a failure
    /// poisons every task id in the batch.
    #[must_use]
    pub const fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::DatasetLoadFailed { .. } | Self::AnnotatorLoadFailed { .. }
        )
    }
}

/// Top-level error type for entbench.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BenchError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is a resolution error.
    #[must_use]
    pub const fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution(_))
    }

    /// Returns true if this error is retryable.
    ///
    /// Configuration errors are permanent; resolution failures against a
    /// remote service may succeed on a later attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Resolution(e) => matches!(
                e,
                ResolutionError::ServiceUnreachable { .. }
                    | ResolutionError::Timeout { .. }
                    | ResolutionError::ChunkAborted { .. }
            ),
            Self::Cache(e) => matches!(e, CacheError::Io { .. }),
            Self::Config(_) | Self::Task(_) | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for entbench operations.
pub type BenchResult<T> = Result<T, BenchError>;
