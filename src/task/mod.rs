//! Experiment tasks: data types, deduplication and execution.
//!
//! One task is one unit of benchmarking work — one annotator on one dataset
//! under one experiment type, matching mode and filter. The deduplication
//! layer expands base configurations across the active filter set, reuses
//! finished results where both sides declare themselves cacheable, and
//! dispatches at most one execution unit per base configuration.

pub mod experimenter;
pub mod registry;
pub mod scheduler;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::filter::{Document, FilterDefinition};

pub use experimenter::{Evaluator, ExecutionUnit, Experimenter, ExperimentPlan};
pub use registry::{DiskTaskRegistry, MemoryTaskRegistry, TaskEntry, TaskHandle, TaskRegistry};
pub use scheduler::{DirectScheduler, Scheduler, WorkerPoolScheduler};

/// Error code: the dataset could not be loaded.
pub const ERROR_DATASET_LOAD: i32 = -100;
/// Error code: the annotator could not be loaded.
pub const ERROR_ANNOTATOR_LOAD: i32 = -101;
/// Error code: the annotator failed while annotating.
pub const ERROR_ANNOTATOR_RUN: i32 = -102;
/// Error code: filtering failed.
pub const ERROR_FILTER: i32 = -103;
/// Error code: evaluation failed.
pub const ERROR_EVALUATION: i32 = -104;
/// Error code: unexpected failure.
pub const ERROR_UNEXPECTED: i32 = -1;

/// The kind of experiment being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExperimentType {
    /// Annotate: recognize and disambiguate entities.
    A2KB,
    /// Concepts to knowledge base.
    C2KB,
    /// Disambiguate given mentions.
    D2KB,
    /// Entity recognition only.
    ERec,
    /// Entity typing only.
    ETyping,
}

impl ExperimentType {
    /// Whether this experiment type runs through the filter pipeline.
    ///
    /// Recognition and typing operate on surface forms, not on linked
    /// entities; they expand only to the identity filter.
    #[must_use]
    pub const fn is_filtered(self) -> bool {
        !matches!(self, Self::ERec | Self::ETyping)
    }
}

impl fmt::Display for ExperimentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::A2KB => "A2KB",
            Self::C2KB => "C2KB",
            Self::D2KB => "D2KB",
            Self::ERec => "ERec",
            Self::ETyping => "ETyping",
        };
        f.write_str(s)
    }
}

/// How annotations are matched against the gold standard during scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchingMode {
    /// Positions and entity must match exactly.
    StrongAnnotationMatch,
    /// Overlapping positions with the right entity count as a match.
    WeakAnnotationMatch,
    /// Only the entity must match.
    StrongEntityMatch,
}

impl fmt::Display for MatchingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StrongAnnotationMatch => "StrongAnnotationMatch",
            Self::WeakAnnotationMatch => "WeakAnnotationMatch",
            Self::StrongEntityMatch => "StrongEntityMatch",
        };
        f.write_str(s)
    }
}

/// A loaded annotator, ready to annotate documents.
pub trait Annotator: Send {
    /// Produces one annotated document per input document.
    ///
    /// # Errors
    /// [`TaskError::AnnotatorRunFailed`] on annotation failure.
    fn annotate(&self, documents: &[Document]) -> Result<Vec<Document>, TaskError>;
}

/// Configuration of one annotator, consumed read-only by the dedup layer.
pub trait AnnotatorConfig: Send + Sync {
    /// The annotator name.
    fn name(&self) -> &str;

    /// Whether results produced with this configuration may be reused
    /// across experiments.
    fn could_be_cached(&self) -> bool;

    /// Loads the annotator for an experiment type.
    ///
    /// # Errors
    /// [`TaskError::AnnotatorLoadFailed`] if the annotator does not support
    /// the experiment type or cannot be constructed.
    fn load(&self, experiment_type: ExperimentType) -> Result<Box<dyn Annotator>, TaskError>;
}

/// Configuration of one dataset, consumed read-only by the dedup layer.
pub trait DatasetConfig: Send + Sync {
    /// The dataset name.
    fn name(&self) -> &str;

    /// Whether results computed on this dataset may be reused across
    /// experiments.
    fn could_be_cached(&self) -> bool;

    /// Loads the dataset documents (with gold standard markings) for an
    /// experiment type.
    ///
    /// # Errors
    /// [`TaskError::DatasetLoadFailed`] if the dataset does not support the
    /// experiment type or cannot be read.
    fn load(&self, experiment_type: ExperimentType) -> Result<Vec<Document>, TaskError>;
}

/// A base experiment configuration before filter expansion.
#[derive(Clone)]
pub struct ExperimentConfiguration {
    /// The annotator side.
    pub annotator: Arc<dyn AnnotatorConfig>,
    /// The dataset side.
    pub dataset: Arc<dyn DatasetConfig>,
    /// Experiment type.
    pub experiment_type: ExperimentType,
    /// Matching mode used for scoring.
    pub matching: MatchingMode,
}

impl fmt::Debug for ExperimentConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExperimentConfiguration")
            .field("annotator", &self.annotator.name())
            .field("dataset", &self.dataset.name())
            .field("experiment_type", &self.experiment_type)
            .field("matching", &self.matching)
            .finish()
    }
}

/// One expanded experiment task configuration: the unit of deduplication.
///
/// Two configurations are equal iff all five components are equal.
#[derive(Clone)]
pub struct ExperimentTaskConfiguration {
    /// The annotator side.
    pub annotator: Arc<dyn AnnotatorConfig>,
    /// The dataset side.
    pub dataset: Arc<dyn DatasetConfig>,
    /// Experiment type.
    pub experiment_type: ExperimentType,
    /// Matching mode used for scoring.
    pub matching: MatchingMode,
    /// The filter this task's results are restricted to.
    pub filter: FilterDefinition,
}

impl ExperimentTaskConfiguration {
    /// The identity-relevant fields as a registry key.
    #[must_use]
    pub fn key(&self) -> TaskKey {
        TaskKey {
            annotator: self.annotator.name().to_string(),
            dataset: self.dataset.name().to_string(),
            experiment_type: self.experiment_type,
            matching: self.matching,
            filter: self.filter.name.clone(),
        }
    }

    /// Whether a finished result for this configuration may be reused:
    /// both the annotator and the dataset must declare themselves cacheable.
    #[must_use]
    pub fn cache_eligible(&self) -> bool {
        let eligible = self.annotator.could_be_cached() && self.dataset.could_be_cached();
        log::debug!(
            "cache eligibility: {}={} && {}={} -> {eligible}",
            self.annotator.name(),
            self.annotator.could_be_cached(),
            self.dataset.name(),
            self.dataset.could_be_cached()
        );
        eligible
    }
}

impl PartialEq for ExperimentTaskConfiguration {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key() && self.filter == other.filter
    }
}

impl Eq for ExperimentTaskConfiguration {}

impl fmt::Debug for ExperimentTaskConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExperimentTaskConfiguration")
            .field("annotator", &self.annotator.name())
            .field("dataset", &self.dataset.name())
            .field("experiment_type", &self.experiment_type)
            .field("matching", &self.matching)
            .field("filter", &self.filter.name)
            .finish()
    }
}

/// The persisted identity of a task: the five components that make two
/// units of work the same work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    /// Annotator name.
    pub annotator: String,
    /// Dataset name.
    pub dataset: String,
    /// Experiment type.
    pub experiment_type: ExperimentType,
    /// Matching mode.
    pub matching: MatchingMode,
    /// Filter name.
    pub filter: String,
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.annotator, self.dataset, self.experiment_type, self.matching, self.filter
        )
    }
}

/// Completion state of a task in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Created, not yet run.
    Pending,
    /// Currently executing.
    Running,
    /// Completed with a stored result.
    Finished,
    /// Failed with an error code.
    Errored(i32),
}

impl TaskState {
    /// Returns true if the task completed successfully.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Finished)
    }
}

/// The scored outcome of one finished task.
///
/// Computing these numbers is the evaluator collaborator's job; reused
/// results share this schema with freshly computed ones by design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TaskResult {
    /// Micro-averaged precision.
    pub micro_precision: f64,
    /// Micro-averaged recall.
    pub micro_recall: f64,
    /// Micro-averaged F1.
    pub micro_f1: f64,
    /// Macro-averaged precision.
    pub macro_precision: f64,
    /// Macro-averaged recall.
    pub macro_recall: f64,
    /// Macro-averaged F1.
    pub macro_f1: f64,
    /// Number of documents the annotator errored on.
    pub error_count: u64,
    /// Additional named measures.
    #[serde(default)]
    pub extras: BTreeMap<String, f64>,
}
