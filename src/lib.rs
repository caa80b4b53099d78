//! # entbench - Filtering and deduplication core for entity annotation benchmarks
//!
//! entbench restricts benchmark scoring to configurable subsets of a knowledge
//! base and avoids recomputing work whose inputs have not changed. It has two
//! halves:
//!
//! - **Filtering**: decorator chains around an [`filter::EntityResolver`]
//!   select the entity URIs of a dataset or annotator result that satisfy a
//!   predicate, with whitelisting, chunked remote access and a
//!   content-addressed result cache.
//! - **Deduplication**: the [`task::Experimenter`] expands base experiment
//!   configurations across the active filter set, reuses finished results
//!   where both the annotator and the dataset allow it, and dispatches the
//!   surviving work as one execution unit per base configuration.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use entbench::filter::{FilterPipelineFactory, FilterSettings, MemoryFilterCache};
//! use entbench::task::{DirectScheduler, Experimenter, ExperimentPlan, MemoryTaskRegistry};
//!
//! let settings = FilterSettings::from_path("filters.json")?;
//! let factory = FilterPipelineFactory::new(Arc::new(MemoryFilterCache::new()), settings.cache);
//! let holder = Arc::new(factory.build_holder(&settings.effective_definitions(), &base_for)?);
//!
//! let experimenter = Experimenter::new(registry, evaluator, holder);
//! let handles = experimenter.run(&ExperimentPlan::new(configurations), &DirectScheduler::new())?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod filter;
pub mod task;

// Re-export primary types at crate root for convenience
pub use error::{BenchError, BenchResult, CacheError, ConfigError, ResolutionError, TaskError};
pub use filter::{
    Document, EntityResolver, EntitySet, FilterCache, FilterDefinition, FilterHolder,
    FilterPipelineFactory, FilterSettings, FilterWrapper, Marking,
};
pub use task::{
    Evaluator, ExperimentConfiguration, Experimenter, ExperimentPlan, ExperimentType,
    MatchingMode, Scheduler, TaskKey, TaskRegistry, TaskResult, TaskState,
};
