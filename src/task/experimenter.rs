//! Experiment planning, deduplication and execution.
//!
//! The experimenter takes a batch of base configurations, expands each
//! across the active filter set, and decides per expanded configuration
//! whether an existing finished result can stand in for new work. All
//! surviving work of one base configuration is bundled into a single
//! [`ExecutionUnit`] so the dataset is loaded and the annotator run once,
//! however many filters are active.

use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{BenchResult, ConfigError, TaskError};
use crate::filter::{Document, FilterHolder, GOLD_STANDARD_SENTINEL};
use crate::task::registry::{TaskHandle, TaskRegistry};
use crate::task::scheduler::Scheduler;
use crate::task::{
    ExperimentConfiguration, ExperimentTaskConfiguration, TaskKey, TaskResult, TaskState,
};

/// Scores one filtered annotator result against the filtered gold standard.
pub trait Evaluator: Send + Sync {
    /// Produces the scored result for one task.
    ///
    /// # Errors
    /// [`TaskError::EvaluationFailed`] if scoring is impossible.
    fn evaluate(
        &self,
        gold: &[Document],
        annotated: &[Document],
        key: &TaskKey,
    ) -> Result<TaskResult, TaskError>;
}

/// A batch of base configurations submitted together.
#[derive(Debug, Clone)]
pub struct ExperimentPlan {
    /// Identifier of this experiment run.
    pub experiment_id: Uuid,
    /// The base configurations, before filter expansion.
    pub configurations: Vec<ExperimentConfiguration>,
}

impl ExperimentPlan {
    /// Creates a plan with a fresh experiment id.
    #[must_use]
    pub fn new(configurations: Vec<ExperimentConfiguration>) -> Self {
        Self {
            experiment_id: Uuid::new_v4(),
            configurations,
        }
    }
}

/// All surviving work of one base configuration.
///
/// Runs the dataset load, annotator load and annotation once, then filters
/// and evaluates per task. Outcomes are reported through the registry; the
/// unit itself never returns an error because sibling tasks must keep
/// going when one fails.
pub struct ExecutionUnit {
    configuration: ExperimentConfiguration,
    holder: Arc<FilterHolder>,
    tasks: BTreeMap<String, u64>,
    registry: Arc<dyn TaskRegistry>,
    evaluator: Arc<dyn Evaluator>,
}

impl ExecutionUnit {
    /// Filter name to task id, for inspection before dispatch.
    #[must_use]
    pub fn tasks(&self) -> &BTreeMap<String, u64> {
        &self.tasks
    }

    /// Runs the unit to completion, recording every outcome in the
    /// registry. Registry write failures are logged and do not stop the
    /// remaining tasks.
    pub fn run(self) {
        let dataset_name = self.configuration.dataset.name().to_string();
        let annotator_name = self.configuration.annotator.name().to_string();
        log::info!(
            "running {} task(s) for {annotator_name} on {dataset_name} ({})",
            self.tasks.len(),
            self.configuration.experiment_type
        );

        for task_id in self.tasks.values() {
            self.set_state(*task_id, TaskState::Running);
        }

        let gold = match self
            .configuration
            .dataset
            .load(self.configuration.experiment_type)
        {
            Ok(documents) => documents,
            Err(e) => {
                self.fail_all(&e);
                return;
            }
        };

        let annotator = match self
            .configuration
            .annotator
            .load(self.configuration.experiment_type)
        {
            Ok(annotator) => annotator,
            Err(e) => {
                self.fail_all(&e);
                return;
            }
        };

        let annotated = match annotator.annotate(&gold) {
            Ok(documents) => documents,
            Err(e) => {
                self.fail_all(&e);
                return;
            }
        };

        // One gold-standard pass per filter up front; results land in the
        // shared cache under the sentinel key, so every later run on this
        // dataset starts warm.
        self.holder.precache_gold_standard(&gold, &dataset_name);

        for (filter_name, task_id) in &self.tasks {
            match self.run_task(filter_name, &gold, &annotated, &dataset_name, &annotator_name) {
                Ok(result) => {
                    if let Err(e) = self.registry.set_result(*task_id, result) {
                        log::error!("cannot record result of task {task_id}: {e}");
                    }
                }
                Err(e) => {
                    log::error!("task {task_id} (filter '{filter_name}') failed: {e}");
                    self.set_state(*task_id, TaskState::Errored(e.error_code()));
                }
            }
        }
    }

    fn run_task(
        &self,
        filter_name: &str,
        gold: &[Document],
        annotated: &[Document],
        dataset: &str,
        annotator: &str,
    ) -> Result<TaskResult, TaskError> {
        let wrapper = self
            .holder
            .by_name(filter_name)
            .ok_or_else(|| TaskError::Registry {
                reason: format!("no wrapper for filter '{filter_name}'"),
            })?;

        let filtered_gold =
            wrapper
                .filter_gold_standard(gold, dataset)
                .map_err(|source| TaskError::FilterFailed {
                    filter: filter_name.to_string(),
                    source,
                })?;
        let filtered_annotated = wrapper
            .filter_annotator_result(annotated, dataset, annotator)
            .map_err(|source| TaskError::FilterFailed {
                filter: filter_name.to_string(),
                source,
            })?;

        let key = TaskKey {
            annotator: annotator.to_string(),
            dataset: dataset.to_string(),
            experiment_type: self.configuration.experiment_type,
            matching: self.configuration.matching,
            filter: filter_name.to_string(),
        };
        self.evaluator
            .evaluate(&filtered_gold, &filtered_annotated, &key)
    }

    /// An upstream failure leaves nothing any task in the unit could use.
    fn fail_all(&self, error: &TaskError) {
        log::error!(
            "unit for {} on {} failed before filtering: {error}",
            self.configuration.annotator.name(),
            self.configuration.dataset.name()
        );
        let code = error.error_code();
        for task_id in self.tasks.values() {
            self.set_state(*task_id, TaskState::Errored(code));
        }
    }

    fn set_state(&self, task_id: u64, state: TaskState) {
        if let Err(e) = self.registry.set_state(task_id, state) {
            log::error!("cannot update state of task {task_id}: {e}");
        }
    }
}

/// Expands, deduplicates and dispatches experiment batches.
pub struct Experimenter {
    registry: Arc<dyn TaskRegistry>,
    evaluator: Arc<dyn Evaluator>,
    holder: Arc<FilterHolder>,
    identity_holder: Arc<FilterHolder>,
}

impl Experimenter {
    /// Creates an experimenter over a registry, an evaluator and the
    /// active filter set.
    #[must_use]
    pub fn new(
        registry: Arc<dyn TaskRegistry>,
        evaluator: Arc<dyn Evaluator>,
        holder: Arc<FilterHolder>,
    ) -> Self {
        Self {
            registry,
            evaluator,
            holder,
            identity_holder: Arc::new(FilterHolder::identity_only()),
        }
    }

    /// Plans and dispatches a batch: expands every base configuration
    /// across the filter set, reuses finished results where both sides are
    /// cacheable, and submits at most one execution unit per base
    /// configuration. Returns the handle decided for every expanded key.
    ///
    /// Base configurations are processed in a deterministic order that is
    /// independent of their order in the plan.
    ///
    /// # Errors
    /// Configuration errors if an annotator name collides with the gold
    /// standard sentinel, task errors from the registry or scheduler.
    pub fn run(
        &self,
        plan: &ExperimentPlan,
        scheduler: &dyn Scheduler,
    ) -> BenchResult<BTreeMap<TaskKey, TaskHandle>> {
        let mut configurations: Vec<&ExperimentConfiguration> =
            plan.configurations.iter().collect();
        configurations.sort_by_key(|c| {
            (
                c.annotator.name().to_string(),
                c.dataset.name().to_string(),
                c.experiment_type,
                c.matching,
            )
        });

        let mut handles: BTreeMap<TaskKey, TaskHandle> = BTreeMap::new();
        for configuration in configurations {
            if configuration.annotator.name() == GOLD_STANDARD_SENTINEL {
                return Err(ConfigError::ReservedAnnotatorName {
                    name: configuration.annotator.name().to_string(),
                }
                .into());
            }

            let holder = if configuration.experiment_type.is_filtered() {
                &self.holder
            } else {
                &self.identity_holder
            };

            let mut unit_tasks: BTreeMap<String, u64> = BTreeMap::new();
            for wrapper in holder.wrappers() {
                let task = ExperimentTaskConfiguration {
                    annotator: Arc::clone(&configuration.annotator),
                    dataset: Arc::clone(&configuration.dataset),
                    experiment_type: configuration.experiment_type,
                    matching: configuration.matching,
                    filter: wrapper.definition().clone(),
                };
                let key = task.key();

                // The same key may appear twice in one plan; the second
                // occurrence is the same work regardless of cacheability.
                // The unit planned for the first occurrence owns the task
                // id, so nothing is added to this unit's map.
                if handles.contains_key(&key) {
                    log::debug!("key {key} already planned in this batch");
                    continue;
                }

                let handle = self.registry.get_or_create(
                    &key,
                    plan.experiment_id,
                    task.cache_eligible(),
                )?;
                if let TaskHandle::Created(id) = handle {
                    unit_tasks.insert(key.filter.clone(), id);
                } else {
                    log::info!("reusing finished task {} for {key}", handle.task_id());
                }
                handles.insert(key, handle);
            }

            if unit_tasks.is_empty() {
                log::info!(
                    "all tasks for {} on {} reused, nothing to run",
                    configuration.annotator.name(),
                    configuration.dataset.name()
                );
                continue;
            }

            scheduler.submit(ExecutionUnit {
                configuration: configuration.clone(),
                holder: Arc::clone(holder),
                tasks: unit_tasks,
                registry: Arc::clone(&self.registry),
                evaluator: Arc::clone(&self.evaluator),
            })?;
        }

        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{
        FilterDefinition, FilterPipelineFactory, IdentityResolver, Marking, MemoryFilterCache,
    };
    use crate::task::registry::MemoryTaskRegistry;
    use crate::task::scheduler::DirectScheduler;
    use crate::task::testutil::{EchoAnnotatorConfig, FixedDatasetConfig};
    use crate::task::{ExperimentType, MatchingMode};

    /// Counts markings; enough structure to tell results apart.
    struct CountingEvaluator;

    impl Evaluator for CountingEvaluator {
        fn evaluate(
            &self,
            gold: &[Document],
            annotated: &[Document],
            _key: &TaskKey,
        ) -> Result<TaskResult, TaskError> {
            let gold_count: usize = gold.iter().map(|d| d.markings.len()).sum();
            let annotated_count: usize = annotated.iter().map(|d| d.markings.len()).sum();
            let recall = if gold_count == 0 {
                1.0
            } else {
                annotated_count as f64 / gold_count as f64
            };
            Ok(TaskResult {
                micro_recall: recall,
                ..TaskResult::default()
            })
        }
    }

    fn documents() -> Vec<Document> {
        vec![Document::new(
            "http://doc/1",
            vec![
                Marking::Meaning {
                    uris: vec!["http://kb.org/person/alice".to_string()],
                },
                Marking::Meaning {
                    uris: vec!["http://kb.org/place/berlin".to_string()],
                },
            ],
        )]
    }

    fn holder_with(filters: &[&str]) -> Arc<FilterHolder> {
        let factory = FilterPipelineFactory::new(Arc::new(MemoryFilterCache::new()), true);
        let definitions: Vec<FilterDefinition> = filters
            .iter()
            .map(|name| FilterDefinition::new(*name, "?v <p> <o>", vec![], "probe", 0))
            .collect();
        let holder = factory
            .build_holder(&definitions, &|_| Ok(Box::new(IdentityResolver::new())))
            .unwrap();
        Arc::new(holder)
    }

    fn experimenter(registry: Arc<dyn TaskRegistry>, holder: Arc<FilterHolder>) -> Experimenter {
        Experimenter::new(registry, Arc::new(CountingEvaluator), holder)
    }

    fn base(annotator: Arc<EchoAnnotatorConfig>, dataset: Arc<FixedDatasetConfig>) -> ExperimentConfiguration {
        ExperimentConfiguration {
            annotator,
            dataset,
            experiment_type: ExperimentType::A2KB,
            matching: MatchingMode::WeakAnnotationMatch,
        }
    }

    #[test]
    fn test_expansion_covers_identity_and_filters() {
        let registry: Arc<dyn TaskRegistry> = Arc::new(MemoryTaskRegistry::new());
        let experimenter = experimenter(Arc::clone(&registry), holder_with(&["persons"]));
        let plan = ExperimentPlan::new(vec![base(
            EchoAnnotatorConfig::new("a", true),
            FixedDatasetConfig::new("d", true, documents()),
        )]);

        let handles = experimenter.run(&plan, &DirectScheduler::new()).unwrap();
        assert_eq!(handles.len(), 2);
        let filters: Vec<&str> = handles.keys().map(|k| k.filter.as_str()).collect();
        assert!(filters.contains(&"nofilter"));
        assert!(filters.contains(&"persons"));
        for handle in handles.values() {
            let entry = registry.get(handle.task_id()).unwrap().unwrap();
            assert!(entry.state.is_finished());
        }
    }

    #[test]
    fn test_unfiltered_types_expand_to_identity_only() {
        let registry: Arc<dyn TaskRegistry> = Arc::new(MemoryTaskRegistry::new());
        let experimenter = experimenter(Arc::clone(&registry), holder_with(&["persons"]));
        let mut configuration = base(
            EchoAnnotatorConfig::new("a", true),
            FixedDatasetConfig::new("d", true, documents()),
        );
        configuration.experiment_type = ExperimentType::ERec;
        let plan = ExperimentPlan::new(vec![configuration]);

        let handles = experimenter.run(&plan, &DirectScheduler::new()).unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles.keys().next().unwrap().filter, "nofilter");
    }

    #[test]
    fn test_second_run_reuses_cacheable_results() {
        let registry: Arc<dyn TaskRegistry> = Arc::new(MemoryTaskRegistry::new());
        let experimenter = experimenter(Arc::clone(&registry), holder_with(&["persons"]));
        let annotator = EchoAnnotatorConfig::new("a", true);
        let dataset = FixedDatasetConfig::new("d", true, documents());

        let first = experimenter
            .run(
                &ExperimentPlan::new(vec![base(annotator.clone(), dataset.clone())]),
                &DirectScheduler::new(),
            )
            .unwrap();
        let second = experimenter
            .run(
                &ExperimentPlan::new(vec![base(annotator, dataset)]),
                &DirectScheduler::new(),
            )
            .unwrap();

        assert!(first.values().all(|h| !h.is_reused()));
        assert!(second.values().all(|h| h.is_reused()));
        for (key, handle) in &second {
            assert_eq!(handle.task_id(), first[key].task_id());
        }
    }

    #[test]
    fn test_non_cacheable_side_forces_fresh_tasks() {
        let registry: Arc<dyn TaskRegistry> = Arc::new(MemoryTaskRegistry::new());
        let experimenter = experimenter(Arc::clone(&registry), holder_with(&[]));
        let annotator = EchoAnnotatorConfig::new("a", false);
        let dataset = FixedDatasetConfig::new("d", true, documents());

        let first = experimenter
            .run(
                &ExperimentPlan::new(vec![base(annotator.clone(), dataset.clone())]),
                &DirectScheduler::new(),
            )
            .unwrap();
        let second = experimenter
            .run(
                &ExperimentPlan::new(vec![base(annotator, dataset)]),
                &DirectScheduler::new(),
            )
            .unwrap();

        assert!(second.values().all(|h| !h.is_reused()));
        let first_ids: Vec<u64> = first.values().map(|h| h.task_id()).collect();
        assert!(second.values().all(|h| !first_ids.contains(&h.task_id())));
    }

    #[test]
    fn test_upstream_failure_poisons_whole_unit() {
        let registry: Arc<dyn TaskRegistry> = Arc::new(MemoryTaskRegistry::new());
        let experimenter = experimenter(Arc::clone(&registry), holder_with(&["persons"]));
        let dataset = Arc::new(FixedDatasetConfig {
            dataset_name: "d".to_string(),
            cacheable: true,
            documents: documents(),
            fail_load: true,
        });
        let plan = ExperimentPlan::new(vec![base(EchoAnnotatorConfig::new("a", true), dataset)]);

        let handles = experimenter.run(&plan, &DirectScheduler::new()).unwrap();
        for handle in handles.values() {
            let entry = registry.get(handle.task_id()).unwrap().unwrap();
            assert_eq!(entry.state, TaskState::Errored(crate::task::ERROR_DATASET_LOAD));
        }
    }

    #[test]
    fn test_annotator_run_failure_poisons_whole_unit() {
        let registry: Arc<dyn TaskRegistry> = Arc::new(MemoryTaskRegistry::new());
        let experimenter = experimenter(Arc::clone(&registry), holder_with(&["persons"]));
        let annotator = Arc::new(EchoAnnotatorConfig {
            annotator_name: "a".to_string(),
            cacheable: true,
            fail_load: false,
            fail_run: true,
            runs: Arc::default(),
        });
        let plan = ExperimentPlan::new(vec![base(
            annotator,
            FixedDatasetConfig::new("d", true, documents()),
        )]);

        let handles = experimenter.run(&plan, &DirectScheduler::new()).unwrap();
        for handle in handles.values() {
            let entry = registry.get(handle.task_id()).unwrap().unwrap();
            assert_eq!(entry.state, TaskState::Errored(crate::task::ERROR_ANNOTATOR_RUN));
        }
    }

    #[test]
    fn test_sentinel_annotator_name_rejected_at_planning() {
        let registry: Arc<dyn TaskRegistry> = Arc::new(MemoryTaskRegistry::new());
        let experimenter = experimenter(Arc::clone(&registry), holder_with(&[]));
        let plan = ExperimentPlan::new(vec![base(
            EchoAnnotatorConfig::new(GOLD_STANDARD_SENTINEL, true),
            FixedDatasetConfig::new("d", true, documents()),
        )]);

        let err = experimenter.run(&plan, &DirectScheduler::new()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_duplicate_configurations_collapse_within_plan() {
        let registry: Arc<dyn TaskRegistry> = Arc::new(MemoryTaskRegistry::new());
        let experimenter = experimenter(Arc::clone(&registry), holder_with(&[]));
        let annotator = EchoAnnotatorConfig::new("a", true);
        let dataset = FixedDatasetConfig::new("d", true, documents());
        let plan = ExperimentPlan::new(vec![
            base(annotator.clone(), dataset.clone()),
            base(Arc::clone(&annotator), dataset),
        ]);

        let handles = experimenter.run(&plan, &DirectScheduler::new()).unwrap();
        // one expanded key, one task row, one dispatched unit
        assert_eq!(handles.len(), 1);
        assert!(registry.get(2).unwrap().is_none());
        assert_eq!(annotator.runs(), 1);
    }
}
