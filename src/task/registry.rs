//! The persisted task registry.
//!
//! The registry is the dedup layer's memory: one row per created task,
//! keyed by the five identity-relevant fields, surviving process restarts.
//! Reuse and creation happen in a single `get_or_create` operation under
//! one lock, so two concurrent submissions of the same work cannot both
//! create a row — the original system's separate check-then-create steps
//! left exactly that window open.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TaskError;
use crate::task::{TaskKey, TaskResult, TaskState};

fn lock_err(context: &'static str) -> TaskError {
    TaskError::Registry {
        reason: format!("poisoned lock: {context}"),
    }
}

/// One persisted registry row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEntry {
    /// The task id, unique within the registry and assigned sequentially.
    pub task_id: u64,
    /// The identity-relevant fields of the task configuration.
    pub key: TaskKey,
    /// The experiment this task was created for.
    pub experiment_id: Uuid,
    /// Completion state.
    pub state: TaskState,
    /// Scored result, present once finished.
    pub result: Option<TaskResult>,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Time of the last state change.
    pub last_changed: DateTime<Utc>,
}

/// Outcome of [`TaskRegistry::get_or_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskHandle {
    /// A new pending row was created.
    Created(u64),
    /// An existing finished row was reused; no new work is needed.
    Reused(u64),
}

impl TaskHandle {
    /// The task id, whether created or reused.
    #[must_use]
    pub const fn task_id(self) -> u64 {
        match self {
            Self::Created(id) | Self::Reused(id) => id,
        }
    }

    /// Returns true if an existing finished result was reused.
    #[must_use]
    pub const fn is_reused(self) -> bool {
        matches!(self, Self::Reused(_))
    }
}

/// The persisted mapping from task identity to task id and state.
pub trait TaskRegistry: Send + Sync {
    /// Reuses an existing finished row for `key` if `cache_eligible`, or
    /// creates a new pending row. One transactional operation: concurrent
    /// callers with the same key observe a single winner.
    ///
    /// # Errors
    /// [`TaskError::Registry`] on backend failure.
    fn get_or_create(
        &self,
        key: &TaskKey,
        experiment_id: Uuid,
        cache_eligible: bool,
    ) -> Result<TaskHandle, TaskError>;

    /// Updates the state of a task.
    ///
    /// # Errors
    /// [`TaskError::UnknownTask`] if the id does not exist.
    fn set_state(&self, task_id: u64, state: TaskState) -> Result<(), TaskError>;

    /// Stores the scored result of a task and marks it finished.
    ///
    /// # Errors
    /// [`TaskError::UnknownTask`] if the id does not exist.
    fn set_result(&self, task_id: u64, result: TaskResult) -> Result<(), TaskError>;

    /// Fetches a row by task id.
    ///
    /// # Errors
    /// [`TaskError::Registry`] on backend failure.
    fn get(&self, task_id: u64) -> Result<Option<TaskEntry>, TaskError>;

    /// The most recently created row for a key, if any.
    ///
    /// # Errors
    /// [`TaskError::Registry`] on backend failure.
    fn find_latest(&self, key: &TaskKey) -> Result<Option<TaskEntry>, TaskError>;
}

/// Registry contents; the disk backend serializes this whole structure.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryState {
    next_task_id: u64,
    entries: BTreeMap<u64, TaskEntry>,
}

impl RegistryState {
    fn get_or_create(
        &mut self,
        key: &TaskKey,
        experiment_id: Uuid,
        cache_eligible: bool,
    ) -> TaskHandle {
        if cache_eligible {
            let reusable = self
                .entries
                .values()
                .rev()
                .find(|entry| entry.key == *key && entry.state.is_finished());
            if let Some(entry) = reusable {
                log::debug!("reusing finished task {} for {key}", entry.task_id);
                return TaskHandle::Reused(entry.task_id);
            }
        }

        self.next_task_id += 1;
        let task_id = self.next_task_id;
        let now = Utc::now();
        self.entries.insert(
            task_id,
            TaskEntry {
                task_id,
                key: key.clone(),
                experiment_id,
                state: TaskState::Pending,
                result: None,
                created: now,
                last_changed: now,
            },
        );
        log::debug!("created task {task_id} for {key}");
        TaskHandle::Created(task_id)
    }

    fn set_state(&mut self, task_id: u64, state: TaskState) -> Result<(), TaskError> {
        let entry = self
            .entries
            .get_mut(&task_id)
            .ok_or(TaskError::UnknownTask { task_id })?;
        entry.state = state;
        entry.last_changed = Utc::now();
        Ok(())
    }

    fn set_result(&mut self, task_id: u64, result: TaskResult) -> Result<(), TaskError> {
        let entry = self
            .entries
            .get_mut(&task_id)
            .ok_or(TaskError::UnknownTask { task_id })?;
        entry.result = Some(result);
        entry.state = TaskState::Finished;
        entry.last_changed = Utc::now();
        Ok(())
    }

    fn find_latest(&self, key: &TaskKey) -> Option<&TaskEntry> {
        self.entries.values().rev().find(|entry| entry.key == *key)
    }
}

/// Thread-safe in-memory registry for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryTaskRegistry {
    state: RwLock<RegistryState>,
}

impl MemoryTaskRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskRegistry for MemoryTaskRegistry {
    fn get_or_create(
        &self,
        key: &TaskKey,
        experiment_id: Uuid,
        cache_eligible: bool,
    ) -> Result<TaskHandle, TaskError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("memory.get_or_create"))?;
        Ok(state.get_or_create(key, experiment_id, cache_eligible))
    }

    fn set_state(&self, task_id: u64, new_state: TaskState) -> Result<(), TaskError> {
        let mut state = self.state.write().map_err(|_| lock_err("memory.set_state"))?;
        state.set_state(task_id, new_state)
    }

    fn set_result(&self, task_id: u64, result: TaskResult) -> Result<(), TaskError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("memory.set_result"))?;
        state.set_result(task_id, result)
    }

    fn get(&self, task_id: u64) -> Result<Option<TaskEntry>, TaskError> {
        let state = self.state.read().map_err(|_| lock_err("memory.get"))?;
        Ok(state.entries.get(&task_id).cloned())
    }

    fn find_latest(&self, key: &TaskKey) -> Result<Option<TaskEntry>, TaskError> {
        let state = self.state.read().map_err(|_| lock_err("memory.find_latest"))?;
        Ok(state.find_latest(key).cloned())
    }
}

/// Disk-backed registry: the whole state as one JSON file, rewritten
/// through a temporary file plus rename on every mutation.
///
/// Mutation rates are low (a handful of rows per experiment), so a full
/// snapshot per write is simpler and safer than an append log.
#[derive(Debug)]
pub struct DiskTaskRegistry {
    path: PathBuf,
    state: Mutex<RegistryState>,
}

impl DiskTaskRegistry {
    /// Opens a registry file, creating parent directories if needed.
    /// A missing file starts an empty registry.
    ///
    /// # Errors
    /// [`TaskError::Registry`] if the file exists but cannot be read or
    /// decoded; a corrupt registry must not silently lose dedup history.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TaskError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| TaskError::Registry {
                reason: format!("cannot create {}: {e}", parent.display()),
            })?;
        }

        let state = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| TaskError::Registry {
                reason: format!("corrupt registry {}: {e}", path.display()),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryState::default(),
            Err(e) => {
                return Err(TaskError::Registry {
                    reason: format!("cannot read {}: {e}", path.display()),
                })
            }
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    fn persist(&self, state: &RegistryState) -> Result<(), TaskError> {
        let json = serde_json::to_string_pretty(state).map_err(|e| TaskError::Registry {
            reason: format!("cannot encode registry: {e}"),
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| TaskError::Registry {
            reason: format!("cannot write {}: {e}", tmp.display()),
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| TaskError::Registry {
            reason: format!("cannot replace {}: {e}", self.path.display()),
        })
    }
}

impl TaskRegistry for DiskTaskRegistry {
    fn get_or_create(
        &self,
        key: &TaskKey,
        experiment_id: Uuid,
        cache_eligible: bool,
    ) -> Result<TaskHandle, TaskError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| lock_err("disk.get_or_create"))?;
        let handle = state.get_or_create(key, experiment_id, cache_eligible);
        if matches!(handle, TaskHandle::Created(_)) {
            self.persist(&state)?;
        }
        Ok(handle)
    }

    fn set_state(&self, task_id: u64, new_state: TaskState) -> Result<(), TaskError> {
        let mut state = self.state.lock().map_err(|_| lock_err("disk.set_state"))?;
        state.set_state(task_id, new_state)?;
        self.persist(&state)
    }

    fn set_result(&self, task_id: u64, result: TaskResult) -> Result<(), TaskError> {
        let mut state = self.state.lock().map_err(|_| lock_err("disk.set_result"))?;
        state.set_result(task_id, result)?;
        self.persist(&state)
    }

    fn get(&self, task_id: u64) -> Result<Option<TaskEntry>, TaskError> {
        let state = self.state.lock().map_err(|_| lock_err("disk.get"))?;
        Ok(state.entries.get(&task_id).cloned())
    }

    fn find_latest(&self, key: &TaskKey) -> Result<Option<TaskEntry>, TaskError> {
        let state = self.state.lock().map_err(|_| lock_err("disk.find_latest"))?;
        Ok(state.find_latest(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{ExperimentType, MatchingMode};

    // Compile-time test: ensure the registry trait is object-safe
    fn _assert_registry_object_safe(_: &dyn TaskRegistry) {}

    fn key(filter: &str) -> TaskKey {
        TaskKey {
            annotator: "spotlight".to_string(),
            dataset: "kore50".to_string(),
            experiment_type: ExperimentType::A2KB,
            matching: MatchingMode::WeakAnnotationMatch,
            filter: filter.to_string(),
        }
    }

    #[test]
    fn test_create_then_reuse_finished() {
        let registry = MemoryTaskRegistry::new();
        let experiment = Uuid::new_v4();
        let k = key("persons");

        let first = registry.get_or_create(&k, experiment, true).unwrap();
        assert!(matches!(first, TaskHandle::Created(1)));

        // not finished yet: a second eligible request creates a new row
        let second = registry.get_or_create(&k, experiment, true).unwrap();
        assert!(matches!(second, TaskHandle::Created(2)));

        registry.set_result(first.task_id(), TaskResult::default()).unwrap();
        let third = registry.get_or_create(&k, experiment, true).unwrap();
        assert_eq!(third, TaskHandle::Reused(1));
    }

    #[test]
    fn test_not_eligible_always_creates() {
        let registry = MemoryTaskRegistry::new();
        let experiment = Uuid::new_v4();
        let k = key("persons");

        let first = registry.get_or_create(&k, experiment, false).unwrap();
        registry.set_result(first.task_id(), TaskResult::default()).unwrap();

        let second = registry.get_or_create(&k, experiment, false).unwrap();
        assert!(matches!(second, TaskHandle::Created(_)));
        assert_ne!(first.task_id(), second.task_id());
    }

    #[test]
    fn test_distinct_keys_never_merge() {
        let registry = MemoryTaskRegistry::new();
        let experiment = Uuid::new_v4();

        let a = registry.get_or_create(&key("persons"), experiment, true).unwrap();
        registry.set_result(a.task_id(), TaskResult::default()).unwrap();

        // same base, different filter: semantically distinct work
        let b = registry.get_or_create(&key("places"), experiment, true).unwrap();
        assert!(matches!(b, TaskHandle::Created(_)));
    }

    #[test]
    fn test_state_transitions() {
        let registry = MemoryTaskRegistry::new();
        let handle = registry
            .get_or_create(&key("persons"), Uuid::new_v4(), true)
            .unwrap();
        let id = handle.task_id();

        registry.set_state(id, TaskState::Running).unwrap();
        assert_eq!(registry.get(id).unwrap().unwrap().state, TaskState::Running);

        registry.set_state(id, TaskState::Errored(-103)).unwrap();
        let entry = registry.get(id).unwrap().unwrap();
        assert_eq!(entry.state, TaskState::Errored(-103));
        assert!(!entry.state.is_finished());

        let err = registry.set_state(999, TaskState::Running).unwrap_err();
        assert!(matches!(err, TaskError::UnknownTask { task_id: 999 }));
    }

    #[test]
    fn test_disk_registry_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let experiment = Uuid::new_v4();
        let k = key("persons");

        {
            let registry = DiskTaskRegistry::open(&path).unwrap();
            let handle = registry.get_or_create(&k, experiment, true).unwrap();
            registry
                .set_result(handle.task_id(), TaskResult {
                    micro_f1: 0.5,
                    ..TaskResult::default()
                })
                .unwrap();
        }

        let registry = DiskTaskRegistry::open(&path).unwrap();
        let reused = registry.get_or_create(&k, experiment, true).unwrap();
        assert_eq!(reused, TaskHandle::Reused(1));
        let entry = registry.get(1).unwrap().unwrap();
        assert_eq!(entry.result.unwrap().micro_f1, 0.5);

        // id sequence continues, no reuse of ids across restarts
        let fresh = registry
            .get_or_create(&key("places"), experiment, true)
            .unwrap();
        assert_eq!(fresh, TaskHandle::Created(2));
    }

    #[test]
    fn test_disk_registry_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        fs::write(&path, "{ nope").unwrap();
        let err = DiskTaskRegistry::open(&path).unwrap_err();
        assert!(matches!(err, TaskError::Registry { .. }));
    }
}
