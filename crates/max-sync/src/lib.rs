// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! max-sync
//!
//! Interprets a connector's [`SyncPlan`] into a task graph and drives it to
//! completion against a [`TaskStore`], emitting [`SyncEvent`]s as it goes.

pub mod bus;
pub mod cancel;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use max_engine::EntityDef;
use max_error::MaxError;
use max_id::Ref;
use max_task_store::{Task, TaskState, TaskStore, TaskTemplate};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub use bus::{EventBus, EventBusStats, EventSubscription, SyncEvent};
pub use cancel::CancellationToken;

/// What one step in a [`SyncPlan`] operates over.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StepTarget {
    /// Every instance of an entity type, as defined by its schema.
    ForAll(EntityDef),
    /// The root entity of the installation.
    ForRoot(Ref),
    /// One specific, already-known entity.
    ForOne(Ref),
}

/// What a step does to its target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StepOperation {
    /// Load the given scalar/date fields.
    LoadFields(Vec<String>),
    /// Load every element of a collection field.
    LoadCollection(String),
}

/// A single unit of sync work: a target and the operation to run on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// What the step operates over.
    pub target: StepTarget,
    /// What the step does.
    pub operation: StepOperation,
}

/// One entry in a [`SyncPlan`]: a single step, or a group of steps that may
/// run concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PlanEntry {
    /// A single step, sequenced after the previous entry.
    Step(Step),
    /// Steps with no ordering dependency between them.
    Parallel(Vec<Step>),
}

/// An ordered sequence of plan entries describing everything one sync run
/// must do.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncPlan {
    /// The entries, in execution order. Entries link sequentially; steps
    /// within one `Parallel` entry do not depend on each other.
    pub entries: Vec<PlanEntry>,
}

/// What one task accomplished, reported by a [`TaskRunner`] on success.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// The entity type the task operated on.
    pub entity_type: String,
    /// Number of entities touched, if the runner can report one.
    pub count: Option<usize>,
}

/// Executes one [`Task`]'s payload against an installation's connector and
/// engine.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Run one task to completion, or return the error it failed with.
    async fn run(&self, task: &Task) -> Result<TaskOutcome, MaxError>;
}

/// The lifecycle state of one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// The drive loop is actively claiming and dispatching tasks.
    Running,
    /// Claiming is stopped; in-flight tasks are finishing.
    Paused,
    /// Every task reached a terminal state with no failures reported.
    Completed,
    /// The run terminated with at least one failed task.
    Failed,
    /// `cancel()` was called; remaining tasks were marked cancelled.
    Cancelled,
}

/// The aggregate result of one finished sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// How the run ended.
    pub status: SyncStatus,
    /// Number of tasks that completed successfully.
    pub tasks_completed: usize,
    /// Number of tasks that failed.
    pub tasks_failed: usize,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

/// A successor entry's tasks waiting on every sibling of the previous
/// `Parallel` group, keyed by temp id until [`SyncExecutor::run`] resolves
/// them to assigned task ids.
struct FanIn {
    successor_temp_id: String,
    predecessor_temp_ids: Vec<String>,
}

/// Turn a [`SyncPlan`] into the initial task batch: parallel groups become
/// sibling tasks with no `blockedBy`, sequential entries chain via
/// `blockedBy` on the previous entry's single task. An entry following a
/// `Parallel` group of more than one step cannot be expressed with a single
/// `blockedBy` edge, so its tasks are enqueued `held` and released as a
/// fan-in once every sibling of that group has completed.
fn plan_to_templates(sync_id: &str, plan: &SyncPlan) -> (Vec<TaskTemplate>, Vec<FanIn>) {
    let mut templates = Vec::new();
    let mut fan_ins = Vec::new();
    let mut previous_temp_ids: Vec<String> = Vec::new();
    let mut counter: u64 = 0;

    for entry in &plan.entries {
        let steps: Vec<&Step> = match entry {
            PlanEntry::Step(step) => vec![step],
            PlanEntry::Parallel(steps) => steps.iter().collect(),
        };

        let needs_fan_in = previous_temp_ids.len() > 1;
        let blocked_by_temp_id = if needs_fan_in { None } else { previous_temp_ids.first().cloned() };

        let mut current_temp_ids = Vec::with_capacity(steps.len());
        for step in steps {
            counter += 1;
            let temp_id = format!("plan-{counter}");
            templates.push(TaskTemplate {
                temp_id: temp_id.clone(),
                sync_id: sync_id.to_string(),
                parent_temp_id: None,
                blocked_by_temp_id: blocked_by_temp_id.clone(),
                held: needs_fan_in,
                not_before: None,
                payload: serde_json::to_value(step).unwrap_or(serde_json::Value::Null),
            });
            if needs_fan_in {
                fan_ins.push(FanIn {
                    successor_temp_id: temp_id.clone(),
                    predecessor_temp_ids: previous_temp_ids.clone(),
                });
            }
            current_temp_ids.push(temp_id);
        }
        previous_temp_ids = current_temp_ids;
    }

    (templates, fan_ins)
}

/// Read the entity type a task's payload targets, for event labelling.
fn entity_type_of(task: &Task) -> String {
    let step: Result<Step, _> = serde_json::from_value(task.payload.clone());
    match step {
        Ok(step) => match step.target {
            StepTarget::ForAll(def) => def.entity_type,
            StepTarget::ForRoot(r) | StepTarget::ForOne(r) => r.entity_type,
        },
        Err(_) => "unknown".to_string(),
    }
}

/// Drives one sync run's task graph to completion.
pub struct SyncExecutor {
    task_store: Arc<dyn TaskStore>,
    runner: Arc<dyn TaskRunner>,
    bus: Arc<EventBus>,
}

impl SyncExecutor {
    /// Build an executor over the given task store, runner, and event bus.
    pub fn new(task_store: Arc<dyn TaskStore>, runner: Arc<dyn TaskRunner>, bus: Arc<EventBus>) -> Self {
        Self { task_store, runner, bus }
    }

    /// Assign a sync id, enqueue the plan's initial task batch, and spawn
    /// the drive loop in the background. Returns immediately with a handle.
    pub async fn run(&self, sync_id: String, plan: SyncPlan) -> Result<SyncHandle, MaxError> {
        self.bus.publish(SyncEvent::SyncStarted { sync_id: sync_id.clone() });

        let (templates, fan_ins) = plan_to_templates(&sync_id, &plan);
        let mut fan_in_by_successor: std::collections::BTreeMap<String, Vec<String>> = std::collections::BTreeMap::new();
        if !templates.is_empty() {
            let temp_order: Vec<String> = templates.iter().map(|t| t.temp_id.clone()).collect();
            let assigned_ids = self.task_store.enqueue_graph(templates).await?;
            let temp_to_real: std::collections::BTreeMap<&str, &str> =
                temp_order.iter().map(String::as_str).zip(assigned_ids.iter().map(String::as_str)).collect();
            for fan_in in &fan_ins {
                let successor = temp_to_real[fan_in.successor_temp_id.as_str()].to_string();
                let predecessors =
                    fan_in.predecessor_temp_ids.iter().map(|temp_id| temp_to_real[temp_id.as_str()].to_string()).collect();
                fan_in_by_successor.insert(successor, predecessors);
            }
        }

        let paused = Arc::new(AtomicBool::new(false));
        let cancel_token = CancellationToken::new();
        let (completion_tx, completion_rx) = watch::channel(None);

        let task_store = Arc::clone(&self.task_store);
        let runner = Arc::clone(&self.runner);
        let bus = Arc::clone(&self.bus);
        let drive_sync_id = sync_id.clone();
        let drive_paused = Arc::clone(&paused);
        let drive_token = cancel_token.clone();

        tokio::spawn(async move {
            let result = drive(
                &task_store,
                &runner,
                &bus,
                &drive_sync_id,
                &drive_paused,
                &drive_token,
                fan_in_by_successor,
            )
            .await;
            let _ = completion_tx.send(Some(result));
        });

        Ok(SyncHandle {
            sync_id,
            task_store: Arc::clone(&self.task_store),
            paused,
            cancel_token,
            completion: completion_rx,
        })
    }
}

async fn drive(
    task_store: &Arc<dyn TaskStore>,
    runner: &Arc<dyn TaskRunner>,
    bus: &Arc<EventBus>,
    sync_id: &str,
    paused: &Arc<AtomicBool>,
    cancel_token: &CancellationToken,
    mut fan_in_by_successor: std::collections::BTreeMap<String, Vec<String>>,
) -> SyncResult {
    let started = Instant::now();
    let mut tasks_completed = 0usize;
    let mut tasks_failed = 0usize;

    loop {
        if cancel_token.is_cancelled() {
            cancel_remaining(task_store, sync_id).await;
            return SyncResult {
                status: SyncStatus::Cancelled,
                tasks_completed,
                tasks_failed,
                duration: started.elapsed(),
            };
        }

        if !matches!(task_store.has_active_tasks(sync_id).await, Ok(true)) {
            break;
        }

        if paused.load(Ordering::SeqCst) {
            task_store.wait_for_activity(sync_id).await;
            continue;
        }

        let claimed = match task_store.claim(sync_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                task_store.wait_for_activity(sync_id).await;
                continue;
            }
            Err(error) => {
                tracing::warn!(sync_id, %error, "claim failed, retrying after backoff");
                task_store.wait_for_activity(sync_id).await;
                continue;
            }
        };

        let entity_type = entity_type_of(&claimed);
        match runner.run(&claimed).await {
            Ok(outcome) => {
                if let Err(error) = task_store.complete(&claimed.id).await {
                    tracing::warn!(task_id = %claimed.id, %error, "complete failed after successful run");
                }
                let _ = task_store.unblock_dependents(&claimed.id).await;
                if let Some(parent_id) = &claimed.parent_id {
                    if matches!(task_store.all_children_complete(parent_id).await, Ok(true))
                        && task_store.complete(parent_id).await.is_ok()
                    {
                        let _ = task_store.unblock_dependents(parent_id).await;
                    }
                }

                let satisfied: Vec<String> = fan_in_by_successor
                    .iter_mut()
                    .filter_map(|(successor, predecessors)| {
                        predecessors.retain(|predecessor| predecessor != &claimed.id);
                        predecessors.is_empty().then(|| successor.clone())
                    })
                    .collect();
                for successor in satisfied {
                    fan_in_by_successor.remove(&successor);
                    let _ = task_store.promote(&successor).await;
                }

                tasks_completed += 1;
                bus.publish(SyncEvent::TaskCompleted {
                    entity_type: outcome.entity_type,
                    count: outcome.count,
                });
            }
            Err(error) => {
                tracing::warn!(task_id = %claimed.id, %error, "task failed");
                let _ = task_store.fail(&claimed.id, error).await;
                tasks_failed += 1;
                bus.publish(SyncEvent::TaskFailed { entity_type });
            }
        }
    }

    let status = if tasks_failed > 0 { SyncStatus::Failed } else { SyncStatus::Completed };
    SyncResult {
        status,
        tasks_completed,
        tasks_failed,
        duration: started.elapsed(),
    }
}

async fn cancel_remaining(task_store: &Arc<dyn TaskStore>, sync_id: &str) {
    if let Ok(tasks) = task_store.list_for_sync(sync_id).await {
        for task in tasks {
            if !matches!(task.state, TaskState::Completed | TaskState::Failed | TaskState::Cancelled) {
                let _ = task_store.cancel(&task.id).await;
            }
        }
    }
}

/// A handle to one in-flight or finished sync run.
pub struct SyncHandle {
    sync_id: String,
    task_store: Arc<dyn TaskStore>,
    paused: Arc<AtomicBool>,
    cancel_token: CancellationToken,
    completion: watch::Receiver<Option<SyncResult>>,
}

impl SyncHandle {
    /// The sync id this handle tracks.
    #[must_use]
    pub fn sync_id(&self) -> &str {
        &self.sync_id
    }

    /// Current status, derived from the completion channel and pause flag.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        if let Some(result) = self.completion.borrow().as_ref() {
            return result.status;
        }
        if self.paused.load(Ordering::SeqCst) {
            SyncStatus::Paused
        } else {
            SyncStatus::Running
        }
    }

    /// Stop claiming new tasks. In-flight tasks run to completion.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Resume claiming after a [`Self::pause`].
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Mark every remaining non-terminal task for this sync `cancelled` and
    /// complete the handle with status [`SyncStatus::Cancelled`].
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Await the run's [`SyncResult`]. Resolves immediately if it already
    /// finished.
    pub async fn completion(&self) -> SyncResult {
        let mut rx = self.completion.clone();
        loop {
            if let Some(result) = rx.borrow().as_ref() {
                return result.clone();
            }
            if rx.changed().await.is_err() {
                return SyncResult {
                    status: SyncStatus::Completed,
                    tasks_completed: 0,
                    tasks_failed: 0,
                    duration: Duration::ZERO,
                };
            }
        }
    }

    /// Access the underlying task store, e.g. for diagnostics.
    #[must_use]
    pub fn task_store(&self) -> &Arc<dyn TaskStore> {
        &self.task_store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use max_task_store::InMemoryTaskStore;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    struct CountingRunner {
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl TaskRunner for CountingRunner {
        async fn run(&self, task: &Task) -> Result<TaskOutcome, MaxError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(n) {
                return Err(MaxError::new("sync.upstream_error", "boom"));
            }
            let entity_type = entity_type_of(task);
            Ok(TaskOutcome { entity_type, count: Some(1) })
        }
    }

    fn entity_def(entity_type: &str) -> EntityDef {
        EntityDef {
            entity_type: entity_type.to_string(),
            fields: Default::default(),
            required: vec![],
        }
    }

    fn one_step_plan(entity_type: &str) -> SyncPlan {
        SyncPlan {
            entries: vec![PlanEntry::Step(Step {
                target: StepTarget::ForAll(entity_def(entity_type)),
                operation: StepOperation::LoadFields(vec!["name".into()]),
            })],
        }
    }

    #[tokio::test]
    async fn plan_with_two_sequential_steps_runs_both_in_order() {
        let plan = SyncPlan {
            entries: vec![
                PlanEntry::Step(Step {
                    target: StepTarget::ForAll(entity_def("contact")),
                    operation: StepOperation::LoadFields(vec!["name".into()]),
                }),
                PlanEntry::Step(Step {
                    target: StepTarget::ForAll(entity_def("deal")),
                    operation: StepOperation::LoadFields(vec!["amount".into()]),
                }),
            ],
        };

        let task_store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let runner: Arc<dyn TaskRunner> =
            Arc::new(CountingRunner { calls: AtomicUsize::new(0), fail_on: None });
        let bus = Arc::new(EventBus::new());
        let executor = SyncExecutor::new(Arc::clone(&task_store), runner, bus);

        let handle = executor.run("sync-1".into(), plan).await.unwrap();
        let result = tokio::time::timeout(StdDuration::from_secs(2), handle.completion()).await.unwrap();
        assert_eq!(result.status, SyncStatus::Completed);
        assert_eq!(result.tasks_completed, 2);
        assert_eq!(result.tasks_failed, 0);
    }

    #[tokio::test]
    async fn failing_task_marks_run_failed_and_emits_task_failed() {
        let plan = one_step_plan("contact");
        let task_store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let runner: Arc<dyn TaskRunner> =
            Arc::new(CountingRunner { calls: AtomicUsize::new(0), fail_on: Some(0) });
        let bus = Arc::new(EventBus::new());
        let mut sub = bus.subscribe();
        let executor = SyncExecutor::new(Arc::clone(&task_store), runner, bus);

        let handle = executor.run("sync-2".into(), plan).await.unwrap();
        assert!(matches!(sub.recv().await, Some(SyncEvent::SyncStarted { .. })));
        let failed = sub.recv().await.unwrap();
        assert!(matches!(failed, SyncEvent::TaskFailed { entity_type } if entity_type == "contact"));

        let result = tokio::time::timeout(StdDuration::from_secs(2), handle.completion()).await.unwrap();
        assert_eq!(result.status, SyncStatus::Failed);
        assert_eq!(result.tasks_failed, 1);
    }

    #[tokio::test]
    async fn cancel_marks_remaining_tasks_cancelled() {
        let plan = SyncPlan {
            entries: vec![PlanEntry::Parallel(vec![
                Step {
                    target: StepTarget::ForAll(entity_def("contact")),
                    operation: StepOperation::LoadFields(vec![]),
                },
                Step {
                    target: StepTarget::ForAll(entity_def("deal")),
                    operation: StepOperation::LoadFields(vec![]),
                },
            ])],
        };

        let task_store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let runner: Arc<dyn TaskRunner> =
            Arc::new(CountingRunner { calls: AtomicUsize::new(0), fail_on: None });
        let bus = Arc::new(EventBus::new());
        let executor = SyncExecutor::new(Arc::clone(&task_store), runner, bus);

        let handle = executor.run("sync-3".into(), plan).await.unwrap();
        handle.cancel();
        let result = tokio::time::timeout(StdDuration::from_secs(2), handle.completion()).await.unwrap();
        assert_eq!(result.status, SyncStatus::Cancelled);
    }

    #[tokio::test]
    async fn pause_stops_claiming_until_resumed() {
        let plan = one_step_plan("contact");
        let task_store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let runner: Arc<dyn TaskRunner> =
            Arc::new(CountingRunner { calls: AtomicUsize::new(0), fail_on: None });
        let bus = Arc::new(EventBus::new());
        let executor = SyncExecutor::new(Arc::clone(&task_store), runner, bus);

        let handle = executor.run("sync-4".into(), plan).await.unwrap();
        handle.pause();
        assert_eq!(handle.status(), SyncStatus::Paused);
        handle.resume();
        let result = tokio::time::timeout(StdDuration::from_secs(2), handle.completion()).await.unwrap();
        assert_eq!(result.status, SyncStatus::Completed);
    }

    #[test]
    fn plan_to_templates_chains_sequential_entries() {
        let plan = SyncPlan {
            entries: vec![
                PlanEntry::Step(Step {
                    target: StepTarget::ForAll(entity_def("contact")),
                    operation: StepOperation::LoadFields(vec![]),
                }),
                PlanEntry::Step(Step {
                    target: StepTarget::ForAll(entity_def("deal")),
                    operation: StepOperation::LoadFields(vec![]),
                }),
            ],
        };
        let (templates, fan_ins) = plan_to_templates("sync-1", &plan);
        assert_eq!(templates.len(), 2);
        assert!(templates[0].blocked_by_temp_id.is_none());
        assert_eq!(templates[1].blocked_by_temp_id.as_deref(), Some(templates[0].temp_id.as_str()));
        assert!(fan_ins.is_empty());
    }

    #[test]
    fn plan_to_templates_parallel_group_has_no_blocked_by() {
        let plan = SyncPlan {
            entries: vec![PlanEntry::Parallel(vec![
                Step {
                    target: StepTarget::ForAll(entity_def("contact")),
                    operation: StepOperation::LoadFields(vec![]),
                },
                Step {
                    target: StepTarget::ForAll(entity_def("deal")),
                    operation: StepOperation::LoadFields(vec![]),
                },
            ])],
        };
        let (templates, fan_ins) = plan_to_templates("sync-1", &plan);
        assert_eq!(templates.len(), 2);
        assert!(templates[0].blocked_by_temp_id.is_none());
        assert!(templates[1].blocked_by_temp_id.is_none());
        assert!(fan_ins.is_empty());
    }

    #[test]
    fn plan_to_templates_step_after_parallel_group_waits_on_every_sibling() {
        let plan = SyncPlan {
            entries: vec![
                PlanEntry::Parallel(vec![
                    Step {
                        target: StepTarget::ForAll(entity_def("contact")),
                        operation: StepOperation::LoadFields(vec![]),
                    },
                    Step {
                        target: StepTarget::ForAll(entity_def("deal")),
                        operation: StepOperation::LoadFields(vec![]),
                    },
                ]),
                PlanEntry::Step(Step {
                    target: StepTarget::ForAll(entity_def("activity")),
                    operation: StepOperation::LoadFields(vec![]),
                }),
            ],
        };
        let (templates, fan_ins) = plan_to_templates("sync-1", &plan);
        assert_eq!(templates.len(), 3);
        let group: Vec<&str> = templates[..2].iter().map(|t| t.temp_id.as_str()).collect();

        let successor = &templates[2];
        assert!(successor.blocked_by_temp_id.is_none());
        assert!(successor.held);

        assert_eq!(fan_ins.len(), 1);
        assert_eq!(fan_ins[0].successor_temp_id, successor.temp_id);
        assert_eq!(fan_ins[0].predecessor_temp_ids, group);
    }

    #[tokio::test]
    async fn step_after_parallel_group_runs_only_once_every_sibling_completes() {
        let plan = SyncPlan {
            entries: vec![
                PlanEntry::Parallel(vec![
                    Step {
                        target: StepTarget::ForAll(entity_def("contact")),
                        operation: StepOperation::LoadFields(vec![]),
                    },
                    Step {
                        target: StepTarget::ForAll(entity_def("deal")),
                        operation: StepOperation::LoadFields(vec![]),
                    },
                ]),
                PlanEntry::Step(Step {
                    target: StepTarget::ForAll(entity_def("activity")),
                    operation: StepOperation::LoadFields(vec![]),
                }),
            ],
        };

        let task_store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let runner: Arc<dyn TaskRunner> =
            Arc::new(CountingRunner { calls: AtomicUsize::new(0), fail_on: None });
        let bus = Arc::new(EventBus::new());
        let executor = SyncExecutor::new(Arc::clone(&task_store), runner, bus);

        let handle = executor.run("sync-5".into(), plan).await.unwrap();
        let result = tokio::time::timeout(StdDuration::from_secs(2), handle.completion()).await.unwrap();
        assert_eq!(result.status, SyncStatus::Completed);
        assert_eq!(result.tasks_completed, 3);
        assert_eq!(result.tasks_failed, 0);
    }

    #[tokio::test]
    async fn empty_plan_completes_immediately_with_zero_counts() {
        let task_store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let runner: Arc<dyn TaskRunner> =
            Arc::new(CountingRunner { calls: AtomicUsize::new(0), fail_on: None });
        let bus = Arc::new(EventBus::new());
        let executor = SyncExecutor::new(Arc::clone(&task_store), runner, bus);

        let handle = executor.run("sync-5".into(), SyncPlan::default()).await.unwrap();
        let result = tokio::time::timeout(StdDuration::from_secs(2), handle.completion()).await.unwrap();
        assert_eq!(result.status, SyncStatus::Completed);
        assert_eq!(result.tasks_completed, 0);
    }
}
