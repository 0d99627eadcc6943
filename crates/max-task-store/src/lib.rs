// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! max-task-store
//!
//! The persistent task graph an installation's sync executor drives:
//! parent/child and blocked-by edges, at-most-one claim semantics, and
//! completion propagation.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use max_error::{MaxError, MaxErrorDto};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};

/// The lifecycle state of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Created but blocked on a predecessor; not yet claimable.
    New,
    /// Unblocked and waiting to be claimed.
    Pending,
    /// Claimed and currently executing.
    Running,
    /// Finished its own work but waiting on children to complete.
    AwaitingChildren,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Paused by an operator before completion.
    Paused,
    /// Cancelled before completion.
    Cancelled,
}

impl TaskState {
    fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Paused | TaskState::Cancelled)
    }
}

/// One node in the task graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique id, assigned by the store on enqueue.
    pub id: String,
    /// The sync run this task belongs to.
    pub sync_id: String,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Parent task, if this task is a child spawned during another's run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// A task that must complete before this one becomes claimable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<String>,
    /// Earliest time this task may be claimed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    /// Opaque work payload interpreted by the `TaskRunner`.
    pub payload: serde_json::Value,
    /// When this task was enqueued.
    pub created_at: DateTime<Utc>,
    /// When this task reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// The error this task failed with, if `state == failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MaxErrorDto>,
}

/// A task to enqueue directly, referencing existing task ids.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    /// The sync run this task belongs to.
    pub sync_id: String,
    /// An existing parent task id.
    pub parent_id: Option<String>,
    /// An existing task id that must complete first.
    pub blocked_by: Option<String>,
    /// Earliest time this task may be claimed.
    pub not_before: Option<DateTime<Utc>>,
    /// Opaque work payload.
    pub payload: serde_json::Value,
}

/// One entry in a batch passed to [`TaskStore::enqueue_graph`]. Templates
/// reference each other by a batch-local `temp_id`; the store rewrites
/// `parent_temp_id`/`blocked_by_temp_id` into assigned task ids.
#[derive(Debug, Clone)]
pub struct TaskTemplate {
    /// Batch-local identifier other templates in the same call may
    /// reference.
    pub temp_id: String,
    /// The sync run this task belongs to.
    pub sync_id: String,
    /// Another template's `temp_id` that is this task's parent.
    pub parent_temp_id: Option<String>,
    /// Another template's `temp_id` that must complete first.
    pub blocked_by_temp_id: Option<String>,
    /// Start `new` even with no `blocked_by_temp_id`, instead of the usual
    /// `pending`. Used for a task that depends on more than one predecessor:
    /// the caller holds it in `new` and calls [`TaskStore::promote`] once
    /// every predecessor it is actually waiting on has completed.
    pub held: bool,
    /// Earliest time this task may be claimed.
    pub not_before: Option<DateTime<Utc>>,
    /// Opaque work payload.
    pub payload: serde_json::Value,
}

/// Persistent storage for a sync run's task graph.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a single task, assigning it a monotonic id.
    async fn enqueue(&self, task: NewTask) -> Result<String, MaxError>;

    /// Atomically insert a batch of tasks that reference each other by
    /// `temp_id`. Returns the assigned ids, in template order.
    async fn enqueue_graph(&self, templates: Vec<TaskTemplate>) -> Result<Vec<String>, MaxError>;

    /// Fetch one task by id.
    async fn get(&self, id: &str) -> Result<Task, MaxError>;

    /// Atomically claim one `pending` task for `sync_id` whose `not_before`
    /// has passed, transitioning it to `running`. Returns `None` if no
    /// task is eligible right now.
    async fn claim(&self, sync_id: &str) -> Result<Option<Task>, MaxError>;

    /// Transition `running → completed`, stamping `completed_at`.
    async fn complete(&self, id: &str) -> Result<(), MaxError>;

    /// Transition `running → awaiting_children`.
    async fn set_awaiting_children(&self, id: &str) -> Result<(), MaxError>;

    /// Transition `running → failed`, stamping `error` and `completed_at`.
    async fn fail(&self, id: &str, error: MaxError) -> Result<(), MaxError>;

    /// Transition every `new` task with `blocked_by == completed_task_id`
    /// to `pending`. Returns the number of tasks unblocked.
    async fn unblock_dependents(&self, completed_task_id: &str) -> Result<usize, MaxError>;

    /// Transition a single `new` task straight to `pending`, independent of
    /// its `blocked_by` edge. Used to release a task a sync executor is
    /// holding until every member of a fan-in group has completed.
    async fn promote(&self, id: &str) -> Result<(), MaxError>;

    /// `true` iff `parent_id` has at least one child and every child is
    /// `completed`.
    async fn all_children_complete(&self, parent_id: &str) -> Result<bool, MaxError>;

    /// `true` iff any task for `sync_id` is `pending` or `running`.
    async fn has_active_tasks(&self, sync_id: &str) -> Result<bool, MaxError>;

    /// Snapshot every task belonging to `sync_id`, in id order. Used by a
    /// sync executor's cancel path to find every task it must mark
    /// `cancelled`, including ones spawned as children mid-run.
    async fn list_for_sync(&self, sync_id: &str) -> Result<Vec<Task>, MaxError>;

    /// Transition a non-terminal task to `paused`.
    async fn pause(&self, id: &str) -> Result<(), MaxError>;

    /// Transition a non-terminal task to `cancelled`.
    async fn cancel(&self, id: &str) -> Result<(), MaxError>;

    /// Suspend until the store has new activity for `sync_id` (an enqueue
    /// or an unblock) or a bounded timeout elapses, whichever comes
    /// first. Used by a sync executor between empty `claim` attempts
    /// instead of busy-polling.
    async fn wait_for_activity(&self, sync_id: &str);
}

fn invalid_transition(id: &str, from: TaskState, to: &str) -> MaxError {
    MaxError::new(
        "task_store.invalid_transition",
        format!("task {id} cannot transition from {from:?} to {to}"),
    )
    .with_facet(max_error::Facet::InvariantViolated)
}

fn not_found(id: &str) -> MaxError {
    MaxError::not_found("task_store.task_not_found", "task", id)
}

/// An in-memory [`TaskStore`]. Tasks are kept in a `BTreeMap` keyed by a
/// monotonic numeric id, so iteration order is insertion (FIFO) order —
/// the reference claim policy the specification permits.
pub struct InMemoryTaskStore {
    tasks: Mutex<BTreeMap<u64, Task>>,
    next_id: Mutex<u64>,
    activity: Notify,
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTaskStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(BTreeMap::new()),
            next_id: Mutex::new(1),
            activity: Notify::new(),
        }
    }

    fn parse_id(id: &str) -> Option<u64> {
        id.strip_prefix("task-")?.parse().ok()
    }

    async fn transition(
        &self,
        id: &str,
        allowed_from: &[TaskState],
        to: TaskState,
        stamp_completed: bool,
        error: Option<MaxError>,
    ) -> Result<(), MaxError> {
        let key = Self::parse_id(id).ok_or_else(|| not_found(id))?;
        let mut tasks = self.tasks.lock().await;
        let task = tasks.get_mut(&key).ok_or_else(|| not_found(id))?;
        if !allowed_from.contains(&task.state) {
            return Err(invalid_transition(id, task.state, &format!("{to:?}")));
        }
        task.state = to;
        if stamp_completed {
            task.completed_at = Some(Utc::now());
        }
        if let Some(e) = error {
            task.error = Some(e.to_dto());
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn enqueue(&self, task: NewTask) -> Result<String, MaxError> {
        let mut next_id = self.next_id.lock().await;
        let key = *next_id;
        *next_id += 1;
        drop(next_id);

        let id = format!("task-{key}");
        let state = if task.blocked_by.is_some() {
            TaskState::New
        } else {
            TaskState::Pending
        };
        let record = Task {
            id: id.clone(),
            sync_id: task.sync_id,
            state,
            parent_id: task.parent_id,
            blocked_by: task.blocked_by,
            not_before: task.not_before,
            payload: task.payload,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        };
        self.tasks.lock().await.insert(key, record);
        self.activity.notify_waiters();
        Ok(id)
    }

    async fn enqueue_graph(&self, templates: Vec<TaskTemplate>) -> Result<Vec<String>, MaxError> {
        let known: std::collections::BTreeSet<&str> = templates.iter().map(|t| t.temp_id.as_str()).collect();
        for t in &templates {
            for reference in [t.parent_temp_id.as_deref(), t.blocked_by_temp_id.as_deref()].into_iter().flatten() {
                if !known.contains(reference) {
                    return Err(MaxError::bad_input(
                        "task_store.unknown_temp_id",
                        format!("template {} references unknown temp id {reference}", t.temp_id),
                    ));
                }
            }
        }
        if let Some(cycle_at) = find_cycle(&templates) {
            return Err(MaxError::new(
                "task_store.circular_dependency",
                format!("task graph batch contains a cycle at {cycle_at}"),
            )
            .with_facet(max_error::Facet::InvariantViolated));
        }

        let mut next_id = self.next_id.lock().await;
        let mut assigned: BTreeMap<String, String> = BTreeMap::new();
        let mut records = Vec::with_capacity(templates.len());
        for t in &templates {
            let key = *next_id;
            *next_id += 1;
            let id = format!("task-{key}");
            assigned.insert(t.temp_id.clone(), id.clone());
            records.push((key, id));
        }
        drop(next_id);

        let mut tasks = self.tasks.lock().await;
        let mut ids = Vec::with_capacity(templates.len());
        for (t, (key, id)) in templates.into_iter().zip(records) {
            let parent_id = t.parent_temp_id.map(|tmp| assigned[&tmp].clone());
            let blocked_by = t.blocked_by_temp_id.map(|tmp| assigned[&tmp].clone());
            let state = if blocked_by.is_some() || t.held { TaskState::New } else { TaskState::Pending };
            tasks.insert(
                key,
                Task {
                    id: id.clone(),
                    sync_id: t.sync_id,
                    state,
                    parent_id,
                    blocked_by,
                    not_before: t.not_before,
                    payload: t.payload,
                    created_at: Utc::now(),
                    completed_at: None,
                    error: None,
                },
            );
            ids.push(id);
        }
        drop(tasks);
        self.activity.notify_waiters();
        Ok(ids)
    }

    async fn get(&self, id: &str) -> Result<Task, MaxError> {
        let key = Self::parse_id(id).ok_or_else(|| not_found(id))?;
        self.tasks.lock().await.get(&key).cloned().ok_or_else(|| not_found(id))
    }

    async fn claim(&self, sync_id: &str) -> Result<Option<Task>, MaxError> {
        let now = Utc::now();
        let mut tasks = self.tasks.lock().await;
        let eligible = tasks.values_mut().find(|t| {
            t.sync_id == sync_id
                && t.state == TaskState::Pending
                && t.not_before.map(|nb| nb <= now).unwrap_or(true)
        });
        match eligible {
            Some(task) => {
                task.state = TaskState::Running;
                Ok(Some(task.clone()))
            }
            None => Ok(None),
        }
    }

    async fn complete(&self, id: &str) -> Result<(), MaxError> {
        self.transition(id, &[TaskState::Running], TaskState::Completed, true, None).await
    }

    async fn set_awaiting_children(&self, id: &str) -> Result<(), MaxError> {
        self.transition(id, &[TaskState::Running], TaskState::AwaitingChildren, false, None).await
    }

    async fn fail(&self, id: &str, error: MaxError) -> Result<(), MaxError> {
        self.transition(id, &[TaskState::Running], TaskState::Failed, true, Some(error)).await
    }

    async fn unblock_dependents(&self, completed_task_id: &str) -> Result<usize, MaxError> {
        let mut tasks = self.tasks.lock().await;
        let mut count = 0;
        for task in tasks.values_mut() {
            if task.state == TaskState::New && task.blocked_by.as_deref() == Some(completed_task_id) {
                task.state = TaskState::Pending;
                count += 1;
            }
        }
        drop(tasks);
        if count > 0 {
            self.activity.notify_waiters();
        }
        Ok(count)
    }

    async fn promote(&self, id: &str) -> Result<(), MaxError> {
        self.transition(id, &[TaskState::New], TaskState::Pending, false, None).await?;
        self.activity.notify_waiters();
        Ok(())
    }

    async fn all_children_complete(&self, parent_id: &str) -> Result<bool, MaxError> {
        let tasks = self.tasks.lock().await;
        let mut children = tasks.values().filter(|t| t.parent_id.as_deref() == Some(parent_id)).peekable();
        if children.peek().is_none() {
            return Ok(false);
        }
        Ok(children.all(|t| t.state == TaskState::Completed))
    }

    async fn has_active_tasks(&self, sync_id: &str) -> Result<bool, MaxError> {
        let tasks = self.tasks.lock().await;
        Ok(tasks
            .values()
            .any(|t| t.sync_id == sync_id && matches!(t.state, TaskState::Pending | TaskState::Running)))
    }

    async fn list_for_sync(&self, sync_id: &str) -> Result<Vec<Task>, MaxError> {
        let tasks = self.tasks.lock().await;
        Ok(tasks.values().filter(|t| t.sync_id == sync_id).cloned().collect())
    }

    async fn pause(&self, id: &str) -> Result<(), MaxError> {
        self.transition(
            id,
            &[TaskState::New, TaskState::Pending, TaskState::Running, TaskState::AwaitingChildren],
            TaskState::Paused,
            false,
            None,
        )
        .await
    }

    async fn cancel(&self, id: &str) -> Result<(), MaxError> {
        self.transition(
            id,
            &[TaskState::New, TaskState::Pending, TaskState::Running, TaskState::AwaitingChildren],
            TaskState::Cancelled,
            false,
            None,
        )
        .await
    }

    async fn wait_for_activity(&self, _sync_id: &str) {
        let notified = self.activity.notified();
        let _ = tokio::time::timeout(Duration::from_millis(50), notified).await;
    }
}

/// DFS cycle check over a batch's `parent_temp_id`/`blocked_by_temp_id`
/// edges. Returns the `temp_id` where a cycle was detected, if any.
fn find_cycle(templates: &[TaskTemplate]) -> Option<String> {
    let edges: BTreeMap<&str, Vec<&str>> = templates
        .iter()
        .map(|t| {
            let deps: Vec<&str> = [t.parent_temp_id.as_deref(), t.blocked_by_temp_id.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            (t.temp_id.as_str(), deps)
        })
        .collect();

    let mut visited: BTreeMap<&str, u8> = BTreeMap::new(); // 0=unvisited,1=in-progress,2=done

    fn visit<'a>(
        node: &'a str,
        edges: &BTreeMap<&'a str, Vec<&'a str>>,
        visited: &mut BTreeMap<&'a str, u8>,
    ) -> Option<String> {
        match visited.get(node) {
            Some(1) => return Some(node.to_string()),
            Some(2) => return None,
            _ => {}
        }
        visited.insert(node, 1);
        if let Some(deps) = edges.get(node) {
            for dep in deps {
                if let Some(cycle_at) = visit(dep, edges, visited) {
                    return Some(cycle_at);
                }
            }
        }
        visited.insert(node, 2);
        None
    }

    for t in templates {
        if let Some(cycle_at) = visit(t.temp_id.as_str(), &edges, &mut visited) {
            return Some(cycle_at);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_task(sync_id: &str) -> NewTask {
        NewTask {
            sync_id: sync_id.to_string(),
            payload: json!({}),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn enqueue_unblocked_task_is_pending() {
        let store = InMemoryTaskStore::new();
        let id = store.enqueue(new_task("sync-1")).await.unwrap();
        let task = store.get(&id).await.unwrap();
        assert_eq!(task.state, TaskState::Pending);
    }

    #[tokio::test]
    async fn enqueue_blocked_task_is_new() {
        let store = InMemoryTaskStore::new();
        let blocker = store.enqueue(new_task("sync-1")).await.unwrap();
        let id = store
            .enqueue(NewTask {
                sync_id: "sync-1".into(),
                blocked_by: Some(blocker),
                payload: json!({}),
                ..Default::default()
            })
            .await
            .unwrap();
        let task = store.get(&id).await.unwrap();
        assert_eq!(task.state, TaskState::New);
    }

    #[tokio::test]
    async fn claim_transitions_pending_to_running_at_most_once() {
        let store = InMemoryTaskStore::new();
        store.enqueue(new_task("sync-1")).await.unwrap();
        let first = store.claim("sync-1").await.unwrap();
        assert!(first.is_some());
        let second = store.claim("sync-1").await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn complete_then_unblock_dependents() {
        let store = InMemoryTaskStore::new();
        let blocker = store.enqueue(new_task("sync-1")).await.unwrap();
        let dependent = store
            .enqueue(NewTask {
                sync_id: "sync-1".into(),
                blocked_by: Some(blocker.clone()),
                payload: json!({}),
                ..Default::default()
            })
            .await
            .unwrap();

        store.claim("sync-1").await.unwrap();
        store.complete(&blocker).await.unwrap();
        let unblocked = store.unblock_dependents(&blocker).await.unwrap();
        assert_eq!(unblocked, 1);
        assert_eq!(store.get(&dependent).await.unwrap().state, TaskState::Pending);
    }

    #[tokio::test]
    async fn held_template_stays_new_until_promoted() {
        let store = InMemoryTaskStore::new();
        let ids = store
            .enqueue_graph(vec![TaskTemplate {
                temp_id: "a".into(),
                sync_id: "sync-1".into(),
                parent_temp_id: None,
                blocked_by_temp_id: None,
                held: true,
                not_before: None,
                payload: json!({}),
            }])
            .await
            .unwrap();
        assert_eq!(store.get(&ids[0]).await.unwrap().state, TaskState::New);

        store.promote(&ids[0]).await.unwrap();
        assert_eq!(store.get(&ids[0]).await.unwrap().state, TaskState::Pending);
    }

    #[tokio::test]
    async fn task_completion_propagates_to_parent() {
        let store = InMemoryTaskStore::new();
        let parent_id = store.enqueue(new_task("sync-1")).await.unwrap();
        store.claim("sync-1").await.unwrap();
        store.set_awaiting_children(&parent_id).await.unwrap();

        let c1 = store
            .enqueue(NewTask {
                sync_id: "sync-1".into(),
                parent_id: Some(parent_id.clone()),
                payload: json!({}),
                ..Default::default()
            })
            .await
            .unwrap();
        let c2 = store
            .enqueue(NewTask {
                sync_id: "sync-1".into(),
                parent_id: Some(parent_id.clone()),
                payload: json!({}),
                ..Default::default()
            })
            .await
            .unwrap();

        store.claim("sync-1").await.unwrap();
        store.claim("sync-1").await.unwrap();
        assert!(!store.all_children_complete(&parent_id).await.unwrap());

        store.complete(&c1).await.unwrap();
        assert!(!store.all_children_complete(&parent_id).await.unwrap());
        store.complete(&c2).await.unwrap();
        assert!(store.all_children_complete(&parent_id).await.unwrap());
        store.complete(&parent_id).await.unwrap();
        assert_eq!(store.get(&parent_id).await.unwrap().state, TaskState::Completed);
    }

    #[tokio::test]
    async fn fail_stamps_error_and_completed_at() {
        let store = InMemoryTaskStore::new();
        let id = store.enqueue(new_task("sync-1")).await.unwrap();
        store.claim("sync-1").await.unwrap();
        store.fail(&id, MaxError::new("sync.upstream_error", "boom")).await.unwrap();
        let task = store.get(&id).await.unwrap();
        assert_eq!(task.state, TaskState::Failed);
        assert!(task.completed_at.is_some());
        assert_eq!(task.error.unwrap().code, "sync.upstream_error");
    }

    #[tokio::test]
    async fn complete_from_non_running_state_is_invalid_transition() {
        let store = InMemoryTaskStore::new();
        let id = store.enqueue(new_task("sync-1")).await.unwrap();
        let err = store.complete(&id).await.unwrap_err();
        assert!(err.has(max_error::Facet::InvariantViolated));
    }

    #[tokio::test]
    async fn has_active_tasks_reflects_pending_and_running() {
        let store = InMemoryTaskStore::new();
        assert!(!store.has_active_tasks("sync-1").await.unwrap());
        let id = store.enqueue(new_task("sync-1")).await.unwrap();
        assert!(store.has_active_tasks("sync-1").await.unwrap());
        store.claim("sync-1").await.unwrap();
        assert!(store.has_active_tasks("sync-1").await.unwrap());
        store.complete(&id).await.unwrap();
        assert!(!store.has_active_tasks("sync-1").await.unwrap());
    }

    #[tokio::test]
    async fn enqueue_graph_rewrites_temp_ids() {
        let store = InMemoryTaskStore::new();
        let ids = store
            .enqueue_graph(vec![
                TaskTemplate {
                    temp_id: "a".into(),
                    sync_id: "sync-1".into(),
                    parent_temp_id: None,
                    blocked_by_temp_id: None,
                    held: false,
                    not_before: None,
                    payload: json!({}),
                },
                TaskTemplate {
                    temp_id: "b".into(),
                    sync_id: "sync-1".into(),
                    parent_temp_id: None,
                    blocked_by_temp_id: Some("a".into()),
                    held: false,
                    not_before: None,
                    payload: json!({}),
                },
            ])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        let b = store.get(&ids[1]).await.unwrap();
        assert_eq!(b.blocked_by, Some(ids[0].clone()));
        assert_eq!(b.state, TaskState::New);
    }

    #[tokio::test]
    async fn enqueue_graph_rejects_unknown_temp_id() {
        let store = InMemoryTaskStore::new();
        let err = store
            .enqueue_graph(vec![TaskTemplate {
                temp_id: "a".into(),
                sync_id: "sync-1".into(),
                parent_temp_id: None,
                blocked_by_temp_id: Some("ghost".into()),
                held: false,
                not_before: None,
                payload: json!({}),
            }])
            .await
            .unwrap_err();
        assert!(err.has(max_error::Facet::BadInput));
    }

    #[tokio::test]
    async fn enqueue_graph_rejects_cycles() {
        let store = InMemoryTaskStore::new();
        let err = store
            .enqueue_graph(vec![
                TaskTemplate {
                    temp_id: "a".into(),
                    sync_id: "sync-1".into(),
                    parent_temp_id: None,
                    blocked_by_temp_id: Some("b".into()),
                    held: false,
                    not_before: None,
                    payload: json!({}),
                },
                TaskTemplate {
                    temp_id: "b".into(),
                    sync_id: "sync-1".into(),
                    parent_temp_id: None,
                    blocked_by_temp_id: Some("a".into()),
                    held: false,
                    not_before: None,
                    payload: json!({}),
                },
            ])
            .await
            .unwrap_err();
        assert!(err.has(max_error::Facet::InvariantViolated));
    }

    #[tokio::test]
    async fn pause_then_cancel_is_invalid_transition() {
        let store = InMemoryTaskStore::new();
        let id = store.enqueue(new_task("sync-1")).await.unwrap();
        store.pause(&id).await.unwrap();
        let err = store.cancel(&id).await.unwrap_err();
        assert!(err.has(max_error::Facet::InvariantViolated));
    }

    #[tokio::test]
    async fn list_for_sync_returns_only_matching_tasks() {
        let store = InMemoryTaskStore::new();
        store.enqueue(new_task("sync-1")).await.unwrap();
        store.enqueue(new_task("sync-1")).await.unwrap();
        store.enqueue(new_task("sync-2")).await.unwrap();
        let tasks = store.list_for_sync("sync-1").await.unwrap();
        assert_eq!(tasks.len(), 2);
    }

    #[tokio::test]
    async fn wait_for_activity_returns_without_hanging_when_idle() {
        let store = InMemoryTaskStore::new();
        store.wait_for_activity("sync-1").await;
    }
}
