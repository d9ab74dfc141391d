use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use loomflow_registry::Outputs;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::task::{Task, TaskState};

pub type TaskResult = Result<Outputs, String>;
pub type TaskFn =
  Arc<dyn Fn(Task) -> Pin<Box<dyn Future<Output = TaskResult> + Send>> + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
  pub total: usize,
  pub pending: usize,
  pub running: usize,
  pub completed: usize,
  pub failed: usize,
}

#[derive(Debug, Clone)]
pub enum QueueEvent {
  TaskStart {
    task_id: String,
    node_id: String,
    node_type: String,
  },
  TaskComplete {
    task_id: String,
    node_id: String,
    result: Outputs,
    elapsed_ms: u64,
  },
  TaskFail {
    task_id: String,
    node_id: String,
    error: String,
  },
  QueueUpdated(QueueStats),
}

#[derive(PartialEq, Eq)]
struct HeapEntry {
  priority: i32,
  seq: u64,
  task_id: String,
}

impl Ord for HeapEntry {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    (self.priority, self.seq).cmp(&(other.priority, other.seq))
  }
}
impl PartialOrd for HeapEntry {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

struct Inner {
  tasks: HashMap<String, Task>,
  heap: BinaryHeap<Reverse<HeapEntry>>,
  /// task_id -> ids of tasks that depend on it
  forward_deps: HashMap<String, Vec<String>>,
  counter: u64,
  running: usize,
  completion_order: Vec<String>,
}

impl Inner {
  fn stats(&self) -> QueueStats {
    let completed = self
      .tasks
      .values()
      .filter(|t| t.state == TaskState::Completed)
      .count();
    let failed = self
      .tasks
      .values()
      .filter(|t| t.state == TaskState::Failed)
      .count();
    QueueStats {
      total: self.tasks.len(),
      pending: self.tasks.len() - completed - failed - self.running,
      running: self.running,
      completed,
      failed,
    }
  }

  fn all_processed(&self) -> bool {
    self
      .tasks
      .values()
      .all(|t| matches!(t.state, TaskState::Completed | TaskState::Failed))
  }

  fn dependencies_satisfied(&self, task_id: &str) -> bool {
    self.tasks[task_id]
      .dependencies
      .iter()
      .all(|dep| matches!(self.tasks.get(dep).map(|t| t.state), Some(TaskState::Completed)))
  }

  fn push_ready(&mut self, task_id: &str) {
    let priority = self.tasks[task_id].priority;
    self.heap.push(Reverse(HeapEntry {
      priority,
      seq: self.counter,
      task_id: task_id.to_string(),
    }));
    self.counter += 1;
  }

  /// Mark a task's transitive dependents as Failed without running them,
  /// since a task is only ever scheduled once every dependency has
  /// completed. Without this, a blocked dependent would remain Pending
  /// forever and `wait_until_complete` would never resolve.
  fn cascade_failure(&mut self, failed_task_id: &str, events: &mut Vec<QueueEvent>) {
    let mut frontier = vec![failed_task_id.to_string()];
    while let Some(id) = frontier.pop() {
      let dependents = self.forward_deps.get(&id).cloned().unwrap_or_default();
      for dep_id in dependents {
        if let Some(t) = self.tasks.get_mut(&dep_id)
          && t.state == TaskState::Pending
        {
          t.state = TaskState::Failed;
          t.error = Some(format!("upstream dependency '{id}' failed"));
          events.push(QueueEvent::TaskFail {
            task_id: t.task_id.clone(),
            node_id: t.node_id.clone(),
            error: t.error.clone().unwrap(),
          });
          frontier.push(dep_id);
        }
      }
    }
  }
}

/// Priority queue of ready tasks with a fixed-size worker pool.
///
/// Shared state (task map, forward graph, heap, counters) is protected by
/// a single coarse lock; critical sections are small and the dominant work
/// happens inside each task's own future, outside the lock.
pub struct ExecutionQueue {
  inner: Arc<Mutex<Inner>>,
  done: Arc<Notify>,
  running_flag: Arc<AtomicBool>,
  max_workers: usize,
  run_task: TaskFn,
  events: mpsc::UnboundedSender<QueueEvent>,
  handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ExecutionQueue {
  pub fn new(max_workers: usize, run_task: TaskFn) -> (Self, mpsc::UnboundedReceiver<QueueEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let queue = Self {
      inner: Arc::new(Mutex::new(Inner {
        tasks: HashMap::new(),
        heap: BinaryHeap::new(),
        forward_deps: HashMap::new(),
        counter: 0,
        running: 0,
        completion_order: Vec::new(),
      })),
      done: Arc::new(Notify::new()),
      running_flag: Arc::new(AtomicBool::new(false)),
      max_workers: max_workers.max(1),
      run_task,
      events: tx,
      handles: Mutex::new(Vec::new()),
    };
    (queue, rx)
  }

  /// Register a task. If it has no dependencies, or all are already
  /// Completed, it is pushed onto the ready heap immediately.
  pub async fn add_task(&self, task: Task) {
    let mut inner = self.inner.lock().await;
    let task_id = task.task_id.clone();
    for dep in &task.dependencies {
      inner
        .forward_deps
        .entry(dep.clone())
        .or_default()
        .push(task_id.clone());
    }
    let ready = inner.dependencies_satisfied_for(&task);
    inner.tasks.insert(task_id.clone(), task);
    if ready {
      inner.push_ready(&task_id);
    }
  }

  pub async fn start(&self) {
    self.running_flag.store(true, Ordering::SeqCst);
    let mut handles = self.handles.lock().await;
    for _ in 0..self.max_workers {
      handles.push(self.spawn_worker());
    }
  }

  fn spawn_worker(&self) -> JoinHandle<()> {
    let inner = self.inner.clone();
    let done = self.done.clone();
    let running_flag = self.running_flag.clone();
    let run_task = self.run_task.clone();
    let events = self.events.clone();
    tokio::spawn(async move {
      while running_flag.load(Ordering::SeqCst) {
        let popped = {
          let mut guard = inner.lock().await;
          guard.heap.pop()
        };
        let Some(Reverse(entry)) = popped else {
          tokio::time::sleep(std::time::Duration::from_millis(100)).await;
          continue;
        };
        execute_one(&inner, &done, &run_task, &events, entry.task_id).await;
      }
    })
  }

  /// Stop accepting dispatch: idle workers exit at their next poll, and
  /// any task already running is allowed to finish. Does not cancel
  /// in-flight work.
  pub async fn stop(&self) {
    self.running_flag.store(false, Ordering::SeqCst);
    let mut handles = self.handles.lock().await;
    for h in handles.drain(..) {
      let _ = h.await;
    }
  }

  pub async fn wait_until_complete(&self) {
    loop {
      {
        let inner = self.inner.lock().await;
        if inner.all_processed() {
          return;
        }
      }
      self.done.notified().await;
    }
  }

  pub async fn stats(&self) -> QueueStats {
    self.inner.lock().await.stats()
  }

  pub async fn task_state(&self, task_id: &str) -> Option<TaskState> {
    self.inner.lock().await.tasks.get(task_id).map(|t| t.state)
  }

  pub async fn task_result(&self, task_id: &str) -> Option<Outputs> {
    self
      .inner
      .lock()
      .await
      .tasks
      .get(task_id)
      .and_then(|t| t.result.clone())
  }

  /// Node ids in the exact reverse order of their successful completion,
  /// for driving the rollback cascade.
  pub async fn completion_order_reversed(&self) -> Vec<String> {
    let mut order = self.inner.lock().await.completion_order.clone();
    order.reverse();
    order
  }
}

impl Inner {
  fn dependencies_satisfied_for(&self, task: &Task) -> bool {
    task
      .dependencies
      .iter()
      .all(|dep| matches!(self.tasks.get(dep).map(|t| t.state), Some(TaskState::Completed)))
  }
}

#[instrument(skip(inner, done, run_task, events))]
async fn execute_one(
  inner: &Arc<Mutex<Inner>>,
  done: &Arc<Notify>,
  run_task: &TaskFn,
  events: &mpsc::UnboundedSender<QueueEvent>,
  task_id: String,
) {
  let task = {
    let mut guard = inner.lock().await;
    let Some(t) = guard.tasks.get_mut(&task_id) else {
      return;
    };
    if t.state != TaskState::Pending {
      return;
    }
    t.state = TaskState::Running;
    guard.running += 1;
    let snapshot = guard.tasks[&task_id].clone();
    let _ = events.send(QueueEvent::TaskStart {
      task_id: snapshot.task_id.clone(),
      node_id: snapshot.node_id.clone(),
      node_type: snapshot.node_type.clone(),
    });
    snapshot
  };

  let started = Instant::now();
  let outcome = run_task(task.clone()).await;
  let elapsed_ms = started.elapsed().as_millis() as u64;

  let mut guard = inner.lock().await;
  guard.running -= 1;
  let mut pending_events = Vec::new();
  match outcome {
    Ok(result) => {
      if let Some(t) = guard.tasks.get_mut(&task_id) {
        t.state = TaskState::Completed;
        t.result = Some(result.clone());
        t.elapsed_ms = Some(elapsed_ms);
      }
      guard.completion_order.push(task.node_id.clone());
      pending_events.push(QueueEvent::TaskComplete {
        task_id: task_id.clone(),
        node_id: task.node_id.clone(),
        result,
        elapsed_ms,
      });
      let dependents = guard.forward_deps.get(&task_id).cloned().unwrap_or_default();
      for dep_id in dependents {
        if guard.tasks.get(&dep_id).map(|t| t.state) == Some(TaskState::Pending)
          && guard.dependencies_satisfied(&dep_id)
        {
          guard.push_ready(&dep_id);
        }
      }
    }
    Err(error) => {
      if let Some(t) = guard.tasks.get_mut(&task_id) {
        t.state = TaskState::Failed;
        t.error = Some(error.clone());
      }
      pending_events.push(QueueEvent::TaskFail {
        task_id: task_id.clone(),
        node_id: task.node_id.clone(),
        error,
      });
      guard.cascade_failure(&task_id, &mut pending_events);
    }
  }
  let stats = guard.stats();
  let all_done = guard.all_processed();
  drop(guard);

  for e in pending_events {
    let _ = events.send(e);
  }
  let _ = events.send(QueueEvent::QueueUpdated(stats));
  if all_done {
    done.notify_waiters();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  fn boxed_run<F, Fut>(f: F) -> TaskFn
  where
    F: Fn(Task) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskResult> + Send + 'static,
  {
    Arc::new(move |t| Box::pin(f(t)))
  }

  #[tokio::test]
  async fn independent_tasks_all_complete() {
    let (queue, _rx) = ExecutionQueue::new(2, boxed_run(|_t| async { Ok(Outputs::new()) }));
    queue.start().await;
    queue
      .add_task(Task::new("t1", "n1", "noop", HashSet::new(), 50))
      .await;
    queue
      .add_task(Task::new("t2", "n2", "noop", HashSet::new(), 50))
      .await;
    queue.wait_until_complete().await;
    let stats = queue.stats().await;
    assert_eq!(stats.completed, 2);
    queue.stop().await;
  }

  #[tokio::test]
  async fn failure_cascades_to_dependents() {
    let (queue, _rx) = ExecutionQueue::new(1, boxed_run(|t| async move {
      if t.node_id == "b" {
        Err("boom".to_string())
      } else {
        Ok(Outputs::new())
      }
    }));
    queue.start().await;
    queue
      .add_task(Task::new("a", "a", "noop", HashSet::new(), 50))
      .await;
    queue
      .add_task(Task::new("b", "b", "noop", HashSet::from(["a".to_string()]), 50))
      .await;
    queue
      .add_task(Task::new("c", "c", "noop", HashSet::from(["b".to_string()]), 50))
      .await;
    queue.wait_until_complete().await;
    let stats = queue.stats().await;
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 2);
    assert_eq!(queue.task_state("c").await, Some(TaskState::Failed));
    queue.stop().await;
  }
}
