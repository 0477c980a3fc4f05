//! Task scheduler — one evaluation loop per active task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{ScheduledTask, TaskSnapshot};

/// Owns the task registry and the per-task evaluation loops.
///
/// Each active task gets its own tokio loop ticking at the schedule's
/// check interval, so tasks evaluate independently of each other.
/// Actions are spawned fire-and-forget; a slow action never blocks
/// another task's evaluation, and `last_run` is recorded at dispatch.
pub struct Scheduler {
    tasks: RwLock<HashMap<String, ScheduledTask>>,
    loops: Mutex<HashMap<String, CancellationToken>>,
}

impl Scheduler {
    /// Create a scheduler with an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tasks: RwLock::new(HashMap::new()),
            loops: Mutex::new(HashMap::new()),
        })
    }

    /// Insert or replace a task by id. If the task is active, its
    /// evaluation loop starts immediately.
    ///
    /// Replacing an existing id keeps the previous last-run timestamp
    /// unless the caller supplies one explicitly.
    pub async fn add_task(self: &Arc<Self>, mut task: ScheduledTask) {
        let id = task.id.clone();
        let active = task.active;
        {
            let mut tasks = self.tasks.write().await;
            if let Some(prev) = tasks.get(&id) {
                if task.last_run.is_none() {
                    task.last_run = prev.last_run;
                }
            }
            info!(task_id = %id, schedule = %task.schedule, active, "Registered task");
            tasks.insert(id.clone(), task);
        }
        // Restart the loop so a changed schedule takes effect.
        self.stop_loop(&id);
        if active {
            self.spawn_loop(&id);
        }
    }

    /// Stop evaluation and delete the task. No-op on unknown ids.
    pub async fn remove_task(&self, id: &str) {
        self.stop_loop(id);
        if self.tasks.write().await.remove(id).is_some() {
            info!(task_id = %id, "Removed task");
        }
    }

    /// Flip a task's active flag, starting or stopping its loop to
    /// match. Returns `false` when the id is unknown.
    pub async fn toggle_task(self: &Arc<Self>, id: &str) -> bool {
        let now_active = {
            let mut tasks = self.tasks.write().await;
            let Some(task) = tasks.get_mut(id) else {
                return false;
            };
            task.active = !task.active;
            task.active
        };
        if now_active {
            self.spawn_loop(id);
        } else {
            self.stop_loop(id);
        }
        info!(task_id = %id, active = now_active, "Toggled task");
        true
    }

    /// Read-only snapshot of one task.
    pub async fn get_task(&self, id: &str) -> Option<TaskSnapshot> {
        self.tasks.read().await.get(id).map(ScheduledTask::snapshot)
    }

    /// Read-only snapshots of every registered task.
    pub async fn get_tasks(&self) -> Vec<TaskSnapshot> {
        let mut snapshots: Vec<TaskSnapshot> = self
            .tasks
            .read()
            .await
            .values()
            .map(ScheduledTask::snapshot)
            .collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    /// Start evaluation loops for every active task. Idempotent:
    /// tasks that already have a loop are left alone.
    pub async fn start(self: &Arc<Self>) {
        let active_ids: Vec<String> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.active)
            .map(|t| t.id.clone())
            .collect();
        info!(task_count = active_ids.len(), "Scheduler started");
        for id in active_ids {
            self.spawn_loop(&id);
        }
    }

    /// Halt every evaluation loop. No task fires after this returns;
    /// actions already spawned keep running to completion.
    pub fn stop(&self) {
        let mut loops = self.loops.lock().unwrap_or_else(|e| e.into_inner());
        for (id, token) in loops.drain() {
            debug!(task_id = %id, "Stopping task loop");
            token.cancel();
        }
        info!("Scheduler stopped");
    }

    /// Number of running evaluation loops.
    pub fn running_loops(&self) -> usize {
        self.loops.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn spawn_loop(self: &Arc<Self>, id: &str) {
        let token = {
            let mut loops = self.loops.lock().unwrap_or_else(|e| e.into_inner());
            if loops.contains_key(id) {
                return;
            }
            let token = CancellationToken::new();
            loops.insert(id.to_string(), token.clone());
            token
        };

        let scheduler = Arc::clone(self);
        let id = id.to_string();
        tokio::spawn(async move {
            let Some(check_interval) = scheduler
                .tasks
                .read()
                .await
                .get(&id)
                .map(|t| t.schedule.check_interval())
            else {
                return;
            };

            let mut interval = tokio::time::interval(check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; consume it so the
            // task does not fire at registration time.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => scheduler.evaluate(&id).await,
                }
            }
        });
    }

    fn stop_loop(&self, id: &str) {
        let mut loops = self.loops.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = loops.remove(id) {
            token.cancel();
        }
    }

    /// Evaluate one task: decide whether this tick fires, record the
    /// firing time, and spawn the action.
    async fn evaluate(&self, id: &str) {
        let action = {
            let mut tasks = self.tasks.write().await;
            let Some(task) = tasks.get_mut(id) else {
                return;
            };
            if !task.active {
                return;
            }
            let now = Utc::now();
            if !task.schedule.should_fire(task.last_run, now) {
                debug!(task_id = %id, "Tick elapsed, not due");
                return;
            }
            task.last_run = Some(now);
            task.next_run = ChronoDuration::from_std(task.schedule.check_interval())
                .ok()
                .map(|d| now + d);
            task.action.clone()
        };

        info!(task_id = %id, "Firing task");
        let id = id.to_string();
        tokio::spawn(async move {
            if let Err(e) = (action)().await {
                warn!(task_id = %id, "Task action failed: {e:#}");
            }
        });
    }
}
