//! rentd-cron: Recurring task scheduling.
//!
//! Provides an in-process scheduler for named recurring tasks. Each
//! task carries a schedule expression from a small fixed vocabulary
//! and an async action; the scheduler runs one evaluation loop per
//! active task and guarantees at most one firing per calendar month
//! for `@monthly` tasks. State lives in memory for the life of the
//! process.

pub mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use scheduler::Scheduler;

/// Async action invoked when a task fires.
///
/// Failures are caught and logged at the invocation site; the
/// scheduler never propagates them.
pub type TaskAction = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A task's nominal period, parsed from a schedule expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    /// `@monthly` — at most once per calendar month, on day 1.
    Monthly,
    /// `@weekly` — every 7 days of elapsed process time.
    Weekly,
    /// `@daily` — every 24 hours of elapsed process time.
    Daily,
    /// `@hourly` — every hour of elapsed process time.
    Hourly,
    /// `*/N` — every N minutes of elapsed process time.
    EveryMinutes { minutes: u64 },
}

impl Schedule {
    /// Parse a schedule expression. Returns `None` for anything
    /// outside the fixed vocabulary.
    pub fn parse(expr: &str) -> Option<Self> {
        match expr.trim() {
            "@monthly" => Some(Self::Monthly),
            "@weekly" => Some(Self::Weekly),
            "@daily" => Some(Self::Daily),
            "@hourly" => Some(Self::Hourly),
            other => {
                let minutes: u64 = other.strip_prefix("*/")?.parse().ok()?;
                if minutes == 0 {
                    return None;
                }
                Some(Self::EveryMinutes { minutes })
            }
        }
    }

    /// Parse an expression, falling back to daily on anything
    /// unrecognized. The warning is the operator's only signal.
    pub fn parse_or_daily(expr: &str, task_id: &str) -> Self {
        Self::parse(expr).unwrap_or_else(|| {
            warn!(
                task_id,
                expr, "Unrecognized schedule expression, falling back to @daily"
            );
            Self::Daily
        })
    }

    /// How often the evaluation loop for this schedule ticks.
    ///
    /// For everything but `@monthly` the check interval equals the
    /// nominal period, so an elapsed tick is a firing. `@monthly`
    /// is checked hourly and gated by [`Schedule::should_fire`].
    pub fn check_interval(&self) -> Duration {
        match self {
            Self::Monthly | Self::Hourly => Duration::from_secs(3600),
            Self::Weekly => Duration::from_secs(7 * 86_400),
            Self::Daily => Duration::from_secs(86_400),
            Self::EveryMinutes { minutes } => Duration::from_secs(minutes * 60),
        }
    }

    /// Whether an elapsed check tick should fire the action.
    ///
    /// `@monthly` fires only on day 1 of the month, and only when the
    /// last firing (if any) fell in a different calendar month. Every
    /// other schedule fires on every tick; there is no catch-up for
    /// periods missed while the process was down.
    pub fn should_fire(&self, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match self {
            Self::Monthly => {
                if now.day() != 1 {
                    return false;
                }
                !last_run.is_some_and(|l| l.year() == now.year() && l.month() == now.month())
            }
            _ => true,
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Monthly => f.write_str("@monthly"),
            Self::Weekly => f.write_str("@weekly"),
            Self::Daily => f.write_str("@daily"),
            Self::Hourly => f.write_str("@hourly"),
            Self::EveryMinutes { minutes } => write!(f, "*/{minutes}"),
        }
    }
}

/// A named recurring task registered with the [`Scheduler`].
#[derive(Clone)]
pub struct ScheduledTask {
    /// Unique task ID, immutable once registered.
    pub id: String,
    /// Human-readable task name.
    pub name: String,
    /// When the task fires.
    pub schedule: Schedule,
    /// Whether the task is evaluated at all.
    pub active: bool,
    /// Last firing time, if any.
    pub last_run: Option<DateTime<Utc>>,
    /// Advisory next firing time; firing is decided by
    /// [`Schedule::should_fire`], not by this field.
    pub next_run: Option<DateTime<Utc>>,
    /// Action invoked on each firing.
    pub action: TaskAction,
}

impl ScheduledTask {
    /// Create an active task from a schedule expression.
    ///
    /// Unrecognized expressions fall back to daily with a warning.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        expr: &str,
        action: TaskAction,
    ) -> Self {
        let id = id.into();
        let schedule = Schedule::parse_or_daily(expr, &id);
        Self {
            id,
            name: name.into(),
            schedule,
            active: true,
            last_run: None,
            next_run: None,
            action,
        }
    }

    /// Action-free snapshot for read-only callers.
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            schedule: self.schedule,
            active: self.active,
            last_run: self.last_run,
            next_run: self.next_run,
        }
    }
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("schedule", &self.schedule)
            .field("active", &self.active)
            .field("last_run", &self.last_run)
            .field("next_run", &self.next_run)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a registered task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub name: String,
    pub schedule: Schedule,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
}
