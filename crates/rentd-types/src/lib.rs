use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ──────────────────── Automation Config ────────────────────

/// Tunable policy for the billing automations.
///
/// Held in memory for the life of the process; restarting resets it to
/// the values loaded from the config file (or these defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Master switch for all three automation tasks.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Day of month (1-31) on which monthly invoices are generated.
    #[serde(default = "default_generate_day")]
    pub generate_day: u8,
    /// Day-counts before a due date at which a rent reminder fires.
    #[serde(default = "default_reminder_days")]
    pub reminder_days_before: Vec<i64>,
    /// Day-counts past due at which an overdue alert re-fires.
    /// Advisory grouping only; the overdue sweep itself runs daily.
    #[serde(default = "default_overdue_days")]
    pub overdue_check_days: Vec<i64>,
    /// Days past due after which an overdue account is escalated to
    /// managers in addition to the tenant alert.
    #[serde(default = "default_escalation_days")]
    pub manager_escalation_days: i64,
}

fn default_true() -> bool {
    true
}

fn default_generate_day() -> u8 {
    1
}

fn default_reminder_days() -> Vec<i64> {
    vec![7, 3, 1]
}

fn default_overdue_days() -> Vec<i64> {
    vec![1, 3, 7, 14]
}

fn default_escalation_days() -> i64 {
    14
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            generate_day: default_generate_day(),
            reminder_days_before: default_reminder_days(),
            overdue_check_days: default_overdue_days(),
            manager_escalation_days: default_escalation_days(),
        }
    }
}

/// Partial update to [`AutomationConfig`]; only present fields are merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutomationConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_day: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_days_before: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overdue_check_days: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_escalation_days: Option<i64>,
}

impl AutomationConfigPatch {
    /// Validate field ranges before the patch reaches the coordinator.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(day) = self.generate_day {
            if !(1..=31).contains(&day) {
                return Err(format!("generate_day must be in 1-31, got {day}"));
            }
        }
        if let Some(days) = self.manager_escalation_days {
            if days < 0 {
                return Err(format!("manager_escalation_days must be >= 0, got {days}"));
            }
        }
        Ok(())
    }
}

// ──────────────────── Invoice Types ────────────────────

/// The slice of an invoice the automation layer cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceSummary {
    /// Invoice identifier in the backing store.
    pub id: String,
    /// Display name of the tenant billed.
    pub tenant_name: String,
    /// Amount due.
    pub amount: f64,
    /// Due date.
    pub due_date: DateTime<Utc>,
}

// ──────────────────── Automation Status ────────────────────

/// Snapshot of one automation task for the operations dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub id: String,
    pub name: String,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}

/// Master switch plus per-task snapshots, as returned by the status API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationStatus {
    pub enabled: bool,
    pub tasks: Vec<TaskStatus>,
}

// ──────────────────── Manual Trigger ────────────────────

/// Which automation a manual trigger invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Invoices,
    Overdue,
    Reminders,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Invoices => "invoices",
            Self::Overdue => "overdue",
            Self::Reminders => "reminders",
        };
        f.write_str(s)
    }
}
