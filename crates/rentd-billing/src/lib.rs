//! rentd-billing: Billing automation on top of the task scheduler.
//!
//! Registers the three billing tasks (monthly invoice generation,
//! daily overdue sweep, daily reminder sweep), supplies their action
//! closures, and exposes the configuration/manual-control surface the
//! API layer uses. Knows nothing about how notifications are
//! delivered or invoices are stored; those live behind the
//! collaborator traits.

pub mod automation;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use rentd_types::InvoiceSummary;

pub use automation::BillingAutomation;

/// Fixed task ids registered by [`BillingAutomation::install`].
pub const TASK_MONTHLY_GENERATION: &str = "monthly-invoice-generation";
pub const TASK_OVERDUE_CHECK: &str = "daily-overdue-check";
pub const TASK_REMINDER_CHECK: &str = "daily-reminder-check";

/// The three known task ids, in display order.
pub const TASK_IDS: [&str; 3] = [TASK_MONTHLY_GENERATION, TASK_OVERDUE_CHECK, TASK_REMINDER_CHECK];

/// Invoice operations the automations call out to.
#[async_trait]
pub trait InvoiceService: Send + Sync {
    /// Generate this month's invoices for all qualifying leases,
    /// returning the created invoices.
    async fn generate_monthly_invoices(&self) -> Result<Vec<InvoiceSummary>>;

    /// Scan for invoices past their due date, mark them overdue, and
    /// return the newly-or-still overdue invoices.
    async fn mark_overdue_invoices(&self) -> Result<Vec<InvoiceSummary>>;

    /// Invoices still awaiting payment.
    async fn pending_invoices(&self) -> Result<Vec<InvoiceSummary>>;
}

/// Notification dispatch. Each call may fail independently; callers
/// treat a single failed send as non-fatal for the rest of a batch.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Rent-due reminder to a named tenant.
    async fn send_rent_reminder(
        &self,
        tenant: &str,
        amount: f64,
        due_date: DateTime<Utc>,
    ) -> Result<()>;

    /// Overdue alert to a named tenant.
    async fn send_overdue_alert(&self, tenant: &str, days_overdue: i64, amount: f64)
    -> Result<()>;

    /// Free-text escalation message to a manager.
    async fn send_escalation(&self, manager: &str, title: &str, message: &str) -> Result<()>;
}

/// Lookup of manager identities for summary and escalation audiences.
#[async_trait]
pub trait ManagerDirectory: Send + Sync {
    async fn list_managers(&self) -> Result<Vec<String>>;
}
