//! Billing automation coordinator.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use futures::FutureExt;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use rentd_cron::{ScheduledTask, Scheduler, TaskAction};
use rentd_types::{
    AutomationConfig, AutomationConfigPatch, AutomationStatus, TaskStatus, TriggerKind,
};

use crate::{
    InvoiceService, ManagerDirectory, Notifier, TASK_IDS, TASK_MONTHLY_GENERATION,
    TASK_OVERDUE_CHECK, TASK_REMINDER_CHECK,
};

/// Coordinates the three billing automations on top of the generic
/// scheduler. One instance lives for the process lifetime; the live
/// config is in-memory only and resets on restart.
pub struct BillingAutomation {
    scheduler: Arc<Scheduler>,
    config: RwLock<AutomationConfig>,
    invoices: Arc<dyn InvoiceService>,
    notifier: Arc<dyn Notifier>,
    managers: Arc<dyn ManagerDirectory>,
}

impl BillingAutomation {
    pub fn new(
        scheduler: Arc<Scheduler>,
        config: AutomationConfig,
        invoices: Arc<dyn InvoiceService>,
        notifier: Arc<dyn Notifier>,
        managers: Arc<dyn ManagerDirectory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            scheduler,
            config: RwLock::new(config),
            invoices,
            notifier,
            managers,
        })
    }

    /// Register the three billing tasks with the scheduler. Each
    /// task's initial active flag follows `config.enabled`.
    pub async fn install(self: &Arc<Self>) {
        let enabled = self.config.read().await.enabled;

        let this = Arc::clone(self);
        let generation: TaskAction = Arc::new(move || {
            let this = Arc::clone(&this);
            async move { this.run_invoice_generation(Utc::now(), false).await }.boxed()
        });

        let this = Arc::clone(self);
        let overdue: TaskAction = Arc::new(move || {
            let this = Arc::clone(&this);
            async move { this.run_overdue_check(Utc::now()).await }.boxed()
        });

        let this = Arc::clone(self);
        let reminders: TaskAction = Arc::new(move || {
            let this = Arc::clone(&this);
            async move { this.run_reminder_check(Utc::now()).await }.boxed()
        });

        for (id, name, expr, action) in [
            (
                TASK_MONTHLY_GENERATION,
                "Monthly invoice generation",
                "@monthly",
                generation,
            ),
            (TASK_OVERDUE_CHECK, "Daily overdue sweep", "@daily", overdue),
            (
                TASK_REMINDER_CHECK,
                "Daily reminder sweep",
                "@daily",
                reminders,
            ),
        ] {
            let mut task = ScheduledTask::new(id, name, expr, action);
            task.active = enabled;
            self.scheduler.add_task(task).await;
        }
        info!(enabled, "Billing automation installed");
    }

    /// Invoke one of the automations directly, bypassing the periodic
    /// evaluation. The invoices kind also bypasses the generate-day
    /// gate; this is the only path that can force generation mid-month.
    pub async fn manual_trigger(&self, kind: TriggerKind) -> anyhow::Result<()> {
        info!(%kind, "Manual trigger");
        let now = Utc::now();
        match kind {
            TriggerKind::Invoices => self.run_invoice_generation(now, true).await,
            TriggerKind::Overdue => self.run_overdue_check(now).await,
            TriggerKind::Reminders => self.run_reminder_check(now).await,
        }
    }

    /// Merge a partial update into the live config. When `enabled`
    /// changes, the three tasks' active flags are re-synced so the
    /// config and the scheduler never diverge.
    pub async fn update_config(&self, patch: AutomationConfigPatch) -> AutomationConfig {
        let snapshot = {
            let mut config = self.config.write().await;
            if let Some(enabled) = patch.enabled {
                config.enabled = enabled;
            }
            if let Some(day) = patch.generate_day {
                config.generate_day = day;
            }
            if let Some(days) = patch.reminder_days_before {
                config.reminder_days_before = days;
            }
            if let Some(days) = patch.overdue_check_days {
                config.overdue_check_days = days;
            }
            if let Some(days) = patch.manager_escalation_days {
                config.manager_escalation_days = days;
            }
            config.clone()
        };

        if patch.enabled.is_some() {
            self.sync_task_flags(snapshot.enabled).await;
        }
        info!(enabled = snapshot.enabled, "Automation config updated");
        snapshot
    }

    /// Current config snapshot.
    pub async fn get_config(&self) -> AutomationConfig {
        self.config.read().await.clone()
    }

    /// Master flag plus a snapshot of each known task.
    pub async fn get_status(&self) -> AutomationStatus {
        let enabled = self.config.read().await.enabled;
        let mut tasks = Vec::with_capacity(TASK_IDS.len());
        for id in TASK_IDS {
            if let Some(snap) = self.scheduler.get_task(id).await {
                tasks.push(TaskStatus {
                    id: snap.id,
                    name: snap.name,
                    active: snap.active,
                    last_run: snap.last_run,
                });
            }
        }
        AutomationStatus { enabled, tasks }
    }

    async fn sync_task_flags(&self, enabled: bool) {
        let scheduler = &self.scheduler;
        for id in TASK_IDS {
            let Some(snap) = scheduler.get_task(id).await else {
                continue;
            };
            if snap.active != enabled {
                scheduler.toggle_task(id).await;
            }
        }
    }

    /// Monthly generation action. The scheduler's `@monthly` rule
    /// bounds this to once per calendar month; the generate-day gate
    /// here decides which day actually triggers it. `force` (manual
    /// trigger) skips the gate.
    async fn run_invoice_generation(&self, now: DateTime<Utc>, force: bool) -> anyhow::Result<()> {
        let generate_day = self.config.read().await.generate_day;
        if !force && now.day() != u32::from(generate_day) {
            debug!(generate_day, today = now.day(), "Not the generation day, skipping");
            return Ok(());
        }

        match self.invoices.generate_monthly_invoices().await {
            Ok(invoices) => {
                info!(count = invoices.len(), "Generated monthly invoices");
                for invoice in &invoices {
                    if let Err(e) = self
                        .notifier
                        .send_rent_reminder(&invoice.tenant_name, invoice.amount, invoice.due_date)
                        .await
                    {
                        warn!(invoice_id = %invoice.id, tenant = %invoice.tenant_name,
                            "Tenant notification failed: {e:#}");
                    }
                }
                self.notify_managers(
                    "Monthly invoices generated",
                    &format!("Generated {} invoices for this billing cycle.", invoices.len()),
                )
                .await;
                Ok(())
            }
            Err(e) => {
                error!("Invoice generation failed: {e:#}");
                self.notify_managers(
                    "Invoice generation failed",
                    &format!("Monthly invoice generation failed: {e:#}"),
                )
                .await;
                Ok(())
            }
        }
    }

    /// Daily overdue sweep: mark overdue invoices, alert each tenant,
    /// and escalate accounts past the manager threshold.
    async fn run_overdue_check(&self, now: DateTime<Utc>) -> anyhow::Result<()> {
        let escalation_days = self.config.read().await.manager_escalation_days;
        let overdue = self.invoices.mark_overdue_invoices().await?;

        let mut escalated = 0usize;
        for invoice in &overdue {
            let days_overdue = (now.date_naive() - invoice.due_date.date_naive()).num_days();
            if let Err(e) = self
                .notifier
                .send_overdue_alert(&invoice.tenant_name, days_overdue, invoice.amount)
                .await
            {
                warn!(invoice_id = %invoice.id, tenant = %invoice.tenant_name,
                    "Overdue alert failed: {e:#}");
            }
            if days_overdue >= escalation_days {
                escalated += 1;
                self.notify_managers(
                    &format!("Overdue account: {}", invoice.tenant_name),
                    &format!(
                        "{} is {} days overdue on {:.2}.",
                        invoice.tenant_name, days_overdue, invoice.amount
                    ),
                )
                .await;
            }
        }
        info!(processed = overdue.len(), escalated, "Overdue sweep complete");
        Ok(())
    }

    /// Daily reminder sweep: each configured day-count is an
    /// independent trigger, evaluated once per sweep.
    async fn run_reminder_check(&self, now: DateTime<Utc>) -> anyhow::Result<()> {
        let reminder_days = self.config.read().await.reminder_days_before.clone();
        let pending = self.invoices.pending_invoices().await?;

        let mut sent = 0usize;
        for invoice in &pending {
            let days_until_due = (invoice.due_date.date_naive() - now.date_naive()).num_days();
            if !reminder_days.contains(&days_until_due) {
                continue;
            }
            match self
                .notifier
                .send_rent_reminder(&invoice.tenant_name, invoice.amount, invoice.due_date)
                .await
            {
                Ok(()) => sent += 1,
                Err(e) => warn!(invoice_id = %invoice.id, tenant = %invoice.tenant_name,
                    "Reminder failed: {e:#}"),
            }
        }
        info!(pending = pending.len(), sent, "Reminder sweep complete");
        Ok(())
    }

    /// Send a free-text notification to every manager; individual
    /// failures are logged and do not abort the rest.
    async fn notify_managers(&self, title: &str, message: &str) {
        let managers = match self.managers.list_managers().await {
            Ok(m) => m,
            Err(e) => {
                warn!("Manager lookup failed: {e:#}");
                return;
            }
        };
        for manager in managers {
            if let Err(e) = self.notifier.send_escalation(&manager, title, message).await {
                warn!(manager = %manager, "Manager notification failed: {e:#}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use rentd_types::InvoiceSummary;
    use std::sync::Mutex;

    fn invoice(id: &str, tenant: &str, due: DateTime<Utc>) -> InvoiceSummary {
        InvoiceSummary {
            id: id.into(),
            tenant_name: tenant.into(),
            amount: 1200.0,
            due_date: due,
        }
    }

    #[derive(Default)]
    struct MockInvoices {
        generated: Vec<InvoiceSummary>,
        overdue: Vec<InvoiceSummary>,
        pending: Vec<InvoiceSummary>,
        fail_generate: bool,
        generate_calls: Mutex<usize>,
    }

    #[async_trait]
    impl InvoiceService for MockInvoices {
        async fn generate_monthly_invoices(&self) -> Result<Vec<InvoiceSummary>> {
            *self.generate_calls.lock().unwrap() += 1;
            if self.fail_generate {
                return Err(anyhow!("database unavailable"));
            }
            Ok(self.generated.clone())
        }

        async fn mark_overdue_invoices(&self) -> Result<Vec<InvoiceSummary>> {
            Ok(self.overdue.clone())
        }

        async fn pending_invoices(&self) -> Result<Vec<InvoiceSummary>> {
            Ok(self.pending.clone())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        reminders: Mutex<Vec<String>>,
        alerts: Mutex<Vec<(String, i64)>>,
        escalations: Mutex<Vec<(String, String)>>,
        fail_tenant: Option<String>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_rent_reminder(
            &self,
            tenant: &str,
            _amount: f64,
            _due_date: DateTime<Utc>,
        ) -> Result<()> {
            if self.fail_tenant.as_deref() == Some(tenant) {
                return Err(anyhow!("smtp refused"));
            }
            self.reminders.lock().unwrap().push(tenant.to_string());
            Ok(())
        }

        async fn send_overdue_alert(
            &self,
            tenant: &str,
            days_overdue: i64,
            _amount: f64,
        ) -> Result<()> {
            self.alerts.lock().unwrap().push((tenant.to_string(), days_overdue));
            Ok(())
        }

        async fn send_escalation(&self, manager: &str, title: &str, _message: &str) -> Result<()> {
            self.escalations
                .lock()
                .unwrap()
                .push((manager.to_string(), title.to_string()));
            Ok(())
        }
    }

    struct OneManager;

    #[async_trait]
    impl ManagerDirectory for OneManager {
        async fn list_managers(&self) -> Result<Vec<String>> {
            Ok(vec!["manager-1".to_string()])
        }
    }

    fn build(
        invoices: MockInvoices,
        notifier: RecordingNotifier,
        config: AutomationConfig,
    ) -> (Arc<BillingAutomation>, Arc<MockInvoices>, Arc<RecordingNotifier>) {
        let invoices = Arc::new(invoices);
        let notifier = Arc::new(notifier);
        let automation = BillingAutomation::new(
            Scheduler::new(),
            config,
            Arc::clone(&invoices) as Arc<dyn InvoiceService>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            Arc::new(OneManager),
        );
        (automation, invoices, notifier)
    }

    fn mid_march() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 15, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_generation_gated_by_generate_day() {
        let now = mid_march();
        let (automation, invoices, notifier) = build(
            MockInvoices {
                generated: vec![invoice("i1", "Alice", now + Duration::days(14))],
                ..Default::default()
            },
            RecordingNotifier::default(),
            AutomationConfig::default(), // generate_day = 1
        );

        // Scheduled path on the 15th: gate blocks, nothing generated.
        automation.run_invoice_generation(now, false).await.unwrap();
        assert_eq!(*invoices.generate_calls.lock().unwrap(), 0);
        assert!(notifier.reminders.lock().unwrap().is_empty());

        // Manual trigger bypasses the gate.
        automation.run_invoice_generation(now, true).await.unwrap();
        assert_eq!(*invoices.generate_calls.lock().unwrap(), 1);
        assert_eq!(notifier.reminders.lock().unwrap().as_slice(), ["Alice"]);
        // Managers got the summary.
        let escalations = notifier.escalations.lock().unwrap();
        assert_eq!(escalations.len(), 1);
        assert_eq!(escalations[0].1, "Monthly invoices generated");
    }

    #[tokio::test]
    async fn test_generation_matches_configured_day() {
        let now = mid_march();
        let (automation, invoices, _notifier) = build(
            MockInvoices::default(),
            RecordingNotifier::default(),
            AutomationConfig {
                generate_day: 15,
                ..Default::default()
            },
        );
        automation.run_invoice_generation(now, false).await.unwrap();
        assert_eq!(*invoices.generate_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_generation_partial_notification_failure() {
        let now = mid_march();
        let (automation, _invoices, notifier) = build(
            MockInvoices {
                generated: vec![
                    invoice("i1", "Alice", now + Duration::days(14)),
                    invoice("i2", "Bob", now + Duration::days(14)),
                    invoice("i3", "Cara", now + Duration::days(14)),
                ],
                ..Default::default()
            },
            RecordingNotifier {
                fail_tenant: Some("Bob".into()),
                ..Default::default()
            },
            AutomationConfig::default(),
        );

        automation.run_invoice_generation(now, true).await.unwrap();
        // Bob's failure does not abort Alice or Cara.
        assert_eq!(notifier.reminders.lock().unwrap().as_slice(), ["Alice", "Cara"]);
        // Sweep still completed: managers got the summary.
        assert_eq!(notifier.escalations.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_notifies_managers() {
        let (automation, _invoices, notifier) = build(
            MockInvoices {
                fail_generate: true,
                ..Default::default()
            },
            RecordingNotifier::default(),
            AutomationConfig::default(),
        );

        // Top-level failure is swallowed and reported, not propagated.
        automation.run_invoice_generation(mid_march(), true).await.unwrap();
        let escalations = notifier.escalations.lock().unwrap();
        assert_eq!(escalations.len(), 1);
        assert_eq!(escalations[0].1, "Invoice generation failed");
    }

    #[tokio::test]
    async fn test_escalation_boundary() {
        let now = mid_march();
        let (automation, _invoices, notifier) = build(
            MockInvoices {
                overdue: vec![
                    invoice("i1", "Alice", now - Duration::days(13)),
                    invoice("i2", "Bob", now - Duration::days(14)),
                ],
                ..Default::default()
            },
            RecordingNotifier::default(),
            AutomationConfig::default(), // manager_escalation_days = 14
        );

        automation.run_overdue_check(now).await.unwrap();

        let alerts = notifier.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 2);
        assert!(alerts.contains(&("Alice".into(), 13)));
        assert!(alerts.contains(&("Bob".into(), 14)));

        // Only Bob crosses the threshold: exactly one escalation.
        let escalations = notifier.escalations.lock().unwrap();
        assert_eq!(escalations.len(), 1);
        assert_eq!(escalations[0].0, "manager-1");
        assert!(escalations[0].1.contains("Bob"));
    }

    #[tokio::test]
    async fn test_reminder_threshold_independence() {
        let now = mid_march();
        let (automation, _invoices, notifier) = build(
            MockInvoices {
                pending: vec![invoice("i1", "Alice", now + Duration::days(7))],
                ..Default::default()
            },
            RecordingNotifier::default(),
            AutomationConfig::default(), // reminder_days_before = [7, 3, 1]
        );

        automation.run_reminder_check(now).await.unwrap();
        // Due in exactly 7 days: one reminder (the 7-day match), not three.
        assert_eq!(notifier.reminders.lock().unwrap().as_slice(), ["Alice"]);
    }

    #[tokio::test]
    async fn test_reminder_skips_unmatched_day_counts() {
        let now = mid_march();
        let (automation, _invoices, notifier) = build(
            MockInvoices {
                pending: vec![
                    invoice("i1", "Alice", now + Duration::days(5)),
                    invoice("i2", "Bob", now + Duration::days(3)),
                ],
                ..Default::default()
            },
            RecordingNotifier::default(),
            AutomationConfig::default(),
        );

        automation.run_reminder_check(now).await.unwrap();
        assert_eq!(notifier.reminders.lock().unwrap().as_slice(), ["Bob"]);
    }

    #[tokio::test]
    async fn test_install_and_config_sync() {
        let (automation, _invoices, _notifier) = build(
            MockInvoices::default(),
            RecordingNotifier::default(),
            AutomationConfig::default(),
        );
        automation.install().await;

        let status = automation.get_status().await;
        assert_eq!(status.tasks.len(), 3);
        assert!(status.enabled);
        assert!(status.tasks.iter().all(|t| t.active));

        let config = automation
            .update_config(AutomationConfigPatch {
                enabled: Some(false),
                ..Default::default()
            })
            .await;
        assert!(!config.enabled);
        let status = automation.get_status().await;
        assert!(!status.enabled);
        assert!(status.tasks.iter().all(|t| !t.active));

        automation
            .update_config(AutomationConfigPatch {
                enabled: Some(true),
                ..Default::default()
            })
            .await;
        let status = automation.get_status().await;
        assert!(status.tasks.iter().all(|t| t.active));
    }

    #[tokio::test]
    async fn test_update_config_merges_partially() {
        let (automation, _invoices, _notifier) = build(
            MockInvoices::default(),
            RecordingNotifier::default(),
            AutomationConfig::default(),
        );
        automation.install().await;

        let config = automation
            .update_config(AutomationConfigPatch {
                generate_day: Some(5),
                reminder_days_before: Some(vec![10, 2]),
                ..Default::default()
            })
            .await;
        assert_eq!(config.generate_day, 5);
        assert_eq!(config.reminder_days_before, vec![10, 2]);
        // Untouched fields keep their values, tasks stay active.
        assert!(config.enabled);
        assert_eq!(config.manager_escalation_days, 14);
        assert!(automation.get_status().await.tasks.iter().all(|t| t.active));
    }

    #[tokio::test]
    async fn test_manual_trigger_overdue_and_reminders() {
        let now = Utc::now();
        let (automation, _invoices, notifier) = build(
            MockInvoices {
                overdue: vec![invoice("i1", "Alice", now - Duration::days(3))],
                pending: vec![invoice("i2", "Bob", now + Duration::days(1))],
                ..Default::default()
            },
            RecordingNotifier::default(),
            AutomationConfig::default(),
        );

        automation.manual_trigger(TriggerKind::Overdue).await.unwrap();
        assert_eq!(notifier.alerts.lock().unwrap().len(), 1);

        automation.manual_trigger(TriggerKind::Reminders).await.unwrap();
        assert_eq!(notifier.reminders.lock().unwrap().as_slice(), ["Bob"]);
    }
}
