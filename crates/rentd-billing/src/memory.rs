//! In-process collaborator implementations.
//!
//! Used by `rentd serve` when no real backing services are wired in,
//! and by tests. Invoices live in memory; notification "delivery" is
//! a structured log line, since the transport itself is outside this
//! service's boundary.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::info;

use rentd_types::InvoiceSummary;

use crate::{InvoiceService, ManagerDirectory, Notifier};

/// Payment state of a stored invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvoiceState {
    Pending,
    Overdue,
}

#[derive(Debug, Clone)]
struct StoredInvoice {
    summary: InvoiceSummary,
    state: InvoiceState,
}

/// A lease the store bills monthly: tenant name and rent amount.
#[derive(Debug, Clone)]
pub struct Lease {
    pub tenant_name: String,
    pub amount: f64,
}

/// In-memory invoice store. Generation creates one invoice per lease,
/// due 14 days out.
#[derive(Default)]
pub struct MemoryInvoiceStore {
    leases: Vec<Lease>,
    invoices: RwLock<Vec<StoredInvoice>>,
    next_id: AtomicU64,
}

impl MemoryInvoiceStore {
    pub fn new(leases: Vec<Lease>) -> Self {
        Self {
            leases,
            invoices: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> String {
        format!("inv-{:06}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Insert a pending invoice directly, for seeding and tests.
    pub async fn insert_pending(&self, tenant_name: &str, amount: f64, due_date: DateTime<Utc>) {
        let summary = InvoiceSummary {
            id: self.next_id(),
            tenant_name: tenant_name.to_string(),
            amount,
            due_date,
        };
        self.invoices.write().await.push(StoredInvoice {
            summary,
            state: InvoiceState::Pending,
        });
    }
}

#[async_trait]
impl InvoiceService for MemoryInvoiceStore {
    async fn generate_monthly_invoices(&self) -> Result<Vec<InvoiceSummary>> {
        let due_date = Utc::now() + Duration::days(14);
        let mut invoices = self.invoices.write().await;
        let mut created = Vec::with_capacity(self.leases.len());
        for lease in &self.leases {
            let summary = InvoiceSummary {
                id: self.next_id(),
                tenant_name: lease.tenant_name.clone(),
                amount: lease.amount,
                due_date,
            };
            invoices.push(StoredInvoice {
                summary: summary.clone(),
                state: InvoiceState::Pending,
            });
            created.push(summary);
        }
        Ok(created)
    }

    async fn mark_overdue_invoices(&self) -> Result<Vec<InvoiceSummary>> {
        let now = Utc::now();
        let mut invoices = self.invoices.write().await;
        let mut overdue = Vec::new();
        for invoice in invoices.iter_mut() {
            if invoice.summary.due_date < now {
                invoice.state = InvoiceState::Overdue;
            }
            if invoice.state == InvoiceState::Overdue {
                overdue.push(invoice.summary.clone());
            }
        }
        Ok(overdue)
    }

    async fn pending_invoices(&self) -> Result<Vec<InvoiceSummary>> {
        Ok(self
            .invoices
            .read()
            .await
            .iter()
            .filter(|i| i.state == InvoiceState::Pending)
            .map(|i| i.summary.clone())
            .collect())
    }
}

/// Notifier that logs each notification instead of delivering it.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send_rent_reminder(
        &self,
        tenant: &str,
        amount: f64,
        due_date: DateTime<Utc>,
    ) -> Result<()> {
        info!(tenant, amount, due = %due_date.date_naive(), "Rent reminder");
        Ok(())
    }

    async fn send_overdue_alert(
        &self,
        tenant: &str,
        days_overdue: i64,
        amount: f64,
    ) -> Result<()> {
        info!(tenant, days_overdue, amount, "Overdue alert");
        Ok(())
    }

    async fn send_escalation(&self, manager: &str, title: &str, message: &str) -> Result<()> {
        info!(manager, title, message, "Escalation");
        Ok(())
    }
}

/// Fixed manager list.
pub struct StaticManagerDirectory {
    managers: Vec<String>,
}

impl StaticManagerDirectory {
    pub fn new(managers: Vec<String>) -> Self {
        Self { managers }
    }
}

#[async_trait]
impl ManagerDirectory for StaticManagerDirectory {
    async fn list_managers(&self) -> Result<Vec<String>> {
        Ok(self.managers.clone())
    }
}
