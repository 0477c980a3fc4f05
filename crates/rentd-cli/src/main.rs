mod client;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use rentd_billing::BillingAutomation;
use rentd_billing::memory::{MemoryInvoiceStore, StaticManagerDirectory, TracingNotifier};
use rentd_cron::Scheduler;

#[derive(Parser)]
#[command(name = "rentd", about = "Property-management billing automation service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the automation service and HTTP API
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Manager identity to receive escalations (repeatable)
        #[arg(short, long = "manager")]
        managers: Vec<String>,
    },
    /// Fetch automation status from a running service
    Status {
        /// Gateway base URL
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        url: String,

        /// Bearer token for authentication
        #[arg(long)]
        token: Option<String>,
    },
    /// Manually trigger an automation on a running service
    Trigger {
        /// Which automation to run: invoices, overdue, or reminders
        #[arg(value_name = "TYPE")]
        trigger_type: String,

        /// Gateway base URL
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        url: String,

        /// Bearer token for authentication
        #[arg(long)]
        token: Option<String>,
    },
    /// Check local configuration
    Health,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, managers } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_serve(port, managers))?;
        }
        Commands::Status { url, token } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(client::run_status(url, token))?;
        }
        Commands::Trigger {
            trigger_type,
            url,
            token,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(client::run_trigger(trigger_type, url, token))?;
        }
        Commands::Health => {
            let config = rentd_config::load_config().unwrap_or_default();
            println!("rentd is healthy");
            println!("  automation enabled: {}", config.automation.enabled);
            println!("  generate day: {}", config.automation.generate_day);
            println!(
                "  reminder days: {:?}",
                config.automation.reminder_days_before
            );
            println!("  gateway port: {}", config.gateway.port);
        }
    }

    Ok(())
}

async fn run_serve(port: Option<u16>, managers: Vec<String>) -> anyhow::Result<()> {
    let config = rentd_config::load_config().unwrap_or_default();

    info!(
        managers = managers.len(),
        enabled = config.automation.enabled,
        "Starting billing automation service"
    );

    let scheduler = Scheduler::new();
    let automation = BillingAutomation::new(
        Arc::clone(&scheduler),
        config.automation.clone(),
        Arc::new(MemoryInvoiceStore::new(Vec::new())),
        Arc::new(TracingNotifier),
        Arc::new(StaticManagerDirectory::new(managers)),
    );

    automation.install().await;
    scheduler.start().await;

    rentd_gateway::start_gateway(&config, automation, scheduler, port).await
}
