//! Thin HTTP client for the `status` and `trigger` subcommands.

use anyhow::{anyhow, bail};
use serde_json::{Value, json};

use rentd_types::TriggerKind;

/// GET the automation status and print it.
pub async fn run_status(url: String, token: Option<String>) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let mut request = client.get(format!("{url}/api/automation/status"));
    if let Some(token) = &token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await?;
    let status = response.status();
    let body: Value = response.json().await?;
    if !status.is_success() {
        bail!("status request failed ({status}): {body}");
    }
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

/// POST a manual trigger and print the result.
pub async fn run_trigger(
    trigger_type: String,
    url: String,
    token: Option<String>,
) -> anyhow::Result<()> {
    let kind: TriggerKind = serde_json::from_value(json!(trigger_type)).map_err(|_| {
        anyhow!("invalid trigger type '{trigger_type}', expected invoices, overdue, or reminders")
    })?;

    let client = reqwest::Client::new();
    let mut request = client
        .post(format!("{url}/api/automation/trigger"))
        .json(&json!({ "type": kind }));
    if let Some(token) = &token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await?;
    let status = response.status();
    let body: Value = response.json().await?;
    if !status.is_success() {
        bail!("trigger request failed ({status}): {body}");
    }
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
