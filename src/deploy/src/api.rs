//! Deployment API surface for the blue-green release tooling.
//!
//! The deployment engine itself runs behind a webhook; this crate only plans
//! and sequences the calls. Every operation is posted to `DEPLOYMENT_WEBHOOK`
//! as a small action envelope, and Slack notifications go to the optional
//! `SLACK_WEBHOOK`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Target environment for a deployment run.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the two long-lived deployment slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Blue,
    Green,
}

impl Slot {
    /// The slot traffic is not pointed at when `self` is active.
    pub fn other(&self) -> Slot {
        match self {
            Slot::Blue => Slot::Green,
            Slot::Green => Slot::Blue,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Blue => "blue",
            Slot::Green => "green",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a single slot is currently running.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlotState {
    pub version: Option<String>,
    pub healthy: bool,
    pub deployed_at: Option<DateTime<Utc>>,
}

/// Snapshot of both slots for one environment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentState {
    pub active_slot: Slot,
    pub blue: SlotState,
    pub green: SlotState,
}

impl EnvironmentState {
    /// The slot a new release lands in.
    pub fn inactive_slot(&self) -> Slot {
        self.active_slot.other()
    }

    pub fn slot(&self, slot: Slot) -> &SlotState {
        match slot {
            Slot::Blue => &self.blue,
            Slot::Green => &self.green,
        }
    }
}

/// Operations the deployment pipeline performs against an environment.
///
/// `current_state` is the only read; everything else mutates infrastructure
/// and must never run during a dry run.
#[async_trait]
pub trait DeploymentApi: Send + Sync {
    async fn current_state(&self, environment: Environment) -> Result<EnvironmentState>;
    async fn run_preflight(&self, environment: Environment) -> Result<()>;
    async fn deploy(&self, environment: Environment, slot: Slot, version: &str) -> Result<()>;
    async fn check_health(&self, environment: Environment, slot: Slot) -> Result<()>;
    async fn promote(&self, environment: Environment, slot: Slot) -> Result<()>;
    async fn rollback(&self, environment: Environment) -> Result<()>;
    async fn notify(&self, message: &str) -> Result<()>;
}

/// Webhook-backed implementation used by the `omniflow-deploy` binary.
pub struct HttpDeploymentApi {
    http: reqwest::Client,
    webhook_url: String,
    slack_url: Option<String>,
}

impl HttpDeploymentApi {
    pub fn new(webhook_url: impl Into<String>, slack_url: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build the HTTP client")?;

        Ok(Self {
            http,
            webhook_url: webhook_url.into(),
            slack_url,
        })
    }

    /// Read the webhook endpoints from the process environment.
    ///
    /// `DEPLOYMENT_WEBHOOK` is required. `SLACK_WEBHOOK` is optional and
    /// disables notifications when unset.
    pub fn from_env() -> Result<Self> {
        let webhook_url =
            std::env::var("DEPLOYMENT_WEBHOOK").context("DEPLOYMENT_WEBHOOK is not set")?;
        let slack_url = std::env::var("SLACK_WEBHOOK").ok();
        Self::new(webhook_url, slack_url)
    }

    async fn post_action(
        &self,
        action: &str,
        environment: Environment,
        slot: Option<Slot>,
        version: Option<&str>,
    ) -> Result<reqwest::Response> {
        let body = json!({
            "action": action,
            "environment": environment,
            "slot": slot,
            "version": version,
        });

        debug!(action, environment = %environment, "Calling deployment webhook");
        let response = self
            .http
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Deployment webhook call '{}' failed", action))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!(
                "Deployment webhook '{}' returned {}: {}",
                action,
                status,
                detail
            );
        }

        Ok(response)
    }
}

#[async_trait]
impl DeploymentApi for HttpDeploymentApi {
    async fn current_state(&self, environment: Environment) -> Result<EnvironmentState> {
        let response = self.post_action("state", environment, None, None).await?;
        response
            .json::<EnvironmentState>()
            .await
            .context("Deployment webhook returned an invalid state payload")
    }

    async fn run_preflight(&self, environment: Environment) -> Result<()> {
        self.post_action("preflight", environment, None, None)
            .await?;
        Ok(())
    }

    async fn deploy(&self, environment: Environment, slot: Slot, version: &str) -> Result<()> {
        self.post_action("deploy", environment, Some(slot), Some(version))
            .await?;
        Ok(())
    }

    async fn check_health(&self, environment: Environment, slot: Slot) -> Result<()> {
        self.post_action("health", environment, Some(slot), None)
            .await?;
        Ok(())
    }

    async fn promote(&self, environment: Environment, slot: Slot) -> Result<()> {
        self.post_action("promote", environment, Some(slot), None)
            .await?;
        Ok(())
    }

    async fn rollback(&self, environment: Environment) -> Result<()> {
        self.post_action("rollback", environment, None, None)
            .await?;
        Ok(())
    }

    async fn notify(&self, message: &str) -> Result<()> {
        let Some(slack_url) = &self.slack_url else {
            debug!("SLACK_WEBHOOK not configured, skipping notification");
            return Ok(());
        };

        let response = self
            .http
            .post(slack_url)
            .json(&json!({ "text": message }))
            .send()
            .await
            .context("Slack webhook call failed")?;

        if !response.status().is_success() {
            bail!("Slack webhook returned {}", response.status());
        }

        Ok(())
    }
}
