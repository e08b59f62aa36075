//! Command-line interface for blue-green deployments.
//!
//! # Usage
//!
//! ```bash
//! # Deploy a release to staging
//! omniflow-deploy --environment staging --version 2.0.0
//!
//! # Preview a production deploy without touching anything
//! omniflow-deploy -e production -v 2.0.0 --dry-run
//!
//! # Roll production back to the previous slot
//! omniflow-deploy -e production --rollback
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{DeploymentApi, Environment};
use crate::plan::{Action, DeploymentPlan, StepKind};

/// OmniFlow blue-green deployment tool
#[derive(Parser, Debug)]
#[command(name = "omniflow-deploy")]
#[command(about = "Deploy, promote and roll back OmniFlow releases across blue-green slots")]
pub struct Cli {
    /// Target environment
    #[arg(short, long)]
    pub environment: Environment,

    /// Version to deploy (required unless --rollback is given)
    #[arg(short, long)]
    pub version: Option<String>,

    /// Switch traffic back to the previously active slot
    #[arg(short, long)]
    pub rollback: bool,

    /// Print the plan without performing any deployment calls
    #[arg(short, long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt for production
    #[arg(short, long)]
    pub force: bool,

    /// Skip preflight checks
    #[arg(long)]
    pub skip_tests: bool,

    /// Skip post-deploy health checks
    #[arg(long)]
    pub skip_health_checks: bool,
}

/// Production mutations require an interactive confirmation unless forced.
pub fn needs_confirmation(environment: Environment, force: bool) -> bool {
    environment == Environment::Production && !force
}

fn confirm_via_stdin(plan: &DeploymentPlan) -> Result<bool> {
    println!(
        "This will {} on {}. Type 'yes' to continue:",
        plan.action.as_str(),
        plan.environment
    );
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("yes"))
}

/// Drives a parsed command against a deployment API.
pub struct DeployRunner {
    api: Arc<dyn DeploymentApi>,
}

impl DeployRunner {
    pub fn new(api: Arc<dyn DeploymentApi>) -> Self {
        Self { api }
    }

    /// Plan the requested action, print it, and execute it unless this is a
    /// dry run or the operator declines the production confirmation.
    pub async fn run(&self, args: &Cli) -> Result<()> {
        let requested_version = if args.rollback {
            None
        } else {
            match &args.version {
                Some(version) => Some(version.as_str()),
                None => bail!("A version is required: pass -v/--version or use --rollback"),
            }
        };

        let state = self
            .api
            .current_state(args.environment)
            .await
            .context("Failed to read the current environment state")?;

        let plan = match requested_version {
            Some(version) => DeploymentPlan::deploy(
                args.environment,
                &state,
                version,
                args.skip_tests,
                args.skip_health_checks,
            ),
            None => DeploymentPlan::rollback(args.environment, &state, args.skip_health_checks),
        };

        println!("{}", plan.render());

        if args.dry_run {
            info!("Dry run requested, stopping before any deployment calls");
            return Ok(());
        }

        if needs_confirmation(args.environment, args.force) && !confirm_via_stdin(&plan)? {
            println!("Aborted.");
            return Ok(());
        }

        self.execute(&plan).await
    }

    async fn execute(&self, plan: &DeploymentPlan) -> Result<()> {
        for step in &plan.steps {
            if step.skipped {
                info!(step = %step.name, "Skipping step");
                continue;
            }

            info!(step = %step.name, "Running step");
            let result = match &step.kind {
                StepKind::Preflight => self.api.run_preflight(plan.environment).await,
                StepKind::Deploy { version } => {
                    self.api
                        .deploy(plan.environment, plan.target_slot, version)
                        .await
                }
                StepKind::HealthCheck => {
                    self.api
                        .check_health(plan.environment, plan.target_slot)
                        .await
                }
                StepKind::Promote => self.api.promote(plan.environment, plan.target_slot).await,
                StepKind::Rollback => self.api.rollback(plan.environment).await,
                StepKind::Notify { message } => match self.api.notify(message).await {
                    Err(error) => {
                        warn!(%error, "Notification failed");
                        Ok(())
                    }
                    ok => ok,
                },
            };

            result.with_context(|| format!("Deployment step '{}' failed", step.name))?;
        }

        match plan.action {
            Action::Deploy => println!(
                "Deployment complete: {} is now serving from the {} slot.",
                plan.environment, plan.target_slot
            ),
            Action::Rollback => println!(
                "Rollback complete: {} is back on the {} slot.",
                plan.environment, plan.target_slot
            ),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{EnvironmentState, Slot, SlotState};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingApi {
        fail_health: bool,
        state_calls: AtomicUsize,
        preflight_calls: AtomicUsize,
        deploy_calls: AtomicUsize,
        health_calls: AtomicUsize,
        promote_calls: AtomicUsize,
        rollback_calls: AtomicUsize,
        deployed: Mutex<Vec<(Slot, String)>>,
        notifications: Mutex<Vec<String>>,
    }

    impl RecordingApi {
        fn mutating_calls(&self) -> usize {
            self.preflight_calls.load(Ordering::SeqCst)
                + self.deploy_calls.load(Ordering::SeqCst)
                + self.health_calls.load(Ordering::SeqCst)
                + self.promote_calls.load(Ordering::SeqCst)
                + self.rollback_calls.load(Ordering::SeqCst)
                + self.notifications.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DeploymentApi for RecordingApi {
        async fn current_state(&self, _environment: Environment) -> Result<EnvironmentState> {
            self.state_calls.fetch_add(1, Ordering::SeqCst);
            Ok(EnvironmentState {
                active_slot: Slot::Blue,
                blue: SlotState {
                    version: Some("1.4.0".to_string()),
                    healthy: true,
                    deployed_at: None,
                },
                green: SlotState {
                    version: Some("1.3.2".to_string()),
                    healthy: true,
                    deployed_at: None,
                },
            })
        }

        async fn run_preflight(&self, _environment: Environment) -> Result<()> {
            self.preflight_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn deploy(&self, _environment: Environment, slot: Slot, version: &str) -> Result<()> {
            self.deploy_calls.fetch_add(1, Ordering::SeqCst);
            self.deployed
                .lock()
                .unwrap()
                .push((slot, version.to_string()));
            Ok(())
        }

        async fn check_health(&self, _environment: Environment, _slot: Slot) -> Result<()> {
            self.health_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_health {
                bail!("slot reported unhealthy");
            }
            Ok(())
        }

        async fn promote(&self, _environment: Environment, _slot: Slot) -> Result<()> {
            self.promote_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn rollback(&self, _environment: Environment) -> Result<()> {
            self.rollback_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn notify(&self, message: &str) -> Result<()> {
            self.notifications.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["omniflow-deploy"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn test_short_flags_parse() {
        let args = cli(&["-e", "production", "-v", "2.0.0", "-d", "-f"]);
        assert_eq!(args.environment, Environment::Production);
        assert_eq!(args.version.as_deref(), Some("2.0.0"));
        assert!(args.dry_run);
        assert!(args.force);
        assert!(!args.rollback);
    }

    #[test]
    fn test_needs_confirmation_only_for_unforced_production() {
        assert!(needs_confirmation(Environment::Production, false));
        assert!(!needs_confirmation(Environment::Production, true));
        assert!(!needs_confirmation(Environment::Staging, false));
        assert!(!needs_confirmation(Environment::Staging, true));
    }

    #[tokio::test]
    async fn test_dry_run_reads_state_and_performs_no_deployment_calls() {
        let api = Arc::new(RecordingApi::default());
        let runner = DeployRunner::new(api.clone());
        let args = cli(&["-e", "production", "-v", "2.0.0", "--dry-run"]);

        runner.run(&args).await.unwrap();

        assert_eq!(api.state_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.mutating_calls(), 0);
    }

    #[tokio::test]
    async fn test_staging_deploy_runs_every_step() {
        let api = Arc::new(RecordingApi::default());
        let runner = DeployRunner::new(api.clone());
        let args = cli(&["-e", "staging", "-v", "2.0.0"]);

        runner.run(&args).await.unwrap();

        assert_eq!(api.preflight_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.deploy_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.health_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.promote_calls.load(Ordering::SeqCst), 1);

        let deployed = api.deployed.lock().unwrap();
        assert_eq!(deployed.as_slice(), &[(Slot::Green, "2.0.0".to_string())]);

        let notifications = api.notifications.lock().unwrap();
        assert_eq!(notifications.len(), 1);
        assert!(notifications[0].contains("2.0.0"));
    }

    #[tokio::test]
    async fn test_skip_flags_suppress_the_matching_calls() {
        let api = Arc::new(RecordingApi::default());
        let runner = DeployRunner::new(api.clone());
        let args = cli(&[
            "-e",
            "staging",
            "-v",
            "2.0.0",
            "--skip-tests",
            "--skip-health-checks",
        ]);

        runner.run(&args).await.unwrap();

        assert_eq!(api.preflight_calls.load(Ordering::SeqCst), 0);
        assert_eq!(api.health_calls.load(Ordering::SeqCst), 0);
        assert_eq!(api.deploy_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.promote_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_forced_production_rollback_switches_without_prompting() {
        let api = Arc::new(RecordingApi::default());
        let runner = DeployRunner::new(api.clone());
        let args = cli(&["-e", "production", "--rollback", "--force"]);

        runner.run(&args).await.unwrap();

        assert_eq!(api.rollback_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.deploy_calls.load(Ordering::SeqCst), 0);
        assert_eq!(api.promote_calls.load(Ordering::SeqCst), 0);
        assert_eq!(api.notifications.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deploy_without_version_is_rejected_before_any_call() {
        let api = Arc::new(RecordingApi::default());
        let runner = DeployRunner::new(api.clone());
        let args = cli(&["-e", "staging"]);

        let err = runner.run(&args).await.unwrap_err();

        assert!(err.to_string().contains("--version"));
        assert_eq!(api.state_calls.load(Ordering::SeqCst), 0);
        assert_eq!(api.mutating_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_health_check_stops_before_promote() {
        let api = Arc::new(RecordingApi {
            fail_health: true,
            ..RecordingApi::default()
        });
        let runner = DeployRunner::new(api.clone());
        let args = cli(&["-e", "staging", "-v", "2.0.0"]);

        let err = runner.run(&args).await.unwrap_err();

        assert!(err.to_string().contains("Health check"));
        assert_eq!(api.deploy_calls.load(Ordering::SeqCst), 1);
        assert_eq!(api.promote_calls.load(Ordering::SeqCst), 0);
        assert!(api.notifications.lock().unwrap().is_empty());
    }
}
