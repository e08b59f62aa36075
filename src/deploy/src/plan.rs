//! Deployment planning.
//!
//! A plan is computed from the current environment state before anything
//! runs and printed in full, so an operator can see which slot will be
//! touched and which steps a flag has skipped. Runs always land in the
//! inactive slot and only switch traffic once that slot checks out.

use crate::api::{Environment, EnvironmentState, Slot};

/// What the run does to the environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Deploy,
    Rollback,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Deploy => "deploy",
            Action::Rollback => "rollback",
        }
    }
}

/// The operation a plan step maps to on [`crate::api::DeploymentApi`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepKind {
    Preflight,
    Deploy { version: String },
    HealthCheck,
    Promote,
    Rollback,
    Notify { message: String },
}

/// A single step in the plan, with an optional skip marker.
#[derive(Clone, Debug)]
pub struct PlanStep {
    pub kind: StepKind,
    pub name: String,
    pub skipped: bool,
    pub reason: Option<String>,
}

impl PlanStep {
    fn run(kind: StepKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            skipped: false,
            reason: None,
        }
    }

    fn skip(kind: StepKind, name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            skipped: true,
            reason: Some(reason.into()),
        }
    }
}

/// Ordered description of a deployment or rollback run.
#[derive(Clone, Debug)]
pub struct DeploymentPlan {
    pub environment: Environment,
    pub action: Action,
    pub version: Option<String>,
    pub active_slot: Slot,
    pub target_slot: Slot,
    pub steps: Vec<PlanStep>,
}

impl DeploymentPlan {
    /// Plan a release of `version` into the inactive slot.
    pub fn deploy(
        environment: Environment,
        state: &EnvironmentState,
        version: &str,
        skip_tests: bool,
        skip_health_checks: bool,
    ) -> Self {
        let target = state.inactive_slot();
        let mut steps = Vec::new();

        if skip_tests {
            steps.push(PlanStep::skip(
                StepKind::Preflight,
                "Run preflight checks",
                "--skip-tests",
            ));
        } else {
            steps.push(PlanStep::run(StepKind::Preflight, "Run preflight checks"));
        }

        steps.push(PlanStep::run(
            StepKind::Deploy {
                version: version.to_string(),
            },
            format!("Deploy version {} to the {} slot", version, target),
        ));

        let health_name = format!("Health check the {} slot", target);
        if skip_health_checks {
            steps.push(PlanStep::skip(
                StepKind::HealthCheck,
                health_name,
                "--skip-health-checks",
            ));
        } else {
            steps.push(PlanStep::run(StepKind::HealthCheck, health_name));
        }

        steps.push(PlanStep::run(
            StepKind::Promote,
            format!("Promote the {} slot to active", target),
        ));
        steps.push(PlanStep::run(
            StepKind::Notify {
                message: format!(
                    "OmniFlow {}: version {} deployed to the {} slot and promoted",
                    environment, version, target
                ),
            },
            "Send deployment notification",
        ));

        Self {
            environment,
            action: Action::Deploy,
            version: Some(version.to_string()),
            active_slot: state.active_slot,
            target_slot: target,
            steps,
        }
    }

    /// Plan a traffic switch back to the previously active slot.
    pub fn rollback(
        environment: Environment,
        state: &EnvironmentState,
        skip_health_checks: bool,
    ) -> Self {
        let target = state.inactive_slot();
        let mut steps = Vec::new();

        let health_name = format!("Health check the {} slot", target);
        if skip_health_checks {
            steps.push(PlanStep::skip(
                StepKind::HealthCheck,
                health_name,
                "--skip-health-checks",
            ));
        } else {
            steps.push(PlanStep::run(StepKind::HealthCheck, health_name));
        }

        steps.push(PlanStep::run(
            StepKind::Rollback,
            format!("Switch traffic back to the {} slot", target),
        ));
        steps.push(PlanStep::run(
            StepKind::Notify {
                message: format!(
                    "OmniFlow {}: rolled back to the {} slot",
                    environment, target
                ),
            },
            "Send rollback notification",
        ));

        Self {
            environment,
            action: Action::Rollback,
            version: state.slot(target).version.clone(),
            active_slot: state.active_slot,
            target_slot: target,
            steps,
        }
    }

    /// Human-readable plan, printed before execution.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Deployment Plan\n\
             ===============\n\
             Environment:  {}\n\
             Action:       {}\n",
            self.environment,
            self.action.as_str(),
        );

        if let Some(version) = &self.version {
            out.push_str(&format!("Version:      {}\n", version));
        }

        out.push_str(&format!("Active slot:  {}\n", self.active_slot));
        out.push_str(&format!(
            "Target slot:  {} (currently inactive)\n\nSteps:\n",
            self.target_slot
        ));

        for (index, step) in self.steps.iter().enumerate() {
            out.push_str(&format!("  {}. {}", index + 1, step.name));
            if step.skipped {
                match &step.reason {
                    Some(reason) => out.push_str(&format!(" [skipped: {}]", reason)),
                    None => out.push_str(" [skipped]"),
                }
            }
            out.push('\n');
        }

        out
    }
}
