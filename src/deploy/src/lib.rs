//! # OmniFlow Deploy
//!
//! Blue-green deployment tooling for the OmniFlow platform. The crate plans
//! a deploy or rollback against the current slot state, prints the plan, and
//! drives the external deployment engine through its webhook.

pub mod api;
pub mod cli;
pub mod plan;

pub use api::{DeploymentApi, Environment, EnvironmentState, HttpDeploymentApi, Slot, SlotState};
pub use cli::{needs_confirmation, Cli, DeployRunner};
pub use plan::{Action, DeploymentPlan, PlanStep, StepKind};
