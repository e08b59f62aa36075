//! Entry point for the `omniflow-deploy` binary.

use clap::Parser;
use omniflow_deploy::{Cli, DeployRunner, HttpDeploymentApi};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_logging();

    let args = Cli::parse();

    let api = match HttpDeploymentApi::from_env() {
        Ok(api) => api,
        Err(error) => {
            error!(%error, "Deployment configuration is incomplete");
            eprintln!("Error: {:#}", error);
            std::process::exit(1);
        }
    };

    let runner = DeployRunner::new(Arc::new(api));
    if let Err(error) = runner.run(&args).await {
        error!(%error, "Deployment failed");
        eprintln!("Error: {:#}", error);
        std::process::exit(1);
    }
}

/// Logs go to stderr so the plan output on stdout stays clean.
fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "omniflow_deploy=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
