//! kubefoundry command line

pub mod commands;
mod error;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use kubefoundry_common::telemetry::LogFormat;

use commands::Context;

/// kubefoundry - compile and admit model deployments for Kubernetes inference runtimes
#[derive(Parser, Debug)]
#[command(name = "kubefoundry")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: $KUBEFOUNDRY_CONFIG or ~/.kubefoundry/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to kubeconfig file (default: $KUBEFOUNDRY_KUBECONFIG, then the config file, then kube defaults)
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Log output format (`text` or `json`)
    #[arg(long, env = "KUBEFOUNDRY_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: LogFormat,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the registered runtimes and what they support
    Providers,

    /// List premade models
    Catalog(commands::inspect::CatalogArgs),

    /// Print the JSON schema of a deployment request
    Schema,

    /// Validate a deployment request file
    Validate(commands::request::FileArgs),

    /// Compile a deployment request into the runtime's custom resource
    Compile(commands::request::CompileArgs),

    /// Show GPU capacity of the current cluster
    Capacity,

    /// Check whether a request fits the current cluster
    CheckFit(commands::request::CheckFitArgs),

    /// Validate, check fit, compile and apply a deployment
    Deploy(commands::deploy::DeployArgs),

    /// Show the canonical status of deployments
    Status(commands::deploy::StatusArgs),

    /// Delete a deployment
    Delete(commands::deploy::DeleteArgs),

    /// Check whether a runtime is installed
    Installation(commands::install::ProviderArgs),

    /// Print install and uninstall steps for a runtime
    InstallPlan(commands::install::ProviderArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let ctx = Context::load(self.config.as_deref(), self.kubeconfig.as_deref())?;
        match self.command {
            Commands::Providers => commands::inspect::providers(&ctx).await,
            Commands::Catalog(args) => commands::inspect::catalog(&ctx, args),
            Commands::Schema => commands::inspect::schema(),
            Commands::Validate(args) => commands::request::validate(&ctx, args),
            Commands::Compile(args) => commands::request::compile(&ctx, args),
            Commands::Capacity => commands::request::capacity(&ctx).await,
            Commands::CheckFit(args) => commands::request::check_fit(&ctx, args).await,
            Commands::Deploy(args) => commands::deploy::deploy(&ctx, args).await,
            Commands::Status(args) => commands::deploy::status(&ctx, args).await,
            Commands::Delete(args) => commands::deploy::delete(&ctx, args).await,
            Commands::Installation(args) => commands::install::installation(&ctx, args).await,
            Commands::InstallPlan(args) => commands::install::install_plan(&ctx, args).await,
        }
    }
}
