//! Runtime installation commands

use clap::Args;
use serde::Serialize;

use crate::cli::Result;
use crate::provider::{HelmChart, InstallStep, UninstallResources};

use super::{print, Context, OutputFormat};

/// Provider selection
#[derive(Args, Debug)]
pub struct ProviderArgs {
    /// Provider id
    #[arg(long)]
    pub provider: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InstallPlan {
    provider: &'static str,
    version: String,
    charts: Vec<HelmChart>,
    steps: Vec<InstallStep>,
    uninstall: UninstallResources,
}

/// Check whether a runtime's CRD and operator are present
pub async fn installation(ctx: &Context, args: ProviderArgs) -> Result<()> {
    let provider = ctx.engine.get_provider(&args.provider)?;
    let cluster = ctx.cluster().await?;
    let status = provider.check_installation(&cluster).await?;
    print(&status, OutputFormat::Json)
}

/// Print the Helm steps that install a runtime and what uninstall removes
pub async fn install_plan(ctx: &Context, args: ProviderArgs) -> Result<()> {
    let provider = ctx.engine.get_provider(&args.provider)?;
    let plan = InstallPlan {
        provider: provider.id(),
        version: provider.latest_version().await,
        charts: provider.helm_charts().await,
        steps: provider.install_steps().await,
        uninstall: provider.uninstall_resources(),
    };
    print(&plan, OutputFormat::Json)
}
