//! Offline inspection: providers, catalogs, request schema

use clap::Args;
use serde::Serialize;

use crate::catalog::CatalogEntry;
use crate::provider::{KeyMetric, MetricsEndpoint, ProviderInfo};
use crate::request::DeploymentInput;

use super::{print, Context, OutputFormat};
use crate::cli::Result;

/// Catalog arguments
#[derive(Args, Debug)]
pub struct CatalogArgs {
    /// Only this provider's catalog
    #[arg(long)]
    pub provider: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProviderListing {
    #[serde(flatten)]
    info: ProviderInfo,
    metrics: MetricsEndpoint,
    key_metrics: &'static [KeyMetric],
}

#[derive(Serialize)]
struct CatalogListing {
    provider: &'static str,
    models: &'static [CatalogEntry],
}

/// List every provider with its current operator version
pub async fn providers(ctx: &Context) -> Result<()> {
    let mut listings = Vec::new();
    for provider in ctx.engine.registry().iter() {
        provider.latest_version().await;
        listings.push(ProviderListing {
            info: provider.info(),
            metrics: provider.metrics_endpoint(),
            key_metrics: provider.key_metrics(),
        });
    }
    print(&listings, OutputFormat::Json)
}

/// List premade models, per provider
pub fn catalog(ctx: &Context, args: CatalogArgs) -> Result<()> {
    let providers = match args.provider.as_deref() {
        Some(id) => vec![ctx.engine.get_provider(id)?],
        None => ctx.engine.registry().iter().collect(),
    };

    let listings: Vec<CatalogListing> = providers
        .into_iter()
        .filter_map(|provider| {
            provider.catalog().map(|catalog| CatalogListing {
                provider: provider.id(),
                models: catalog.entries(),
            })
        })
        .collect();
    print(&listings, OutputFormat::Json)
}

/// Print the request JSON schema
pub fn schema() -> Result<()> {
    print(&schemars::schema_for!(DeploymentInput), OutputFormat::Json)
}
