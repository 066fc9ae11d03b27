//! Cluster commands: deploy, status, delete

use clap::Args;
use serde_json::Value;
use tracing::{info, warn};

use crate::cli::{Error, Result};
use crate::cluster::{ClusterQuery, CrdConfig};
use crate::provider::Provider;
use crate::status::CanonicalStatus;

use super::request::FileArgs;
use super::{print, read_document, Context, OutputFormat};

/// Deploy arguments
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Request file
    #[command(flatten)]
    pub file: FileArgs,

    /// Refuse to apply when the fit check fails
    #[arg(long)]
    pub require_fit: bool,

    /// Print the plan without applying it
    #[arg(long)]
    pub dry_run: bool,
}

/// Status arguments
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Provider id
    #[arg(long)]
    pub provider: String,

    /// Namespace (default: config `defaultNamespace`)
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Deployment name; every deployment in the namespace when omitted
    pub name: Option<String>,
}

/// Delete arguments
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Provider id
    #[arg(long)]
    pub provider: String,

    /// Namespace (default: config `defaultNamespace`)
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Deployment name
    pub name: String,
}

/// Every custom resource a provider may have compiled to
pub fn provider_crds(provider: &dyn Provider) -> Vec<CrdConfig> {
    let mut crds: Vec<CrdConfig> = Vec::new();
    for variant in provider.features().resource_variants {
        let crd = provider.crd_config(Some(*variant));
        if !crds.contains(&crd) {
            crds.push(crd);
        }
    }
    if crds.is_empty() {
        crds.push(provider.crd_config(None));
    }
    crds
}

/// Find a deployment among a provider's custom resources
pub async fn find_object(
    cluster: &dyn ClusterQuery,
    provider: &dyn Provider,
    namespace: &str,
    name: &str,
) -> Result<Option<(CrdConfig, Value)>> {
    for crd in provider_crds(provider) {
        match cluster.get_custom_object(&crd, namespace, name).await {
            Ok(Some(object)) => return Ok(Some((crd, object))),
            Ok(None) => {}
            // The CRD for this variant may not be installed
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(None)
}

/// Reduce every deployment a provider owns in a namespace
pub async fn list_statuses(
    cluster: &dyn ClusterQuery,
    provider: &dyn Provider,
    namespace: &str,
) -> Result<Vec<CanonicalStatus>> {
    let mut statuses = Vec::new();
    for crd in provider_crds(provider) {
        match cluster.list_custom_objects(&crd, namespace).await {
            Ok(objects) => statuses.extend(objects.iter().map(|o| provider.parse_status(o))),
            Err(e) if e.is_not_found() => {
                warn!(crd = %crd.crd_name(), "Custom resource not installed");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(statuses)
}

/// Validate, check fit, compile and create the custom object
pub async fn deploy(ctx: &Context, args: DeployArgs) -> Result<()> {
    let raw = read_document(&args.file.path)?;
    let cluster = ctx.cluster().await?;
    let plan = ctx.engine.plan(&raw, Some(&cluster), None).await?;

    if let Some(fit) = plan.fit.as_ref().filter(|fit| !fit.fits) {
        if args.require_fit {
            return Err(Error::DoesNotFit {
                reasons: fit
                    .warnings
                    .iter()
                    .map(|w| w.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; "),
            });
        }
        warn!(
            name = %plan.request.name,
            "Deployment may not schedule; applying anyway"
        );
    }

    if args.dry_run {
        return print(&plan, OutputFormat::Json);
    }

    let provider = ctx.engine.get_provider(&plan.request.provider)?;
    let installation = provider.check_installation(&cluster).await?;
    if !installation.installed {
        return Err(Error::NotInstalled {
            provider: provider.id().to_string(),
            message: installation.message,
        });
    }

    let created = cluster
        .create_custom_object(&plan.crd, &plan.request.namespace, &plan.manifest)
        .await?;
    info!(
        provider = provider.id(),
        name = %plan.request.name,
        namespace = %plan.request.namespace,
        kind = plan.crd.kind,
        "Created deployment"
    );
    print(&provider.parse_status(&created), OutputFormat::Json)
}

/// Print canonical status for one or every deployment
pub async fn status(ctx: &Context, args: StatusArgs) -> Result<()> {
    let provider = ctx.engine.get_provider(&args.provider)?;
    let namespace = ctx.namespace(args.namespace.as_deref());
    let cluster = ctx.cluster().await?;

    match args.name {
        Some(name) => {
            let (_, object) = find_object(&cluster, provider, &namespace, &name)
                .await?
                .ok_or_else(|| Error::deployment_not_found(&namespace, &name))?;
            print(&provider.parse_status(&object), OutputFormat::Json)
        }
        None => {
            let statuses = list_statuses(&cluster, provider, &namespace).await?;
            print(&statuses, OutputFormat::Json)
        }
    }
}

/// Delete a deployment
pub async fn delete(ctx: &Context, args: DeleteArgs) -> Result<()> {
    let provider = ctx.engine.get_provider(&args.provider)?;
    let namespace = ctx.namespace(args.namespace.as_deref());
    let cluster = ctx.cluster().await?;

    let (_, object) = find_object(&cluster, provider, &namespace, &args.name)
        .await?
        .ok_or_else(|| Error::deployment_not_found(&namespace, &args.name))?;
    let crd = provider.crd_for_object(&object);
    cluster
        .delete_custom_object(&crd, &namespace, &args.name)
        .await?;
    info!(provider = provider.id(), name = %args.name, namespace = %namespace, "Deleted deployment");
    Ok(())
}
