//! Request commands: validate, compile, capacity, check-fit

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::admission::FitResult;
use crate::capacity::ClusterGpuSnapshot;
use crate::cli::{Error, Result};
use crate::request::DeploymentRequest;
use crate::validation::ValidationOutcome;

use super::{print, read_document, Context, OutputFormat};

/// A request file argument
#[derive(Args, Debug)]
pub struct FileArgs {
    /// Deployment request (YAML or JSON, `-` for stdin)
    pub path: PathBuf,
}

/// Compile arguments
#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Request file
    #[command(flatten)]
    pub file: FileArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub output: OutputFormat,
}

/// Fit check arguments
#[derive(Args, Debug)]
pub struct CheckFitArgs {
    /// Request file
    #[command(flatten)]
    pub file: FileArgs,

    /// Minimum GPUs per worker the model needs (default: catalog entry, else 1)
    #[arg(long)]
    pub model_minimum: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FitReport {
    fit: FitResult,
    snapshot: ClusterGpuSnapshot,
}

/// Validate a document, printing the outcome's errors and turning a
/// rejection into an error
pub fn validated(ctx: &Context, raw: &Value) -> Result<DeploymentRequest> {
    let outcome = ctx.engine.validate(raw);
    if outcome.valid {
        if let Some(request) = outcome.normalized {
            return Ok(request);
        }
    }
    for error in &outcome.errors {
        warn!(field = %error.field, "{}", error.message);
    }
    Err(Error::Rejected {
        count: outcome.errors.len(),
    })
}

/// Print the validation outcome; a rejected request exits non-zero
pub fn validate(ctx: &Context, args: FileArgs) -> Result<()> {
    let raw = read_document(&args.path)?;
    let outcome: ValidationOutcome = ctx.engine.validate(&raw);
    print(&outcome, OutputFormat::Json)?;
    if outcome.valid {
        Ok(())
    } else {
        Err(Error::Rejected {
            count: outcome.errors.len(),
        })
    }
}

/// Print the compiled manifest
pub fn compile(ctx: &Context, args: CompileArgs) -> Result<()> {
    let raw = read_document(&args.file.path)?;
    let request = validated(ctx, &raw)?;
    let manifest = ctx.engine.compile(&request.provider, &request)?;
    print(&manifest, args.output)
}

/// Print the cluster's GPU snapshot
pub async fn capacity(ctx: &Context) -> Result<()> {
    let cluster = ctx.cluster().await?;
    let snapshot = ctx.engine.build_snapshot(&cluster).await;
    print(&snapshot, OutputFormat::Json)
}

/// Print the fit result for a request against the live cluster
pub async fn check_fit(ctx: &Context, args: CheckFitArgs) -> Result<()> {
    let raw = read_document(&args.file.path)?;
    let request = validated(ctx, &raw)?;

    let cluster = ctx.cluster().await?;
    let snapshot = ctx.engine.build_snapshot(&cluster).await;
    let minimum = args
        .model_minimum
        .or_else(|| ctx.engine.catalog_minimum(&request));
    let fit = ctx.engine.check_fit(&request, &snapshot, minimum);
    info!(name = %request.name, fits = fit.fits, warnings = fit.warnings.len(), "Checked fit");

    print(&FitReport { fit, snapshot }, OutputFormat::Json)
}
