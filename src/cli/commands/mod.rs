//! CLI commands

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use kubefoundry_common::kube_utils::create_client;

use crate::cluster::KubeClusterQuery;
use crate::config::FoundryConfig;
use crate::engine::Engine;
use crate::provider::ProviderRegistry;

use super::{Error, Result};

pub mod deploy;
pub mod inspect;
pub mod install;
pub mod request;

/// Path meaning "read from stdin"
pub const STDIN_PATH: &str = "-";

/// Output format for documents
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON (default)
    #[default]
    Json,
    /// YAML
    Yaml,
}

/// Loaded config plus the engine built from it
pub struct Context {
    /// Effective configuration
    pub config: FoundryConfig,
    /// Engine over the built-in providers
    pub engine: Engine,
    kubeconfig: Option<PathBuf>,
}

impl Context {
    /// Load config and build the engine
    pub fn load(config_path: Option<&Path>, kubeconfig: Option<&Path>) -> Result<Self> {
        let config = FoundryConfig::load(config_path)?;
        let kubeconfig = config.resolve_kubeconfig(kubeconfig);
        let engine = Engine::new(ProviderRegistry::builtin(&config.registry_options()?));
        Ok(Self::new(config, engine, kubeconfig))
    }

    /// Context over an existing config and engine
    pub fn new(config: FoundryConfig, engine: Engine, kubeconfig: Option<PathBuf>) -> Self {
        Self {
            config,
            engine,
            kubeconfig,
        }
    }

    /// Namespace from a flag, falling back to the configured default
    pub fn namespace(&self, explicit: Option<&str>) -> String {
        explicit
            .map(str::to_string)
            .unwrap_or_else(|| self.config.default_namespace.clone())
    }

    /// Connect to the cluster with the configured retry policy
    pub async fn cluster(&self) -> Result<KubeClusterQuery> {
        debug!(kubeconfig = ?self.kubeconfig, "Connecting to cluster");
        let client = create_client(self.kubeconfig.as_deref()).await?;
        Ok(KubeClusterQuery::new(client).with_retry(self.config.retry.to_retry_config()))
    }
}

/// Parse a YAML or JSON document into a JSON value
pub fn parse_document(path: &Path, data: &str) -> Result<Value> {
    serde_yaml::from_str(data).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a request document from a file, or stdin for `-`
pub fn read_document(path: &Path) -> Result<Value> {
    let data = if path == Path::new(STDIN_PATH) {
        let mut data = String::new();
        std::io::stdin()
            .read_to_string(&mut data)
            .map_err(|e| Error::read(path, e))?;
        data
    } else {
        std::fs::read_to_string(path).map_err(|e| Error::read(path, e))?
    };
    parse_document(path, &data)
}

/// Render a value in the requested format
pub fn render<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    })
}

/// Print a value to stdout
pub fn print<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    println!("{}", render(value, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn yaml_and_json_documents_parse_alike() {
        let path = Path::new("request.yaml");
        let yaml = parse_document(
            path,
            "name: demo\nprovider: kaito\nresources:\n  gpu: 1\n",
        )
        .unwrap();
        let json = parse_document(
            path,
            r#"{"name": "demo", "provider": "kaito", "resources": {"gpu": 1}}"#,
        )
        .unwrap();
        assert_eq!(yaml, json);
        assert_eq!(yaml["resources"]["gpu"], 1);
    }

    #[test]
    fn parse_error_names_the_file() {
        let err = parse_document(Path::new("broken.yaml"), "name: [demo").unwrap_err();
        assert!(err.to_string().contains("broken.yaml"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = read_document(Path::new("/nonexistent/request.yaml")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }

    #[test]
    fn render_formats() {
        let value = json!({"kind": "Workspace"});
        assert!(render(&value, OutputFormat::Json).unwrap().contains("\"kind\": \"Workspace\""));
        assert_eq!(render(&value, OutputFormat::Yaml).unwrap(), "kind: Workspace\n");
    }

    #[test]
    fn namespace_falls_back_to_config() {
        let ctx = Context::new(FoundryConfig::default(), Engine::default(), None);
        assert_eq!(ctx.namespace(None), "default");
        assert_eq!(ctx.namespace(Some("models")), "models");
    }
}
