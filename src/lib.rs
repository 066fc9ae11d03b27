//! kubefoundry - provider translation and admission engine
//!
//! kubefoundry takes one deployment request and turns it into the custom
//! resource of a Kubernetes inference runtime, then reads the runtime's live
//! objects back into a single status shape.
//!
//! # Pipeline
//!
//! - Validate a raw request into a normalized [`request::DeploymentRequest`]
//! - Snapshot free GPUs per node and run an advisory fit check
//! - Compile the request for a provider (KAITO, Dynamo, KubeRay)
//! - Reduce live custom objects into a [`status::CanonicalStatus`]
//!
//! # Modules
//!
//! - [`request`] - Deployment request types
//! - [`validation`] - Cross-field request validation
//! - [`catalog`] - Curated premade model catalogs
//! - [`capacity`] - Cluster GPU capacity snapshot
//! - [`admission`] - Advisory fit check
//! - [`status`] - Phase reduction and canonical status
//! - [`provider`] - Runtime adapters and the provider registry
//! - [`cluster`] - Cluster access used by the engine
//! - [`engine`] - Facade tying the pieces together
//! - [`config`] - Configuration file
//! - [`cli`] - Command line

#![deny(missing_docs)]

pub mod admission;
pub mod capacity;
pub mod catalog;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod provider;
pub mod request;
pub mod status;
pub mod validation;

pub use engine::{DeploymentPlan, Engine};
pub use kubefoundry_common::{Error, FieldError, Result};
