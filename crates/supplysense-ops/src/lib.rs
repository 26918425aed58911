//! # SupplySense Ops
//!
//! Operational tooling for the SupplySense deployment: a teardown
//! orchestrator for the resources CloudFormation cannot remove on its own
//! (ECR repositories with images, SNS topics with subscriptions, AgentCore
//! gateways with attached targets), a DynamoDB sample-data seeder, and a
//! full-system deployment driver.
//!
//! ## Concepts
//!
//! Every remote resource is provider-owned and referenced by name or id;
//! this tool holds no persistent local state. Teardown is best-effort and
//! strictly sequential: a failure on one resource is logged and the run
//! proceeds to the next. The one hard rule is the dependent-resource
//! invariant: a parent (gateway, repository, topic) is never deleted
//! until a fresh listing confirms its dependents (targets, images,
//! subscriptions) are gone. Confirmation comes from re-querying the
//! provider, never from a delete call's reported success.
//!
//! Deployment-specific names and patterns (stack order, repository and
//! topic prefixes, table keys, the parameter path) live in a
//! [`config::Profile`] rather than in code, so they can be overridden
//! with a JSON file when they drift.
//!
//! ## Error handling
//!
//! Library-level failures are captured in the [`Error`] enum. Individual
//! provider operations return `anyhow::Result` and are wrapped at the
//! orchestration boundary; expected-absence errors (resource not found)
//! are classified at the call site and treated as success-equivalent.

pub mod aws;
pub mod config;
pub mod console;
pub mod deploy;
pub mod process;
pub mod retry;
pub mod seed;
pub mod teardown;
#[cfg(test)]
mod test;

/// Top-level error enum that encompasses all errors.
#[derive(snafu::Snafu, Debug)]
pub enum Error {
    #[snafu(display("{source}:\n{}",
                source.chain()
                    .map(|e| format!("{e}"))
                    .collect::<Vec<_>>()
                    .join("\n -> ")))]
    Ops { source: anyhow::Error },

    #[snafu(display("Could not read profile '{}': {source}", path.display()))]
    ProfileRead {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not parse profile '{}': {source}", path.display()))]
    ProfileParse {
        path: std::path::PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("Could not read seed data '{}': {source}", path.display()))]
    DataRead {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not parse seed data '{}': {source}", path.display()))]
    DataParse {
        path: std::path::PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("Could not write '{}': {source}", path.display()))]
    WriteFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Prerequisite check failed: {name}"))]
    Prerequisite { name: String },

    #[snafu(display("Table '{table}' does not exist. Deploy infrastructure first."))]
    MissingTable { table: String },
}

impl From<anyhow::Error> for Error {
    fn from(source: anyhow::Error) -> Self {
        Error::Ops { source }
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
