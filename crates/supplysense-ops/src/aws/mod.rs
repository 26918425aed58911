//! AWS operations for SupplySense.
//!
//! One module per service. Each operation takes the shared [`SdkConfig`]
//! and constructs its client per call; outputs are mapped into small
//! local summary types so the orchestration layers never touch SDK types
//! directly. Expected-absence errors (the service telling us a resource
//! is already gone) are classified here and surfaced as values, not
//! errors.

pub use aws_config::SdkConfig;

pub mod agentcore;
pub mod bedrockagent;
pub mod cloudformation;
pub mod dynamodb;
pub mod ecr;
pub mod lambda;
pub mod sns;
pub mod ssm;
pub mod sts;

/// The region the config resolved to, for display.
pub fn region(cfg: &SdkConfig) -> String {
    cfg.region()
        .map(|r| r.to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}
