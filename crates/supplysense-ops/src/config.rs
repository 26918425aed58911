//! Deployment profile.
//!
//! Names, prefixes and key schemas are deployment-specific and drift over
//! time, so they are configuration rather than code. The [`Profile`]
//! defaults describe the stock SupplySense deployment; any field can be
//! overridden by pointing `--profile` at a JSON file.

use snafu::ResultExt;

use crate::{ProfileParseSnafu, ProfileReadSnafu};

/// A DynamoDB table and the key attributes that identify an item in it.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub partition_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<String>,
}

impl TableSpec {
    pub fn new(name: &str, partition_key: &str) -> Self {
        TableSpec {
            name: name.to_owned(),
            partition_key: partition_key.to_owned(),
            sort_key: None,
        }
    }

    pub fn with_sort_key(name: &str, partition_key: &str, sort_key: &str) -> Self {
        TableSpec {
            name: name.to_owned(),
            partition_key: partition_key.to_owned(),
            sort_key: Some(sort_key.to_owned()),
        }
    }
}

/// The full set of SupplySense tables.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tables {
    pub inventory: TableSpec,
    pub orders: TableSpec,
    pub suppliers: TableSpec,
    pub logistics: TableSpec,
    pub demand_forecast: TableSpec,
    pub actions: TableSpec,
    pub approvals: TableSpec,
    pub chat_sessions: TableSpec,
}

impl Tables {
    /// Every table, in teardown order.
    pub fn all(&self) -> Vec<&TableSpec> {
        vec![
            &self.inventory,
            &self.orders,
            &self.suppliers,
            &self.logistics,
            &self.demand_forecast,
            &self.actions,
            &self.approvals,
            &self.chat_sessions,
        ]
    }

    /// The tables that receive sample data.
    pub fn seedable(&self) -> Vec<&TableSpec> {
        vec![
            &self.inventory,
            &self.orders,
            &self.suppliers,
            &self.logistics,
            &self.demand_forecast,
        ]
    }
}

impl Default for Tables {
    fn default() -> Self {
        Tables {
            inventory: TableSpec::with_sort_key("supplysense-inventory", "productId", "locationId"),
            orders: TableSpec::new("supplysense-orders", "orderId"),
            suppliers: TableSpec::new("supplysense-suppliers", "supplierId"),
            logistics: TableSpec::new("supplysense-logistics", "shipmentId"),
            demand_forecast: TableSpec::with_sort_key(
                "supplysense-demand-forecast",
                "productId",
                "forecastDate",
            ),
            actions: TableSpec::with_sort_key("supplysense-actions", "PK", "SK"),
            approvals: TableSpec::with_sort_key("supplysense-approvals", "PK", "SK"),
            chat_sessions: TableSpec::new("chat-sessions", "sessionId"),
        }
    }
}

/// An agent whose id is exported by the agent stack.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AgentOutput {
    /// Display name, e.g. "Inventory".
    pub name: String,
    /// The stack output key holding the agent id, e.g. "InventoryAgentId".
    pub output_key: String,
}

impl AgentOutput {
    fn new(name: &str, output_key: &str) -> Self {
        AgentOutput {
            name: name.to_owned(),
            output_key: output_key.to_owned(),
        }
    }
}

/// Everything deployment-specific: which stacks exist and in what order
/// they delete, which name patterns identify SupplySense resources, and
/// where the companion projects live on disk.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Profile {
    /// Stacks in deletion order. Later stacks own resources earlier ones
    /// depend on, so the order matters to CloudFormation.
    pub stacks: Vec<String>,
    /// The stack whose deletion is known to fail on a buggy custom
    /// resource, triggering the recovery path.
    pub broken_stack: String,
    /// The stack exporting the chat service URL.
    pub chat_stack: String,
    /// The stack exporting Cognito and agent ids.
    pub agent_stack: String,
    /// ECR repositories whose names contain any of these are ours.
    pub repository_prefixes: Vec<String>,
    /// SNS topics whose ARNs contain any of these are ours.
    pub topic_prefixes: Vec<String>,
    /// AgentCore gateways and runtimes whose names contain this are ours.
    pub resource_marker: String,
    /// SSM parameter path prefix, deleted recursively.
    pub parameter_path: String,
    /// A repository CloudFormation reliably fails to delete; purged
    /// directly during stack recovery.
    pub orphaned_repository: Option<String>,
    /// Name fragments identifying the buggy logging custom-resource
    /// Lambda functions.
    pub logging_function_markers: Vec<String>,
    pub tables: Tables,
    /// CDK project root (contains the CDK app and package.json).
    pub project_dir: std::path::PathBuf,
    /// Orchestrator sub-project, installed during deploy.
    pub orchestrator_dir: std::path::PathBuf,
    /// UI sub-project; receives the generated env file.
    pub ui_dir: std::path::PathBuf,
    /// Output key on the chat stack holding the service URL.
    pub chat_url_output: String,
    /// Output keys on the agent stack for the UI env file.
    pub user_pool_output: String,
    pub user_pool_client_output: String,
    /// Optional; older deployments do not export an identity pool.
    pub identity_pool_output: String,
    /// Agents prepared after deployment.
    pub agents: Vec<AgentOutput>,
}

impl Default for Profile {
    fn default() -> Self {
        Profile {
            stacks: vec![
                "SupplySenseChatStack".to_owned(),
                "SupplySenseAgentCoreStack".to_owned(),
                "SupplySenseTablesStack".to_owned(),
            ],
            broken_stack: "SupplySenseChatStack".to_owned(),
            chat_stack: "SupplySenseChatStack".to_owned(),
            agent_stack: "SupplySenseAgentCoreStack".to_owned(),
            repository_prefixes: vec![
                "supplysense-chat-orchestration".to_owned(),
                "supplysense-inventory".to_owned(),
                "supplysense-demand".to_owned(),
                "supplysense-logistics".to_owned(),
                "supplysense-risk".to_owned(),
                "supplysense-orchestrator".to_owned(),
            ],
            topic_prefixes: vec![
                "supplysense-action-events".to_owned(),
                "supplysense-approval-events".to_owned(),
            ],
            resource_marker: "SupplySense".to_owned(),
            parameter_path: "/supplysense/agents".to_owned(),
            orphaned_repository: None,
            logging_function_markers: vec![
                "SNSLogging".to_owned(),
                "ActionTopicLogging".to_owned(),
                "ApprovalTopicLogging".to_owned(),
            ],
            tables: Tables::default(),
            project_dir: ".".into(),
            orchestrator_dir: "orchestrator".into(),
            ui_dir: "ui".into(),
            chat_url_output: "ChatServiceUrl".to_owned(),
            user_pool_output: "CognitoUserPoolId".to_owned(),
            user_pool_client_output: "CognitoUserPoolClientId".to_owned(),
            identity_pool_output: "CognitoIdentityPoolId".to_owned(),
            agents: vec![
                AgentOutput::new("Inventory", "InventoryAgentId"),
                AgentOutput::new("Demand", "DemandAgentId"),
                AgentOutput::new("Orchestrator", "OrchestratorAgentId"),
                AgentOutput::new("Logistics", "LogisticsAgentId"),
                AgentOutput::new("Risk", "RiskAgentId"),
            ],
        }
    }
}

impl Profile {
    /// Reads a profile from a JSON file. Fields absent from the file keep
    /// their defaults.
    pub fn load(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        log::debug!("loading profile from {}", path.display());
        let contents = std::fs::read_to_string(path).context(ProfileReadSnafu { path })?;
        serde_json::from_str(&contents).context(ProfileParseSnafu { path })
    }

    /// Returns `true` when `name` matches any of the given patterns.
    pub fn matches_any(name: &str, patterns: &[String]) -> bool {
        patterns.iter().any(|p| name.contains(p.as_str()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_profile_names_the_stock_deployment() {
        let profile = Profile::default();
        assert_eq!(3, profile.stacks.len());
        assert_eq!("SupplySenseChatStack", profile.broken_stack);
        assert_eq!(8, profile.tables.all().len());
        assert_eq!(5, profile.tables.seedable().len());
        assert!(profile.parameter_path.starts_with('/'));
    }

    #[test]
    fn partial_profile_overrides_keep_defaults() {
        let profile: Profile = serde_json::from_str(
            r#"{
                "resource_marker": "Acme",
                "orphaned_repository": "acme-chat-orchestration-123-us-east-1"
            }"#,
        )
        .unwrap();
        assert_eq!("Acme", profile.resource_marker);
        assert_eq!(
            Some("acme-chat-orchestration-123-us-east-1".to_owned()),
            profile.orphaned_repository
        );
        // Untouched fields fall back to the stock deployment.
        assert_eq!(Profile::default().stacks, profile.stacks);
        assert_eq!(Profile::default().tables, profile.tables);
    }

    #[test]
    fn pattern_matching_is_substring_based() {
        let prefixes = vec!["supplysense-risk".to_owned()];
        assert!(Profile::matches_any(
            "supplysense-risk-905418470400-us-east-1",
            &prefixes
        ));
        assert!(!Profile::matches_any("unrelated-repo", &prefixes));
    }
}
