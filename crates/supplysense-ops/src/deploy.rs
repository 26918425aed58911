//! The full-system deployment driver.
//!
//! Prerequisite checks, dependency installs, CDK bootstrap and deploy,
//! stack-output collection into the UI env file, sample-data seeding,
//! Bedrock agent preparation and a post-deploy health check: the same
//! sequence an operator would run by hand, with every external command
//! executed against an explicit directory.

use std::path::Path;

use anyhow::Context;
use aws_config::SdkConfig;

use crate::{
    aws::{self, bedrockagent, cloudformation, dynamodb, sts},
    config::Profile,
    console, process,
    seed::{self, SeedData, SeedOpts},
};

/// The CDK toolchain requires at least this Node.js major version.
const MIN_NODE_MAJOR: u32 = 18;

#[derive(Clone, Copy, Debug)]
pub struct DeployOpts {
    pub skip_prerequisites: bool,
    pub skip_infrastructure: bool,
    pub skip_ui: bool,
}

/// Parses the major version out of `node --version` output ("v18.17.0").
pub fn node_major_version(output: &str) -> Option<u32> {
    output
        .trim()
        .strip_prefix('v')?
        .split('.')
        .next()?
        .parse()
        .ok()
}

/// The values written to the UI's `.env.local`. Every field is populated
/// from a retrieved stack output before anything is written; the
/// identity pool is optional because older deployments do not export one.
#[derive(Clone, Debug, PartialEq)]
pub struct UiEnv {
    pub user_pool_id: String,
    pub user_pool_client_id: String,
    pub api_endpoint: String,
    pub region: String,
    pub identity_pool_id: Option<String>,
}

impl UiEnv {
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("NEXT_PUBLIC_USER_POOL_ID={}\n", self.user_pool_id));
        out.push_str(&format!(
            "NEXT_PUBLIC_USER_POOL_CLIENT_ID={}\n",
            self.user_pool_client_id
        ));
        if let Some(identity_pool_id) = &self.identity_pool_id {
            out.push_str(&format!(
                "NEXT_PUBLIC_IDENTITY_POOL_ID={identity_pool_id}\n"
            ));
        }
        out.push_str(&format!("NEXT_PUBLIC_API_ENDPOINT={}\n", self.api_endpoint));
        out.push_str(&format!("NEXT_PUBLIC_AWS_REGION={}\n", self.region));
        out
    }
}

async fn check_prerequisites(cfg: &SdkConfig, root: &Path) -> crate::Result<()> {
    console::header("Checking prerequisites");
    let mut ok = true;

    match process::capture("node", &["--version"], root).await {
        Ok(version) => match node_major_version(&version) {
            Some(major) if major >= MIN_NODE_MAJOR => {
                console::success(format!("Node.js {version}"));
            }
            Some(_) => {
                console::error(format!(
                    "Node.js {MIN_NODE_MAJOR} or higher required, found {version}"
                ));
                ok = false;
            }
            None => {
                console::error(format!("could not parse Node.js version from '{version}'"));
                ok = false;
            }
        },
        Err(err) => {
            console::error(format!("Node.js not found: {err:#}"));
            ok = false;
        }
    }

    match process::capture("npx", &["cdk", "--version"], root).await {
        Ok(version) => console::success(format!("AWS CDK {version}")),
        Err(err) => {
            console::error(format!("AWS CDK not found: {err:#}"));
            ok = false;
        }
    }

    match sts::account_id(cfg).await {
        Ok(account) => console::success(format!("AWS account {account}")),
        Err(err) => {
            console::error(format!(
                "AWS credentials not configured (run `aws configure`): {err:#}"
            ));
            ok = false;
        }
    }

    if !ok {
        return Err(crate::Error::Prerequisite {
            name: "one or more checks failed".to_owned(),
        });
    }
    console::info("prerequisites check complete");
    Ok(())
}

/// The CDK bootstrap stack must exist before any deploy.
async fn ensure_bootstrapped(cfg: &SdkConfig, root: &Path) -> crate::Result<()> {
    console::header("CDK bootstrap check");
    let status = match cloudformation::stack_status(cfg, "CDKToolkit").await {
        Ok(status) => status,
        Err(err) => {
            log::warn!("could not check the bootstrap stack: {err:#}");
            None
        }
    };
    match status.as_deref() {
        Some("CREATE_COMPLETE") | Some("UPDATE_COMPLETE") => {
            console::success("CDK already bootstrapped");
        }
        _ => {
            console::info("bootstrapping CDK");
            process::run("npx", &["cdk", "bootstrap"], root).await?;
            console::success("CDK bootstrap complete");
        }
    }
    Ok(())
}

/// Collects stack outputs and writes the UI env file. A missing required
/// output downgrades to a warning; no partial file is written.
async fn write_ui_env(cfg: &SdkConfig, profile: &Profile, ui_dir: &Path) -> crate::Result<()> {
    console::info("retrieving stack outputs");
    let chat = cloudformation::stack_outputs(cfg, &profile.chat_stack).await;
    let agent = cloudformation::stack_outputs(cfg, &profile.agent_stack).await;
    let (chat, agent) = match (chat, agent) {
        (Ok(Some(chat)), Ok(Some(agent))) => (chat, agent),
        _ => {
            console::warning(
                "could not retrieve all stack outputs; configure the UI environment manually",
            );
            return Ok(());
        }
    };

    let mut missing = Vec::new();
    let api_endpoint = chat.get(&profile.chat_url_output).cloned();
    if api_endpoint.is_none() {
        missing.push(profile.chat_url_output.clone());
    }
    let user_pool_id = agent.get(&profile.user_pool_output).cloned();
    if user_pool_id.is_none() {
        missing.push(profile.user_pool_output.clone());
    }
    let user_pool_client_id = agent.get(&profile.user_pool_client_output).cloned();
    if user_pool_client_id.is_none() {
        missing.push(profile.user_pool_client_output.clone());
    }
    if !missing.is_empty() {
        console::warning(format!(
            "stack outputs missing ({}); configure the UI environment manually",
            missing.join(", ")
        ));
        return Ok(());
    }

    let env = UiEnv {
        // UNWRAP: safe because the missing-output check above returned.
        user_pool_id: user_pool_id.unwrap(),
        user_pool_client_id: user_pool_client_id.unwrap(),
        api_endpoint: api_endpoint.unwrap(),
        region: aws::region(cfg),
        identity_pool_id: agent.get(&profile.identity_pool_output).cloned(),
    };
    console::info("stack outputs retrieved:");
    console::detail(format!("API endpoint: {}", env.api_endpoint));
    console::detail(format!("user pool id: {}", env.user_pool_id));
    console::detail(format!("user pool client id: {}", env.user_pool_client_id));
    match &env.identity_pool_id {
        Some(id) => console::detail(format!("identity pool id: {id}")),
        None => console::detail("identity pool id: (not exported)".to_owned()),
    }

    let path = ui_dir.join(".env.local");
    std::fs::write(&path, env.render()).map_err(|source| crate::Error::WriteFile {
        path: path.clone(),
        source,
    })?;
    console::success(format!("UI environment file created at {}", path.display()));
    Ok(())
}

async fn prepare_agents(cfg: &SdkConfig, profile: &Profile) {
    console::header("Preparing Bedrock agents");
    let outputs = match cloudformation::stack_outputs(cfg, &profile.agent_stack).await {
        Ok(Some(outputs)) => outputs,
        _ => {
            console::warning(
                "could not read the agent stack outputs; agents may need manual preparation",
            );
            return;
        }
    };
    for agent in &profile.agents {
        match outputs.get(&agent.output_key) {
            Some(id) if id != "None" => {
                console::info(format!("preparing {} agent ({id})", agent.name));
                match bedrockagent::prepare_agent(cfg, id).await {
                    Ok(true) => console::success(format!("{} agent prepared", agent.name)),
                    Ok(false) => console::warning(format!("{} agent not found", agent.name)),
                    Err(err) => console::warning(format!(
                        "{} agent preparation may have failed: {err:#}",
                        agent.name
                    )),
                }
            }
            _ => console::warning(format!("{} agent id not found", agent.name)),
        }
    }
}

async fn health_check(cfg: &SdkConfig, profile: &Profile) {
    console::header("System health check");

    match cloudformation::stack_outputs(cfg, &profile.chat_stack).await {
        Ok(Some(outputs)) => match outputs.get(&profile.chat_url_output) {
            Some(url) => {
                let health = format!("{}/health", url.trim_end_matches('/'));
                match reqwest::get(&health).await {
                    Ok(response) if response.status().is_success() => {
                        console::success("API health check passed");
                    }
                    Ok(response) => console::warning(format!(
                        "API health check returned {} - the service may still be starting",
                        response.status()
                    )),
                    Err(err) => console::warning(format!(
                        "API health check failed ({err}) - the service may still be starting"
                    )),
                }
            }
            None => console::warning("could not resolve the chat service URL"),
        },
        _ => console::warning("could not resolve the chat service URL"),
    }

    let seedable = profile.tables.seedable();
    let mut active = 0usize;
    for spec in &seedable {
        match dynamodb::table_active(cfg, &spec.name).await {
            Ok(true) => active += 1,
            Ok(false) => {}
            Err(err) => log::warn!("could not check table {}: {err:#}", spec.name),
        }
    }
    let line = format!("DynamoDB tables: {active}/{} active", seedable.len());
    if active == seedable.len() {
        console::success(line);
    } else {
        console::warning(line);
    }
}

/// Runs the whole deployment sequence. Unlike teardown, a failed step
/// here aborts the run; deploying onto a half-installed toolchain only
/// produces confusing CloudFormation states.
pub async fn run(
    cfg: &SdkConfig,
    profile: &Profile,
    data: &SeedData,
    opts: &DeployOpts,
) -> crate::Result<()> {
    console::header("SupplySense complete system deployment");
    console::info(format!("region: {}", aws::region(cfg)));

    // Resolve all project directories up front; commands never rely on
    // the process working directory.
    let root = std::fs::canonicalize(&profile.project_dir)
        .with_context(|| format!("project dir {} not found", profile.project_dir.display()))?;
    let orchestrator = root.join(&profile.orchestrator_dir);
    let ui = root.join(&profile.ui_dir);

    if !opts.skip_prerequisites {
        check_prerequisites(cfg, &root).await?;
    }

    console::header("Installing dependencies");
    process::run("npm", &["install"], &root).await?;
    console::success("root dependencies installed");
    process::run("npm", &["install"], &orchestrator).await?;
    console::success("orchestrator dependencies installed");
    process::run("npm", &["install"], &ui).await?;
    console::success("UI dependencies installed");

    console::header("Building the CDK app");
    process::run("npm", &["run", "build"], &root).await?;
    console::success("build complete");

    ensure_bootstrapped(cfg, &root).await?;

    if !opts.skip_infrastructure {
        console::header("Deploying infrastructure");
        process::run(
            "npx",
            &["cdk", "deploy", "--all", "--require-approval", "never"],
            &root,
        )
        .await?;
        console::success("infrastructure deployment complete");
        write_ui_env(cfg, profile, &ui).await?;
    }

    seed::run(
        cfg,
        profile,
        data,
        SeedOpts {
            force: false,
            verbose: false,
        },
    )
    .await?;

    prepare_agents(cfg, profile).await;

    if !opts.skip_ui {
        console::header("Building the UI");
        process::run("npm", &["run", "build"], &ui).await?;
        console::success("UI build complete");
    }

    health_check(cfg, profile).await;

    console::header("Deployment summary");
    console::success("infrastructure deployed");
    console::success("agents prepared");
    console::success("tables seeded with sample data");
    console::success("UI built");
    console::info("next steps:");
    console::detail("start the UI: cd ui && npm run dev");
    console::detail("open http://localhost:3000 and sign in with Cognito");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn node_versions_parse() {
        assert_eq!(Some(18), node_major_version("v18.17.0"));
        assert_eq!(Some(20), node_major_version("v20.0.0\n"));
        assert_eq!(None, node_major_version("18.17.0"), "missing v prefix");
        assert_eq!(None, node_major_version("vx.y.z"));
    }

    fn env() -> UiEnv {
        UiEnv {
            user_pool_id: "us-east-1_AbCdEf".to_owned(),
            user_pool_client_id: "client123".to_owned(),
            api_endpoint: "https://chat.example.com".to_owned(),
            region: "us-east-1".to_owned(),
            identity_pool_id: None,
        }
    }

    #[test]
    fn env_file_defines_every_value_it_writes() {
        let rendered = env().render();
        for line in rendered.lines() {
            let (key, value) = line.split_once('=').expect("every line is KEY=value");
            assert!(!key.is_empty());
            assert!(!value.is_empty(), "{key} must be populated");
        }
        assert!(
            !rendered.contains("IDENTITY_POOL"),
            "no identity-pool line when the stack exports none"
        );
        assert_eq!(4, rendered.lines().count());
    }

    #[test]
    fn env_file_includes_the_identity_pool_when_exported() {
        let rendered = UiEnv {
            identity_pool_id: Some("us-east-1:pool".to_owned()),
            ..env()
        }
        .render();
        assert!(rendered.contains("NEXT_PUBLIC_IDENTITY_POOL_ID=us-east-1:pool\n"));
        assert_eq!(5, rendered.lines().count());
    }
}
