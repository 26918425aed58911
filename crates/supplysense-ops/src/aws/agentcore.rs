//! AWS Bedrock AgentCore gateways, gateway targets and runtimes.
//!
//! Gateways refuse deletion while targets are still attached, and the
//! control plane is eventually consistent about target removal, so the
//! teardown path re-lists targets until they are confirmed gone.

use aws_config::SdkConfig;
use aws_sdk_bedrockagentcorecontrol::error::ProvideErrorMetadata;

#[derive(Clone, Debug, PartialEq)]
pub struct Gateway {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Runtime {
    pub id: String,
    pub name: String,
}

/// What happened to a gateway delete call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GatewayDeletion {
    Deleted,
    /// The service rejected the delete because targets are still
    /// attached, the known signature for an incomplete drain.
    TargetsRemain,
    Missing,
}

pub async fn list_gateways(cfg: &SdkConfig) -> anyhow::Result<Vec<Gateway>> {
    let client = aws_sdk_bedrockagentcorecontrol::Client::new(cfg);
    let mut gateways = Vec::new();
    let mut next = None;
    loop {
        let out = client.list_gateways().set_next_token(next).send().await?;
        for summary in out.items() {
            gateways.push(Gateway {
                id: summary.gateway_id().to_owned(),
                name: summary.name().to_owned(),
            });
        }
        next = out.next_token().map(str::to_owned);
        if next.is_none() {
            break;
        }
    }
    Ok(gateways)
}

/// Lists target ids attached to a gateway.
pub async fn list_gateway_targets(
    cfg: &SdkConfig,
    gateway_id: &str,
) -> anyhow::Result<Vec<String>> {
    let client = aws_sdk_bedrockagentcorecontrol::Client::new(cfg);
    let mut targets = Vec::new();
    let mut next = None;
    loop {
        let out = client
            .list_gateway_targets()
            .gateway_identifier(gateway_id)
            .set_next_token(next)
            .send()
            .await?;
        for summary in out.items() {
            targets.push(summary.target_id().to_owned());
        }
        next = out.next_token().map(str::to_owned);
        if next.is_none() {
            break;
        }
    }
    Ok(targets)
}

pub async fn delete_gateway_target(
    cfg: &SdkConfig,
    gateway_id: &str,
    target_id: &str,
) -> anyhow::Result<()> {
    let client = aws_sdk_bedrockagentcorecontrol::Client::new(cfg);
    client
        .delete_gateway_target()
        .gateway_identifier(gateway_id)
        .target_id(target_id)
        .send()
        .await?;
    Ok(())
}

pub async fn delete_gateway(cfg: &SdkConfig, gateway_id: &str) -> anyhow::Result<GatewayDeletion> {
    let client = aws_sdk_bedrockagentcorecontrol::Client::new(cfg);
    match client
        .delete_gateway()
        .gateway_identifier(gateway_id)
        .send()
        .await
    {
        Ok(_) => Ok(GatewayDeletion::Deleted),
        Err(err) => {
            let err = err.into_service_error();
            if err.is_resource_not_found_exception() {
                return Ok(GatewayDeletion::Missing);
            }
            if err
                .message()
                .is_some_and(|msg| msg.contains("target"))
            {
                return Ok(GatewayDeletion::TargetsRemain);
            }
            Err(err.into())
        }
    }
}

pub async fn list_runtimes(cfg: &SdkConfig) -> anyhow::Result<Vec<Runtime>> {
    let client = aws_sdk_bedrockagentcorecontrol::Client::new(cfg);
    let mut runtimes = Vec::new();
    let mut next = None;
    loop {
        let out = client
            .list_agent_runtimes()
            .set_next_token(next)
            .send()
            .await?;
        for summary in out.agent_runtimes() {
            runtimes.push(Runtime {
                id: summary.agent_runtime_id().to_owned(),
                name: summary.agent_runtime_name().to_owned(),
            });
        }
        next = out.next_token().map(str::to_owned);
        if next.is_none() {
            break;
        }
    }
    Ok(runtimes)
}

/// Deletes an agent runtime. Returns `false` if it did not exist.
pub async fn delete_runtime(cfg: &SdkConfig, runtime_id: &str) -> anyhow::Result<bool> {
    let client = aws_sdk_bedrockagentcorecontrol::Client::new(cfg);
    match client
        .delete_agent_runtime()
        .agent_runtime_id(runtime_id)
        .send()
        .await
    {
        Ok(_) => Ok(true),
        Err(err) => {
            let err = err.into_service_error();
            if err.is_resource_not_found_exception() {
                Ok(false)
            } else {
                Err(err.into())
            }
        }
    }
}
