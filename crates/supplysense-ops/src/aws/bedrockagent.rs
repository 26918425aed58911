//! AWS Bedrock agent preparation.

use aws_config::SdkConfig;

/// Moves an agent's working draft into the prepared state so aliases can
/// route to it. Returns `false` if the agent does not exist.
pub async fn prepare_agent(cfg: &SdkConfig, agent_id: &str) -> anyhow::Result<bool> {
    let client = aws_sdk_bedrockagent::Client::new(cfg);
    match client.prepare_agent().agent_id(agent_id).send().await {
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
