//! AWS STS, used to verify credentials before deploying.

use anyhow::Context;
use aws_config::SdkConfig;

/// The account id of the configured credentials.
pub async fn account_id(cfg: &SdkConfig) -> anyhow::Result<String> {
    let client = aws_sdk_sts::Client::new(cfg);
    let out = client.get_caller_identity().send().await?;
    Ok(out
        .account()
        .context("caller identity is missing an account id")?
        .to_owned())
}
