//! AWS SNS topics and subscriptions.

use aws_config::SdkConfig;

/// Lists every topic ARN in the region.
pub async fn list_topics(cfg: &SdkConfig) -> anyhow::Result<Vec<String>> {
    let client = aws_sdk_sns::Client::new(cfg);
    let mut arns = Vec::new();
    let mut next = None;
    loop {
        let out = client.list_topics().set_next_token(next).send().await?;
        for topic in out.topics() {
            if let Some(arn) = topic.topic_arn() {
                arns.push(arn.to_owned());
            }
        }
        next = out.next_token().map(str::to_owned);
        if next.is_none() {
            break;
        }
    }
    Ok(arns)
}

/// Lists confirmed subscription ARNs for a topic. Pending subscriptions
/// have no real ARN and cannot be unsubscribed, so they are filtered out.
pub async fn list_subscriptions(cfg: &SdkConfig, topic_arn: &str) -> anyhow::Result<Vec<String>> {
    let client = aws_sdk_sns::Client::new(cfg);
    let mut arns = Vec::new();
    let mut next = None;
    loop {
        let out = client
            .list_subscriptions_by_topic()
            .topic_arn(topic_arn)
            .set_next_token(next)
            .send()
            .await?;
        for sub in out.subscriptions() {
            if let Some(arn) = sub.subscription_arn() {
                if !arn.contains("PendingConfirmation") {
                    arns.push(arn.to_owned());
                }
            }
        }
        next = out.next_token().map(str::to_owned);
        if next.is_none() {
            break;
        }
    }
    Ok(arns)
}

pub async fn unsubscribe(cfg: &SdkConfig, subscription_arn: &str) -> anyhow::Result<()> {
    let client = aws_sdk_sns::Client::new(cfg);
    client
        .unsubscribe()
        .subscription_arn(subscription_arn)
        .send()
        .await?;
    Ok(())
}

/// Deletes a topic. Returns `false` if it did not exist.
pub async fn delete_topic(cfg: &SdkConfig, topic_arn: &str) -> anyhow::Result<bool> {
    let client = aws_sdk_sns::Client::new(cfg);
    match client.delete_topic().topic_arn(topic_arn).send().await {
        Ok(_) => Ok(true),
        Err(err) => {
            let err = err.into_service_error();
            if err.is_not_found_exception() {
                Ok(false)
            } else {
                Err(err.into())
            }
        }
    }
}
