//! AWS CloudFormation stacks.
//!
//! Stack lifecycle is normally driven through the CDK CLI; these
//! operations exist for the recovery path (inspecting a `DELETE_FAILED`
//! stack and deleting it with some resources retained) and for reading
//! stack outputs after a deploy.

use std::collections::HashMap;

use aws_config::SdkConfig;
use aws_sdk_cloudformation::error::ProvideErrorMetadata;

/// How many of the most recent stack events are inspected when looking
/// for failed resources.
const EVENT_DEPTH: usize = 100;

/// A stack event reduced to the fields failure analysis cares about.
#[derive(Clone, Debug, PartialEq)]
pub struct StackEvent {
    pub logical_id: String,
    pub resource_type: String,
    pub resource_status: String,
}

fn is_missing_stack_message(message: Option<&str>) -> bool {
    message.is_some_and(|msg| msg.contains("does not exist"))
}

/// The stack's current status string, or `None` when the stack does not
/// exist (or is already deleted).
pub async fn stack_status(cfg: &SdkConfig, stack: &str) -> anyhow::Result<Option<String>> {
    let client = aws_sdk_cloudformation::Client::new(cfg);
    match client.describe_stacks().stack_name(stack).send().await {
        Ok(out) => Ok(out
            .stacks()
            .first()
            .and_then(|s| s.stack_status())
            .map(|st| st.as_str().to_owned())),
        Err(err) => {
            let err = err.into_service_error();
            if is_missing_stack_message(err.message()) {
                Ok(None)
            } else {
                Err(err.into())
            }
        }
    }
}

/// The most recent events for a stack, newest first, bounded to the
/// first page and [`EVENT_DEPTH`] entries.
pub async fn recent_events(cfg: &SdkConfig, stack: &str) -> anyhow::Result<Vec<StackEvent>> {
    let client = aws_sdk_cloudformation::Client::new(cfg);
    let out = match client.describe_stack_events().stack_name(stack).send().await {
        Ok(out) => out,
        Err(err) => {
            let err = err.into_service_error();
            if is_missing_stack_message(err.message()) {
                return Ok(Vec::new());
            }
            return Err(err.into());
        }
    };
    Ok(out
        .stack_events()
        .iter()
        .take(EVENT_DEPTH)
        .filter_map(|event| {
            Some(StackEvent {
                logical_id: event.logical_resource_id()?.to_owned(),
                resource_type: event.resource_type()?.to_owned(),
                resource_status: event.resource_status()?.as_str().to_owned(),
            })
        })
        .collect())
}

/// Logical ids of custom resources whose deletion failed, deduplicated
/// in event order. These are the resources that must be retained for the
/// rest of the stack to delete.
pub fn failed_custom_resources(events: &[StackEvent]) -> Vec<String> {
    let mut ids = Vec::new();
    for event in events {
        if event.resource_status == "DELETE_FAILED"
            && event.resource_type == "AWS::CloudFormation::CustomResource"
            && !ids.contains(&event.logical_id)
        {
            ids.push(event.logical_id.clone());
        }
    }
    ids
}

pub async fn delete_stack(cfg: &SdkConfig, stack: &str) -> anyhow::Result<()> {
    let client = aws_sdk_cloudformation::Client::new(cfg);
    client.delete_stack().stack_name(stack).send().await?;
    Ok(())
}

/// Deletes a stack with the given logical ids excluded from the delete
/// set. CloudFormation only accepts this form for stacks in
/// `DELETE_FAILED`.
pub async fn delete_stack_retaining(
    cfg: &SdkConfig,
    stack: &str,
    retain: &[String],
) -> anyhow::Result<()> {
    let client = aws_sdk_cloudformation::Client::new(cfg);
    client
        .delete_stack()
        .stack_name(stack)
        .set_retain_resources(Some(retain.to_vec()))
        .send()
        .await?;
    Ok(())
}

/// The stack's outputs as a key/value map, or `None` when the stack does
/// not exist.
pub async fn stack_outputs(
    cfg: &SdkConfig,
    stack: &str,
) -> anyhow::Result<Option<HashMap<String, String>>> {
    let client = aws_sdk_cloudformation::Client::new(cfg);
    match client.describe_stacks().stack_name(stack).send().await {
        Ok(out) => {
            let Some(stack) = out.stacks().first() else {
                return Ok(None);
            };
            let mut outputs = HashMap::new();
            for output in stack.outputs() {
                if let (Some(key), Some(value)) = (output.output_key(), output.output_value()) {
                    outputs.insert(key.to_owned(), value.to_owned());
                }
            }
            Ok(Some(outputs))
        }
        Err(err) => {
            let err = err.into_service_error();
            if is_missing_stack_message(err.message()) {
                Ok(None)
            } else {
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn event(logical_id: &str, resource_type: &str, status: &str) -> StackEvent {
        StackEvent {
            logical_id: logical_id.to_owned(),
            resource_type: resource_type.to_owned(),
            resource_status: status.to_owned(),
        }
    }

    #[test]
    fn failed_custom_resources_filters_and_dedupes() {
        let events = vec![
            event("ActionTopicLogging", "AWS::CloudFormation::CustomResource", "DELETE_FAILED"),
            event("ChatService", "AWS::ECS::Service", "DELETE_FAILED"),
            event("ActionTopicLogging", "AWS::CloudFormation::CustomResource", "DELETE_FAILED"),
            event("ApprovalTopicLogging", "AWS::CloudFormation::CustomResource", "DELETE_COMPLETE"),
            event("SnsLoggingResource", "AWS::CloudFormation::CustomResource", "DELETE_FAILED"),
        ];
        assert_eq!(
            vec!["ActionTopicLogging".to_owned(), "SnsLoggingResource".to_owned()],
            failed_custom_resources(&events),
            "only failed custom resources, each once"
        );
    }

    #[test]
    fn missing_stack_is_recognized_by_message() {
        assert!(is_missing_stack_message(Some(
            "Stack with id SupplySenseChatStack does not exist"
        )));
        assert!(!is_missing_stack_message(Some("Rate exceeded")));
        assert!(!is_missing_stack_message(None));
    }
}
