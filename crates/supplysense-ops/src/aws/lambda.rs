//! AWS Lambda functions.
//!
//! Only the teardown recovery path touches Lambda: the buggy SNS-logging
//! custom resources leave functions behind that block stack deletion.

use aws_config::SdkConfig;

/// Lists every function name in the region.
pub async fn list_function_names(cfg: &SdkConfig) -> anyhow::Result<Vec<String>> {
    let client = aws_sdk_lambda::Client::new(cfg);
    let mut names = Vec::new();
    let mut marker = None;
    loop {
        let out = client.list_functions().set_marker(marker).send().await?;
        for function in out.functions() {
            if let Some(name) = function.function_name() {
                names.push(name.to_owned());
            }
        }
        marker = out.next_marker().map(str::to_owned);
        if marker.is_none() {
            break;
        }
    }
    Ok(names)
}

/// Deletes a function. Returns `false` if it did not exist.
pub async fn delete_function(cfg: &SdkConfig, name: &str) -> anyhow::Result<bool> {
    let client = aws_sdk_lambda::Client::new(cfg);
    match client.delete_function().function_name(name).send().await {
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
