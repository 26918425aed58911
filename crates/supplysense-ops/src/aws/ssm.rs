//! AWS SSM parameters.

use aws_config::SdkConfig;

/// Lists every parameter name under a path prefix, recursively.
pub async fn parameters_by_path(cfg: &SdkConfig, path: &str) -> anyhow::Result<Vec<String>> {
    let client = aws_sdk_ssm::Client::new(cfg);
    let mut names = Vec::new();
    let mut next = None;
    loop {
        let out = client
            .get_parameters_by_path()
            .path(path)
            .recursive(true)
            .set_next_token(next)
            .send()
            .await?;
        for parameter in out.parameters() {
            if let Some(name) = parameter.name() {
                names.push(name.to_owned());
            }
        }
        next = out.next_token().map(str::to_owned);
        if next.is_none() {
            break;
        }
    }
    Ok(names)
}

/// Deletes a parameter. Returns `false` if it did not exist.
pub async fn delete_parameter(cfg: &SdkConfig, name: &str) -> anyhow::Result<bool> {
    let client = aws_sdk_ssm::Client::new(cfg);
    match client.delete_parameter().name(name).send().await {
        Ok(_) => Ok(true),
        Err(err) => {
            let err = err.into_service_error();
            if err.is_parameter_not_found() {
                Ok(false)
            } else {
                Err(err.into())
            }
        }
    }
}
