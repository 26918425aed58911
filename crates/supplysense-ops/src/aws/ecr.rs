//! AWS ECR repositories and images.
//!
//! A repository cannot be deleted while it still holds images, so the
//! teardown path drains images in batches first. `BatchDeleteImage`
//! accepts at most 100 identifiers per call.

use aws_config::SdkConfig;
use aws_sdk_ecr::types as aws;

/// Largest batch `BatchDeleteImage` accepts.
pub const IMAGE_BATCH: usize = 100;

/// Identifies an image by digest and/or tag; untagged images carry only
/// a digest.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageId {
    pub digest: Option<String>,
    pub tag: Option<String>,
}

impl ImageId {
    fn is_empty(&self) -> bool {
        self.digest.is_none() && self.tag.is_none()
    }
}

impl From<&ImageId> for aws::ImageIdentifier {
    fn from(value: &ImageId) -> Self {
        let mut builder = aws::ImageIdentifier::builder();
        if let Some(digest) = &value.digest {
            builder = builder.image_digest(digest);
        }
        if let Some(tag) = &value.tag {
            builder = builder.image_tag(tag);
        }
        builder.build()
    }
}

/// Lists every repository name in the region.
pub async fn list_repositories(cfg: &SdkConfig) -> anyhow::Result<Vec<String>> {
    let client = aws_sdk_ecr::Client::new(cfg);
    let mut names = Vec::new();
    let mut next = None;
    loop {
        let out = client
            .describe_repositories()
            .set_next_token(next)
            .send()
            .await?;
        for repo in out.repositories() {
            if let Some(name) = repo.repository_name() {
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

/// Returns one page of image identifiers; an absent repository reads as
/// empty.
pub async fn list_images(cfg: &SdkConfig, repository: &str) -> anyhow::Result<Vec<ImageId>> {
    let client = aws_sdk_ecr::Client::new(cfg);
    let out = match client
        .list_images()
        .repository_name(repository)
        .send()
        .await
    {
        Ok(out) => out,
        Err(err) => {
            let err = err.into_service_error();
            if err.is_repository_not_found_exception() {
                log::info!("repository {repository} is already gone");
                return Ok(Vec::new());
            }
            return Err(err.into());
        }
    };
    Ok(out
        .image_ids()
        .iter()
        .map(|id| ImageId {
            digest: id.image_digest().map(str::to_owned),
            tag: id.image_tag().map(str::to_owned),
        })
        .filter(|id| !id.is_empty())
        .collect())
}

pub async fn batch_delete_images(
    cfg: &SdkConfig,
    repository: &str,
    images: &[ImageId],
) -> anyhow::Result<()> {
    let client = aws_sdk_ecr::Client::new(cfg);
    let ids: Vec<aws::ImageIdentifier> = images.iter().map(|id| id.into()).collect();
    let _ = client
        .batch_delete_image()
        .repository_name(repository)
        .set_image_ids(Some(ids))
        .send()
        .await?;
    Ok(())
}

/// Deletes a repository. Returns `false` if it did not exist.
pub async fn delete_repository(
    cfg: &SdkConfig,
    repository: &str,
    force: bool,
) -> anyhow::Result<bool> {
    let client = aws_sdk_ecr::Client::new(cfg);
    match client
        .delete_repository()
        .repository_name(repository)
        .force(force)
        .send()
        .await
    {
        Ok(_) => Ok(true),
        Err(err) => {
            let err = err.into_service_error();
            if err.is_repository_not_found_exception() {
                Ok(false)
            } else {
                Err(err.into())
            }
        }
    }
}
