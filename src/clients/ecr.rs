//! AWS ECR registry client.

use async_trait::async_trait;
use aws_sdk_ecr::error::DisplayErrorContext;
use aws_sdk_ecr::Client;
use tracing::debug;

use crate::interfaces::registry::{RegistryClient, RegistryError, Result};
use crate::model::ImageTags;

/// Reads image tags with `DescribeImages`, one [`ImageTags`] per image.
pub struct EcrRegistryClient {
    client: Client,
    registry_id: Option<String>,
}

impl EcrRegistryClient {
    pub fn new(config: &aws_config::SdkConfig, registry_id: Option<String>) -> Self {
        Self {
            client: Client::new(config),
            registry_id,
        }
    }
}

#[async_trait]
impl RegistryClient for EcrRegistryClient {
    async fn list_tags(&self, service: &str) -> Result<Vec<ImageTags>> {
        let mut pages = self
            .client
            .describe_images()
            .repository_name(service)
            .set_registry_id(self.registry_id.clone())
            .into_paginator()
            .items()
            .send();

        let mut images = Vec::new();
        while let Some(detail) = pages.next().await {
            let detail = detail.map_err(|err| {
                let not_found = err
                    .as_service_error()
                    .is_some_and(|e| e.is_repository_not_found_exception());
                if not_found {
                    RegistryError::RepositoryNotFound(service.to_string())
                } else {
                    RegistryError::Request {
                        service: service.to_string(),
                        message: DisplayErrorContext(&err).to_string(),
                    }
                }
            })?;
            images.push(ImageTags::new(detail.image_tags().iter().cloned()));
        }

        debug!(service = %service, images = images.len(), "Listed registry images");
        Ok(images)
    }
}
