//! AWS ECS cluster client.

use std::collections::BTreeSet;

use async_trait::async_trait;
use aws_sdk_ecs::error::DisplayErrorContext;
use aws_sdk_ecs::types::DesiredStatus;
use aws_sdk_ecs::Client;
use tracing::{debug, info};

use crate::interfaces::cluster::{ClusterClient, ClusterError, Result};

/// `DescribeTasks` accepts at most this many task ARNs per call.
const DESCRIBE_TASKS_BATCH: usize = 100;

fn request_error<E>(err: E) -> ClusterError
where
    E: std::error::Error,
{
    ClusterError::Request(DisplayErrorContext(err).to_string())
}

/// Lists container images of every running task in every cluster.
pub struct EcsClusterClient {
    client: Client,
}

impl EcsClusterClient {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    async fn clusters(&self) -> Result<Vec<String>> {
        let mut pages = self.client.list_clusters().into_paginator().items().send();
        let mut clusters = Vec::new();
        while let Some(arn) = pages.next().await {
            clusters.push(arn.map_err(request_error)?);
        }
        Ok(clusters)
    }

    async fn running_tasks(&self, cluster: &str) -> Result<Vec<String>> {
        let mut pages = self
            .client
            .list_tasks()
            .cluster(cluster)
            .desired_status(DesiredStatus::Running)
            .into_paginator()
            .items()
            .send();
        let mut tasks = Vec::new();
        while let Some(arn) = pages.next().await {
            tasks.push(arn.map_err(request_error)?);
        }
        Ok(tasks)
    }

    /// Task definition ARNs used by `tasks`, without repeats.
    async fn task_definitions(&self, cluster: &str, tasks: &[String]) -> Result<BTreeSet<String>> {
        let mut definitions = BTreeSet::new();
        for batch in tasks.chunks(DESCRIBE_TASKS_BATCH) {
            let response = self
                .client
                .describe_tasks()
                .cluster(cluster)
                .set_tasks(Some(batch.to_vec()))
                .send()
                .await
                .map_err(request_error)?;
            definitions.extend(
                response
                    .tasks()
                    .iter()
                    .filter_map(|task| task.task_definition_arn().map(str::to_string)),
            );
        }
        Ok(definitions)
    }

    async fn container_images(&self, task_definition: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .describe_task_definition()
            .task_definition(task_definition)
            .send()
            .await
            .map_err(request_error)?;

        Ok(response
            .task_definition()
            .map(|definition| {
                definition
                    .container_definitions()
                    .iter()
                    .filter_map(|container| container.image().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl ClusterClient for EcsClusterClient {
    async fn running_images(&self) -> Result<Vec<String>> {
        let clusters = self.clusters().await?;
        if clusters.is_empty() {
            return Err(ClusterError::NoClusters);
        }
        info!(clusters = clusters.len(), "Listed clusters");

        let mut images = Vec::new();
        for cluster in &clusters {
            let tasks = self.running_tasks(cluster).await?;
            debug!(cluster = %cluster, tasks = tasks.len(), "Listed running tasks");
            if tasks.is_empty() {
                continue;
            }

            for definition in self.task_definitions(cluster, &tasks).await? {
                let found = self.container_images(&definition).await?;
                debug!(task_definition = %definition, images = ?found, "Described task definition");
                images.extend(found);
            }
        }

        Ok(images)
    }
}
