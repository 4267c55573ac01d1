// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::EngineResult;

/// Trait for cluster provisioning engine operations.
///
/// This abstraction allows the provisioner to be exercised without a real
/// kind installation.
#[async_trait]
pub trait ClusterEngine: Send + Sync {
	/// Names of the clusters that currently exist.
	async fn list_clusters(&self) -> EngineResult<Vec<String>>;

	/// Create a cluster from the configuration file at `config`, blocking
	/// until its control plane is ready or `wait` elapses.
	async fn create_cluster(&self, name: &str, config: &Path, wait: Duration) -> EngineResult<()>;

	/// Kubeconfig YAML for reaching the cluster from the host.
	async fn kubeconfig(&self, name: &str) -> EngineResult<String>;

	/// Delete a cluster. Deleting a cluster that does not exist succeeds.
	async fn delete_cluster(&self, name: &str) -> EngineResult<()>;
}
