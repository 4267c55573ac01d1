// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use async_trait::async_trait;

use crate::context::BuildContext;
use crate::error::RuntimeResult;
use crate::types::{PortMapping, RegistryCredentials};

/// Operations kubicle needs from a local container engine.
///
/// Implementations must be safe to share across tasks. The production
/// implementation talks to the Docker engine API; [`crate::MockRuntime`]
/// keeps everything in memory for tests.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
	/// Pull an image, consuming the progress stream until it completes.
	async fn pull_image(&self, reference: &str) -> RuntimeResult<()>;

	/// Build an image tagged `tag` from a streamed tar context.
	///
	/// A failure reported by the context takes precedence over the engine's
	/// own error for the same build.
	async fn build_image(&self, tag: &str, context: BuildContext) -> RuntimeResult<()>;

	/// Push a local image to the registry named in `reference`.
	async fn push_image(&self, reference: &str, credentials: &RegistryCredentials)
		-> RuntimeResult<()>;

	/// Remove a local image.
	async fn delete_image(&self, reference: &str, force: bool) -> RuntimeResult<()>;

	/// Create a container and return its id.
	async fn create_container(
		&self,
		name: &str,
		image: &str,
		ports: &[PortMapping],
	) -> RuntimeResult<String>;

	async fn start_container(&self, id: &str) -> RuntimeResult<()>;

	/// Wait until the container reports healthy. A zero timeout means one minute.
	async fn wait_healthy(&self, id: &str, timeout: Duration) -> RuntimeResult<()>;

	/// Names of the networks a container is attached to.
	async fn container_networks(&self, name: &str) -> RuntimeResult<Vec<String>>;

	async fn connect_network(&self, container: &str, network: &str) -> RuntimeResult<()>;

	/// Whether a container with this name or id exists. Absence is not an error.
	async fn container_exists(&self, name: &str) -> RuntimeResult<bool>;

	/// Remove a container. Returns [`crate::RuntimeError::NotFound`] when it is absent.
	async fn remove_container(&self, id: &str, force: bool) -> RuntimeResult<()>;
}
