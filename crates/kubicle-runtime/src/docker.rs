// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::container::{
	Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
	StartContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::{BuildImageOptions, CreateImageOptions, PushImageOptions, RemoveImageOptions};
use bollard::models::{
	ContainerInspectResponse, ContainerStateStatusEnum, EndpointSettings, HealthStatusEnum,
	HostConfig, PortBinding,
};
use bollard::network::ConnectNetworkOptions;
use bollard::Docker;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::{oneshot, OnceCell};
use tracing::{debug, instrument, trace};

use crate::client::ContainerRuntime;
use crate::context::BuildContext;
use crate::error::{
	BuildContextError, ContainerOperation, ImageOperation, RuntimeError, RuntimeResult,
};
use crate::health::{wait_until_healthy, HealthState};
use crate::types::{split_reference, PortMapping, RegistryCredentials};

/// Docker engine client.
///
/// The connection is made on first use, configured from the environment
/// (`DOCKER_HOST` and friends) with API version negotiation. The outcome,
/// success or failure, is shared by every later call.
#[derive(Default)]
pub struct DockerRuntime {
	docker: OnceCell<Result<Docker, String>>,
}

impl DockerRuntime {
	pub fn new() -> Self {
		Self::default()
	}

	/// Wrap an already connected client.
	pub fn with_client(docker: Docker) -> Self {
		Self {
			docker: OnceCell::new_with(Some(Ok(docker))),
		}
	}

	async fn client(&self) -> RuntimeResult<&Docker> {
		let connected = self
			.docker
			.get_or_init(|| async {
				let docker = Docker::connect_with_defaults().map_err(|e| e.to_string())?;
				let docker = docker.negotiate_version().await.map_err(|e| e.to_string())?;
				debug!("Docker client initialized");
				Ok(docker)
			})
			.await;

		connected.as_ref().map_err(|message| RuntimeError::Unavailable {
			message: message.clone(),
		})
	}

	async fn inspect(&self, name: &str) -> RuntimeResult<ContainerInspectResponse> {
		let docker = self.client().await?;
		docker
			.inspect_container(name, None::<InspectContainerOptions>)
			.await
			.map_err(|e| container_error(ContainerOperation::Inspect, name, e))
	}
}

fn is_not_found(err: &DockerError) -> bool {
	matches!(
		err,
		DockerError::DockerResponseServerError {
			status_code: 404,
			..
		}
	)
}

fn image_error(operation: ImageOperation, image: &str, err: impl ToString) -> RuntimeError {
	RuntimeError::Image {
		operation,
		image: image.to_string(),
		message: err.to_string(),
	}
}

/// Adapts a build context to the engine's byte-stream request body.
///
/// The body ends at the first context error, which is sent on `failed`.
fn request_body(
	context: BuildContext,
	failed: oneshot::Sender<BuildContextError>,
) -> impl Stream<Item = Bytes> + Send + 'static {
	context.scan(Some(failed), |failed, item| {
		let next = match item {
			Ok(chunk) => Some(chunk),
			Err(err) => {
				if let Some(tx) = failed.take() {
					let _ = tx.send(err);
				}
				None
			}
		};
		futures::future::ready(next)
	})
}

fn container_error(
	operation: ContainerOperation,
	container: &str,
	err: DockerError,
) -> RuntimeError {
	if is_not_found(&err) {
		return RuntimeError::NotFound {
			container: container.to_string(),
		};
	}
	RuntimeError::Container {
		operation,
		container: container.to_string(),
		message: err.to_string(),
	}
}

fn health_state(response: &ContainerInspectResponse) -> HealthState {
	let Some(state) = response.state.as_ref() else {
		return HealthState::Starting;
	};

	if let Some(status @ (ContainerStateStatusEnum::EXITED | ContainerStateStatusEnum::DEAD)) =
		state.status.as_ref()
	{
		return HealthState::Unhealthy(format!("container {status}"));
	}

	match state.health.as_ref().and_then(|h| h.status.as_ref()) {
		Some(HealthStatusEnum::HEALTHY) => HealthState::Healthy,
		Some(HealthStatusEnum::UNHEALTHY) => HealthState::Unhealthy("unhealthy".to_string()),
		Some(HealthStatusEnum::STARTING) => HealthState::Starting,
		// No health check configured: running is as ready as it gets.
		_ if state.running == Some(true) => HealthState::Healthy,
		_ => HealthState::Starting,
	}
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
	#[instrument(skip(self))]
	async fn pull_image(&self, reference: &str) -> RuntimeResult<()> {
		let docker = self.client().await?;
		let options = CreateImageOptions {
			from_image: reference,
			..Default::default()
		};

		let mut progress = docker.create_image(Some(options), None, None);
		while let Some(info) = progress.next().await {
			let info = info.map_err(|e| image_error(ImageOperation::Pull, reference, e))?;
			if let Some(error) = info.error {
				return Err(image_error(ImageOperation::Pull, reference, error));
			}
			trace!(status = ?info.status, "Pull progress");
		}
		debug!("Image pulled");
		Ok(())
	}

	#[instrument(skip(self, context))]
	async fn build_image(&self, tag: &str, context: BuildContext) -> RuntimeResult<()> {
		let docker = self.client().await?;
		let options = BuildImageOptions {
			dockerfile: "Dockerfile",
			t: tag,
			q: true,
			rm: true,
			..Default::default()
		};

		let (failed_tx, mut failed_rx) = oneshot::channel::<BuildContextError>();
		let body = request_body(context, failed_tx);

		let mut progress = docker.build_image(options, None, Some(bollard::body_stream(body)));
		let mut build_result = Ok(());
		while let Some(info) = progress.next().await {
			match info {
				Ok(info) => {
					if let Some(error) = info.error {
						build_result = Err(image_error(ImageOperation::Build, tag, error));
						break;
					}
					trace!(stream = ?info.stream, "Build progress");
				}
				Err(e) => {
					build_result = Err(image_error(ImageOperation::Build, tag, e));
					break;
				}
			}
		}
		drop(progress);

		if let Ok(err) = failed_rx.try_recv() {
			return Err(RuntimeError::BuildContext(err));
		}
		build_result?;
		debug!("Image built");
		Ok(())
	}

	#[instrument(skip(self, credentials))]
	async fn push_image(
		&self,
		reference: &str,
		credentials: &RegistryCredentials,
	) -> RuntimeResult<()> {
		let docker = self.client().await?;
		let (repository, tag) = split_reference(reference);
		let credentials = DockerCredentials {
			username: Some(credentials.username.clone()),
			password: Some(credentials.password.clone()),
			..Default::default()
		};

		let mut progress = docker.push_image(
			repository,
			Some(PushImageOptions { tag }),
			Some(credentials),
		);
		while let Some(info) = progress.next().await {
			let info = info.map_err(|e| image_error(ImageOperation::Push, reference, e))?;
			if let Some(error) = info.error {
				return Err(image_error(ImageOperation::Push, reference, error));
			}
			trace!(status = ?info.status, "Push progress");
		}
		debug!("Image pushed");
		Ok(())
	}

	#[instrument(skip(self))]
	async fn delete_image(&self, reference: &str, force: bool) -> RuntimeResult<()> {
		let docker = self.client().await?;
		let options = RemoveImageOptions {
			force,
			..Default::default()
		};
		docker
			.remove_image(reference, Some(options), None)
			.await
			.map_err(|e| image_error(ImageOperation::Delete, reference, e))?;
		Ok(())
	}

	#[instrument(skip(self, ports))]
	async fn create_container(
		&self,
		name: &str,
		image: &str,
		ports: &[PortMapping],
	) -> RuntimeResult<String> {
		let docker = self.client().await?;

		let mut exposed_ports = HashMap::new();
		let mut port_bindings = HashMap::new();
		for port in ports {
			exposed_ports.insert(port.container_key(), HashMap::new());
			port_bindings.insert(
				port.container_key(),
				Some(vec![PortBinding {
					host_ip: None,
					host_port: Some(port.host_port.to_string()),
				}]),
			);
		}

		let config = Config {
			image: Some(image.to_string()),
			exposed_ports: Some(exposed_ports),
			host_config: Some(HostConfig {
				port_bindings: Some(port_bindings),
				..Default::default()
			}),
			..Default::default()
		};
		let options = CreateContainerOptions {
			name,
			platform: None,
		};

		let response = docker
			.create_container(Some(options), config)
			.await
			.map_err(|e| RuntimeError::Container {
				operation: ContainerOperation::Create,
				container: name.to_string(),
				message: e.to_string(),
			})?;
		for warning in &response.warnings {
			debug!(warning = %warning, "Container create warning");
		}
		Ok(response.id)
	}

	#[instrument(skip(self))]
	async fn start_container(&self, id: &str) -> RuntimeResult<()> {
		let docker = self.client().await?;
		docker
			.start_container(id, None::<StartContainerOptions<String>>)
			.await
			.map_err(|e| container_error(ContainerOperation::Start, id, e))
	}

	#[instrument(skip(self))]
	async fn wait_healthy(&self, id: &str, timeout: Duration) -> RuntimeResult<()> {
		wait_until_healthy(id, timeout, move || async move {
			let response = self.inspect(id).await?;
			Ok(health_state(&response))
		})
		.await
	}

	#[instrument(skip(self))]
	async fn container_networks(&self, name: &str) -> RuntimeResult<Vec<String>> {
		let response = self.inspect(name).await?;
		let networks = response
			.network_settings
			.and_then(|settings| settings.networks)
			.map(|networks| networks.into_keys().collect())
			.unwrap_or_default();
		Ok(networks)
	}

	#[instrument(skip(self))]
	async fn connect_network(&self, container: &str, network: &str) -> RuntimeResult<()> {
		let docker = self.client().await?;
		let options = ConnectNetworkOptions {
			container,
			endpoint_config: EndpointSettings::default(),
		};
		docker
			.connect_network(network, options)
			.await
			.map_err(|e| container_error(ContainerOperation::Connect, container, e))
	}

	#[instrument(skip(self))]
	async fn container_exists(&self, name: &str) -> RuntimeResult<bool> {
		match self.inspect(name).await {
			Ok(_) => Ok(true),
			Err(RuntimeError::NotFound { .. }) => Ok(false),
			Err(e) => Err(e),
		}
	}

	#[instrument(skip(self))]
	async fn remove_container(&self, id: &str, force: bool) -> RuntimeResult<()> {
		let docker = self.client().await?;
		let options = RemoveContainerOptions {
			force,
			..Default::default()
		};
		docker
			.remove_container(id, Some(options))
			.await
			.map_err(|e| container_error(ContainerOperation::Remove, id, e))
	}
}
