// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::client::ContainerRuntime;
use crate::context::BuildContext;
use crate::error::{ContainerOperation, ImageOperation, RuntimeError, RuntimeResult};
use crate::types::{PortMapping, RegistryCredentials};

/// Recorded call to the mock runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockCall {
	PullImage(String),
	BuildImage { tag: String, files: Vec<String> },
	PushImage(String),
	DeleteImage(String),
	CreateContainer { name: String, image: String, ports: Vec<PortMapping> },
	StartContainer(String),
	WaitHealthy(String),
	ContainerNetworks(String),
	ConnectNetwork { container: String, network: String },
	ContainerExists(String),
	RemoveContainer(String),
}

/// A container known to the mock runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockContainer {
	pub id: String,
	pub name: String,
	pub image: String,
	pub networks: Vec<String>,
	pub running: bool,
}

#[derive(Default)]
struct MockState {
	images: BTreeSet<String>,
	pushed: BTreeSet<String>,
	containers: BTreeMap<String, MockContainer>,
}

impl MockState {
	fn find(&self, name_or_id: &str) -> Option<&MockContainer> {
		self.containers
			.values()
			.find(|c| c.name == name_or_id || c.id == name_or_id)
	}

	fn find_mut(&mut self, name_or_id: &str) -> Option<&mut MockContainer> {
		self.containers
			.values_mut()
			.find(|c| c.name == name_or_id || c.id == name_or_id)
	}
}

/// In-memory container runtime for tests.
///
/// Images, containers and network attachments are tracked in shared state,
/// so clones observe each other's effects.
#[derive(Clone, Default)]
pub struct MockRuntime {
	/// If set, every call fails with [`RuntimeError::Unavailable`].
	pub unavailable: Option<String>,
	pub pull_error: Option<String>,
	pub build_error: Option<String>,
	pub push_error: Option<String>,
	pub delete_image_error: Option<String>,
	pub create_error: Option<String>,
	pub start_error: Option<String>,
	pub connect_error: Option<String>,
	pub remove_error: Option<String>,
	state: Arc<Mutex<MockState>>,
	/// Track calls for verification.
	pub calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockRuntime {
	pub fn new() -> Self {
		Self::default()
	}

	/// Seed a running container attached to `networks`, such as a cluster node.
	pub fn with_container(self, name: &str, networks: &[&str]) -> Self {
		self.state.lock().unwrap().containers.insert(
			name.to_string(),
			MockContainer {
				id: format!("mock-{name}"),
				name: name.to_string(),
				image: "kindest/node".to_string(),
				networks: networks.iter().map(|n| n.to_string()).collect(),
				running: true,
			},
		);
		self
	}

	pub fn with_image(self, reference: &str) -> Self {
		self.state
			.lock()
			.unwrap()
			.images
			.insert(reference.to_string());
		self
	}

	pub fn unavailable(mut self, message: impl Into<String>) -> Self {
		self.unavailable = Some(message.into());
		self
	}

	pub fn with_pull_error(mut self, error: impl Into<String>) -> Self {
		self.pull_error = Some(error.into());
		self
	}

	pub fn with_build_error(mut self, error: impl Into<String>) -> Self {
		self.build_error = Some(error.into());
		self
	}

	pub fn with_push_error(mut self, error: impl Into<String>) -> Self {
		self.push_error = Some(error.into());
		self
	}

	pub fn with_delete_image_error(mut self, error: impl Into<String>) -> Self {
		self.delete_image_error = Some(error.into());
		self
	}

	pub fn with_create_error(mut self, error: impl Into<String>) -> Self {
		self.create_error = Some(error.into());
		self
	}

	pub fn with_start_error(mut self, error: impl Into<String>) -> Self {
		self.start_error = Some(error.into());
		self
	}

	pub fn with_connect_error(mut self, error: impl Into<String>) -> Self {
		self.connect_error = Some(error.into());
		self
	}

	pub fn with_remove_error(mut self, error: impl Into<String>) -> Self {
		self.remove_error = Some(error.into());
		self
	}

	/// Returns the recorded calls.
	pub fn get_calls(&self) -> Vec<MockCall> {
		self.calls.lock().unwrap().clone()
	}

	/// Clears recorded calls.
	pub fn clear_calls(&self) {
		self.calls.lock().unwrap().clear();
	}

	pub fn container(&self, name_or_id: &str) -> Option<MockContainer> {
		self.state.lock().unwrap().find(name_or_id).cloned()
	}

	pub fn has_image(&self, reference: &str) -> bool {
		self.state.lock().unwrap().images.contains(reference)
	}

	/// Whether `reference` was pushed to a registry.
	pub fn was_pushed(&self, reference: &str) -> bool {
		self.state.lock().unwrap().pushed.contains(reference)
	}

	fn record(&self, call: MockCall) -> RuntimeResult<()> {
		self.calls.lock().unwrap().push(call);
		match &self.unavailable {
			Some(message) => Err(RuntimeError::Unavailable {
				message: message.clone(),
			}),
			None => Ok(()),
		}
	}
}

fn image_failure(
	operation: ImageOperation,
	image: &str,
	error: &Option<String>,
) -> RuntimeResult<()> {
	match error {
		Some(message) => Err(RuntimeError::Image {
			operation,
			image: image.to_string(),
			message: message.clone(),
		}),
		None => Ok(()),
	}
}

fn container_failure(
	operation: ContainerOperation,
	container: &str,
	error: &Option<String>,
) -> RuntimeResult<()> {
	match error {
		Some(message) => Err(RuntimeError::Container {
			operation,
			container: container.to_string(),
			message: message.clone(),
		}),
		None => Ok(()),
	}
}

fn archive_files(archive: &[u8]) -> Vec<String> {
	let mut files = Vec::new();
	let mut reader = tar::Archive::new(archive);
	if let Ok(entries) = reader.entries() {
		for mut entry in entries.flatten() {
			let name = entry
				.path()
				.map(|p| p.to_string_lossy().into_owned())
				.unwrap_or_default();
			let mut sink = Vec::new();
			let _ = entry.read_to_end(&mut sink);
			files.push(name);
		}
	}
	files
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
	async fn pull_image(&self, reference: &str) -> RuntimeResult<()> {
		self.record(MockCall::PullImage(reference.to_string()))?;
		image_failure(ImageOperation::Pull, reference, &self.pull_error)?;
		self.state
			.lock()
			.unwrap()
			.images
			.insert(reference.to_string());
		Ok(())
	}

	async fn build_image(&self, tag: &str, context: BuildContext) -> RuntimeResult<()> {
		let archive = context.collect_bytes().await;
		let files = archive.as_deref().map(archive_files).unwrap_or_default();
		self.record(MockCall::BuildImage {
			tag: tag.to_string(),
			files,
		})?;
		let _archive = archive?;
		image_failure(ImageOperation::Build, tag, &self.build_error)?;
		self.state.lock().unwrap().images.insert(tag.to_string());
		Ok(())
	}

	async fn push_image(
		&self,
		reference: &str,
		_credentials: &RegistryCredentials,
	) -> RuntimeResult<()> {
		self.record(MockCall::PushImage(reference.to_string()))?;
		image_failure(ImageOperation::Push, reference, &self.push_error)?;
		let mut state = self.state.lock().unwrap();
		if !state.images.contains(reference) {
			return Err(RuntimeError::Image {
				operation: ImageOperation::Push,
				image: reference.to_string(),
				message: "no such image".to_string(),
			});
		}
		state.pushed.insert(reference.to_string());
		Ok(())
	}

	async fn delete_image(&self, reference: &str, _force: bool) -> RuntimeResult<()> {
		self.record(MockCall::DeleteImage(reference.to_string()))?;
		image_failure(ImageOperation::Delete, reference, &self.delete_image_error)?;
		if !self.state.lock().unwrap().images.remove(reference) {
			return Err(RuntimeError::Image {
				operation: ImageOperation::Delete,
				image: reference.to_string(),
				message: "no such image".to_string(),
			});
		}
		Ok(())
	}

	async fn create_container(
		&self,
		name: &str,
		image: &str,
		ports: &[PortMapping],
	) -> RuntimeResult<String> {
		self.record(MockCall::CreateContainer {
			name: name.to_string(),
			image: image.to_string(),
			ports: ports.to_vec(),
		})?;
		container_failure(ContainerOperation::Create, name, &self.create_error)?;

		let mut state = self.state.lock().unwrap();
		if state.find(name).is_some() {
			return Err(RuntimeError::Container {
				operation: ContainerOperation::Create,
				container: name.to_string(),
				message: "name already in use".to_string(),
			});
		}
		let id = format!("mock-{name}");
		state.containers.insert(
			name.to_string(),
			MockContainer {
				id: id.clone(),
				name: name.to_string(),
				image: image.to_string(),
				networks: Vec::new(),
				running: false,
			},
		);
		Ok(id)
	}

	async fn start_container(&self, id: &str) -> RuntimeResult<()> {
		self.record(MockCall::StartContainer(id.to_string()))?;
		container_failure(ContainerOperation::Start, id, &self.start_error)?;
		let mut state = self.state.lock().unwrap();
		let container = state.find_mut(id).ok_or_else(|| RuntimeError::NotFound {
			container: id.to_string(),
		})?;
		container.running = true;
		Ok(())
	}

	async fn wait_healthy(&self, id: &str, _timeout: Duration) -> RuntimeResult<()> {
		self.record(MockCall::WaitHealthy(id.to_string()))?;
		let state = self.state.lock().unwrap();
		match state.find(id) {
			Some(c) if c.running => Ok(()),
			Some(_) => Err(RuntimeError::Unhealthy {
				container: id.to_string(),
				status: "created".to_string(),
			}),
			None => Err(RuntimeError::NotFound {
				container: id.to_string(),
			}),
		}
	}

	async fn container_networks(&self, name: &str) -> RuntimeResult<Vec<String>> {
		self.record(MockCall::ContainerNetworks(name.to_string()))?;
		let state = self.state.lock().unwrap();
		state
			.find(name)
			.map(|c| c.networks.clone())
			.ok_or_else(|| RuntimeError::NotFound {
				container: name.to_string(),
			})
	}

	async fn connect_network(&self, container: &str, network: &str) -> RuntimeResult<()> {
		self.record(MockCall::ConnectNetwork {
			container: container.to_string(),
			network: network.to_string(),
		})?;
		container_failure(ContainerOperation::Connect, container, &self.connect_error)?;
		let mut state = self.state.lock().unwrap();
		let found = state.find_mut(container).ok_or_else(|| RuntimeError::NotFound {
			container: container.to_string(),
		})?;
		if !found.networks.iter().any(|n| n == network) {
			found.networks.push(network.to_string());
		}
		Ok(())
	}

	async fn container_exists(&self, name: &str) -> RuntimeResult<bool> {
		self.record(MockCall::ContainerExists(name.to_string()))?;
		Ok(self.state.lock().unwrap().find(name).is_some())
	}

	async fn remove_container(&self, id: &str, _force: bool) -> RuntimeResult<()> {
		self.record(MockCall::RemoveContainer(id.to_string()))?;
		container_failure(ContainerOperation::Remove, id, &self.remove_error)?;
		let mut state = self.state.lock().unwrap();
		let key = state.find(id).map(|c| c.name.clone());
		match key {
			Some(key) => {
				state.containers.remove(&key);
				Ok(())
			}
			None => Err(RuntimeError::NotFound {
				container: id.to_string(),
			}),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::context::stream_tar;
	use tempfile::TempDir;

	#[tokio::test]
	async fn container_lifecycle() {
		let runtime = MockRuntime::new();
		let id = runtime
			.create_container("reg", "registry:2", &[PortMapping::tcp(5000, 5000)])
			.await
			.unwrap();

		assert!(runtime.container_exists("reg").await.unwrap());
		assert!(runtime.container_exists(&id).await.unwrap());

		runtime.start_container(&id).await.unwrap();
		runtime.wait_healthy(&id, Duration::ZERO).await.unwrap();
		runtime.remove_container("reg", true).await.unwrap();

		assert!(!runtime.container_exists("reg").await.unwrap());
		assert!(runtime
			.remove_container("reg", true)
			.await
			.unwrap_err()
			.is_not_found());
	}

	#[tokio::test]
	async fn build_records_archived_files() {
		let dir = TempDir::new().unwrap();
		std::fs::write(dir.path().join("Dockerfile"), b"FROM scratch\n").unwrap();

		let runtime = MockRuntime::new();
		runtime
			.build_image("localhost:5000/app", stream_tar(dir.path()))
			.await
			.unwrap();

		assert!(runtime.has_image("localhost:5000/app"));
		assert_eq!(
			runtime.get_calls(),
			vec![MockCall::BuildImage {
				tag: "localhost:5000/app".to_string(),
				files: vec!["Dockerfile".to_string()],
			}]
		);
	}

	#[tokio::test]
	async fn unavailable_fails_every_call() {
		let runtime = MockRuntime::new().unavailable("no socket");
		let err = runtime.pull_image("registry:2").await.unwrap_err();
		assert!(err.is_unavailable());
		assert_eq!(runtime.get_calls().len(), 1);
	}

	#[test]
	fn push_requires_local_image() {
		let runtime = MockRuntime::new();
		let err = tokio_test::block_on(
			runtime.push_image("localhost:5000/app", &RegistryCredentials::anonymous()),
		)
		.unwrap_err();
		assert!(matches!(err, RuntimeError::Image { operation: ImageOperation::Push, .. }));
		assert!(!runtime.was_pushed("localhost:5000/app"));
	}
}
