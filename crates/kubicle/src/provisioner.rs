// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cluster creation and reuse.

use std::sync::Arc;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use kubicle_kind::{write_cluster_config, ClusterEngine, EngineError};
use kubicle_runtime::{normalize_timeout, ContainerRuntime, DockerRuntime};
use tracing::{debug, info, instrument};

use crate::cluster::ClusterHandle;
use crate::error::{ClusterError, Result};
use crate::identity::{validate_cluster_name, RegistryIdentity};
use crate::publisher::ImagePublisher;
use crate::registry::RegistryOrchestrator;
use crate::settings::Settings;
use crate::teardown::Teardown;

/// Creates clusters, or reattaches to existing ones, and makes sure each has
/// its registry.
#[derive(Clone)]
pub struct ClusterProvisioner {
	runtime: Arc<dyn ContainerRuntime>,
	engine: Arc<dyn ClusterEngine>,
	settings: Settings,
	registry: RegistryOrchestrator,
}

impl ClusterProvisioner {
	pub fn new(
		runtime: Arc<dyn ContainerRuntime>,
		engine: Arc<dyn ClusterEngine>,
		settings: Settings,
	) -> Self {
		let registry = RegistryOrchestrator::new(Arc::clone(&runtime), &settings);
		Self {
			runtime,
			engine,
			settings,
			registry,
		}
	}

	/// Docker runtime and kind CLI engine configured from `settings`.
	pub fn from_settings(settings: Settings) -> Self {
		let engine = settings.kind_engine();
		Self::new(Arc::new(DockerRuntime::new()), Arc::new(engine), settings)
	}

	pub fn settings(&self) -> &Settings {
		&self.settings
	}

	/// Return a handle to cluster `name`, creating it if needed.
	///
	/// A zero `ready_timeout` waits one minute. The registry is reconciled
	/// whether or not the cluster already existed.
	#[instrument(skip(self), fields(cluster = %name))]
	pub async fn provision(&self, name: &str, ready_timeout: Duration) -> Result<ClusterHandle> {
		validate_cluster_name(name)?;
		let ready_timeout = normalize_timeout(ready_timeout);

		let existing = self
			.engine
			.list_clusters()
			.await
			.map_err(ClusterError::ListClusters)?;

		if existing.iter().any(|c| c == name) {
			info!("Reusing existing cluster");
		} else {
			self.create(name, ready_timeout).await?;
		}

		let kubeconfig = self
			.engine
			.kubeconfig(name)
			.await
			.map_err(|source| ClusterError::Kubeconfig {
				cluster: name.to_string(),
				source,
			})?;

		self.registry.ensure_registry(name).await?;

		let client = build_client(name, &kubeconfig).await?;

		Ok(ClusterHandle::new(
			name,
			kubeconfig,
			client,
			ImagePublisher::new(Arc::clone(&self.runtime), self.settings.registry_host_port),
			Teardown::new(name, Arc::clone(&self.runtime), Arc::clone(&self.engine)),
		))
	}

	async fn create(&self, name: &str, ready_timeout: Duration) -> Result<()> {
		let address = RegistryIdentity::for_cluster(name).address();
		let config = write_cluster_config(&address).map_err(|source| ClusterError::ConfigFile {
			cluster: name.to_string(),
			source,
		})?;
		debug!(path = %config.path().display(), mirror = %address, "Wrote cluster config");

		info!(timeout = ?ready_timeout, "Creating cluster");
		self.engine
			.create_cluster(name, config.path(), ready_timeout)
			.await
			.map_err(|source| match source {
				EngineError::Timeout { .. } => ClusterError::ProvisionTimeout {
					cluster: name.to_string(),
					timeout: ready_timeout,
				},
				source => ClusterError::CreateCluster {
					cluster: name.to_string(),
					source,
				},
			})?;
		info!("Cluster created");
		Ok(())
	}
}

async fn build_client(cluster: &str, kubeconfig: &str) -> Result<Client> {
	let credential = |message: String| ClusterError::Credential {
		cluster: cluster.to_string(),
		message,
	};

	let parsed = Kubeconfig::from_yaml(kubeconfig).map_err(|e| credential(e.to_string()))?;
	let config = kube::Config::from_custom_kubeconfig(parsed, &KubeConfigOptions::default())
		.await
		.map_err(|e| credential(e.to_string()))?;
	Client::try_from(config).map_err(|e| credential(e.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ErrorKind;
	use kubicle_kind::{MockCall as EngineCall, MockEngine};
	use kubicle_runtime::{MockCall as RuntimeCall, MockRuntime};

	/// Mock runtime that already knows the node kind would create for `cluster`.
	fn runtime_for(cluster: &str) -> MockRuntime {
		MockRuntime::new().with_container(&format!("{cluster}-control-plane"), &["kind"])
	}

	fn provisioner(runtime: &MockRuntime, engine: &MockEngine) -> ClusterProvisioner {
		ClusterProvisioner::new(
			Arc::new(runtime.clone()),
			Arc::new(engine.clone()),
			Settings::default(),
		)
	}

	fn creates(engine: &MockEngine) -> Vec<EngineCall> {
		engine
			.get_calls()
			.into_iter()
			.filter(|c| matches!(c, EngineCall::CreateCluster { .. }))
			.collect()
	}

	fn registry_creates(runtime: &MockRuntime) -> usize {
		runtime
			.get_calls()
			.iter()
			.filter(|c| matches!(c, RuntimeCall::CreateContainer { .. }))
			.count()
	}

	#[tokio::test]
	async fn fresh_cluster_gets_cluster_and_registry() {
		let runtime = runtime_for("dev");
		let engine = MockEngine::new();

		let handle = provisioner(&runtime, &engine)
			.provision("dev", Duration::from_secs(120))
			.await
			.unwrap();

		assert_eq!(handle.name(), "dev");
		assert_eq!(handle.registry_name(), "dev-registry:5000");
		assert_eq!(handle.image_name("foo:latest"), "dev-registry:5000/foo:latest");
		assert!(handle.kubeconfig().contains("kind-dev"));
		assert_eq!(engine.clusters(), vec!["dev".to_string()]);
		assert!(runtime.container("dev-registry").unwrap().running);

		let creates = creates(&engine);
		assert_eq!(creates.len(), 1);
		match &creates[0] {
			EngineCall::CreateCluster {
				name,
				path,
				config,
				wait,
			} => {
				assert_eq!(name, "dev");
				assert_eq!(*wait, Duration::from_secs(120));
				assert!(config.contains("http://dev-registry:5000"));
				assert!(!config.contains("{{address}}"));
				assert!(!path.exists(), "scratch config left behind");
			}
			other => panic!("unexpected call {other:?}"),
		}
	}

	#[tokio::test]
	async fn repeat_provision_creates_nothing_new() {
		let runtime = runtime_for("dev");
		let engine = MockEngine::new();
		let provisioner = provisioner(&runtime, &engine);

		provisioner.provision("dev", Duration::from_secs(60)).await.unwrap();
		provisioner.provision("dev", Duration::from_secs(60)).await.unwrap();

		assert_eq!(creates(&engine).len(), 1);
		assert_eq!(registry_creates(&runtime), 1);
	}

	#[tokio::test]
	async fn existing_cluster_gets_registry_reconciled() {
		let runtime = runtime_for("dev");
		let engine = MockEngine::new().with_cluster("dev");

		provisioner(&runtime, &engine)
			.provision("dev", Duration::from_secs(60))
			.await
			.unwrap();

		assert!(creates(&engine).is_empty());
		assert_eq!(registry_creates(&runtime), 1);
		assert_eq!(
			engine.get_calls(),
			vec![EngineCall::ListClusters, EngineCall::Kubeconfig("dev".to_string())]
		);
	}

	#[tokio::test]
	async fn zero_timeout_waits_one_minute() {
		let runtime = runtime_for("dev");
		let engine = MockEngine::new();

		provisioner(&runtime, &engine)
			.provision("dev", Duration::ZERO)
			.await
			.unwrap();

		match &creates(&engine)[0] {
			EngineCall::CreateCluster { wait, .. } => assert_eq!(*wait, Duration::from_secs(60)),
			other => panic!("unexpected call {other:?}"),
		}
	}

	#[tokio::test]
	async fn engine_timeout_is_provision_timeout() {
		let runtime = runtime_for("dev");
		let engine = MockEngine::new().with_create_timeout();

		let err = provisioner(&runtime, &engine)
			.provision("dev", Duration::from_secs(30))
			.await
			.unwrap_err();

		assert_eq!(err.kind(), ErrorKind::ProvisionTimeout);
		match err {
			ClusterError::ProvisionTimeout { cluster, timeout } => {
				assert_eq!(cluster, "dev");
				assert_eq!(timeout, Duration::from_secs(30));
			}
			other => panic!("expected timeout, got {other:?}"),
		}
		assert!(runtime.get_calls().is_empty());
	}

	#[tokio::test]
	async fn create_failure_removes_scratch_config() {
		let runtime = runtime_for("dev");
		let engine = MockEngine::new().with_create_error("failed to create cluster");

		let err = provisioner(&runtime, &engine)
			.provision("dev", Duration::from_secs(30))
			.await
			.unwrap_err();

		assert_eq!(err.kind(), ErrorKind::ProvisionFailed);
		match &creates(&engine)[0] {
			EngineCall::CreateCluster { path, .. } => assert!(!path.exists()),
			other => panic!("unexpected call {other:?}"),
		}
	}

	#[tokio::test]
	async fn list_failure_stops_early() {
		let runtime = runtime_for("dev");
		let engine = MockEngine::new().with_list_error("permission denied");

		let err = provisioner(&runtime, &engine)
			.provision("dev", Duration::from_secs(30))
			.await
			.unwrap_err();

		assert!(matches!(err, ClusterError::ListClusters(_)));
		assert_eq!(engine.get_calls(), vec![EngineCall::ListClusters]);
	}

	#[tokio::test]
	async fn malformed_kubeconfig_is_credential_error() {
		let runtime = runtime_for("dev");
		let engine = MockEngine::new().with_kubeconfig("clusters: [this is not: a kubeconfig");

		let err = provisioner(&runtime, &engine)
			.provision("dev", Duration::from_secs(30))
			.await
			.unwrap_err();

		assert_eq!(err.kind(), ErrorKind::CredentialError);
	}

	#[tokio::test]
	async fn registry_failure_fails_provision() {
		let runtime = runtime_for("dev").with_pull_error("toomanyrequests");
		let engine = MockEngine::new();

		let err = provisioner(&runtime, &engine)
			.provision("dev", Duration::from_secs(30))
			.await
			.unwrap_err();

		assert_eq!(err.kind(), ErrorKind::ImageOperationFailed);
	}

	#[tokio::test]
	async fn invalid_name_makes_no_calls() {
		let runtime = MockRuntime::new();
		let engine = MockEngine::new();

		let err = provisioner(&runtime, &engine)
			.provision("Bad_Name", Duration::from_secs(30))
			.await
			.unwrap_err();

		assert_eq!(err.kind(), ErrorKind::InvalidInput);
		assert!(engine.get_calls().is_empty());
		assert!(runtime.get_calls().is_empty());
	}

	#[tokio::test]
	async fn handle_tears_down_what_it_created() {
		let runtime = runtime_for("dev");
		let engine = MockEngine::new();

		let handle = provisioner(&runtime, &engine)
			.provision("dev", Duration::from_secs(60))
			.await
			.unwrap();
		handle.delete().await.unwrap();
		handle.delete().await.unwrap();

		assert!(engine.clusters().is_empty());
		assert!(runtime.container("dev-registry").is_none());
	}

	#[tokio::test]
	async fn handle_publishes_through_host_port() {
		let dir = tempfile::TempDir::new().unwrap();
		std::fs::write(dir.path().join("Dockerfile"), b"FROM scratch\n").unwrap();
		let runtime = runtime_for("dev");
		let engine = MockEngine::new();
		let settings = Settings {
			registry_host_port: 5001,
			..Settings::default()
		};

		let handle =
			ClusterProvisioner::new(Arc::new(runtime.clone()), Arc::new(engine.clone()), settings)
				.provision("dev", Duration::from_secs(60))
				.await
				.unwrap();
		handle.build_and_push_image("svc:latest", dir.path()).await.unwrap();

		assert!(runtime.was_pushed("localhost:5001/svc:latest"));
		assert_eq!(handle.image_name("svc:latest"), "dev-registry:5000/svc:latest");
	}

	#[tokio::test]
	async fn writes_kubeconfig_to_disk() {
		let dir = tempfile::TempDir::new().unwrap();
		let runtime = runtime_for("dev");
		let engine = MockEngine::new();

		let handle = provisioner(&runtime, &engine)
			.provision("dev", Duration::from_secs(60))
			.await
			.unwrap();
		let path = dir.path().join("nested").join("kubeconfig");
		handle.write_kubeconfig(&path).await.unwrap();

		assert_eq!(std::fs::read_to_string(&path).unwrap(), handle.kubeconfig());
	}
}
