// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-cluster registry container lifecycle.

use std::sync::Arc;

use kubicle_runtime::{ContainerRuntime, PortMapping, RuntimeError};
use tracing::{debug, info, instrument, warn};

use crate::error::{ClusterError, RegistryPhase};
use crate::identity::{RegistryIdentity, REGISTRY_PORT};
use crate::settings::Settings;

/// Network kind attaches its nodes to by default.
const KIND_NETWORK: &str = "kind";

/// Picks the network a registry joins when the control-plane node has several.
///
/// Preference: a network named after the cluster, then `kind`, then the
/// lexicographically smallest name.
pub fn select_network<'a>(cluster: &str, networks: &'a [String]) -> Option<&'a str> {
	networks
		.iter()
		.find(|n| n.as_str() == cluster)
		.or_else(|| networks.iter().find(|n| n.as_str() == KIND_NETWORK))
		.or_else(|| networks.iter().min())
		.map(String::as_str)
}

/// Ensures each cluster has a registry container on the cluster network.
#[derive(Clone)]
pub struct RegistryOrchestrator {
	runtime: Arc<dyn ContainerRuntime>,
	image: String,
	host_port: u16,
}

impl RegistryOrchestrator {
	pub fn new(runtime: Arc<dyn ContainerRuntime>, settings: &Settings) -> Self {
		Self {
			runtime,
			image: settings.registry_image.clone(),
			host_port: settings.registry_host_port,
		}
	}

	/// Make sure `<cluster>-registry` exists.
	///
	/// An existing container is accepted as is. A new one is published on
	/// the host port, joined to the control-plane node's network and
	/// started. If any step after creation fails, the new container is
	/// removed again so a later call starts from scratch.
	#[instrument(skip(self))]
	pub async fn ensure_registry(&self, cluster: &str) -> Result<(), ClusterError> {
		let identity = RegistryIdentity::for_cluster(cluster);
		let name = identity.container_name();
		let fail = |phase: RegistryPhase| {
			move |source: RuntimeError| ClusterError::Registry {
				cluster: cluster.to_string(),
				phase,
				source,
			}
		};

		self.runtime
			.pull_image(&self.image)
			.await
			.map_err(fail(RegistryPhase::Pull))?;

		if self
			.runtime
			.container_exists(&name)
			.await
			.map_err(fail(RegistryPhase::Inspect))?
		{
			debug!(container = %name, "Registry container already exists");
			return Ok(());
		}

		let ports = [PortMapping::tcp(self.host_port, REGISTRY_PORT)];
		let id = self
			.runtime
			.create_container(&name, &self.image, &ports)
			.await
			.map_err(fail(RegistryPhase::Create))?;
		debug!(container = %name, id = %id, "Created registry container");

		if let Err(err) = self.attach_and_start(cluster, &identity, &id).await {
			self.rollback(&id).await;
			return Err(err);
		}

		info!(
			container = %name,
			address = %identity.address(),
			host_port = self.host_port,
			"Registry ready"
		);
		Ok(())
	}

	async fn attach_and_start(
		&self,
		cluster: &str,
		identity: &RegistryIdentity,
		id: &str,
	) -> Result<(), ClusterError> {
		let fail = |phase: RegistryPhase| {
			move |source: RuntimeError| ClusterError::Registry {
				cluster: cluster.to_string(),
				phase,
				source,
			}
		};

		let node = identity.control_plane_node();
		let networks = self
			.runtime
			.container_networks(&node)
			.await
			.map_err(fail(RegistryPhase::DiscoverNetwork))?;
		let network = select_network(cluster, &networks)
			.ok_or_else(|| ClusterError::NetworkDiscovery { node: node.clone() })?;
		debug!(
			node = %node,
			network = %network,
			candidates = networks.len(),
			"Selected cluster network"
		);

		self.runtime
			.connect_network(id, network)
			.await
			.map_err(fail(RegistryPhase::Connect))?;

		self.runtime
			.start_container(id)
			.await
			.map_err(fail(RegistryPhase::Start))?;

		Ok(())
	}

	async fn rollback(&self, id: &str) {
		match self.runtime.remove_container(id, true).await {
			Ok(()) => debug!(id = %id, "Removed partially configured registry container"),
			Err(err) => warn!(
				id = %id,
				error = %err,
				"Failed to remove partially configured registry container"
			),
		}
	}
}
