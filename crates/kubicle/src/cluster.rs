// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;
use std::path::Path;

use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::{debug, instrument};

use crate::error::{ClusterError, Result};
use crate::identity::RegistryIdentity;
use crate::publisher::ImagePublisher;
use crate::teardown::{Teardown, TeardownError};

/// A running cluster with its registry.
///
/// Dropping the handle leaves the cluster running; call [`ClusterHandle::delete`]
/// to remove it.
#[derive(Clone)]
pub struct ClusterHandle {
	name: String,
	kubeconfig: String,
	client: Client,
	registry: RegistryIdentity,
	publisher: ImagePublisher,
	teardown: Teardown,
}

impl ClusterHandle {
	pub(crate) fn new(
		name: &str,
		kubeconfig: String,
		client: Client,
		publisher: ImagePublisher,
		teardown: Teardown,
	) -> Self {
		Self {
			name: name.to_string(),
			kubeconfig,
			client,
			registry: RegistryIdentity::for_cluster(name),
			publisher,
			teardown,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Kubeconfig YAML for the cluster.
	pub fn kubeconfig(&self) -> &str {
		&self.kubeconfig
	}

	pub fn client(&self) -> &Client {
		&self.client
	}

	/// Registry address as seen from inside the cluster.
	pub fn registry_name(&self) -> String {
		self.registry.address()
	}

	/// Reference pods use for an image published with
	/// [`ClusterHandle::build_and_push_image`].
	pub fn image_name(&self, image: &str) -> String {
		self.registry.image_name(image)
	}

	pub async fn build_and_push_image(&self, image: &str, dir: impl AsRef<Path>) -> Result<()> {
		self.publisher.publish(image, dir.as_ref()).await
	}

	/// Remove the registry container and the cluster. Safe to call repeatedly.
	pub async fn delete(&self) -> std::result::Result<(), TeardownError> {
		self.teardown.run().await
	}

	pub async fn write_kubeconfig(&self, path: impl AsRef<Path>) -> Result<()> {
		let path = path.as_ref();
		let write_err = |source| ClusterError::WriteKubeconfig {
			path: path.to_path_buf(),
			source,
		};

		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
		}
		tokio::fs::write(path, self.kubeconfig.as_bytes())
			.await
			.map_err(write_err)?;
		debug!(cluster = %self.name, path = %path.display(), "Wrote kubeconfig");
		Ok(())
	}

	/// Names of the cluster's nodes, as reported by the API server.
	#[instrument(skip(self), fields(cluster = %self.name))]
	pub async fn node_names(&self) -> Result<Vec<String>> {
		let nodes: Api<Node> = Api::all(self.client.clone());
		let list = nodes.list(&ListParams::default()).await?;
		let mut names: Vec<String> = list
			.items
			.into_iter()
			.filter_map(|node| node.metadata.name)
			.collect();
		names.sort();
		Ok(names)
	}
}

impl fmt::Debug for ClusterHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ClusterHandle")
			.field("name", &self.name)
			.field("registry", &self.registry.address())
			.finish_non_exhaustive()
	}
}
