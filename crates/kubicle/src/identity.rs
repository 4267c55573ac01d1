// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Names derived from a cluster name.

use crate::error::ClusterError;

/// Port the registry listens on inside its container and on cluster networks.
pub const REGISTRY_PORT: u16 = 5000;

const REGISTRY_SUFFIX: &str = "-registry";
const CONTROL_PLANE_SUFFIX: &str = "-control-plane";
const MAX_LABEL_LENGTH: usize = 63;

/// Longest cluster name whose node hostnames still fit in a DNS label.
pub const MAX_CLUSTER_NAME_LENGTH: usize = MAX_LABEL_LENGTH - CONTROL_PLANE_SUFFIX.len();

/// Identity of a cluster's registry. Never stored; always recomputed from
/// the cluster name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryIdentity {
	cluster: String,
}

impl RegistryIdentity {
	pub fn for_cluster(cluster: &str) -> Self {
		Self {
			cluster: cluster.to_string(),
		}
	}

	/// `<cluster>-registry`
	pub fn container_name(&self) -> String {
		format!("{}{REGISTRY_SUFFIX}", self.cluster)
	}

	/// `<cluster>-registry:5000`, as resolved on the cluster network.
	pub fn address(&self) -> String {
		format!("{}:{REGISTRY_PORT}", self.container_name())
	}

	/// `<cluster>-control-plane`, the node container kind creates.
	pub fn control_plane_node(&self) -> String {
		format!("{}{CONTROL_PLANE_SUFFIX}", self.cluster)
	}

	/// Reference usable in pod specs for an image published to this registry.
	pub fn image_name(&self, image: &str) -> String {
		format!("{}/{image}", self.address())
	}
}

/// Checks that `name` can be used for a kind cluster and its containers.
///
/// Names must be 1 to [`MAX_CLUSTER_NAME_LENGTH`] characters of lowercase
/// alphanumerics and `-`, starting and ending with an alphanumeric.
pub fn validate_cluster_name(name: &str) -> Result<(), ClusterError> {
	let invalid = |reason| ClusterError::InvalidName {
		name: name.to_string(),
		reason,
	};

	if name.is_empty() {
		return Err(invalid("name is empty"));
	}
	if name.len() > MAX_CLUSTER_NAME_LENGTH {
		return Err(invalid("name is too long for node hostnames"));
	}
	if !name
		.chars()
		.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
	{
		return Err(invalid("only lowercase letters, digits and '-' are allowed"));
	}
	if name.starts_with('-') || name.ends_with('-') {
		return Err(invalid("name must start and end with a letter or digit"));
	}
	Ok(())
}
