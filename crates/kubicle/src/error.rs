// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;
use std::time::Duration;

use kubicle_kind::EngineError;
use kubicle_runtime::RuntimeError;
use thiserror::Error;

use crate::teardown::TeardownError;

/// Coarse classification of a [`ClusterError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// The container runtime could not be reached.
	RuntimeUnavailable,
	ImageOperationFailed,
	ContainerOperationFailed,
	ProvisionTimeout,
	ProvisionFailed,
	/// Cluster credentials could not be parsed or turned into a client.
	CredentialError,
	NetworkDiscoveryError,
	/// One or more teardown steps failed.
	CombinedTeardownError,
	KubernetesApi,
	InvalidInput,
	/// Local filesystem failure outside provisioning.
	Io,
}

/// Registry reconciliation steps reported in [`ClusterError::Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryPhase {
	Pull,
	Inspect,
	Create,
	DiscoverNetwork,
	Connect,
	Start,
}

impl fmt::Display for RegistryPhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let phase = match self {
			RegistryPhase::Pull => "pull the registry image",
			RegistryPhase::Inspect => "inspect the registry container",
			RegistryPhase::Create => "create the registry container",
			RegistryPhase::DiscoverNetwork => "discover the cluster network",
			RegistryPhase::Connect => "connect the registry to the cluster network",
			RegistryPhase::Start => "start the registry container",
		};
		f.write_str(phase)
	}
}

/// Publish steps reported in [`ClusterError::Publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishPhase {
	Build,
	Push,
	Delete,
}

impl fmt::Display for PublishPhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PublishPhase::Build => f.write_str("build"),
			PublishPhase::Push => f.write_str("push"),
			PublishPhase::Delete => f.write_str("delete"),
		}
	}
}

#[derive(Debug, Error)]
pub enum ClusterError {
	#[error("invalid cluster name {name:?}: {reason}")]
	InvalidName { name: String, reason: &'static str },

	#[error("failed to list clusters: {0}")]
	ListClusters(#[source] EngineError),

	#[error("failed to write config for cluster {cluster}: {source}")]
	ConfigFile {
		cluster: String,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to create cluster {cluster}: {source}")]
	CreateCluster {
		cluster: String,
		#[source]
		source: EngineError,
	},

	#[error("cluster {cluster} was not ready within {timeout:?}")]
	ProvisionTimeout { cluster: String, timeout: Duration },

	#[error("failed to get kubeconfig for cluster {cluster}: {source}")]
	Kubeconfig {
		cluster: String,
		#[source]
		source: EngineError,
	},

	#[error("unusable credentials for cluster {cluster}: {message}")]
	Credential { cluster: String, message: String },

	#[error("failed to {phase} for cluster {cluster}: {source}")]
	Registry {
		cluster: String,
		phase: RegistryPhase,
		#[source]
		source: RuntimeError,
	},

	#[error("node {node} is not attached to any network")]
	NetworkDiscovery { node: String },

	#[error("failed to {phase} image {image}: {source}")]
	Publish {
		phase: PublishPhase,
		image: String,
		#[source]
		source: RuntimeError,
	},

	#[error("failed to write kubeconfig to {}: {source}", path.display())]
	WriteKubeconfig {
		path: std::path::PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error(transparent)]
	Teardown(#[from] TeardownError),

	#[error("Kubernetes API error: {0}")]
	Kubernetes(#[from] kube::Error),
}

impl ClusterError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			ClusterError::InvalidName { .. } => ErrorKind::InvalidInput,
			ClusterError::ListClusters(_)
			| ClusterError::ConfigFile { .. }
			| ClusterError::CreateCluster { .. }
			| ClusterError::Kubeconfig { .. } => ErrorKind::ProvisionFailed,
			ClusterError::ProvisionTimeout { .. } => ErrorKind::ProvisionTimeout,
			ClusterError::Credential { .. } => ErrorKind::CredentialError,
			ClusterError::Registry { source, .. } | ClusterError::Publish { source, .. } => {
				runtime_kind(source)
			}
			ClusterError::NetworkDiscovery { .. } => ErrorKind::NetworkDiscoveryError,
			ClusterError::WriteKubeconfig { .. } => ErrorKind::Io,
			ClusterError::Teardown(_) => ErrorKind::CombinedTeardownError,
			ClusterError::Kubernetes(_) => ErrorKind::KubernetesApi,
		}
	}
}

fn runtime_kind(err: &RuntimeError) -> ErrorKind {
	match err {
		RuntimeError::Unavailable { .. } => ErrorKind::RuntimeUnavailable,
		RuntimeError::Image { .. } | RuntimeError::BuildContext(_) => {
			ErrorKind::ImageOperationFailed
		}
		RuntimeError::Container { .. }
		| RuntimeError::NotFound { .. }
		| RuntimeError::Timeout { .. }
		| RuntimeError::Unhealthy { .. } => ErrorKind::ContainerOperationFailed,
	}
}

pub type Result<T, E = ClusterError> = std::result::Result<T, E>;
