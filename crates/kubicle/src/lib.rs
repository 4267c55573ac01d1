// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Local kind clusters with a per-cluster image registry.
//!
//! This crate provides:
//! - Cluster provisioning and reuse through a [`kubicle_kind::ClusterEngine`]
//! - A registry container per cluster, reachable from every node
//! - Building and publishing images into that registry
//! - Teardown that reports every failing step

mod cluster;
mod error;
mod identity;
mod provisioner;
mod publisher;
mod registry;
mod settings;
mod teardown;

use std::time::Duration;

pub use cluster::ClusterHandle;
pub use error::{ClusterError, ErrorKind, PublishPhase, RegistryPhase, Result};
pub use identity::{validate_cluster_name, RegistryIdentity, MAX_CLUSTER_NAME_LENGTH, REGISTRY_PORT};
pub use provisioner::ClusterProvisioner;
pub use publisher::ImagePublisher;
pub use registry::{select_network, RegistryOrchestrator};
pub use settings::Settings;
pub use teardown::{Teardown, TeardownError, TeardownFailure, TeardownStep};

/// Create or reuse cluster `name` using Docker, the `kind` CLI and default settings.
pub async fn new_cluster(name: &str, ready_timeout: Duration) -> Result<ClusterHandle> {
	ClusterProvisioner::from_settings(Settings::default())
		.provision(name, ready_timeout)
		.await
}
