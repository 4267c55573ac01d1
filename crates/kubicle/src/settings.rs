// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

use kubicle_config::{
	runtime::{DEFAULT_KIND_BINARY, DEFAULT_REGISTRY_HOST_PORT, DEFAULT_REGISTRY_IMAGE},
	KubicleConfig,
};
use kubicle_kind::KindCommandEngine;

/// Settings shared by the provisioner, registry orchestrator and publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
	/// Image the registry container runs.
	pub registry_image: String,
	/// Host port the registry is published on. Images are pushed through it.
	pub registry_host_port: u16,
	pub kind_binary: PathBuf,
	/// Node image for new clusters; kind's default when unset.
	pub node_image: Option<String>,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			registry_image: DEFAULT_REGISTRY_IMAGE.to_string(),
			registry_host_port: DEFAULT_REGISTRY_HOST_PORT,
			kind_binary: PathBuf::from(DEFAULT_KIND_BINARY),
			node_image: None,
		}
	}
}

impl Settings {
	pub fn from_config(config: &KubicleConfig) -> Self {
		Self {
			registry_image: config.registry.image.clone(),
			registry_host_port: config.registry.host_port,
			kind_binary: config.cluster.kind_binary.clone(),
			node_image: config.cluster.node_image.clone(),
		}
	}

	/// kind CLI engine using the configured binary and node image.
	pub fn kind_engine(&self) -> KindCommandEngine {
		let engine = KindCommandEngine::new(self.kind_binary.clone());
		match &self.node_image {
			Some(image) => engine.with_node_image(image.clone()),
			None => engine,
		}
	}
}
