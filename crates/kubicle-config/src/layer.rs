// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration layer for merging from multiple sources.

use std::path::PathBuf;

use serde::Deserialize;

/// Partial configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
	#[serde(default)]
	pub cluster: Option<ClusterLayer>,
	#[serde(default)]
	pub registry: Option<RegistryLayer>,
	#[serde(default)]
	pub logging: Option<LoggingLayer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterLayer {
	#[serde(default)]
	pub ready_timeout_secs: Option<u64>,
	#[serde(default)]
	pub kind_binary: Option<PathBuf>,
	#[serde(default)]
	pub node_image: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryLayer {
	#[serde(default)]
	pub image: Option<String>,
	#[serde(default)]
	pub host_port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingLayer {
	#[serde(default)]
	pub level: Option<String>,
	#[serde(default)]
	pub format: Option<String>,
}

impl ConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: ConfigLayer) {
		merge_option(&mut self.cluster, other.cluster, ClusterLayer::merge);
		merge_option(&mut self.registry, other.registry, RegistryLayer::merge);
		merge_option(&mut self.logging, other.logging, LoggingLayer::merge);
	}

	pub fn cluster_mut(&mut self) -> &mut ClusterLayer {
		self.cluster.get_or_insert_with(ClusterLayer::default)
	}

	pub fn registry_mut(&mut self) -> &mut RegistryLayer {
		self.registry.get_or_insert_with(RegistryLayer::default)
	}

	pub fn logging_mut(&mut self) -> &mut LoggingLayer {
		self.logging.get_or_insert_with(LoggingLayer::default)
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}

fn take_some<T>(target: &mut Option<T>, source: Option<T>) {
	if source.is_some() {
		*target = source;
	}
}

impl ClusterLayer {
	fn merge(&mut self, other: ClusterLayer) {
		take_some(&mut self.ready_timeout_secs, other.ready_timeout_secs);
		take_some(&mut self.kind_binary, other.kind_binary);
		take_some(&mut self.node_image, other.node_image);
	}
}

impl RegistryLayer {
	fn merge(&mut self, other: RegistryLayer) {
		take_some(&mut self.image, other.image);
		take_some(&mut self.host_port, other.host_port);
	}
}

impl LoggingLayer {
	fn merge(&mut self, other: LoggingLayer) {
		take_some(&mut self.level, other.level);
		take_some(&mut self.format, other.format);
	}
}
