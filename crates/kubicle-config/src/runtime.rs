// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Runtime configuration types with resolved defaults.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::layer::*;
use crate::paths::PathsConfig;
use crate::ConfigError;

pub const DEFAULT_READY_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_KIND_BINARY: &str = "kind";
pub const DEFAULT_REGISTRY_IMAGE: &str = "registry:2";
pub const DEFAULT_REGISTRY_HOST_PORT: u16 = 5000;

/// The final, validated configuration for kubicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubicleConfig {
	pub cluster: ClusterConfig,
	pub registry: RegistryConfig,
	pub logging: LoggingConfig,

	/// Resolved XDG paths (not serialized)
	#[serde(skip)]
	pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
	#[serde(with = "secs_serde")]
	pub ready_timeout: Duration,
	pub kind_binary: PathBuf,
	pub node_image: Option<String>,
}

impl Default for ClusterConfig {
	fn default() -> Self {
		Self {
			ready_timeout: Duration::from_secs(DEFAULT_READY_TIMEOUT_SECS),
			kind_binary: PathBuf::from(DEFAULT_KIND_BINARY),
			node_image: None,
		}
	}
}

mod secs_serde {
	use serde::{self, Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(duration.as_secs())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let secs = u64::deserialize(deserializer)?;
		Ok(Duration::from_secs(secs))
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
	pub image: String,
	pub host_port: u16,
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self {
			image: DEFAULT_REGISTRY_IMAGE.to_string(),
			host_port: DEFAULT_REGISTRY_HOST_PORT,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
	pub level: LogLevel,
	pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Error,
	Warn,
	#[default]
	Info,
	Debug,
	Trace,
}

impl LogLevel {
	pub fn as_str(&self) -> &'static str {
		match self {
			LogLevel::Error => "error",
			LogLevel::Warn => "warn",
			LogLevel::Info => "info",
			LogLevel::Debug => "debug",
			LogLevel::Trace => "trace",
		}
	}
}

impl fmt::Display for LogLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for LogLevel {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"error" => Ok(LogLevel::Error),
			"warn" | "warning" => Ok(LogLevel::Warn),
			"info" => Ok(LogLevel::Info),
			"debug" => Ok(LogLevel::Debug),
			"trace" => Ok(LogLevel::Trace),
			other => Err(ConfigError::invalid_value(
				"logging.level",
				format!("unknown level {other:?} (expected error, warn, info, debug or trace)"),
			)),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	#[default]
	Pretty,
	Json,
	Compact,
}

impl FromStr for LogFormat {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"pretty" => Ok(LogFormat::Pretty),
			"json" => Ok(LogFormat::Json),
			"compact" => Ok(LogFormat::Compact),
			other => Err(ConfigError::invalid_value(
				"logging.format",
				format!("unknown format {other:?} (expected pretty, json or compact)"),
			)),
		}
	}
}

impl KubicleConfig {
	/// Finalize a merged layer, filling in defaults.
	pub fn from_layer(layer: ConfigLayer, paths: PathsConfig) -> Result<Self, ConfigError> {
		Ok(Self {
			cluster: build_cluster_config(layer.cluster),
			registry: build_registry_config(layer.registry),
			logging: build_logging_config(layer.logging)?,
			paths,
		})
	}
}

fn build_cluster_config(layer: Option<ClusterLayer>) -> ClusterConfig {
	let layer = layer.unwrap_or_default();
	let defaults = ClusterConfig::default();
	ClusterConfig {
		ready_timeout: layer
			.ready_timeout_secs
			.map(Duration::from_secs)
			.unwrap_or(defaults.ready_timeout),
		kind_binary: layer.kind_binary.unwrap_or(defaults.kind_binary),
		node_image: layer.node_image,
	}
}

fn build_registry_config(layer: Option<RegistryLayer>) -> RegistryConfig {
	let layer = layer.unwrap_or_default();
	let defaults = RegistryConfig::default();
	RegistryConfig {
		image: layer.image.unwrap_or(defaults.image),
		host_port: layer.host_port.unwrap_or(defaults.host_port),
	}
}

fn build_logging_config(layer: Option<LoggingLayer>) -> Result<LoggingConfig, ConfigError> {
	let layer = layer.unwrap_or_default();
	Ok(LoggingConfig {
		level: layer
			.level
			.as_deref()
			.map(str::parse)
			.transpose()?
			.unwrap_or_default(),
		format: layer
			.format
			.as_deref()
			.map(str::parse)
			.transpose()?
			.unwrap_or_default(),
	})
}
