// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration validation rules.

use tracing::warn;

use crate::runtime::KubicleConfig;
use crate::ConfigError;

/// Validate the configuration.
///
/// Returns Ok(()) if valid, or ConfigError::InvalidValue with details.
pub fn validate_config(config: &KubicleConfig) -> Result<(), ConfigError> {
	validate_cluster(config)?;
	validate_registry(config)?;

	Ok(())
}

fn validate_cluster(config: &KubicleConfig) -> Result<(), ConfigError> {
	let cluster = &config.cluster;

	if cluster.ready_timeout.is_zero() {
		return Err(ConfigError::invalid_value(
			"cluster.ready_timeout_secs",
			"must be at least 1",
		));
	}

	if cluster.kind_binary.as_os_str().is_empty() {
		return Err(ConfigError::invalid_value(
			"cluster.kind_binary",
			"kind_binary cannot be empty",
		));
	}

	if let Some(image) = &cluster.node_image {
		if image.trim().is_empty() {
			return Err(ConfigError::invalid_value(
				"cluster.node_image",
				"node_image cannot be blank",
			));
		}
	}

	Ok(())
}

fn validate_registry(config: &KubicleConfig) -> Result<(), ConfigError> {
	let registry = &config.registry;

	if registry.image.trim().is_empty() {
		return Err(ConfigError::invalid_value(
			"registry.image",
			"image cannot be empty",
		));
	}

	if registry.host_port == 0 {
		return Err(ConfigError::invalid_value(
			"registry.host_port",
			"must be between 1 and 65535",
		));
	}

	if registry.host_port < 1024 {
		warn!(
			host_port = registry.host_port,
			"registry host port is privileged and may require elevated permissions"
		);
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::paths::PathsConfig;
	use crate::runtime::{ClusterConfig, LoggingConfig, RegistryConfig};
	use std::time::Duration;

	fn minimal_config() -> KubicleConfig {
		KubicleConfig {
			cluster: ClusterConfig::default(),
			registry: RegistryConfig::default(),
			logging: LoggingConfig::default(),
			paths: PathsConfig::default(),
		}
	}

	/// The defaults must always pass validation.
	#[test]
	fn test_minimal_config_is_valid() {
		assert!(validate_config(&minimal_config()).is_ok());
	}

	#[test]
	fn test_zero_ready_timeout_fails() {
		let mut config = minimal_config();
		config.cluster.ready_timeout = Duration::ZERO;

		let err = validate_config(&config).unwrap_err();
		assert!(err.to_string().contains("ready_timeout_secs"));
	}

	#[test]
	fn test_empty_registry_image_fails() {
		let mut config = minimal_config();
		config.registry.image = String::new();

		let err = validate_config(&config).unwrap_err();
		assert!(err.to_string().contains("registry.image"));
	}

	#[test]
	fn test_zero_host_port_fails() {
		let mut config = minimal_config();
		config.registry.host_port = 0;

		let err = validate_config(&config).unwrap_err();
		assert!(err.to_string().contains("host_port"));
	}

	#[test]
	fn test_empty_kind_binary_fails() {
		let mut config = minimal_config();
		config.cluster.kind_binary = "".into();

		assert!(validate_config(&config).is_err());
	}
}
