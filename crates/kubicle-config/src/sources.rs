// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: files, environment, CLI, defaults.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::layer::ConfigLayer;
use crate::paths::{PathsConfig, SYSTEM_CONFIG_FILE, WORKSPACE_CONFIG_FILE};
use crate::ConfigError;

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	SystemFile = 20,
	UserFile = 30,
	WorkspaceFile = 40,
	ExplicitFile = 45,
	Environment = 50,
	Cli = 60,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	/// Name for logging
	fn name(&self) -> &'static str;

	/// Precedence level
	fn precedence(&self) -> Precedence;

	/// Load configuration layer from this source
	fn load(&self) -> Result<ConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}
	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		debug!("loading defaults");
		// Defaults are applied during finalization.
		Ok(ConfigLayer::default())
	}
}

/// File-based configuration source (TOML).
pub struct FileSource {
	path: PathBuf,
	precedence: Precedence,
	name: &'static str,
	required: bool,
}

impl FileSource {
	/// System config: /etc/kubicle/config.toml
	pub fn system() -> Self {
		Self::custom(PathBuf::from(SYSTEM_CONFIG_FILE), Precedence::SystemFile, "system-config")
	}

	/// User config: ~/.config/kubicle/config.toml
	pub fn user(paths: &PathsConfig) -> Self {
		Self::custom(paths.user_config_file.clone(), Precedence::UserFile, "user-config")
	}

	/// Workspace config: .kubicle/config.toml
	pub fn workspace() -> Result<Self, ConfigError> {
		let cwd = std::env::current_dir()?;
		Ok(Self::custom(
			cwd.join(WORKSPACE_CONFIG_FILE),
			Precedence::WorkspaceFile,
			"workspace-config",
		))
	}

	/// A file named on the command line. It must exist.
	pub fn explicit(path: PathBuf) -> Self {
		Self {
			required: true,
			..Self::custom(path, Precedence::ExplicitFile, "explicit-config")
		}
	}

	/// Custom file path with specified precedence
	pub fn custom(path: PathBuf, precedence: Precedence, name: &'static str) -> Self {
		Self {
			path,
			precedence,
			name,
			required: false,
		}
	}
}

impl ConfigSource for FileSource {
	fn name(&self) -> &'static str {
		self.name
	}
	fn precedence(&self) -> Precedence {
		self.precedence
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		if !self.required && !self.path.exists() {
			debug!(
				path = %self.path.display(),
				source = self.name,
				"config file not found, skipping"
			);
			return Ok(ConfigLayer::default());
		}

		debug!(path = %self.path.display(), source = self.name, "loading config file");

		let content = std::fs::read_to_string(&self.path)?;
		let layer: ConfigLayer = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: self.path.clone(),
			source: e,
		})?;

		trace!(source = self.name, "parsed config layer");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Recognized variables: KUBICLE_READY_TIMEOUT_SECS, KUBICLE_KIND_BINARY,
/// KUBICLE_NODE_IMAGE, KUBICLE_REGISTRY_IMAGE, KUBICLE_REGISTRY_HOST_PORT,
/// KUBICLE_LOG_LEVEL, KUBICLE_LOG_FORMAT.
pub struct EnvSource;

impl EnvSource {
	/// Build a layer from explicit key/value pairs.
	pub fn layer_from_vars<I>(vars: I) -> Result<ConfigLayer, ConfigError>
	where
		I: IntoIterator<Item = (String, String)>,
	{
		let mut layer = ConfigLayer::default();

		for (key, value) in vars {
			if !key.starts_with("KUBICLE_") {
				continue;
			}

			let value = value.trim().to_string();
			if value.is_empty() {
				continue;
			}

			trace!(key = %key, "processing env var");

			match key.as_str() {
				"KUBICLE_READY_TIMEOUT_SECS" => {
					layer.cluster_mut().ready_timeout_secs = Some(parse_number(&key, &value)?);
				}
				"KUBICLE_KIND_BINARY" => {
					layer.cluster_mut().kind_binary = Some(PathBuf::from(value));
				}
				"KUBICLE_NODE_IMAGE" => {
					layer.cluster_mut().node_image = Some(value);
				}
				"KUBICLE_REGISTRY_IMAGE" => {
					layer.registry_mut().image = Some(value);
				}
				"KUBICLE_REGISTRY_HOST_PORT" => {
					layer.registry_mut().host_port = Some(parse_number(&key, &value)?);
				}
				"KUBICLE_LOG_LEVEL" => {
					layer.logging_mut().level = Some(value);
				}
				"KUBICLE_LOG_FORMAT" => {
					layer.logging_mut().format = Some(value);
				}
				_ => {
					// Unknown KUBICLE_ variable, ignore
				}
			}
		}

		Ok(layer)
	}
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
	T::Err: std::fmt::Display,
{
	value
		.parse()
		.map_err(|e: T::Err| ConfigError::invalid_value(key, format!("{value:?}: {e}")))
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}
	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Self::layer_from_vars(std::env::vars())
	}
}

/// CLI argument overrides.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
	pub log_level: Option<String>,
	pub log_format: Option<String>,
	pub ready_timeout_secs: Option<u64>,
	pub config_file: Option<PathBuf>,
}

/// CLI override source.
pub struct CliSource {
	overrides: CliOverrides,
}

impl CliSource {
	pub fn new(overrides: CliOverrides) -> Self {
		Self { overrides }
	}
}

impl ConfigSource for CliSource {
	fn name(&self) -> &'static str {
		"cli"
	}
	fn precedence(&self) -> Precedence {
		Precedence::Cli
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		debug!("loading CLI overrides");
		let mut layer = ConfigLayer::default();

		if let Some(ref level) = self.overrides.log_level {
			layer.logging_mut().level = Some(level.clone());
		}

		if let Some(ref format) = self.overrides.log_format {
			layer.logging_mut().format = Some(format.clone());
		}

		if let Some(secs) = self.overrides.ready_timeout_secs {
			layer.cluster_mut().ready_timeout_secs = Some(secs);
		}

		Ok(layer)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::Cli > Precedence::Environment);
		assert!(Precedence::Environment > Precedence::ExplicitFile);
		assert!(Precedence::ExplicitFile > Precedence::WorkspaceFile);
		assert!(Precedence::WorkspaceFile > Precedence::UserFile);
		assert!(Precedence::UserFile > Precedence::SystemFile);
		assert!(Precedence::SystemFile > Precedence::Defaults);
	}

	#[test]
	fn test_defaults_source_returns_empty_layer() {
		let layer = DefaultsSource.load().unwrap();
		assert!(layer.cluster.is_none());
		assert!(layer.registry.is_none());
	}

	#[test]
	fn test_file_source_missing_file_returns_empty() {
		let source = FileSource::custom(
			PathBuf::from("/nonexistent/config.toml"),
			Precedence::UserFile,
			"test",
		);
		let layer = source.load().unwrap();
		assert!(layer.cluster.is_none());
	}

	#[test]
	fn test_explicit_file_must_exist() {
		let source = FileSource::explicit(PathBuf::from("/nonexistent/config.toml"));
		assert!(matches!(source.load(), Err(ConfigError::Io(_))));
	}

	#[test]
	fn test_file_source_reports_parse_errors() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("config.toml");
		std::fs::write(&path, "[registry\nimage = ").unwrap();

		let source = FileSource::custom(path.clone(), Precedence::UserFile, "test");
		match source.load() {
			Err(ConfigError::TomlParse { path: p, .. }) => assert_eq!(p, path),
			other => panic!("expected parse error, got {other:?}"),
		}
	}

	#[test]
	fn test_env_vars_populate_layer() {
		let layer = EnvSource::layer_from_vars(vars(&[
			("KUBICLE_READY_TIMEOUT_SECS", "90"),
			("KUBICLE_REGISTRY_HOST_PORT", "5001"),
			("KUBICLE_NODE_IMAGE", "kindest/node:v1.32.0"),
			("KUBICLE_LOG_FORMAT", "json"),
			("PATH", "/usr/bin"),
		]))
		.unwrap();

		assert_eq!(layer.cluster.as_ref().unwrap().ready_timeout_secs, Some(90));
		assert_eq!(
			layer.cluster.as_ref().unwrap().node_image.as_deref(),
			Some("kindest/node:v1.32.0")
		);
		assert_eq!(layer.registry.unwrap().host_port, Some(5001));
		assert_eq!(layer.logging.unwrap().format.as_deref(), Some("json"));
	}

	#[test]
	fn test_env_empty_values_are_ignored() {
		let layer = EnvSource::layer_from_vars(vars(&[("KUBICLE_REGISTRY_IMAGE", "  ")])).unwrap();
		assert!(layer.registry.is_none());
	}

	#[test]
	fn test_env_invalid_number_is_rejected() {
		let err = EnvSource::layer_from_vars(vars(&[("KUBICLE_REGISTRY_HOST_PORT", "70000")]))
			.unwrap_err();
		assert!(err.to_string().contains("KUBICLE_REGISTRY_HOST_PORT"));
	}

	#[test]
	fn test_cli_overrides() {
		let layer = CliSource::new(CliOverrides {
			log_level: Some("trace".to_string()),
			ready_timeout_secs: Some(30),
			..Default::default()
		})
		.load()
		.unwrap();

		assert_eq!(layer.logging.unwrap().level.as_deref(), Some("trace"));
		assert_eq!(layer.cluster.unwrap().ready_timeout_secs, Some(30));
	}
}
