// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Default configuration file generation.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::ConfigError;

/// Default configuration file template.
///
/// This template is written to ~/.config/kubicle/config.toml when no user config exists.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"#
# kubicle Configuration File
# Location: ~/.config/kubicle/config.toml
#
# Values here are overridden by .kubicle/config.toml in the working
# directory, then by KUBICLE_* environment variables, then by flags.
#

# =============================================================================
# Cluster
# =============================================================================

[cluster]
# Seconds to wait for a new cluster's control plane to become ready
ready_timeout_secs = 300

# kind executable, looked up on PATH unless absolute
kind_binary = "kind"

# Node image passed to `kind create cluster --image`
# node_image = "kindest/node:v1.32.0"

# =============================================================================
# Registry
# =============================================================================

[registry]
# Image the per-cluster registry container runs
image = "registry:2"

# Host port the registry is published on; images are pushed through it
host_port = 5000

# =============================================================================
# Logging Configuration
# =============================================================================

[logging]
# Log level: error, warn, info, debug, trace
level = "info"

# Log format: pretty, json, compact
format = "pretty"
"#;

/// Ensure the config directory exists and create a default config file if none exists.
///
/// Returns `true` if a new config file was created, `false` if one already existed.
pub fn ensure_default_config(config_file_path: &Path) -> Result<bool, ConfigError> {
	if config_file_path.exists() {
		debug!(path = %config_file_path.display(), "config file already exists");
		return Ok(false);
	}

	if let Some(parent) = config_file_path.parent() {
		if !parent.exists() {
			debug!(path = %parent.display(), "creating config directory");
			fs::create_dir_all(parent)?;
		}
	}

	info!(path = %config_file_path.display(), "creating default config file");
	fs::write(config_file_path, DEFAULT_CONFIG_TEMPLATE)?;

	Ok(true)
}
