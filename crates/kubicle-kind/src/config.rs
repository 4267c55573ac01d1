// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::io::{self, Write};

use tempfile::NamedTempFile;

const ADDRESS_TOKEN: &str = "{{address}}";

/// kind cluster configuration with one control-plane and one worker node.
///
/// containerd on every node mirrors both `localhost:5000` and the
/// in-network registry address to the registry container.
pub const CLUSTER_CONFIG_TEMPLATE: &str = r#"kind: Cluster
apiVersion: kind.x-k8s.io/v1alpha4
nodes:
  - role: control-plane
  - role: worker
containerdConfigPatches:
  - |-
    [plugins."io.containerd.grpc.v1.cri".registry.mirrors."localhost:5000"]
      endpoint = ["http://{{address}}"]
    [plugins."io.containerd.grpc.v1.cri".registry.mirrors."{{address}}"]
      endpoint = ["http://{{address}}"]
"#;

/// Renders [`CLUSTER_CONFIG_TEMPLATE`] for a registry reachable at `address`.
pub fn render_cluster_config(address: &str) -> String {
	CLUSTER_CONFIG_TEMPLATE.replace(ADDRESS_TOKEN, address)
}

/// Writes the rendered configuration to a scratch file.
///
/// The file is removed when the returned handle is dropped.
pub fn write_cluster_config(address: &str) -> io::Result<NamedTempFile> {
	let mut file = tempfile::Builder::new()
		.prefix("kind-config-")
		.suffix(".yaml")
		.tempfile()?;
	file.write_all(render_cluster_config(address).as_bytes())?;
	file.flush()?;
	Ok(file)
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn renders_registry_mirrors() {
		let config = render_cluster_config("dev-registry:5000");
		assert!(config.contains(r#"mirrors."localhost:5000"]"#));
		assert!(config.contains(r#"mirrors."dev-registry:5000"]"#));
		assert!(config.contains(r#"endpoint = ["http://dev-registry:5000"]"#));
		assert!(!config.contains("{{"));
	}

	#[test]
	fn declares_two_nodes() {
		let config = render_cluster_config("dev-registry:5000");
		assert_eq!(config.matches("- role: control-plane").count(), 1);
		assert_eq!(config.matches("- role: worker").count(), 1);
	}

	#[test]
	fn scratch_file_is_removed_on_drop() {
		let file = write_cluster_config("dev-registry:5000").unwrap();
		let path = file.path().to_path_buf();
		let name = path.file_name().unwrap().to_string_lossy().into_owned();
		assert!(name.starts_with("kind-config-"));
		assert!(name.ends_with(".yaml"));
		assert_eq!(
			std::fs::read_to_string(&path).unwrap(),
			render_cluster_config("dev-registry:5000")
		);

		drop(file);
		assert!(!path.exists());
	}

	proptest! {
		/// Every token is substituted, whatever the cluster name.
		#[test]
		fn no_token_survives_rendering(name in "[a-z][a-z0-9-]{0,20}[a-z0-9]") {
			let address = format!("{name}-registry:5000");
			let config = render_cluster_config(&address);
			prop_assert!(!config.contains(ADDRESS_TOKEN));
			prop_assert_eq!(config.matches(address.as_str()).count(), 3);
		}
	}
}
