// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, trace, warn};

use crate::engine::ClusterEngine;
use crate::error::{EngineError, EngineResult};

/// Extra time given to `kind create cluster` beyond its readiness wait, to
/// cover node image pulls and node container start-up.
pub const CREATE_GRACE: Duration = Duration::from_secs(300);

/// Deadline for the short query and delete commands.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Cluster engine implementation using the kind CLI.
#[derive(Debug, Clone)]
pub struct KindCommandEngine {
	binary: PathBuf,
	node_image: Option<String>,
}

impl KindCommandEngine {
	pub fn new(binary: impl Into<PathBuf>) -> Self {
		Self {
			binary: binary.into(),
			node_image: None,
		}
	}

	/// Node image passed as `--image` when creating clusters.
	pub fn with_node_image(mut self, image: impl Into<String>) -> Self {
		self.node_image = Some(image.into());
		self
	}

	pub fn binary(&self) -> &Path {
		&self.binary
	}

	fn create_args(&self, name: &str, config: &Path, wait: Duration) -> Vec<String> {
		let mut args = vec![
			"create".to_string(),
			"cluster".to_string(),
			"--name".to_string(),
			name.to_string(),
			"--config".to_string(),
			config.display().to_string(),
			"--wait".to_string(),
			format!("{}s", wait.as_secs().max(1)),
		];
		if let Some(image) = &self.node_image {
			args.push("--image".to_string());
			args.push(image.clone());
		}
		args
	}

	async fn run_kind(&self, args: &[String], timeout: Duration) -> EngineResult<String> {
		self.run_kind_output(args, timeout)
			.await
			.map(|output| output.stdout)
	}

	async fn run_kind_output(
		&self,
		args: &[String],
		timeout: Duration,
	) -> EngineResult<KindOutput> {
		let binary = self.binary.display().to_string();
		let mut cmd = Command::new(&self.binary);
		cmd.args(args)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);

		trace!(cmd = %format!("{} {}", binary, args.join(" ")), "running kind command");

		let output = match tokio::time::timeout(timeout, cmd.output()).await {
			Ok(output) => output.map_err(|e| {
				if e.kind() == std::io::ErrorKind::NotFound {
					warn!(binary = %binary, "kind not found in PATH");
					EngineError::NotInstalled {
						binary: binary.clone(),
					}
				} else {
					EngineError::Io(e)
				}
			})?,
			Err(_) => {
				return Err(EngineError::Timeout {
					binary,
					args: args.to_vec(),
					timeout,
				})
			}
		};

		if output.status.success() {
			Ok(KindOutput {
				stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
				stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
			})
		} else {
			let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
			Err(EngineError::CommandFailed {
				binary,
				args: args.to_vec(),
				stderr,
			})
		}
	}
}

/// Output of a kind command that exited successfully.
struct KindOutput {
	stdout: String,
	stderr: String,
}

impl Default for KindCommandEngine {
	fn default() -> Self {
		Self::new("kind")
	}
}

fn owned(args: &[&str]) -> Vec<String> {
	args.iter().map(|s| s.to_string()).collect()
}

/// Parses `kind get clusters` output. kind reports "No kind clusters found."
/// on stderr, so stdout is empty in that case.
fn parse_cluster_list(output: &str) -> Vec<String> {
	output
		.lines()
		.map(str::trim)
		.filter(|line| !line.is_empty())
		.map(str::to_string)
		.collect()
}

/// Matches kind's readiness timeout report. kind either fails the command or
/// logs "WARNING: Timed out waiting for Ready" and exits 0.
fn looks_like_wait_timeout(stderr: &str) -> bool {
	let stderr = stderr.to_lowercase();
	stderr.contains("timed out") || stderr.contains("deadline exceeded")
}

#[async_trait]
impl ClusterEngine for KindCommandEngine {
	async fn list_clusters(&self) -> EngineResult<Vec<String>> {
		let output = self
			.run_kind(&owned(&["get", "clusters"]), COMMAND_TIMEOUT)
			.await?;
		let clusters = parse_cluster_list(&output);
		debug!(count = clusters.len(), "listed kind clusters");
		Ok(clusters)
	}

	#[instrument(skip(self, config), fields(config = %config.display()))]
	async fn create_cluster(
		&self,
		name: &str,
		config: &Path,
		wait: Duration,
	) -> EngineResult<()> {
		let args = self.create_args(name, config, wait);
		let deadline = wait + CREATE_GRACE;
		info!(wait_secs = wait.as_secs(), "creating kind cluster");

		match self.run_kind_output(&args, deadline).await {
			Ok(output) if looks_like_wait_timeout(&output.stderr) => {
				warn!(stderr = %output.stderr, "kind gave up waiting for the control plane");
				Err(EngineError::Timeout {
					binary: self.binary.display().to_string(),
					args,
					timeout: wait,
				})
			}
			Ok(_) => Ok(()),
			Err(EngineError::CommandFailed {
				binary,
				args,
				stderr,
			}) if looks_like_wait_timeout(&stderr) => {
				debug!(stderr = %stderr, "kind reported a readiness timeout");
				Err(EngineError::Timeout {
					binary,
					args,
					timeout: wait,
				})
			}
			Err(e) => Err(e),
		}
	}

	async fn kubeconfig(&self, name: &str) -> EngineResult<String> {
		self.run_kind(
			&owned(&["get", "kubeconfig", "--name", name]),
			COMMAND_TIMEOUT,
		)
		.await
	}

	#[instrument(skip(self))]
	async fn delete_cluster(&self, name: &str) -> EngineResult<()> {
		self.run_kind(&owned(&["delete", "cluster", "--name", name]), COMMAND_TIMEOUT)
			.await?;
		info!("deleted kind cluster");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_cluster_list() {
		assert_eq!(
			parse_cluster_list("dev\nkind\n\n  test  \n"),
			vec!["dev".to_string(), "kind".to_string(), "test".to_string()]
		);
		assert!(parse_cluster_list("").is_empty());
	}

	#[test]
	fn create_args_include_config_and_wait() {
		let engine = KindCommandEngine::default();
		let args = engine.create_args(
			"dev",
			Path::new("/tmp/kind-config-1.yaml"),
			Duration::from_secs(90),
		);
		assert_eq!(
			args,
			owned(&[
				"create",
				"cluster",
				"--name",
				"dev",
				"--config",
				"/tmp/kind-config-1.yaml",
				"--wait",
				"90s",
			])
		);
	}

	#[test]
	fn create_args_with_node_image() {
		let engine = KindCommandEngine::default().with_node_image("kindest/node:v1.32.0");
		let args = engine.create_args("dev", Path::new("cfg.yaml"), Duration::from_secs(60));
		assert_eq!(&args[args.len() - 2..], &owned(&["--image", "kindest/node:v1.32.0"])[..]);
	}

	#[test]
	fn recognizes_wait_timeouts() {
		assert!(looks_like_wait_timeout(
			"ERROR: failed to create cluster: timed out waiting for the condition"
		));
		assert!(looks_like_wait_timeout(" • WARNING: Timed out waiting for Ready ⚠️"));
		assert!(!looks_like_wait_timeout("ERROR: node(s) already exist for a cluster"));
		assert!(!looks_like_wait_timeout(" ✓ Waiting ≤ 1m0s for control-plane = Ready ⏳"));
	}

	#[tokio::test]
	async fn missing_binary_is_not_installed() {
		let engine = KindCommandEngine::new("/nonexistent/kubicle-kind-binary");
		let err = engine.list_clusters().await.unwrap_err();
		assert!(matches!(err, EngineError::NotInstalled { .. }), "got {err:?}");
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn failing_command_reports_stderr() {
		// `false` exits non-zero without output.
		let engine = KindCommandEngine::new("false");
		let err = engine.delete_cluster("dev").await.unwrap_err();
		match err {
			EngineError::CommandFailed { args, .. } => {
				assert_eq!(args, owned(&["delete", "cluster", "--name", "dev"]));
			}
			other => panic!("expected command failure, got {other:?}"),
		}
	}

	#[cfg(unix)]
	fn fake_kind(dir: &tempfile::TempDir, body: &str) -> PathBuf {
		use std::os::unix::fs::PermissionsExt;

		let path = dir.path().join("kind");
		std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
		std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
		path
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn readiness_warning_on_success_is_timeout() {
		let dir = tempfile::tempdir().unwrap();
		let script = fake_kind(
			&dir,
			"echo ' • WARNING: Timed out waiting for Ready ⚠️' >&2\nexit 0",
		);
		let engine = KindCommandEngine::new(script);

		let err = engine
			.create_cluster("dev", Path::new("cfg.yaml"), Duration::from_secs(1))
			.await
			.unwrap_err();

		match err {
			EngineError::Timeout { args, timeout, .. } => {
				assert_eq!(timeout, Duration::from_secs(1));
				assert_eq!(&args[..4], &owned(&["create", "cluster", "--name", "dev"])[..]);
			}
			other => panic!("expected timeout, got {other:?}"),
		}
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn ready_cluster_creates_cleanly() {
		let dir = tempfile::tempdir().unwrap();
		let script = fake_kind(
			&dir,
			"echo ' ✓ Waiting ≤ 1m0s for control-plane = Ready ⏳' >&2\nexit 0",
		);
		let engine = KindCommandEngine::new(script);

		engine
			.create_cluster("dev", Path::new("cfg.yaml"), Duration::from_secs(60))
			.await
			.unwrap();
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn failed_wait_is_timeout() {
		let dir = tempfile::tempdir().unwrap();
		let script = fake_kind(
			&dir,
			concat!(
				"echo 'ERROR: failed to create cluster: timed out waiting for the condition' >&2\n",
				"exit 1",
			),
		);
		let engine = KindCommandEngine::new(script);

		let err = engine
			.create_cluster("dev", Path::new("cfg.yaml"), Duration::from_secs(1))
			.await
			.unwrap_err();
		assert!(matches!(err, EngineError::Timeout { .. }), "got {err:?}");
	}
}
