// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::engine::ClusterEngine;
use crate::error::{EngineError, EngineResult};

/// Recorded call to the mock engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockCall {
	ListClusters,
	CreateCluster {
		name: String,
		path: PathBuf,
		/// Contents of the configuration file at the time of the call.
		config: String,
		wait: Duration,
	},
	Kubeconfig(String),
	DeleteCluster(String),
}

/// Mock cluster engine for testing.
#[derive(Clone, Default)]
pub struct MockEngine {
	/// If set, list_clusters returns this error.
	pub list_error: Option<String>,
	/// If set, create_cluster returns this error.
	pub create_error: Option<String>,
	/// If set, create_cluster times out.
	pub create_timeout: bool,
	/// If set, kubeconfig returns this error.
	pub kubeconfig_error: Option<String>,
	/// If set, kubeconfig returns this document instead of a generated one.
	pub kubeconfig_override: Option<String>,
	/// If set, delete_cluster returns this error.
	pub delete_error: Option<String>,
	clusters: Arc<Mutex<BTreeSet<String>>>,
	/// Track calls for verification.
	pub calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockEngine {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_cluster(self, name: &str) -> Self {
		self.clusters.lock().unwrap().insert(name.to_string());
		self
	}

	pub fn with_list_error(mut self, error: impl Into<String>) -> Self {
		self.list_error = Some(error.into());
		self
	}

	pub fn with_create_error(mut self, error: impl Into<String>) -> Self {
		self.create_error = Some(error.into());
		self
	}

	pub fn with_create_timeout(mut self) -> Self {
		self.create_timeout = true;
		self
	}

	pub fn with_kubeconfig_error(mut self, error: impl Into<String>) -> Self {
		self.kubeconfig_error = Some(error.into());
		self
	}

	pub fn with_kubeconfig(mut self, kubeconfig: impl Into<String>) -> Self {
		self.kubeconfig_override = Some(kubeconfig.into());
		self
	}

	pub fn with_delete_error(mut self, error: impl Into<String>) -> Self {
		self.delete_error = Some(error.into());
		self
	}

	/// Returns the recorded calls.
	pub fn get_calls(&self) -> Vec<MockCall> {
		self.calls.lock().unwrap().clone()
	}

	/// Clears recorded calls.
	pub fn clear_calls(&self) {
		self.calls.lock().unwrap().clear();
	}

	pub fn clusters(&self) -> Vec<String> {
		self.clusters.lock().unwrap().iter().cloned().collect()
	}

	fn record(&self, call: MockCall) {
		self.calls.lock().unwrap().push(call);
	}
}

fn failed(args: &[&str], stderr: &str) -> EngineError {
	EngineError::CommandFailed {
		binary: "kind".to_string(),
		args: args.iter().map(|s| s.to_string()).collect(),
		stderr: stderr.to_string(),
	}
}

/// A kubeconfig that parses and builds a client without contacting anything.
pub fn mock_kubeconfig(name: &str) -> String {
	format!(
		r#"apiVersion: v1
kind: Config
clusters:
- name: kind-{name}
  cluster:
    server: https://127.0.0.1:6443
    insecure-skip-tls-verify: true
contexts:
- name: kind-{name}
  context:
    cluster: kind-{name}
    user: kind-{name}
current-context: kind-{name}
users:
- name: kind-{name}
  user:
    token: mock-token
preferences: {{}}
"#
	)
}

#[async_trait]
impl ClusterEngine for MockEngine {
	async fn list_clusters(&self) -> EngineResult<Vec<String>> {
		self.record(MockCall::ListClusters);
		if let Some(ref error) = self.list_error {
			return Err(failed(&["get", "clusters"], error));
		}
		Ok(self.clusters())
	}

	async fn create_cluster(&self, name: &str, config: &Path, wait: Duration) -> EngineResult<()> {
		let contents = std::fs::read_to_string(config)?;
		self.record(MockCall::CreateCluster {
			name: name.to_string(),
			path: config.to_path_buf(),
			config: contents,
			wait,
		});
		if let Some(ref error) = self.create_error {
			return Err(failed(&["create", "cluster", "--name", name], error));
		}
		if self.create_timeout {
			return Err(EngineError::Timeout {
				binary: "kind".to_string(),
				args: vec!["create".to_string(), "cluster".to_string()],
				timeout: wait,
			});
		}
		let mut clusters = self.clusters.lock().unwrap();
		if !clusters.insert(name.to_string()) {
			return Err(failed(
				&["create", "cluster", "--name", name],
				"node(s) already exist for a cluster with the name",
			));
		}
		Ok(())
	}

	async fn kubeconfig(&self, name: &str) -> EngineResult<String> {
		self.record(MockCall::Kubeconfig(name.to_string()));
		if let Some(ref error) = self.kubeconfig_error {
			return Err(failed(&["get", "kubeconfig", "--name", name], error));
		}
		if !self.clusters.lock().unwrap().contains(name) {
			return Err(failed(
				&["get", "kubeconfig", "--name", name],
				"could not locate any control plane nodes",
			));
		}
		Ok(self
			.kubeconfig_override
			.clone()
			.unwrap_or_else(|| mock_kubeconfig(name)))
	}

	async fn delete_cluster(&self, name: &str) -> EngineResult<()> {
		self.record(MockCall::DeleteCluster(name.to_string()));
		if let Some(ref error) = self.delete_error {
			return Err(failed(&["delete", "cluster", "--name", name], error));
		}
		self.clusters.lock().unwrap().remove(name);
		Ok(())
	}
}
