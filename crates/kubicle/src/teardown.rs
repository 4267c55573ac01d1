// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Removal of a cluster and its registry.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use kubicle_kind::ClusterEngine;
use kubicle_runtime::ContainerRuntime;
use tracing::{debug, info, instrument, warn};

use crate::identity::RegistryIdentity;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
	RemoveRegistry,
	DeleteCluster,
}

impl fmt::Display for TeardownStep {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TeardownStep::RemoveRegistry => f.write_str("remove registry"),
			TeardownStep::DeleteCluster => f.write_str("delete cluster"),
		}
	}
}

#[derive(Debug)]
pub struct TeardownFailure {
	pub step: TeardownStep,
	pub source: BoxError,
}

/// Every failure from a teardown, in the order the steps ran.
#[derive(Debug, Default)]
pub struct TeardownError {
	failures: Vec<TeardownFailure>,
}

impl TeardownError {
	pub fn push(&mut self, step: TeardownStep, source: impl Into<BoxError>) {
		self.failures.push(TeardownFailure {
			step,
			source: source.into(),
		});
	}

	pub fn is_empty(&self) -> bool {
		self.failures.is_empty()
	}

	pub fn failures(&self) -> &[TeardownFailure] {
		&self.failures
	}

	pub fn into_result(self) -> Result<(), TeardownError> {
		if self.is_empty() {
			Ok(())
		} else {
			Err(self)
		}
	}
}

impl fmt::Display for TeardownError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("teardown failed")?;
		for (i, failure) in self.failures.iter().enumerate() {
			let sep = if i == 0 { ": " } else { "; " };
			write!(f, "{sep}{}: {}", failure.step, failure.source)?;
		}
		Ok(())
	}
}

impl StdError for TeardownError {
	fn source(&self) -> Option<&(dyn StdError + 'static)> {
		self.failures
			.first()
			.map(|failure| failure.source.as_ref() as &(dyn StdError + 'static))
	}
}

/// Removes a cluster's registry container and then the cluster itself.
///
/// Both steps always run. A registry that is already gone and a cluster
/// that no longer exists both count as success, so running a teardown twice
/// is harmless.
#[derive(Clone)]
pub struct Teardown {
	cluster: String,
	runtime: Arc<dyn ContainerRuntime>,
	engine: Arc<dyn ClusterEngine>,
}

impl Teardown {
	pub fn new(
		cluster: &str,
		runtime: Arc<dyn ContainerRuntime>,
		engine: Arc<dyn ClusterEngine>,
	) -> Self {
		Self {
			cluster: cluster.to_string(),
			runtime,
			engine,
		}
	}

	pub fn cluster(&self) -> &str {
		&self.cluster
	}

	#[instrument(skip(self), fields(cluster = %self.cluster))]
	pub async fn run(&self) -> Result<(), TeardownError> {
		let mut errors = TeardownError::default();
		let registry = RegistryIdentity::for_cluster(&self.cluster).container_name();

		match self.runtime.remove_container(&registry, true).await {
			Ok(()) => debug!(container = %registry, "Removed registry container"),
			Err(err) if err.is_not_found() => {
				debug!(container = %registry, "Registry container already gone")
			}
			Err(err) => {
				warn!(container = %registry, error = %err, "Failed to remove registry container");
				errors.push(TeardownStep::RemoveRegistry, err);
			}
		}

		match self.engine.delete_cluster(&self.cluster).await {
			Ok(()) => debug!("Deleted cluster"),
			Err(err) => {
				warn!(error = %err, "Failed to delete cluster");
				errors.push(TeardownStep::DeleteCluster, err);
			}
		}

		if errors.is_empty() {
			info!("Cluster torn down");
		}
		errors.into_result()
	}
}
