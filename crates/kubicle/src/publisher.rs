// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::Path;
use std::sync::Arc;

use kubicle_runtime::{stream_tar, ContainerRuntime, RegistryCredentials};
use tracing::{debug, info, instrument, warn};

use crate::error::{ClusterError, PublishPhase};

/// Builds images from a directory and pushes them to a cluster registry
/// through its host port.
#[derive(Clone)]
pub struct ImagePublisher {
	runtime: Arc<dyn ContainerRuntime>,
	host_port: u16,
}

impl ImagePublisher {
	pub fn new(runtime: Arc<dyn ContainerRuntime>, host_port: u16) -> Self {
		Self { runtime, host_port }
	}

	/// Tag the image is built and pushed under on the host.
	pub fn local_tag(&self, image: &str) -> String {
		format!("localhost:{}/{image}", self.host_port)
	}

	/// Build `dir` as `image`, push it, and drop the local copy.
	///
	/// A failed push still attempts the delete but reports the push error.
	/// A failed delete after a successful push is an error.
	#[instrument(skip(self, dir), fields(dir = %dir.display()))]
	pub async fn publish(&self, image: &str, dir: &Path) -> Result<(), ClusterError> {
		let tag = self.local_tag(image);
		let fail = |phase: PublishPhase| {
			let tag = tag.clone();
			move |source| ClusterError::Publish {
				phase,
				image: tag,
				source,
			}
		};

		self.runtime
			.build_image(&tag, stream_tar(dir))
			.await
			.map_err(fail(PublishPhase::Build))?;
		debug!(tag = %tag, "Built image");

		let pushed = self
			.runtime
			.push_image(&tag, &RegistryCredentials::anonymous())
			.await;
		let deleted = self.runtime.delete_image(&tag, true).await;

		match (pushed, deleted) {
			(Ok(()), Ok(())) => {
				info!(tag = %tag, "Published image");
				Ok(())
			}
			(Ok(()), Err(err)) => Err(fail(PublishPhase::Delete)(err)),
			(Err(err), deleted) => {
				if let Err(cleanup) = deleted {
					warn!(
						tag = %tag,
						error = %cleanup,
						"Failed to delete local image after failed push"
					);
				}
				Err(fail(PublishPhase::Push)(err))
			}
		}
	}
}
