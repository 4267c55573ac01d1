// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Image operations reported in [`RuntimeError::Image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOperation {
	Pull,
	Build,
	Push,
	Delete,
}

impl fmt::Display for ImageOperation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let op = match self {
			ImageOperation::Pull => "pull",
			ImageOperation::Build => "build",
			ImageOperation::Push => "push",
			ImageOperation::Delete => "delete",
		};
		f.write_str(op)
	}
}

/// Container operations reported in [`RuntimeError::Container`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerOperation {
	Create,
	Start,
	Inspect,
	Connect,
	Remove,
}

impl fmt::Display for ContainerOperation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let op = match self {
			ContainerOperation::Create => "create",
			ContainerOperation::Start => "start",
			ContainerOperation::Inspect => "inspect",
			ContainerOperation::Connect => "connect",
			ContainerOperation::Remove => "remove",
		};
		f.write_str(op)
	}
}

#[derive(Error, Debug)]
pub enum RuntimeError {
	#[error("container runtime unavailable: {message}")]
	Unavailable { message: String },

	#[error("failed to {operation} image {image}: {message}")]
	Image {
		operation: ImageOperation,
		image: String,
		message: String,
	},

	#[error("failed to {operation} container {container}: {message}")]
	Container {
		operation: ContainerOperation,
		container: String,
		message: String,
	},

	#[error("container not found: {container}")]
	NotFound { container: String },

	#[error("container {container} not healthy after {timeout:?}")]
	Timeout { container: String, timeout: Duration },

	#[error("container {container} is unhealthy: {status}")]
	Unhealthy { container: String, status: String },

	#[error(transparent)]
	BuildContext(#[from] BuildContextError),
}

impl RuntimeError {
	pub fn is_not_found(&self) -> bool {
		matches!(self, RuntimeError::NotFound { .. })
	}

	pub fn is_unavailable(&self) -> bool {
		matches!(self, RuntimeError::Unavailable { .. })
	}
}

/// Errors raised while producing a streamed build context.
#[derive(Error, Debug)]
pub enum BuildContextError {
	#[error("failed to walk {path}: {source}")]
	Walk {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to read {path}: {source}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to write archive: {0}")]
	Archive(#[source] std::io::Error),

	#[error("build context cancelled")]
	Cancelled,

	#[error("build context producer exited without finishing the archive")]
	Interrupted,
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
