// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
	#[error("{binary} is not installed or not in PATH")]
	NotInstalled { binary: String },

	#[error("{binary} command failed: {args:?}: {stderr}")]
	CommandFailed {
		binary: String,
		args: Vec<String>,
		stderr: String,
	},

	#[error("{binary} {args:?} did not finish within {timeout:?}")]
	Timeout {
		binary: String,
		args: Vec<String>,
		timeout: Duration,
	},

	#[error("I/O error: {0}")]
	Io(#[from] io::Error),
}

impl EngineError {
	pub fn is_timeout(&self) -> bool {
		matches!(self, EngineError::Timeout { .. })
	}
}

pub type EngineResult<T> = Result<T, EngineError>;
