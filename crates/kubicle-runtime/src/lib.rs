// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Container runtime abstraction for kubicle.
//!
//! This crate provides:
//! - A trait-based container runtime for testability
//! - A Docker engine implementation using bollard
//! - Streaming tar build contexts
//! - An in-memory mock runtime

mod client;
mod context;
mod docker;
mod error;
mod health;
mod mock;
mod types;

pub use client::ContainerRuntime;
pub use context::{stream_tar, BuildContext, CHANNEL_DEPTH, CHUNK_SIZE};
pub use docker::DockerRuntime;
pub use error::{
	BuildContextError, ContainerOperation, ImageOperation, RuntimeError, RuntimeResult,
};
pub use health::{normalize_timeout, wait_until_healthy, HealthState, DEFAULT_HEALTH_TIMEOUT};
pub use mock::{MockCall, MockContainer, MockRuntime};
pub use types::{split_reference, PortMapping, Protocol, RegistryCredentials};
