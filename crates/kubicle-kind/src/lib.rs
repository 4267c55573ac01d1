// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! kind cluster engine abstraction for kubicle.
//!
//! This crate provides:
//! - A trait-based cluster engine for testability
//! - A kind CLI implementation
//! - The cluster configuration template
//! - A mock engine for tests

mod command;
mod config;
mod engine;
mod error;
mod mock;

pub use command::{KindCommandEngine, COMMAND_TIMEOUT, CREATE_GRACE};
pub use config::{render_cluster_config, write_cluster_config, CLUSTER_CONFIG_TEMPLATE};
pub use engine::ClusterEngine;
pub use error::{EngineError, EngineResult};
pub use mock::{mock_kubeconfig, MockCall, MockEngine};
