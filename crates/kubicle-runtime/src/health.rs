// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{RuntimeError, RuntimeResult};

/// Timeout applied when a caller passes zero.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(60);

const POLL_INTERVAL_MS: u64 = 500;

/// Health reported by a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthState {
	Healthy,
	Starting,
	Unhealthy(String),
}

/// Replaces a zero timeout with [`DEFAULT_HEALTH_TIMEOUT`].
pub fn normalize_timeout(timeout: Duration) -> Duration {
	if timeout.is_zero() {
		DEFAULT_HEALTH_TIMEOUT
	} else {
		timeout
	}
}

/// Polls `probe` until it reports healthy, fails, or the timeout elapses.
pub async fn wait_until_healthy<F, Fut>(
	container: &str,
	timeout: Duration,
	mut probe: F,
) -> RuntimeResult<()>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = RuntimeResult<HealthState>>,
{
	let timeout = normalize_timeout(timeout);

	let poll = async {
		loop {
			match probe().await? {
				HealthState::Healthy => return Ok(()),
				HealthState::Starting => {
					debug!(container, "Container not healthy yet");
					tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
				}
				HealthState::Unhealthy(status) => {
					return Err(RuntimeError::Unhealthy {
						container: container.to_string(),
						status,
					})
				}
			}
		}
	};

	match tokio::time::timeout(timeout, poll).await {
		Ok(result) => result,
		Err(_) => Err(RuntimeError::Timeout {
			container: container.to_string(),
			timeout,
		}),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	#[test]
	fn zero_timeout_becomes_one_minute() {
		assert_eq!(normalize_timeout(Duration::ZERO), Duration::from_secs(60));
		assert_eq!(normalize_timeout(Duration::from_secs(5)), Duration::from_secs(5));
	}

	#[tokio::test(start_paused = true)]
	async fn zero_timeout_waits_one_minute() {
		let start = tokio::time::Instant::now();

		let err = wait_until_healthy("registry", Duration::ZERO, || async {
			Ok(HealthState::Starting)
		})
		.await
		.unwrap_err();

		match err {
			RuntimeError::Timeout { timeout, .. } => assert_eq!(timeout, Duration::from_secs(60)),
			other => panic!("expected timeout, got {other:?}"),
		}
		assert!(start.elapsed() >= Duration::from_secs(60));
	}

	#[tokio::test(start_paused = true)]
	async fn becomes_healthy_after_polling() {
		let probes = Arc::new(AtomicUsize::new(0));
		let counter = probes.clone();

		wait_until_healthy("registry", Duration::from_secs(10), move || {
			let n = counter.fetch_add(1, Ordering::SeqCst);
			async move {
				if n < 3 {
					Ok(HealthState::Starting)
				} else {
					Ok(HealthState::Healthy)
				}
			}
		})
		.await
		.unwrap();

		assert_eq!(probes.load(Ordering::SeqCst), 4);
	}

	#[tokio::test]
	async fn unhealthy_fails_immediately() {
		let err = wait_until_healthy("registry", Duration::from_secs(10), || async {
			Ok(HealthState::Unhealthy("exited".to_string()))
		})
		.await
		.unwrap_err();

		assert!(matches!(err, RuntimeError::Unhealthy { ref status, .. } if status == "exited"));
	}

	#[tokio::test]
	async fn probe_errors_propagate() {
		let err = wait_until_healthy("gone", Duration::from_secs(10), || async {
			Err(RuntimeError::NotFound {
				container: "gone".to_string(),
			})
		})
		.await
		.unwrap_err();

		assert!(err.is_not_found());
	}
}
