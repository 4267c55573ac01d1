// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;

/// Transport protocol of a published port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
	#[default]
	Tcp,
	Udp,
}

impl fmt::Display for Protocol {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Protocol::Tcp => f.write_str("tcp"),
			Protocol::Udp => f.write_str("udp"),
		}
	}
}

/// A container port published on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortMapping {
	pub host_port: u16,
	pub container_port: u16,
	pub protocol: Protocol,
}

impl PortMapping {
	pub fn tcp(host_port: u16, container_port: u16) -> Self {
		Self {
			host_port,
			container_port,
			protocol: Protocol::Tcp,
		}
	}

	/// Port key in the `<port>/<proto>` form used by the engine API.
	pub fn container_key(&self) -> String {
		format!("{}/{}", self.container_port, self.protocol)
	}
}

/// Credentials sent with a push. Empty fields mean anonymous access.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RegistryCredentials {
	pub username: String,
	pub password: String,
}

impl RegistryCredentials {
	pub fn anonymous() -> Self {
		Self::default()
	}
}

impl fmt::Debug for RegistryCredentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RegistryCredentials")
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Splits an image reference into repository and tag.
///
/// A colon only separates a tag when it appears after the last `/`, so
/// `localhost:5000/app` has no tag and defaults to `latest`.
pub fn split_reference(reference: &str) -> (&str, &str) {
	let name_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
	let name = &reference[name_start..];
	let name = name.split('@').next().unwrap_or(name);
	match name.rfind(':') {
		Some(pos) => {
			let split = name_start + pos;
			(&reference[..split], &reference[split + 1..])
		}
		None => (reference, "latest"),
	}
}
