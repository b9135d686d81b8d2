//! Demo configuration, read from an optional TOML file.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use nettables::DEFAULT_PORT;
use serde::Deserialize;
use thiserror::Error;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// The file is not valid TOML or has unknown or mistyped keys.
	#[error("invalid config {path}: {error}")]
	Parse {
		/// Path to the offending file.
		path: PathBuf,
		/// The underlying parse error.
		error: toml::de::Error,
	},
}

/// Tunables shared by the server and client loops.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemoConfig {
	/// Delay between two sends of the published table.
	pub publish_period_ms: u64,
	/// Update interval advertised on the published table; non-positive disables it.
	pub update_interval_ms: i32,
	/// Staleness sweep period.
	pub stale_poll_ms: u64,
	/// Listen port of the server, and default port for client endpoints.
	pub port: u16,
	/// Listen address of the server.
	pub bind: IpAddr,
}

impl Default for DemoConfig {
	fn default() -> Self {
		Self {
			publish_period_ms: 1000,
			update_interval_ms: 5000,
			stale_poll_ms: 100,
			port: DEFAULT_PORT,
			bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
		}
	}
}

impl DemoConfig {
	/// Loads `path`, or the defaults when no path is given.
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		let Some(path) = path else {
			return Ok(Self::default());
		};
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::parse(&text).map_err(|error| ConfigError::Parse {
			path: path.to_path_buf(),
			error,
		})
	}

	/// Parses TOML text.
	pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
		toml::from_str(text)
	}

	pub fn publish_period(&self) -> Duration {
		Duration::from_millis(self.publish_period_ms)
	}

	pub fn stale_poll(&self) -> Duration {
		Duration::from_millis(self.stale_poll_ms)
	}

	pub fn bind_addr(&self) -> SocketAddr {
		SocketAddr::new(self.bind, self.port)
	}
}
