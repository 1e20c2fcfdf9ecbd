//! Server configuration file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uidrive::DriverConfig;
use uidrive::sim::SimProfile;

use crate::daemon::default_socket_path;

const CONFIG_DIR: &str = "uidrive";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read config {path}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid config {path}")]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
}

/// Contents of `config.json`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub socket: Option<PathBuf>,
	pub driver: DriverConfig,
	/// Simulated device served by `uidrive serve`.
	pub device: SimProfile,
}

impl ServerConfig {
	/// `$XDG_CONFIG_HOME/uidrive/config.json`, or the platform equivalent.
	pub fn default_path() -> Option<PathBuf> {
		dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
	}

	/// Loads `path`, or the default location when `path` is `None`.
	///
	/// A missing default file yields defaults; a missing explicit file is an error.
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		match path {
			Some(path) => Self::read(path),
			None => match Self::default_path() {
				Some(path) if path.exists() => Self::read(&path),
				_ => Ok(Self::default()),
			},
		}
	}

	fn read(path: &Path) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})
	}

	pub fn socket_path(&self) -> PathBuf {
		self.socket.clone().unwrap_or_else(default_socket_path)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn partial_file_keeps_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(&path, r#"{"driver": {"implicitWaitMs": 2500}, "device": {"sdkVersion": "11.2"}}"#).unwrap();

		let config = ServerConfig::load(Some(&path)).unwrap();
		assert_eq!(config.driver.implicit_wait_ms, 2500);
		assert_eq!(config.driver.command_timeout_ms, DriverConfig::default().command_timeout_ms);
		assert_eq!(config.device.sdk_version, "11.2");
		assert_eq!(config.device.app_name, SimProfile::default().app_name);
		assert_eq!(config.socket, None);
	}

	#[test]
	fn explicit_missing_file_is_an_error() {
		let dir = tempfile::tempdir().unwrap();
		let err = ServerConfig::load(Some(&dir.path().join("nope.json"))).unwrap_err();
		assert!(matches!(err, ConfigError::Read { .. }));
	}

	#[test]
	fn malformed_file_is_reported() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(&path, "{not json").unwrap();
		assert!(matches!(ServerConfig::load(Some(&path)), Err(ConfigError::Parse { .. })));
	}

	#[test]
	fn configured_socket_wins() {
		let config = ServerConfig {
			socket: Some(PathBuf::from("/run/test/uidrive.sock")),
			..ServerConfig::default()
		};
		assert_eq!(config.socket_path(), PathBuf::from("/run/test/uidrive.sock"));
	}
}
