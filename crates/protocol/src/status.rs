//! Health and session descriptors.

use serde::{Deserialize, Serialize};

use crate::types::CapabilityMap;

/// Readiness of the automation backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendHealth {
	/// True while the application and its automation engine are up.
	pub ready: bool,
	/// Last reason the backend went down, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
	pub version: String,
}

/// Liveness descriptor returned by `status`.
///
/// `busy` reports a command in flight; it is never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
	pub ready: bool,
	pub busy: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
	pub backend: BackendHealth,
	pub build: BuildInfo,
}

/// Merged capabilities plus the mutable settings overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCapabilities {
	pub session_id: String,
	/// Unix epoch seconds at which the session was created.
	pub created_at: u64,
	pub capabilities: CapabilityMap,
	pub settings: CapabilityMap,
}
