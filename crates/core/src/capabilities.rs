//! Capability negotiation.
//!
//! The engine is authoritative about runtime facts, so its reported values
//! overwrite same-named requested values. Everything else passes through.

use serde_json::Value;
use tracing::debug;
use uidrive_protocol::CapabilityMap;

use crate::error::{Error, Result};

/// Engine-reported bundle identifier.
pub const BUNDLE_ID_KEY: &str = "CFBundleIdentifier";
/// Client-side spelling of the bundle identifier.
pub const REQUESTED_BUNDLE_ID_KEY: &str = "bundleId";
pub const PLATFORM_VERSION_KEY: &str = "platformVersion";
pub const SDK_VERSION_KEY: &str = "sdkVersion";

/// Ephemeral fields excluded from capability snapshots unless asked for.
pub const DIAGNOSTIC_KEYS: &[&str] = &["events"];

/// Overlays `reported` onto `requested`.
///
/// Fails when the merged set has no bundle identifier, or when the reported
/// SDK version does not extend the requested platform version.
pub fn merge(requested: &CapabilityMap, reported: &CapabilityMap) -> Result<CapabilityMap> {
	let mut merged = requested.clone();
	for (key, value) in reported {
		if let Some(previous) = merged.insert(key.clone(), value.clone()) {
			if previous != *value {
				debug!(target = "uidrive.caps", key = %key, "engine value overrides requested value");
			}
		}
	}

	if bundle_id(&merged).is_none() {
		return Err(Error::SessionStart(format!(
			"missing required bundle identifier ('{BUNDLE_ID_KEY}' or '{REQUESTED_BUNDLE_ID_KEY}')"
		)));
	}

	if let (Some(requested_version), Some(sdk)) = (
		requested.get(PLATFORM_VERSION_KEY).and_then(Value::as_str),
		reported.get(SDK_VERSION_KEY).and_then(Value::as_str),
	) {
		if !sdk_version_matches(requested_version, sdk) {
			return Err(Error::SessionStart(format!(
				"requested platform version {requested_version} but device runs {sdk}"
			)));
		}
	}

	Ok(merged)
}

/// Bundle identifier from either the engine or the client spelling.
pub fn bundle_id(caps: &CapabilityMap) -> Option<&str> {
	[BUNDLE_ID_KEY, REQUESTED_BUNDLE_ID_KEY]
		.iter()
		.filter_map(|key| caps.get(*key).and_then(Value::as_str))
		.find(|id| !id.trim().is_empty())
}

/// True when `reported` equals `requested` or extends it by further components.
///
/// `"10.3"` matches `"10.3"` and `"10.3.1"`, but not `"10.30"`.
pub fn sdk_version_matches(requested: &str, reported: &str) -> bool {
	let requested: Vec<&str> = requested.trim().split('.').collect();
	let reported: Vec<&str> = reported.trim().split('.').collect();
	requested.len() <= reported.len() && requested.iter().zip(&reported).all(|(a, b)| a == b)
}

/// Copy of `caps` with [`DIAGNOSTIC_KEYS`] removed.
pub fn without_diagnostics(caps: &CapabilityMap) -> CapabilityMap {
	caps.iter()
		.filter(|(key, _)| !DIAGNOSTIC_KEYS.contains(&key.as_str()))
		.map(|(key, value)| (key.clone(), value.clone()))
		.collect()
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn caps(value: Value) -> CapabilityMap {
		match value {
			Value::Object(map) => map,
			_ => panic!("expected object"),
		}
	}

	#[test]
	fn engine_values_win_and_requested_values_pass_through() {
		let requested = caps(json!({
			"platformName": "iOS",
			"platformVersion": "10.3",
			"deviceName": "iPhone 6",
			"app": "/apps/UICatalog.app",
			"browserName": "",
		}));
		let reported = caps(json!({
			"CFBundleIdentifier": "com.example.apple-samplecode.UICatalog",
			"browserName": "UICatalog",
			"device": "iphone",
			"sdkVersion": "10.3.1",
			"udid": "A1B2",
		}));

		let merged = merge(&requested, &reported).unwrap();

		assert_eq!(merged["platformName"], "iOS");
		assert_eq!(merged["app"], "/apps/UICatalog.app");
		assert_eq!(merged["browserName"], "UICatalog");
		assert_eq!(merged["device"], "iphone");
		assert_eq!(merged["udid"], "A1B2");
		assert_eq!(merged.len(), 9);
	}

	#[test]
	fn merge_requires_a_bundle_id() {
		let requested = caps(json!({"platformName": "iOS"}));
		let err = merge(&requested, &CapabilityMap::new()).unwrap_err();
		assert!(matches!(err, Error::SessionStart(_)));

		let requested = caps(json!({"bundleId": "com.example.app"}));
		assert!(merge(&requested, &CapabilityMap::new()).is_ok());

		let requested = caps(json!({"bundleId": "  "}));
		assert!(merge(&requested, &CapabilityMap::new()).is_err());
	}

	#[test]
	fn merge_rejects_mismatched_sdk() {
		let requested = caps(json!({"platformVersion": "11.0", "bundleId": "a.b"}));
		let reported = caps(json!({"sdkVersion": "10.3.1"}));
		assert!(merge(&requested, &reported).is_err());
	}

	#[test]
	fn sdk_prefix_matching_is_component_wise() {
		assert!(sdk_version_matches("10.3", "10.3"));
		assert!(sdk_version_matches("10.3", "10.3.1"));
		assert!(sdk_version_matches("10", "10.3.1"));
		assert!(!sdk_version_matches("10.3", "10.30"));
		assert!(!sdk_version_matches("10.3.1", "10.3"));
	}

	#[test]
	fn diagnostics_are_stripped() {
		let full = caps(json!({"bundleId": "a.b", "events": {"click": [3]}}));
		let clean = without_diagnostics(&full);
		assert!(clean.get("events").is_none());
		assert_eq!(clean["bundleId"], "a.b");
	}
}
