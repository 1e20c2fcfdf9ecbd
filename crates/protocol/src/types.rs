//! Core protocol types used across the wire.

use std::fmt;

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Capability name to value mapping.
///
/// Backed by a key-ordered map, so two snapshots with equal contents
/// serialize identically.
pub type CapabilityMap = serde_json::Map<String, serde_json::Value>;

/// Identifier of the always-present native context.
pub const NATIVE_CONTEXT_ID: &str = "NATIVE_APP";

/// Prefix for web-view context identifiers (`WEBVIEW_<page id>`).
pub const WEBVIEW_CONTEXT_PREFIX: &str = "WEBVIEW_";

/// Execution domain a command can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextKind {
	/// The native UI tree driven by the automation engine.
	Native,
	/// An embedded web view driven through the remote-debugging bridge.
	Webview,
}

impl fmt::Display for ContextKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ContextKind::Native => write!(f, "NATIVE"),
			ContextKind::Webview => write!(f, "WEBVIEW"),
		}
	}
}

/// One entry of the context list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
	pub id: String,
	pub kind: ContextKind,
	/// Page title reported by the bridge, web views only.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
}

impl Context {
	/// The native context record.
	pub fn native() -> Self {
		Self {
			id: NATIVE_CONTEXT_ID.to_string(),
			kind: ContextKind::Native,
			title: None,
			url: None,
		}
	}

	/// A web-view context for the bridge page `page_id`.
	pub fn webview(page_id: &str) -> Self {
		Self {
			id: format!("{WEBVIEW_CONTEXT_PREFIX}{page_id}"),
			kind: ContextKind::Webview,
			title: None,
			url: None,
		}
	}

	/// Bridge page id for web-view contexts.
	pub fn page_id(&self) -> Option<&str> {
		match self.kind {
			ContextKind::Native => None,
			ContextKind::Webview => self.id.strip_prefix(WEBVIEW_CONTEXT_PREFIX),
		}
	}

	pub fn is_native(&self) -> bool {
		self.kind == ContextKind::Native
	}
}

/// Device orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Orientation {
	#[default]
	Portrait,
	Landscape,
}

impl Orientation {
	pub fn as_str(self) -> &'static str {
		match self {
			Orientation::Portrait => "PORTRAIT",
			Orientation::Landscape => "LANDSCAPE",
		}
	}
}

impl fmt::Display for Orientation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Window dimensions in points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
	pub width: u32,
	pub height: u32,
}

impl WindowSize {
	/// Swaps width and height.
	pub fn rotated(self) -> Self {
		Self {
			width: self.height,
			height: self.width,
		}
	}
}

/// Supported log sources. The set is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
	/// Device system log.
	Syslog,
	/// Crash reports for the application under test.
	Crashlog,
	/// Performance/timing log.
	Performance,
}

impl LogType {
	/// All supported log types in their advertised order.
	pub const ALL: [LogType; 3] = [LogType::Syslog, LogType::Crashlog, LogType::Performance];

	pub fn as_str(self) -> &'static str {
		match self {
			LogType::Syslog => "syslog",
			LogType::Crashlog => "crashlog",
			LogType::Performance => "performance",
		}
	}

	/// Looks up a log type by its wire name.
	pub fn from_name(name: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|t| t.as_str() == name)
	}
}

impl fmt::Display for LogType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A single log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
	/// Milliseconds since the Unix epoch.
	pub timestamp: u64,
	pub level: String,
	pub message: String,
}

/// Element lookup strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocatorStrategy {
	#[serde(rename = "id")]
	Id,
	#[serde(rename = "accessibility id")]
	AccessibilityId,
	#[serde(rename = "class name")]
	ClassName,
	#[serde(rename = "xpath")]
	Xpath,
	#[serde(rename = "css selector")]
	CssSelector,
}

/// Element locator as sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
	pub using: LocatorStrategy,
	pub value: String,
}

impl Locator {
	pub fn new(using: LocatorStrategy, value: impl Into<String>) -> Self {
		Self {
			using,
			value: value.into(),
		}
	}

	pub fn accessibility_id(value: impl Into<String>) -> Self {
		Self::new(LocatorStrategy::AccessibilityId, value)
	}

	pub fn id(value: impl Into<String>) -> Self {
		Self::new(LocatorStrategy::Id, value)
	}
}

impl fmt::Display for Locator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let using = serde_json::to_value(self.using)
			.ok()
			.and_then(|v| v.as_str().map(str::to_string))
			.unwrap_or_default();
		write!(f, "{using}={}", self.value)
	}
}

/// Opaque handle to an element found by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef {
	#[serde(rename = "ELEMENT")]
	pub id: String,
}

impl ElementRef {
	pub fn new(id: impl Into<String>) -> Self {
		Self { id: id.into() }
	}
}

/// Serialization format of the UI tree returned by `getSource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
	#[default]
	Xml,
	Json,
}

/// Screenshot image payload, base64 on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot(pub Vec<u8>);

impl Screenshot {
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	pub fn to_base64(&self) -> String {
		base64::prelude::BASE64_STANDARD.encode(&self.0)
	}
}

impl Serialize for Screenshot {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_base64())
	}
}

impl<'de> Deserialize<'de> for Screenshot {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let encoded = String::deserialize(deserializer)?;
		base64::prelude::BASE64_STANDARD
			.decode(encoded.as_bytes())
			.map(Screenshot)
			.map_err(serde::de::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn context_kind_uses_uppercase_names() {
		let json = serde_json::to_string(&Context::native()).unwrap();
		assert_eq!(json, r#"{"id":"NATIVE_APP","kind":"NATIVE"}"#);
	}

	#[test]
	fn webview_context_exposes_page_id() {
		let ctx = Context::webview("3.1");
		assert_eq!(ctx.id, "WEBVIEW_3.1");
		assert_eq!(ctx.page_id(), Some("3.1"));
		assert_eq!(Context::native().page_id(), None);
	}

	#[test]
	fn log_type_names_are_fixed() {
		let names: Vec<_> = LogType::ALL.iter().map(|t| t.as_str()).collect();
		assert_eq!(names, ["syslog", "crashlog", "performance"]);
		assert_eq!(LogType::from_name("crashlog"), Some(LogType::Crashlog));
		assert_eq!(LogType::from_name("something-random"), None);
		assert_eq!(LogType::from_name("SYSLOG"), None);
	}

	#[test]
	fn locator_uses_webdriver_strategy_names() {
		let locator = Locator::accessibility_id("Buttons");
		let json = serde_json::to_value(&locator).unwrap();
		assert_eq!(json["using"], "accessibility id");
		assert_eq!(locator.to_string(), "accessibility id=Buttons");
	}

	#[test]
	fn screenshot_is_base64_on_the_wire() {
		let shot = Screenshot(vec![0x89, b'P', b'N', b'G']);
		let json = serde_json::to_value(&shot).unwrap();
		assert_eq!(json, "iVBORw==");
		let back: Screenshot = serde_json::from_value(json).unwrap();
		assert_eq!(back, shot);
	}
}
