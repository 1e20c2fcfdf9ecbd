//! Closed command set.
//!
//! Commands split into two groups: [`DeviceCommand`]s always go to device
//! services, [`RoutedCommand`]s go to the backend matching the active context.

use serde::Serialize;
use serde_json::Value;
use uidrive_protocol::{
	ElementRef, Locator, LogEntry, LogType, Orientation, Screenshot, SourceFormat, WindowSize,
};

/// A single command invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
	Device(DeviceCommand),
	Routed(RoutedCommand),
}

impl Command {
	pub fn name(&self) -> &'static str {
		match self {
			Command::Device(cmd) => cmd.name(),
			Command::Routed(cmd) => cmd.name(),
		}
	}
}

impl From<DeviceCommand> for Command {
	fn from(cmd: DeviceCommand) -> Self {
		Command::Device(cmd)
	}
}

impl From<RoutedCommand> for Command {
	fn from(cmd: RoutedCommand) -> Self {
		Command::Routed(cmd)
	}
}

/// Context-agnostic, device-level commands.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
	Screenshot,
	GetOrientation,
	SetOrientation(Orientation),
	/// Only the literal target `"current"` is supported.
	GetWindowSize { target: String },
	SetGeoLocation { latitude: f64, longitude: f64 },
	Shake,
	/// Never implemented; always fails.
	Lock,
	Background { seconds: f64 },
	ListLogTypes,
	GetLog { log_type: String },
}

impl DeviceCommand {
	pub fn name(&self) -> &'static str {
		match self {
			DeviceCommand::Screenshot => "getScreenshot",
			DeviceCommand::GetOrientation => "getOrientation",
			DeviceCommand::SetOrientation(_) => "setOrientation",
			DeviceCommand::GetWindowSize { .. } => "getWindowSize",
			DeviceCommand::SetGeoLocation { .. } => "setGeoLocation",
			DeviceCommand::Shake => "shakeDevice",
			DeviceCommand::Lock => "lockDevice",
			DeviceCommand::Background { .. } => "backgroundApp",
			DeviceCommand::ListLogTypes => "listLogTypes",
			DeviceCommand::GetLog { .. } => "getLog",
		}
	}
}

/// Commands executed by the native engine or the web-view bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedCommand {
	/// `None` follows the session's `useJSONSource` setting.
	Source { format: Option<SourceFormat> },
	FindElement(Locator),
	FindElements(Locator),
	Click(ElementRef),
	Back,
	NavigateTo { url: String },
	Title,
	/// Backend-specific escape hatch (`mobile: scroll`, or a script in a web view).
	Execute { name: String, params: Value },
}

impl RoutedCommand {
	pub fn name(&self) -> &'static str {
		match self {
			RoutedCommand::Source { .. } => "getSource",
			RoutedCommand::FindElement(_) => "findElement",
			RoutedCommand::FindElements(_) => "findElements",
			RoutedCommand::Click(_) => "click",
			RoutedCommand::Back => "back",
			RoutedCommand::NavigateTo { .. } => "navigateTo",
			RoutedCommand::Title => "getTitle",
			RoutedCommand::Execute { .. } => "execute",
		}
	}

	pub fn kind(&self) -> RoutedKind {
		match self {
			RoutedCommand::Source { .. } => RoutedKind::Source,
			RoutedCommand::FindElement(_) | RoutedCommand::FindElements(_) => RoutedKind::Find,
			RoutedCommand::Click(_) => RoutedKind::Click,
			RoutedCommand::Back => RoutedKind::Back,
			RoutedCommand::NavigateTo { .. } => RoutedKind::Navigate,
			RoutedCommand::Title => RoutedKind::Title,
			RoutedCommand::Execute { .. } => RoutedKind::Execute,
		}
	}
}

/// Column index of the routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutedKind {
	Source = 0,
	Find,
	Click,
	Back,
	Navigate,
	Title,
	Execute,
}

impl RoutedKind {
	pub const COUNT: usize = 7;
}

/// Typed command result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
	Unit,
	Text(String),
	Screenshot(Screenshot),
	Orientation(Orientation),
	WindowSize(WindowSize),
	Element(ElementRef),
	Elements(Vec<ElementRef>),
	LogTypes(Vec<LogType>),
	Logs(Vec<LogEntry>),
	Value(Value),
}

impl Reply {
	/// Wire form of the reply (`null` for [`Reply::Unit`]).
	pub fn into_value(self) -> Value {
		match self {
			Reply::Unit => Value::Null,
			Reply::Value(value) => value,
			other => serde_json::to_value(other).unwrap_or(Value::Null),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn find_variants_share_a_routing_column() {
		let locator = Locator::id("x");
		assert_eq!(RoutedCommand::FindElement(locator.clone()).kind(), RoutedKind::Find);
		assert_eq!(RoutedCommand::FindElements(locator).kind(), RoutedKind::Find);
		assert_eq!(RoutedKind::Execute as usize + 1, RoutedKind::COUNT);
	}

	#[test]
	fn replies_serialize_to_plain_values() {
		assert_eq!(Reply::Unit.into_value(), Value::Null);
		assert_eq!(Reply::Orientation(Orientation::Landscape).into_value(), "LANDSCAPE");
		assert_eq!(
			Reply::WindowSize(WindowSize { width: 375, height: 667 }).into_value(),
			serde_json::json!({"width": 375, "height": 667})
		);
	}
}
