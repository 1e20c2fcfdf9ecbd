use serde::{Deserialize, Serialize};
use serde_json::Value;
use uidrive::protocol::{CapabilityMap, ElementRef, Locator, Orientation, SourceFormat, StatusReport};

fn current_window() -> String {
	uidrive::router::CURRENT_WINDOW.to_string()
}

/// One request line sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
	Status,
	CreateSession {
		#[serde(default)]
		capabilities: CapabilityMap,
	},
	DeleteSession,
	GetSessionCapabilities {
		/// Include ephemeral fields such as per-command timings.
		#[serde(default)]
		include_diagnostics: bool,
	},
	GetSettings,
	UpdateSettings {
		settings: CapabilityMap,
	},
	SetImplicitWait {
		ms: u64,
	},
	GetSource {
		#[serde(default)]
		format: Option<SourceFormat>,
	},
	GetScreenshot,
	BackgroundApp {
		seconds: f64,
	},
	GetOrientation,
	SetOrientation {
		orientation: Orientation,
	},
	GetWindowSize {
		#[serde(default = "current_window")]
		window: String,
	},
	SetGeoLocation {
		latitude: f64,
		longitude: f64,
	},
	ShakeDevice,
	LockDevice,
	ListLogTypes,
	GetLog {
		log_type: String,
	},
	ListContexts,
	GetContext,
	SetContext {
		id: String,
	},
	FindElement {
		locator: Locator,
	},
	FindElements {
		locator: Locator,
	},
	Click {
		element: ElementRef,
	},
	Back,
	NavigateTo {
		url: String,
	},
	GetTitle,
	Execute {
		name: String,
		#[serde(default)]
		params: Value,
	},
	Shutdown,
}

/// One response line written by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
	Ok {
		#[serde(default)]
		value: Value,
	},
	Status(StatusReport),
	Error {
		code: String,
		message: String,
	},
}

impl Response {
	pub fn ok(value: Value) -> Self {
		Response::Ok { value }
	}

	pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
		Response::Error {
			code: code.into(),
			message: message.into(),
		}
	}
}

impl From<uidrive::Error> for Response {
	fn from(err: uidrive::Error) -> Self {
		Response::error(err.code(), err.to_string())
	}
}
