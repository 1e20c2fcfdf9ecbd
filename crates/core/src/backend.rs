//! Collaborator interfaces consumed by the coordinator.
//!
//! Each backend is reached only through the narrow set of operations the
//! core needs from it. Implementations live outside this crate, except for
//! the in-memory device in [`crate::sim`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uidrive_protocol::{
	CapabilityMap, ElementRef, Locator, LogEntry, LogType, Orientation, Screenshot, SourceFormat,
	WindowSize,
};

use crate::health::HealthReporter;

/// Result type alias for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Which collaborator produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
	Bootstrap,
	Native,
	Webview,
	Device,
}

impl fmt::Display for BackendKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			BackendKind::Bootstrap => write!(f, "bootstrap"),
			BackendKind::Native => write!(f, "native"),
			BackendKind::Webview => write!(f, "web-view"),
			BackendKind::Device => write!(f, "device"),
		}
	}
}

/// Errors returned by collaborators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
	#[error("{0}")]
	Failed(String),

	/// The application or its automation engine is gone.
	#[error("application terminated: {0}")]
	Terminated(String),

	/// The backend does not implement the named operation.
	#[error("'{0}' is not supported by this backend")]
	NotSupported(String),
}

/// A page exposed by the web-view remote-debugging bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebPage {
	pub id: String,
	pub title: String,
	pub url: String,
}

/// Everything a successful launch hands back to the coordinator.
pub struct LaunchedApp {
	/// Capabilities the engine is authoritative about (bundle id, udid, SDK version).
	pub reported: CapabilityMap,
	pub native: Arc<dyn NativeEngine>,
	pub webview: Arc<dyn WebviewBridge>,
	pub device: Arc<dyn DeviceServices>,
	pub logs: Arc<dyn LogSource>,
}

/// Application bootstrap and teardown.
#[async_trait]
pub trait AppLauncher: Send + Sync {
	/// Installs and launches the application described by `requested`.
	///
	/// `health` must be used to report the backend going down (crash, engine exit).
	async fn launch(&self, requested: &CapabilityMap, health: HealthReporter) -> BackendResult<LaunchedApp>;

	/// Stops the application and releases device resources.
	async fn terminate(&self) -> BackendResult<()>;
}

/// Native UI-tree automation engine.
#[async_trait]
pub trait NativeEngine: Send + Sync {
	async fn source(&self, format: SourceFormat) -> BackendResult<String>;

	/// Single lookup attempt; waiting is handled by the caller.
	async fn find(&self, locator: &Locator) -> BackendResult<Vec<ElementRef>>;

	async fn click(&self, element: &ElementRef) -> BackendResult<()>;

	async fn back(&self) -> BackendResult<()>;

	/// Engine-specific extension such as `mobile: scroll`.
	async fn execute(&self, name: &str, params: &Value) -> BackendResult<Value>;
}

/// Remote-debugging bridge into embedded web views.
#[async_trait]
pub trait WebviewBridge: Send + Sync {
	/// Pages currently attached to the application.
	async fn pages(&self) -> BackendResult<Vec<WebPage>>;

	/// Connects the bridge to `page_id`; later calls target that page.
	async fn attach(&self, page_id: &str) -> BackendResult<()>;

	async fn source(&self) -> BackendResult<String>;

	async fn find(&self, locator: &Locator) -> BackendResult<Vec<ElementRef>>;

	async fn click(&self, element: &ElementRef) -> BackendResult<()>;

	async fn back(&self) -> BackendResult<()>;

	async fn navigate(&self, url: &str) -> BackendResult<()>;

	async fn title(&self) -> BackendResult<String>;

	async fn execute_script(&self, script: &str, args: &Value) -> BackendResult<Value>;
}

/// Device-level sensors and system services.
#[async_trait]
pub trait DeviceServices: Send + Sync {
	async fn screenshot(&self) -> BackendResult<Screenshot>;

	async fn orientation(&self) -> BackendResult<Orientation>;

	async fn set_orientation(&self, orientation: Orientation) -> BackendResult<()>;

	async fn window_size(&self) -> BackendResult<WindowSize>;

	async fn set_geolocation(&self, latitude: f64, longitude: f64) -> BackendResult<()>;

	async fn shake(&self) -> BackendResult<()>;

	/// Sends the application to the background and returns once it is resumed.
	async fn background(&self, duration: Duration) -> BackendResult<()>;
}

/// External log collectors.
#[async_trait]
pub trait LogSource: Send + Sync {
	/// Full buffered contents of the named log, oldest first.
	async fn read(&self, log_type: LogType) -> BackendResult<Vec<LogEntry>>;
}
