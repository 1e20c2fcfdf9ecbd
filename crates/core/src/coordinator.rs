//! Session coordinator: lifecycle, the execution lock, and the status path.
//!
//! Two entry points share nothing but the published [`HealthBoard`]:
//!
//! - [`SessionCoordinator::status`] reads the latest health snapshot and
//!   never waits on the execution lock or a backend.
//! - [`SessionCoordinator::execute`] (and every other session operation)
//!   holds the execution lock for the duration of one command.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uidrive_protocol::{
	CapabilityMap, Context, ElementRef, Locator, LogEntry, LogType, Orientation, Screenshot,
	SessionCapabilities, SourceFormat, StatusReport, WindowSize,
};
use uuid::Uuid;

use crate::backend::AppLauncher;
use crate::capabilities;
use crate::command::{Command, DeviceCommand, Reply, RoutedCommand};
use crate::config::DriverConfig;
use crate::context::ContextRegistry;
use crate::error::{Error, Result};
use crate::health::{BusyGuard, CallGuard, HealthBoard};
use crate::logs::LogAggregator;
use crate::router::{self, CommandRouter, RouteParams};

/// Mutable setting toggling the JSON source format.
pub const USE_JSON_SOURCE: &str = "useJSONSource";

/// Most recent durations kept per command name.
const EVENT_SAMPLES: usize = 64;

/// Per-command durations in milliseconds, oldest first.
#[derive(Debug, Default)]
struct CommandEvents(BTreeMap<&'static str, VecDeque<u64>>);

impl CommandEvents {
	fn record(&mut self, command: &'static str, elapsed: Duration) {
		let samples = self.0.entry(command).or_default();
		if samples.len() == EVENT_SAMPLES {
			samples.pop_front();
		}
		samples.push_back(elapsed.as_millis() as u64);
	}

	fn to_value(&self) -> Value {
		serde_json::json!(self.0)
	}
}

/// One automated application run, from launch to teardown.
pub struct Session {
	id: String,
	capabilities: CapabilityMap,
	settings: CapabilityMap,
	created_at: u64,
	implicit_wait: Duration,
	registry: ContextRegistry,
	router: CommandRouter,
	events: CommandEvents,
}

impl Session {
	fn use_json_source(&self) -> bool {
		self.settings.get(USE_JSON_SOURCE).and_then(Value::as_bool).unwrap_or(false)
	}

	fn snapshot(&self, include_diagnostics: bool) -> SessionCapabilities {
		let mut capabilities = capabilities::without_diagnostics(&self.capabilities);
		if include_diagnostics {
			capabilities.insert("events".to_string(), self.events.to_value());
		}
		SessionCapabilities {
			session_id: self.id.clone(),
			created_at: self.created_at,
			capabilities,
			settings: self.settings.clone(),
		}
	}

	async fn execute(&mut self, command: Command) -> Result<Reply> {
		match command {
			Command::Device(cmd) => self.router.route_device(cmd).await,
			Command::Routed(cmd) => {
				let resolved = self.registry.resolve_active(self.router.guard()).await.cloned();
				let context = match resolved {
					Ok(context) => context,
					Err(err) => {
						if matches!(err, Error::StaleContext { .. }) {
							self.router.detach();
						}
						return Err(err);
					}
				};
				let params = RouteParams {
					implicit_wait: self.implicit_wait,
					use_json_source: self.use_json_source(),
				};
				self.router.route(cmd, &context, params).await
			}
		}
	}

	fn record(&mut self, command: &'static str, elapsed: Duration) {
		self.events.record(command, elapsed);
	}
}

/// Scoped hold on the execution lock.
///
/// Dropping it clears the busy flag, then releases the lock, on every exit path.
struct ExecutionLock<'a> {
	_busy: BusyGuard<'a>,
	slot: MutexGuard<'a, Option<Session>>,
}

impl ExecutionLock<'_> {
	fn session(&mut self) -> Result<&mut Session> {
		self.slot.as_mut().ok_or(Error::NoSession)
	}
}

/// Owns the single live session and serializes commands against it.
pub struct SessionCoordinator {
	launcher: Arc<dyn AppLauncher>,
	config: DriverConfig,
	health: HealthBoard,
	session: Mutex<Option<Session>>,
}

impl SessionCoordinator {
	pub fn new(launcher: Arc<dyn AppLauncher>, config: DriverConfig) -> Self {
		Self {
			launcher,
			config,
			health: HealthBoard::new(),
			session: Mutex::new(None),
		}
	}

	/// Liveness descriptor. Never takes the execution lock.
	pub fn status(&self) -> StatusReport {
		self.health.snapshot().to_report()
	}

	async fn lock(&self) -> ExecutionLock<'_> {
		let slot = self.session.lock().await;
		ExecutionLock {
			_busy: self.health.busy(),
			slot,
		}
	}

	/// Launches the application and creates the one live session.
	pub async fn start_session(&self, requested: CapabilityMap) -> Result<SessionCapabilities> {
		let mut lock = self.lock().await;
		if let Some(existing) = lock.slot.as_ref() {
			return Err(Error::SessionStart(format!("session {} is already running", existing.id)));
		}

		info!(target = "uidrive.session", "launching application");
		let launch = self.launcher.launch(&requested, self.health.reporter());
		let launched = match tokio::time::timeout(self.config.command_timeout(), launch).await {
			Ok(Ok(launched)) => launched,
			Ok(Err(err)) => return Err(Error::SessionStart(format!("bootstrap failed: {err}"))),
			Err(_) => {
				// The launch may have got as far as starting the application.
				if let Err(teardown) = self.launcher.terminate().await {
					warn!(target = "uidrive.session", error = %teardown, "teardown after bootstrap timeout");
				}
				return Err(Error::SessionStart(format!(
					"bootstrap did not finish within {}ms",
					self.config.command_timeout_ms
				)));
			}
		};

		let capabilities = match capabilities::merge(&requested, &launched.reported) {
			Ok(capabilities) => capabilities,
			Err(err) => {
				if let Err(teardown) = self.launcher.terminate().await {
					warn!(target = "uidrive.session", error = %teardown, "teardown after failed merge");
				}
				return Err(err);
			}
		};

		let id = Uuid::new_v4().to_string();
		self.health.session_started(&id);

		let guard = CallGuard::new(self.config.command_timeout(), self.health.subscribe());
		let router = CommandRouter::new(
			launched.native,
			Arc::clone(&launched.webview),
			launched.device,
			LogAggregator::new(launched.logs),
			guard,
			self.config.element_poll_interval(),
		);

		let mut settings = CapabilityMap::new();
		settings.insert(USE_JSON_SOURCE.to_string(), Value::Bool(false));

		let session = Session {
			id: id.clone(),
			capabilities,
			settings,
			created_at: SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs(),
			implicit_wait: self.config.implicit_wait(),
			registry: ContextRegistry::new(launched.webview),
			router,
			events: CommandEvents::default(),
		};
		let snapshot = session.snapshot(false);
		*lock.slot = Some(session);

		info!(
			target = "uidrive.session",
			session_id = %id,
			bundle_id = capabilities::bundle_id(&snapshot.capabilities).unwrap_or_default(),
			"session started"
		);
		Ok(snapshot)
	}

	/// Tears down the application. Calling it without a session is a no-op.
	///
	/// An in-flight command is failed first so the execution lock is freed
	/// rather than waited on until the command finishes.
	pub async fn delete_session(&self) -> Result<()> {
		if self.health.snapshot().session_id.is_some() {
			self.health.interrupt("session deleted");
		}

		let mut slot = self.session.lock().await;
		let Some(session) = slot.take() else {
			debug!(target = "uidrive.session", "delete requested without a session");
			return Ok(());
		};

		if let Err(err) = self.launcher.terminate().await {
			warn!(target = "uidrive.session", session_id = %session.id, error = %err, "application teardown failed");
		}
		self.health.session_ended();
		info!(target = "uidrive.session", session_id = %session.id, "session deleted");
		Ok(())
	}

	/// Merged capabilities and settings.
	///
	/// Diagnostic fields such as per-command `events` timings are only
	/// included when `include_diagnostics` is set.
	pub async fn session_capabilities(&self, include_diagnostics: bool) -> Result<SessionCapabilities> {
		let mut lock = self.lock().await;
		Ok(lock.session()?.snapshot(include_diagnostics))
	}

	pub async fn settings(&self) -> Result<CapabilityMap> {
		let mut lock = self.lock().await;
		Ok(lock.session()?.settings.clone())
	}

	/// Merges `update` into the session settings and returns the result.
	pub async fn update_settings(&self, update: CapabilityMap) -> Result<CapabilityMap> {
		if let Some(value) = update.get(USE_JSON_SOURCE) {
			if !value.is_boolean() {
				return Err(Error::InvalidArgument(format!("{USE_JSON_SOURCE} must be a boolean, got {value}")));
			}
		}
		let mut lock = self.lock().await;
		let session = lock.session()?;
		session.settings.extend(update);
		debug!(target = "uidrive.session", settings = ?session.settings, "settings updated");
		Ok(session.settings.clone())
	}

	pub async fn set_implicit_wait(&self, ms: u64) -> Result<()> {
		let mut lock = self.lock().await;
		lock.session()?.implicit_wait = Duration::from_millis(ms);
		Ok(())
	}

	pub async fn list_contexts(&self) -> Result<Vec<Context>> {
		let mut lock = self.lock().await;
		let session = lock.session()?;
		session.registry.list_contexts(session.router.guard()).await
	}

	pub async fn active_context(&self) -> Result<Context> {
		let mut lock = self.lock().await;
		Ok(lock.session()?.registry.active_context().clone())
	}

	/// Switches the active context. The web-view bridge reattaches on first use.
	pub async fn set_active_context(&self, id: &str) -> Result<Context> {
		let mut lock = self.lock().await;
		let session = lock.session()?;
		let context = session
			.registry
			.set_active_context(id, session.router.guard())
			.await?
			.clone();
		session.router.detach();
		Ok(context)
	}

	/// Serialized command entry point.
	///
	/// Parameters are validated before the lock is taken; the lock is
	/// released on every exit path when the scoped guard drops.
	pub async fn execute(&self, command: impl Into<Command>) -> Result<Reply> {
		let command = command.into();
		router::preflight(&command)?;

		let mut lock = self.lock().await;
		let session = lock.session()?;
		let name = command.name();
		let started = Instant::now();
		let result = session.execute(command).await;
		session.record(name, started.elapsed());

		match &result {
			Ok(_) => debug!(target = "uidrive.session", command = name, "command completed"),
			Err(err) => debug!(target = "uidrive.session", command = name, error = %err, "command failed"),
		}
		result
	}

	pub async fn source(&self, format: Option<SourceFormat>) -> Result<String> {
		match self.execute(RoutedCommand::Source { format }).await? {
			Reply::Text(source) => Ok(source),
			_ => Err(Error::UnexpectedReply { command: "getSource" }),
		}
	}

	pub async fn screenshot(&self) -> Result<Screenshot> {
		match self.execute(DeviceCommand::Screenshot).await? {
			Reply::Screenshot(shot) => Ok(shot),
			_ => Err(Error::UnexpectedReply { command: "getScreenshot" }),
		}
	}

	pub async fn background_app(&self, seconds: f64) -> Result<()> {
		self.execute(DeviceCommand::Background { seconds }).await.map(drop)
	}

	pub async fn orientation(&self) -> Result<Orientation> {
		match self.execute(DeviceCommand::GetOrientation).await? {
			Reply::Orientation(orientation) => Ok(orientation),
			_ => Err(Error::UnexpectedReply { command: "getOrientation" }),
		}
	}

	pub async fn set_orientation(&self, orientation: Orientation) -> Result<()> {
		self.execute(DeviceCommand::SetOrientation(orientation)).await.map(drop)
	}

	pub async fn window_size(&self, target: &str) -> Result<WindowSize> {
		let command = DeviceCommand::GetWindowSize {
			target: target.to_string(),
		};
		match self.execute(command).await? {
			Reply::WindowSize(size) => Ok(size),
			_ => Err(Error::UnexpectedReply { command: "getWindowSize" }),
		}
	}

	pub async fn set_geo_location(&self, latitude: f64, longitude: f64) -> Result<()> {
		self.execute(DeviceCommand::SetGeoLocation { latitude, longitude })
			.await
			.map(drop)
	}

	pub async fn shake_device(&self) -> Result<()> {
		self.execute(DeviceCommand::Shake).await.map(drop)
	}

	/// Always fails with [`Error::NotImplemented`].
	pub async fn lock_device(&self) -> Result<()> {
		self.execute(DeviceCommand::Lock).await.map(drop)
	}

	pub async fn log_types(&self) -> Result<Vec<LogType>> {
		match self.execute(DeviceCommand::ListLogTypes).await? {
			Reply::LogTypes(types) => Ok(types),
			_ => Err(Error::UnexpectedReply { command: "listLogTypes" }),
		}
	}

	pub async fn log(&self, log_type: &str) -> Result<Vec<LogEntry>> {
		let command = DeviceCommand::GetLog {
			log_type: log_type.to_string(),
		};
		match self.execute(command).await? {
			Reply::Logs(entries) => Ok(entries),
			_ => Err(Error::UnexpectedReply { command: "getLog" }),
		}
	}

	pub async fn find_element(&self, locator: Locator) -> Result<ElementRef> {
		match self.execute(RoutedCommand::FindElement(locator)).await? {
			Reply::Element(element) => Ok(element),
			_ => Err(Error::UnexpectedReply { command: "findElement" }),
		}
	}

	pub async fn find_elements(&self, locator: Locator) -> Result<Vec<ElementRef>> {
		match self.execute(RoutedCommand::FindElements(locator)).await? {
			Reply::Elements(elements) => Ok(elements),
			_ => Err(Error::UnexpectedReply { command: "findElements" }),
		}
	}

	pub async fn click(&self, element: ElementRef) -> Result<()> {
		self.execute(RoutedCommand::Click(element)).await.map(drop)
	}

	pub async fn back(&self) -> Result<()> {
		self.execute(RoutedCommand::Back).await.map(drop)
	}

	pub async fn navigate_to(&self, url: &str) -> Result<()> {
		self.execute(RoutedCommand::NavigateTo { url: url.to_string() })
			.await
			.map(drop)
	}

	pub async fn title(&self) -> Result<String> {
		match self.execute(RoutedCommand::Title).await? {
			Reply::Text(title) => Ok(title),
			_ => Err(Error::UnexpectedReply { command: "getTitle" }),
		}
	}

	/// Backend-specific escape hatch, e.g. `mobile: scroll`.
	pub async fn execute_extension(&self, name: &str, params: Value) -> Result<Value> {
		let command = RoutedCommand::Execute {
			name: name.to_string(),
			params,
		};
		self.execute(command).await.map(Reply::into_value)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn command_events_keep_only_recent_samples() {
		let mut events = CommandEvents::default();
		for ms in 0..(EVENT_SAMPLES as u64 + 10) {
			events.record("getSource", Duration::from_millis(ms));
		}
		events.record("findElement", Duration::from_millis(3));

		let value = events.to_value();
		let source = value["getSource"].as_array().unwrap();
		assert_eq!(source.len(), EVENT_SAMPLES);
		assert_eq!(source[0], 10);
		assert_eq!(source[EVENT_SAMPLES - 1], EVENT_SAMPLES as u64 + 9);
		assert_eq!(value["findElement"], serde_json::json!([3]));
	}
}
