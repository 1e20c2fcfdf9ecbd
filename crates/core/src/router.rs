//! Command routing.
//!
//! Device commands go to device services regardless of context. Routed
//! commands are looked up in a context-kind by command-kind table.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use uidrive_protocol::{Context, ContextKind, ElementRef, Locator, SourceFormat};

use crate::backend::{BackendError, BackendKind, DeviceServices, NativeEngine, WebviewBridge};
use crate::command::{Command, DeviceCommand, Reply, RoutedCommand, RoutedKind};
use crate::error::{Error, Result};
use crate::health::CallGuard;
use crate::logs::LogAggregator;

/// The only window-size target with defined semantics.
pub const CURRENT_WINDOW: &str = "current";

/// Marker the native engine leaves in a tree it failed to serialize.
pub const ENGINE_ERROR_MARKER: &str = "AX error";

/// Backend chosen for a routed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
	Native,
	Webview,
	Unsupported,
}

use Handler::{Native as N, Unsupported as X, Webview as W};

// Columns follow `RoutedKind`: Source, Find, Click, Back, Navigate, Title, Execute.
const ROUTES: [[Handler; RoutedKind::COUNT]; 2] = [
	/* NATIVE  */ [N, N, N, N, X, X, N],
	/* WEBVIEW */ [W, W, W, W, W, W, W],
];

/// Looks up the handler for `command` in a context of `kind`.
pub fn handler_for(kind: ContextKind, command: RoutedKind) -> Handler {
	let row = match kind {
		ContextKind::Native => 0,
		ContextKind::Webview => 1,
	};
	ROUTES[row][command as usize]
}

/// Validates parameters with a constrained domain.
///
/// Runs before the execution lock is taken and before any backend is
/// touched, so rejected commands have no side effects.
pub fn preflight(command: &Command) -> Result<()> {
	let Command::Device(cmd) = command else {
		return Ok(());
	};
	match cmd {
		DeviceCommand::Lock => Err(Error::not_implemented(cmd.name())),
		DeviceCommand::GetWindowSize { target } if target != CURRENT_WINDOW => Err(Error::InvalidArgument(
			"Currently only getting current window size is supported".to_string(),
		)),
		DeviceCommand::SetGeoLocation { latitude, longitude } => {
			if !(-90.0..=90.0).contains(latitude) {
				return Err(Error::InvalidArgument(format!("latitude {latitude} is outside [-90, 90]")));
			}
			if !(-180.0..=180.0).contains(longitude) {
				return Err(Error::InvalidArgument(format!(
					"longitude {longitude} is outside [-180, 180]"
				)));
			}
			Ok(())
		}
		DeviceCommand::Background { seconds } if !seconds.is_finite() || *seconds < 0.0 => Err(
			Error::InvalidArgument(format!("background duration must be a non-negative number of seconds, got {seconds}")),
		),
		DeviceCommand::GetLog { log_type } => LogAggregator::parse(log_type).map(|_| ()),
		_ => Ok(()),
	}
}

/// Per-command inputs owned by the session.
pub(crate) struct RouteParams {
	pub implicit_wait: Duration,
	pub use_json_source: bool,
}

/// Dispatches commands to the backends of one launched application.
pub struct CommandRouter {
	native: Arc<dyn NativeEngine>,
	webview: Arc<dyn WebviewBridge>,
	device: Arc<dyn DeviceServices>,
	logs: LogAggregator,
	guard: CallGuard,
	poll_interval: Duration,
	/// Page the bridge is currently attached to.
	attached: Option<String>,
}

impl CommandRouter {
	pub(crate) fn new(
		native: Arc<dyn NativeEngine>,
		webview: Arc<dyn WebviewBridge>,
		device: Arc<dyn DeviceServices>,
		logs: LogAggregator,
		guard: CallGuard,
		poll_interval: Duration,
	) -> Self {
		Self {
			native,
			webview,
			device,
			logs,
			guard,
			poll_interval,
			attached: None,
		}
	}

	pub(crate) fn guard(&self) -> &CallGuard {
		&self.guard
	}

	/// Forgets the bridge attachment so the next web command attaches again.
	///
	/// Called whenever the active context changes or turns out to be stale;
	/// a page that comes back under the same id is a new connection.
	pub(crate) fn detach(&mut self) {
		if let Some(page_id) = self.attached.take() {
			debug!(target = "uidrive.router", page_id, "dropped web-view attachment");
		}
	}

	pub(crate) async fn route_device(&mut self, command: DeviceCommand) -> Result<Reply> {
		let device = Arc::clone(&self.device);
		let guard = &self.guard;
		let name = command.name();
		match command {
			DeviceCommand::Screenshot => guard
				.run(BackendKind::Device, name, async move { device.screenshot().await })
				.await
				.map(Reply::Screenshot),
			DeviceCommand::GetOrientation => guard
				.run(BackendKind::Device, name, async move { device.orientation().await })
				.await
				.map(Reply::Orientation),
			DeviceCommand::SetOrientation(orientation) => guard
				.run(BackendKind::Device, name, async move { device.set_orientation(orientation).await })
				.await
				.map(|()| Reply::Unit),
			DeviceCommand::GetWindowSize { .. } => {
				let size = guard
					.run(BackendKind::Device, name, async move { device.window_size().await })
					.await?;
				if size.width == 0 || size.height == 0 {
					return Err(Error::backend(
						BackendKind::Device,
						BackendError::Failed(format!("device reported empty window {}x{}", size.width, size.height)),
					));
				}
				Ok(Reply::WindowSize(size))
			}
			DeviceCommand::SetGeoLocation { latitude, longitude } => guard
				.run(BackendKind::Device, name, async move {
					device.set_geolocation(latitude, longitude).await
				})
				.await
				.map(|()| Reply::Unit),
			DeviceCommand::Shake => guard
				.run(BackendKind::Device, name, async move { device.shake().await })
				.await
				.map(|()| Reply::Unit),
			DeviceCommand::Lock => Err(Error::not_implemented(name)),
			DeviceCommand::Background { seconds } => {
				let duration = Duration::try_from_secs_f64(seconds)
					.map_err(|e| Error::InvalidArgument(format!("background duration {seconds}: {e}")))?;
				let guard = CallGuard::new(background_deadline(self.guard.timeout(), duration), self.guard.health());
				guard
					.run(BackendKind::Device, name, async move { device.background(duration).await })
					.await
					.map(|()| Reply::Unit)
			}
			DeviceCommand::ListLogTypes => Ok(Reply::LogTypes(self.logs.list_log_types())),
			DeviceCommand::GetLog { log_type } => self.logs.fetch(&log_type, &self.guard).await.map(Reply::Logs),
		}
	}

	/// Routes `command` to the backend selected by `context.kind`.
	pub(crate) async fn route(&mut self, command: RoutedCommand, context: &Context, params: RouteParams) -> Result<Reply> {
		let handler = handler_for(context.kind, command.kind());
		debug!(target = "uidrive.router", command = command.name(), context = %context.id, ?handler, "routing command");

		match handler {
			Handler::Unsupported => Err(Error::not_implemented(command.name())),
			Handler::Native => self.run_native(command, params).await,
			Handler::Webview => {
				let Some(page_id) = context.page_id() else {
					self.detach();
					return Err(Error::StaleContext {
						id: context.id.clone(),
					});
				};
				self.ensure_attached(page_id).await?;
				self.run_webview(command, params).await
			}
		}
	}

	async fn run_native(&mut self, command: RoutedCommand, params: RouteParams) -> Result<Reply> {
		let native = Arc::clone(&self.native);
		let name = command.name();
		match command {
			RoutedCommand::Source { format } => {
				let format = format.unwrap_or(if params.use_json_source {
					SourceFormat::Json
				} else {
					SourceFormat::Xml
				});
				let source = self
					.guard
					.run(BackendKind::Native, name, async move { native.source(format).await })
					.await?;
				check_source(&source)?;
				Ok(Reply::Text(source))
			}
			RoutedCommand::FindElement(locator) => {
				let found = self.find_with_wait(Handler::Native, &locator, params.implicit_wait).await?;
				first_or_missing(found, &locator, params.implicit_wait)
			}
			RoutedCommand::FindElements(locator) => self
				.find_with_wait(Handler::Native, &locator, params.implicit_wait)
				.await
				.map(Reply::Elements),
			RoutedCommand::Click(element) => self
				.guard
				.run(BackendKind::Native, name, async move { native.click(&element).await })
				.await
				.map(|()| Reply::Unit),
			RoutedCommand::Back => self
				.guard
				.run(BackendKind::Native, name, async move { native.back().await })
				.await
				.map(|()| Reply::Unit),
			RoutedCommand::Execute { name: extension, params: args } => self
				.guard
				.run(BackendKind::Native, name, async move { native.execute(&extension, &args).await })
				.await
				.map(Reply::Value),
			RoutedCommand::NavigateTo { .. } | RoutedCommand::Title => Err(Error::not_implemented(name)),
		}
	}

	async fn run_webview(&mut self, command: RoutedCommand, params: RouteParams) -> Result<Reply> {
		let webview = Arc::clone(&self.webview);
		let name = command.name();
		match command {
			RoutedCommand::Source { .. } => self
				.guard
				.run(BackendKind::Webview, name, async move { webview.source().await })
				.await
				.map(Reply::Text),
			RoutedCommand::FindElement(locator) => {
				let found = self.find_with_wait(Handler::Webview, &locator, params.implicit_wait).await?;
				first_or_missing(found, &locator, params.implicit_wait)
			}
			RoutedCommand::FindElements(locator) => self
				.find_with_wait(Handler::Webview, &locator, params.implicit_wait)
				.await
				.map(Reply::Elements),
			RoutedCommand::Click(element) => self
				.guard
				.run(BackendKind::Webview, name, async move { webview.click(&element).await })
				.await
				.map(|()| Reply::Unit),
			RoutedCommand::Back => self
				.guard
				.run(BackendKind::Webview, name, async move { webview.back().await })
				.await
				.map(|()| Reply::Unit),
			RoutedCommand::NavigateTo { url } => self
				.guard
				.run(BackendKind::Webview, name, async move { webview.navigate(&url).await })
				.await
				.map(|()| Reply::Unit),
			RoutedCommand::Title => self
				.guard
				.run(BackendKind::Webview, name, async move { webview.title().await })
				.await
				.map(Reply::Text),
			RoutedCommand::Execute { name: script, params: args } => self
				.guard
				.run(BackendKind::Webview, name, async move {
					webview.execute_script(&script, &args).await
				})
				.await
				.map(Reply::Value),
		}
	}

	async fn ensure_attached(&mut self, page_id: &str) -> Result<()> {
		if self.attached.as_deref() == Some(page_id) {
			return Ok(());
		}
		let webview = Arc::clone(&self.webview);
		let target = page_id.to_string();
		self.guard
			.run(BackendKind::Webview, "web-view attach", async move { webview.attach(&target).await })
			.await?;
		debug!(target = "uidrive.router", page_id, "attached web-view bridge");
		self.attached = Some(page_id.to_string());
		Ok(())
	}

	/// Polls the backend until `locator` matches or `wait` has elapsed.
	///
	/// There is no external cancellation; only the wait expiring (or the
	/// backend going down) ends it early.
	async fn find_with_wait(&self, handler: Handler, locator: &Locator, wait: Duration) -> Result<Vec<ElementRef>> {
		let started = Instant::now();
		loop {
			let found = match handler {
				Handler::Native => {
					let native = Arc::clone(&self.native);
					let locator = locator.clone();
					self.guard
						.run(BackendKind::Native, "findElement", async move { native.find(&locator).await })
						.await?
				}
				Handler::Webview => {
					let webview = Arc::clone(&self.webview);
					let locator = locator.clone();
					self.guard
						.run(BackendKind::Webview, "findElement", async move { webview.find(&locator).await })
						.await?
				}
				Handler::Unsupported => return Err(Error::not_implemented("findElement")),
			};
			if !found.is_empty() {
				return Ok(found);
			}
			let elapsed = started.elapsed();
			if elapsed >= wait {
				return Ok(found);
			}
			tokio::time::sleep(self.poll_interval.min(wait - elapsed)).await;
		}
	}
}

/// Deadline for a background call: the command timeout plus the time spent away.
fn background_deadline(timeout: Duration, away: Duration) -> Duration {
	timeout.saturating_add(away)
}

fn first_or_missing(found: Vec<ElementRef>, locator: &Locator, waited: Duration) -> Result<Reply> {
	found
		.into_iter()
		.next()
		.map(Reply::Element)
		.ok_or_else(|| Error::NoSuchElement {
			locator: locator.to_string(),
			waited_ms: waited.as_millis() as u64,
		})
}

fn check_source(source: &str) -> Result<()> {
	if source.contains(ENGINE_ERROR_MARKER) {
		return Err(Error::backend(
			BackendKind::Native,
			BackendError::Failed(format!("UI tree contains engine error marker '{ENGINE_ERROR_MARKER}'")),
		));
	}
	Ok(())
}
