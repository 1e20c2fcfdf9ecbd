use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uidrive::SessionCoordinator;

use super::protocol::{Request, Response};

/// Socket server in front of one [`SessionCoordinator`].
///
/// Each connection is served on its own task, so `status` requests are
/// answered while another connection is waiting on a long command.
pub struct Server {
	coordinator: Arc<SessionCoordinator>,
	listener: UnixListener,
	socket_path: PathBuf,
	shutdown_tx: watch::Sender<bool>,
	shutdown_rx: watch::Receiver<bool>,
}

impl Server {
	pub fn bind(socket_path: &Path, coordinator: Arc<SessionCoordinator>) -> Result<Self> {
		if socket_path.exists() {
			std::fs::remove_file(socket_path)
				.with_context(|| format!("Failed to remove existing socket: {}", socket_path.display()))?;
		}
		if let Some(parent) = socket_path.parent() {
			if !parent.exists() {
				std::fs::create_dir_all(parent)
					.with_context(|| format!("Failed to create socket directory: {}", parent.display()))?;
			}
		}
		let listener = UnixListener::bind(socket_path)
			.with_context(|| format!("Failed to bind socket: {}", socket_path.display()))?;
		info!(target = "uidrive.server", socket = %socket_path.display(), "server listening");

		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		Ok(Self {
			coordinator,
			listener,
			socket_path: socket_path.to_path_buf(),
			shutdown_tx,
			shutdown_rx,
		})
	}

	/// Handle that stops [`run`](Self::run) when sent `true`.
	pub fn shutdown_handle(&self) -> watch::Sender<bool> {
		self.shutdown_tx.clone()
	}

	pub async fn run(mut self) -> Result<()> {
		use tokio::signal::unix::{SignalKind, signal};

		let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
		let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

		loop {
			tokio::select! {
				_ = self.shutdown_rx.changed() => {
					if *self.shutdown_rx.borrow() {
						info!(target = "uidrive.server", "shutdown requested via message");
						break;
					}
				}
				_ = sigterm.recv() => {
					info!(target = "uidrive.server", "received SIGTERM, shutting down");
					break;
				}
				_ = sigint.recv() => {
					info!(target = "uidrive.server", "received SIGINT, shutting down");
					break;
				}
				accept = self.listener.accept() => {
					let (stream, _) = accept.context("Server accept failed")?;
					let coordinator = Arc::clone(&self.coordinator);
					let shutdown_tx = self.shutdown_tx.clone();
					tokio::spawn(async move {
						if let Err(err) = handle_client(stream, coordinator, shutdown_tx).await {
							warn!(target = "uidrive.server", error = %err, "connection error");
						}
					});
				}
			}
		}

		if let Err(err) = self.coordinator.delete_session().await {
			warn!(target = "uidrive.server", error = %err, "error during shutdown");
		}
		if let Err(err) = std::fs::remove_file(&self.socket_path) {
			debug!(target = "uidrive.server", error = %err, "socket cleanup failed");
		}
		Ok(())
	}
}

async fn handle_client<S>(stream: S, coordinator: Arc<SessionCoordinator>, shutdown_tx: watch::Sender<bool>) -> Result<()>
where
	S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
	let (read_half, mut write_half) = tokio::io::split(stream);
	let mut reader = BufReader::new(read_half);
	let mut line = String::new();

	loop {
		line.clear();
		let bytes = reader.read_line(&mut line).await.context("Failed reading request")?;
		if bytes == 0 {
			break;
		}

		let response = match serde_json::from_str::<Request>(line.trim_end()) {
			Ok(request) => handle_request(&coordinator, &shutdown_tx, request).await,
			Err(err) => Response::error("invalid argument", err.to_string()),
		};
		write_response(&mut write_half, &response).await?;
	}

	Ok(())
}

async fn write_response<W>(writer: &mut W, response: &Response) -> Result<()>
where
	W: tokio::io::AsyncWrite + Unpin,
{
	let payload = serde_json::to_string(response).context("Failed to serialize response")?;
	writer
		.write_all(format!("{payload}\n").as_bytes())
		.await
		.context("Failed writing response")?;
	writer.flush().await.context("Failed flushing response")?;
	Ok(())
}

async fn handle_request(coordinator: &SessionCoordinator, shutdown_tx: &watch::Sender<bool>, request: Request) -> Response {
	debug!(target = "uidrive.server", ?request, "request");
	match request {
		Request::Status => Response::Status(coordinator.status()),
		Request::CreateSession { capabilities } => reply(coordinator.start_session(capabilities).await),
		Request::DeleteSession => reply(coordinator.delete_session().await),
		Request::GetSessionCapabilities { include_diagnostics } => {
			reply(coordinator.session_capabilities(include_diagnostics).await)
		}
		Request::GetSettings => reply(coordinator.settings().await),
		Request::UpdateSettings { settings } => reply(coordinator.update_settings(settings).await),
		Request::SetImplicitWait { ms } => reply(coordinator.set_implicit_wait(ms).await),
		Request::GetSource { format } => reply(coordinator.source(format).await),
		Request::GetScreenshot => reply(coordinator.screenshot().await),
		Request::BackgroundApp { seconds } => reply(coordinator.background_app(seconds).await),
		Request::GetOrientation => reply(coordinator.orientation().await),
		Request::SetOrientation { orientation } => reply(coordinator.set_orientation(orientation).await),
		Request::GetWindowSize { window } => reply(coordinator.window_size(&window).await),
		Request::SetGeoLocation { latitude, longitude } => {
			reply(coordinator.set_geo_location(latitude, longitude).await)
		}
		Request::ShakeDevice => reply(coordinator.shake_device().await),
		Request::LockDevice => reply(coordinator.lock_device().await),
		Request::ListLogTypes => reply(coordinator.log_types().await),
		Request::GetLog { log_type } => reply(coordinator.log(&log_type).await),
		Request::ListContexts => reply(coordinator.list_contexts().await),
		Request::GetContext => reply(coordinator.active_context().await),
		Request::SetContext { id } => reply(coordinator.set_active_context(&id).await),
		Request::FindElement { locator } => reply(coordinator.find_element(locator).await),
		Request::FindElements { locator } => reply(coordinator.find_elements(locator).await),
		Request::Click { element } => reply(coordinator.click(element).await),
		Request::Back => reply(coordinator.back().await),
		Request::NavigateTo { url } => reply(coordinator.navigate_to(&url).await),
		Request::GetTitle => reply(coordinator.title().await),
		Request::Execute { name, params } => reply(coordinator.execute_extension(&name, params).await),
		Request::Shutdown => {
			let _ = shutdown_tx.send(true);
			Response::ok(serde_json::Value::Null)
		}
	}
}

fn reply<T: Serialize>(result: uidrive::Result<T>) -> Response {
	match result {
		Ok(value) => match serde_json::to_value(value) {
			Ok(value) => Response::ok(value),
			Err(err) => Response::error("unknown error", err.to_string()),
		},
		Err(err) => {
			debug!(target = "uidrive.server", code = err.code(), error = %err, "request failed");
			Response::from(err)
		}
	}
}
