//! Line-delimited JSON server and client over a Unix socket.

mod protocol;
mod server;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
pub use protocol::{Request, Response};
pub use server::Server;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Returns the default server socket path for the current user.
///
/// Uses `$XDG_RUNTIME_DIR/uidrive.sock` if available (already user-permissioned),
/// otherwise falls back to `/tmp/uidrive-{uid}.sock`.
pub fn default_socket_path() -> PathBuf {
	if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR") {
		if !xdg_runtime.is_empty() {
			return PathBuf::from(xdg_runtime).join("uidrive.sock");
		}
	}

	let uid = unsafe { libc::getuid() };
	PathBuf::from(format!("/tmp/uidrive-{uid}.sock"))
}

/// True when the error means nothing is listening on the socket.
pub fn is_not_running(err: &anyhow::Error) -> bool {
	err.chain()
		.filter_map(|cause| cause.downcast_ref::<std::io::Error>())
		.any(|io| {
			matches!(
				io.kind(),
				std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
			)
		})
}

/// Sends one request and waits for its response.
pub async fn send_request(socket: &Path, request: &Request) -> Result<Response> {
	let stream = UnixStream::connect(socket)
		.await
		.with_context(|| format!("Failed to connect to {}", socket.display()))?;
	send_request_stream(stream, request).await
}

async fn send_request_stream<S>(mut stream: S, request: &Request) -> Result<Response>
where
	S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
	let payload = serde_json::to_string(request).context("Failed to serialize request")?;
	stream
		.write_all(format!("{payload}\n").as_bytes())
		.await
		.context("Failed writing request")?;
	stream.flush().await.context("Failed flushing request")?;

	let mut reader = BufReader::new(stream);
	let mut line = String::new();
	reader.read_line(&mut line).await.context("Failed reading response")?;
	let response = serde_json::from_str(&line).context("Failed parsing response")?;
	Ok(response)
}
