//! Socket round trips against an in-process server on the simulated device.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Value, json};
use uidrive::sim::SimDevice;
use uidrive::{DriverConfig, SessionCoordinator};
use uidrive_cli::daemon::{Request, Response, Server, send_request};

struct Running {
	_dir: tempfile::TempDir,
	socket: PathBuf,
	shutdown: tokio::sync::watch::Sender<bool>,
	task: tokio::task::JoinHandle<anyhow::Result<()>>,
}

fn start() -> Running {
	let dir = tempfile::tempdir().unwrap();
	let socket = dir.path().join("uidrive.sock");
	let coordinator = Arc::new(SessionCoordinator::new(Arc::new(SimDevice::default()), DriverConfig::default()));
	let server = Server::bind(&socket, coordinator).unwrap();
	let shutdown = server.shutdown_handle();
	let task = tokio::spawn(server.run());
	Running {
		_dir: dir,
		socket,
		shutdown,
		task,
	}
}

async fn call(socket: &Path, request: Value) -> Response {
	let request: Request = serde_json::from_value(request).unwrap();
	send_request(socket, &request).await.unwrap()
}

fn value(response: Response) -> Value {
	match response {
		Response::Ok { value } => value,
		other => panic!("expected ok, got {other:?}"),
	}
}

#[tokio::test]
async fn session_over_the_socket() {
	let server = start();
	let socket = server.socket.as_path();

	let Response::Status(status) = call(socket, json!({"type": "status"})).await else {
		panic!("expected status");
	};
	assert!(status.ready);
	assert_eq!(status.session_id, None);

	let created = value(call(socket, json!({"type": "create_session", "capabilities": {"platformName": "iOS"}})).await);
	assert_eq!(created["capabilities"]["CFBundleIdentifier"], "com.example.apple-samplecode.UICatalog");
	assert!(created["sessionId"].is_string());
	assert!(created["createdAt"].is_u64());

	let contexts = value(call(socket, json!({"type": "list_contexts"})).await);
	assert_eq!(contexts, json!([{"id": "NATIVE_APP", "kind": "NATIVE"}]));

	let size = value(call(socket, json!({"type": "get_window_size"})).await);
	assert_eq!(size, json!({"width": 375, "height": 667}));

	let types = value(call(socket, json!({"type": "list_log_types"})).await);
	assert_eq!(types, json!(["syslog", "crashlog", "performance"]));

	let element = value(
		call(
			socket,
			json!({"type": "find_element", "locator": {"using": "accessibility id", "value": "Buttons"}}),
		)
		.await,
	);
	assert!(element["ELEMENT"].is_string());

	value(call(socket, json!({"type": "delete_session"})).await);
	value(call(socket, json!({"type": "shutdown"})).await);
	server.task.await.unwrap().unwrap();
	assert!(!socket.exists());
}

#[tokio::test]
async fn errors_carry_webdriver_codes() {
	let server = start();
	let socket = server.socket.as_path();

	let response = call(socket, json!({"type": "get_source"})).await;
	assert_eq!(
		response,
		Response::Error {
			code: "invalid session id".into(),
			message: "no active session".into()
		}
	);

	value(call(socket, json!({"type": "create_session"})).await);
	let Response::Error { code, message } = call(socket, json!({"type": "lock_device"})).await else {
		panic!("lock should fail");
	};
	assert_eq!(code, "unsupported operation");
	assert!(message.contains("Method has not yet been implemented"));

	let Response::Error { code, .. } = call(socket, json!({"type": "set_context", "id": "WEBVIEW_7"})).await else {
		panic!("unknown context should fail");
	};
	assert_eq!(code, "no such context");

	let Response::Error { code, .. } = call(socket, json!({"type": "get_window_size", "window": "other"})).await else {
		panic!("non-current window should fail");
	};
	assert_eq!(code, "invalid argument");

	server.shutdown.send(true).unwrap();
	server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn malformed_lines_get_an_error_response() {
	use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

	let server = start();
	let mut stream = tokio::net::UnixStream::connect(&server.socket).await.unwrap();
	stream.write_all(b"{\"type\":\"fly\"}\n").await.unwrap();

	let mut line = String::new();
	BufReader::new(&mut stream).read_line(&mut line).await.unwrap();
	let response: Response = serde_json::from_str(&line).unwrap();
	assert!(matches!(response, Response::Error { ref code, .. } if code == "invalid argument"));

	server.shutdown.send(true).unwrap();
	server.task.await.unwrap().unwrap();
}
