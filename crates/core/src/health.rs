//! Published health state.
//!
//! Command execution writes into a [`HealthBoard`]; `status` only ever reads
//! the latest published [`HealthSnapshot`]. No reader waits on the execution
//! lock or on any backend.
//!
//! The busy flag flips on every command, so it lives in an atomic rather
//! than in the watch channel. The channel only changes on session and
//! backend transitions.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;
use uidrive_protocol::{BackendHealth, BuildInfo, StatusReport};

use crate::backend::{BackendError, BackendKind, BackendResult};
use crate::error::{Error, Result};

/// Latest published server health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
	pub backend_ready: bool,
	pub backend_reason: Option<String>,
	pub busy: bool,
	pub session_id: Option<String>,
}

impl HealthSnapshot {
	pub fn to_report(&self) -> StatusReport {
		StatusReport {
			ready: self.session_id.is_none() || self.backend_ready,
			busy: self.busy,
			session_id: self.session_id.clone(),
			backend: BackendHealth {
				ready: self.backend_ready,
				reason: self.backend_reason.clone(),
			},
			build: BuildInfo {
				version: env!("CARGO_PKG_VERSION").to_string(),
			},
		}
	}
}

/// Owner of the published health state.
pub struct HealthBoard {
	tx: Arc<watch::Sender<HealthSnapshot>>,
	busy: AtomicBool,
}

impl HealthBoard {
	pub fn new() -> Self {
		let (tx, _rx) = watch::channel(HealthSnapshot::default());
		Self {
			tx: Arc::new(tx),
			busy: AtomicBool::new(false),
		}
	}

	pub fn snapshot(&self) -> HealthSnapshot {
		let mut snapshot = self.tx.borrow().clone();
		snapshot.busy = self.is_busy();
		snapshot
	}

	pub fn is_busy(&self) -> bool {
		self.busy.load(Ordering::Acquire)
	}

	pub fn subscribe(&self) -> watch::Receiver<HealthSnapshot> {
		self.tx.subscribe()
	}

	/// Handle given to backends so they can report readiness changes.
	pub fn reporter(&self) -> HealthReporter {
		HealthReporter {
			tx: Arc::clone(&self.tx),
		}
	}

	pub(crate) fn session_started(&self, session_id: &str) {
		self.tx.send_modify(|s| {
			s.session_id = Some(session_id.to_string());
			s.backend_ready = true;
			s.backend_reason = None;
		});
	}

	pub(crate) fn session_ended(&self) {
		self.tx.send_modify(|s| {
			s.session_id = None;
			s.backend_ready = false;
		});
	}

	/// Marks the backend down so any in-flight command fails promptly.
	pub(crate) fn interrupt(&self, reason: &str) {
		self.reporter().backend_down(reason);
	}

	/// Reports `busy = true` until the returned guard is dropped.
	pub(crate) fn busy(&self) -> BusyGuard<'_> {
		self.busy.store(true, Ordering::Release);
		BusyGuard { board: self }
	}
}

impl Default for HealthBoard {
	fn default() -> Self {
		Self::new()
	}
}

pub(crate) struct BusyGuard<'a> {
	board: &'a HealthBoard,
}

impl Drop for BusyGuard<'_> {
	fn drop(&mut self) {
		self.board.busy.store(false, Ordering::Release);
	}
}

/// Write handle for backend readiness.
#[derive(Clone)]
pub struct HealthReporter {
	tx: Arc<watch::Sender<HealthSnapshot>>,
}

impl HealthReporter {
	pub fn backend_up(&self) {
		self.tx.send_modify(|s| {
			s.backend_ready = true;
			s.backend_reason = None;
		});
	}

	pub fn backend_down(&self, reason: &str) {
		warn!(target = "uidrive.health", reason, "backend reported down");
		self.tx.send_modify(|s| {
			s.backend_ready = false;
			s.backend_reason = Some(reason.to_string());
		});
	}
}

/// Runs backend calls under the command deadline, racing backend readiness.
#[derive(Clone)]
pub(crate) struct CallGuard {
	timeout: Duration,
	health: watch::Receiver<HealthSnapshot>,
}

impl CallGuard {
	pub(crate) fn new(timeout: Duration, health: watch::Receiver<HealthSnapshot>) -> Self {
		Self { timeout, health }
	}

	pub(crate) fn timeout(&self) -> Duration {
		self.timeout
	}

	pub(crate) fn health(&self) -> watch::Receiver<HealthSnapshot> {
		self.health.clone()
	}

	pub(crate) async fn run<T, F>(&self, backend: BackendKind, condition: &str, call: F) -> Result<T>
	where
		F: Future<Output = BackendResult<T>>,
	{
		let mut health = self.health.clone();
		tokio::select! {
			biased;
			reason = backend_down(&mut health) => {
				Err(Error::backend(backend, BackendError::Terminated(reason)))
			}
			outcome = self.run_until_deadline(backend, condition, call) => outcome,
		}
	}

	/// Like [`run`](Self::run) but only bounded by the deadline.
	///
	/// For collaborators that outlive the application, such as the device
	/// log collectors, which still answer after a crash.
	pub(crate) async fn run_until_deadline<T, F>(&self, backend: BackendKind, condition: &str, call: F) -> Result<T>
	where
		F: Future<Output = BackendResult<T>>,
	{
		match tokio::time::timeout(self.timeout, call).await {
			Ok(result) => result.map_err(|source| Error::backend(backend, source)),
			Err(_) => Err(Error::Timeout {
				ms: self.timeout.as_millis() as u64,
				condition: condition.to_string(),
			}),
		}
	}
}

/// Resolves once the backend is reported down.
async fn backend_down(health: &mut watch::Receiver<HealthSnapshot>) -> String {
	let reason = match health.wait_for(|s| !s.backend_ready).await {
		Ok(snapshot) => Some(
			snapshot
				.backend_reason
				.clone()
				.unwrap_or_else(|| "backend not ready".to_string()),
		),
		Err(_) => None,
	};
	match reason {
		Some(reason) => reason,
		// Board dropped: readiness can no longer change.
		None => std::future::pending().await,
	}
}
