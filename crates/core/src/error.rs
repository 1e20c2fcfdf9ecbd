//! Error taxonomy for session coordination and command routing.

use thiserror::Error;

use crate::backend::{BackendError, BackendKind};

/// Result type alias for coordinator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers of the session coordinator.
#[derive(Debug, Error)]
pub enum Error {
	/// Bootstrap failed or capabilities could not be merged. Fatal to the session.
	#[error("session not created: {0}")]
	SessionStart(String),

	/// A command arrived while no session is live.
	#[error("no active session")]
	NoSession,

	/// Context id absent from the latest context list.
	#[error("no such context: '{id}'")]
	UnknownContext { id: String },

	/// The active web view detached since it was selected.
	#[error("active context '{id}' is no longer available")]
	StaleContext { id: String },

	#[error("unknown log type '{name}' (supported: syslog, crashlog, performance)")]
	UnknownLogType { name: String },

	/// Parameter outside the command's value domain.
	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	/// Deliberately stubbed or unsupported in the active context.
	#[error("{command}: Method has not yet been implemented")]
	NotImplemented { command: String },

	/// Failure reported by the native engine, web-view bridge, or device services.
	#[error("{backend} backend failed: {source}")]
	Backend {
		backend: BackendKind,
		#[source]
		source: BackendError,
	},

	#[error("timeout after {ms}ms waiting for: {condition}")]
	Timeout { ms: u64, condition: String },

	/// A command produced a reply of the wrong shape.
	#[error("unexpected reply to {command}")]
	UnexpectedReply { command: &'static str },

	/// Implicit wait expired without a matching element.
	#[error("no element matching {locator} after waiting {waited_ms}ms")]
	NoSuchElement { locator: String, waited_ms: u64 },
}

impl Error {
	pub(crate) fn backend(backend: BackendKind, source: BackendError) -> Self {
		match source {
			BackendError::NotSupported(command) => Error::NotImplemented { command },
			source => Error::Backend { backend, source },
		}
	}

	pub(crate) fn not_implemented(command: &str) -> Self {
		Error::NotImplemented {
			command: command.to_string(),
		}
	}

	/// W3C WebDriver error code for this error.
	pub fn code(&self) -> &'static str {
		match self {
			Error::SessionStart(_) => "session not created",
			Error::NoSession => "invalid session id",
			Error::UnknownContext { .. } | Error::StaleContext { .. } => "no such context",
			Error::UnknownLogType { .. } => "unknown log type",
			Error::InvalidArgument(_) => "invalid argument",
			Error::NotImplemented { .. } => "unsupported operation",
			Error::Backend { .. } | Error::UnexpectedReply { .. } => "unknown error",
			Error::Timeout { .. } => "timeout",
			Error::NoSuchElement { .. } => "no such element",
		}
	}

	/// Returns true for errors raised before any backend call was attempted.
	pub fn is_validation(&self) -> bool {
		matches!(
			self,
			Error::InvalidArgument(_) | Error::UnknownContext { .. } | Error::UnknownLogType { .. }
		)
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout { .. })
	}

	/// Returns true if the application went away under the command.
	pub fn is_terminated(&self) -> bool {
		matches!(
			self,
			Error::Backend {
				source: BackendError::Terminated(_),
				..
			}
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn not_supported_backend_errors_become_not_implemented() {
		let err = Error::backend(BackendKind::Native, BackendError::NotSupported("mobile: pinch".into()));
		assert!(matches!(err, Error::NotImplemented { ref command } if command == "mobile: pinch"));
		assert_eq!(err.code(), "unsupported operation");
	}

	#[test]
	fn backend_errors_keep_their_source() {
		let err = Error::backend(BackendKind::Webview, BackendError::Failed("socket closed".into()));
		assert_eq!(err.to_string(), "web-view backend failed: socket closed");
		assert!(std::error::Error::source(&err).is_some());
	}

	#[test]
	fn lock_message_mentions_not_implemented() {
		let err = Error::not_implemented("lock");
		assert!(err.to_string().contains("Method has not yet been implemented"));
	}

	#[test]
	fn validation_errors_are_classified() {
		assert!(Error::InvalidArgument("x".into()).is_validation());
		assert!(Error::UnknownLogType { name: "x".into() }.is_validation());
		assert!(!Error::NoSession.is_validation());
		assert!(Error::Timeout { ms: 1, condition: "x".into() }.is_timeout());
	}
}
