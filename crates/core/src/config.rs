//! Driver timing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_ELEMENT_POLL_INTERVAL_MS: u64 = 100;

/// Timing knobs applied to every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DriverConfig {
	/// Initial implicit wait for element lookups; sessions may change it.
	pub implicit_wait_ms: u64,
	/// Deadline for a single backend call.
	pub command_timeout_ms: u64,
	/// Delay between lookup attempts while an implicit wait is running.
	pub element_poll_interval_ms: u64,
}

impl Default for DriverConfig {
	fn default() -> Self {
		Self {
			implicit_wait_ms: 0,
			command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
			element_poll_interval_ms: DEFAULT_ELEMENT_POLL_INTERVAL_MS,
		}
	}
}

impl DriverConfig {
	pub fn with_implicit_wait_ms(mut self, ms: u64) -> Self {
		self.implicit_wait_ms = ms;
		self
	}

	pub fn with_command_timeout_ms(mut self, ms: u64) -> Self {
		self.command_timeout_ms = ms;
		self
	}

	pub fn with_element_poll_interval_ms(mut self, ms: u64) -> Self {
		self.element_poll_interval_ms = ms;
		self
	}

	pub fn implicit_wait(&self) -> Duration {
		Duration::from_millis(self.implicit_wait_ms)
	}

	pub fn command_timeout(&self) -> Duration {
		Duration::from_millis(self.command_timeout_ms)
	}

	/// Poll interval, never zero so waits cannot spin.
	pub fn element_poll_interval(&self) -> Duration {
		Duration::from_millis(self.element_poll_interval_ms.max(1))
	}
}
