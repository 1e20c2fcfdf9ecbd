//! Log retrieval from the fixed set of external log sources.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use uidrive_protocol::{LogEntry, LogType};

use crate::backend::{BackendKind, LogSource};
use crate::error::{Error, Result};
use crate::health::CallGuard;

/// Pulls log entries on demand.
///
/// Each retrieval returns only the entries appended since the previous
/// retrieval of the same type.
pub struct LogAggregator {
	source: Arc<dyn LogSource>,
	delivered: HashMap<LogType, usize>,
}

impl LogAggregator {
	pub fn new(source: Arc<dyn LogSource>) -> Self {
		Self {
			source,
			delivered: HashMap::new(),
		}
	}

	/// Supported log types. Static, never discovered at runtime.
	pub fn list_log_types(&self) -> Vec<LogType> {
		LogType::ALL.to_vec()
	}

	/// Resolves `name` against the fixed set without touching the source.
	pub fn parse(name: &str) -> Result<LogType> {
		LogType::from_name(name).ok_or_else(|| Error::UnknownLogType {
			name: name.to_string(),
		})
	}

	pub(crate) async fn fetch(&mut self, name: &str, guard: &CallGuard) -> Result<Vec<LogEntry>> {
		let log_type = Self::parse(name)?;
		let source = Arc::clone(&self.source);
		// Collectors run on the device, so a crashed application still has logs.
		let mut entries = guard
			.run_until_deadline(BackendKind::Device, "log retrieval", async move { source.read(log_type).await })
			.await?;

		let seen = self.delivered.entry(log_type).or_default();
		if *seen > entries.len() {
			// Collector rotated its buffer.
			*seen = 0;
		}
		let fresh = entries.split_off(*seen);
		*seen += fresh.len();

		debug!(target = "uidrive.logs", log_type = %log_type, count = fresh.len(), "fetched log entries");
		Ok(fresh)
	}
}
