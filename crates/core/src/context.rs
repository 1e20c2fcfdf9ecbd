//! Context registry: the native context plus whatever web views are attached.

use std::sync::Arc;

use tracing::{debug, info};
use uidrive_protocol::{Context, ContextKind};

use crate::backend::{BackendKind, WebviewBridge};
use crate::error::{Error, Result};
use crate::health::CallGuard;

/// Tracks available contexts and the active one.
///
/// The native context is always first and always present. Web views come
/// and go as the application opens and closes web content, so callers poll
/// [`list_contexts`](Self::list_contexts) rather than expecting immediacy.
pub struct ContextRegistry {
	bridge: Arc<dyn WebviewBridge>,
	active: Context,
}

impl ContextRegistry {
	pub fn new(bridge: Arc<dyn WebviewBridge>) -> Self {
		Self {
			bridge,
			active: Context::native(),
		}
	}

	/// Current ordered context list, polled from the bridge.
	pub(crate) async fn list_contexts(&self, guard: &CallGuard) -> Result<Vec<Context>> {
		let bridge = Arc::clone(&self.bridge);
		let pages = guard
			.run(BackendKind::Webview, "web-view discovery", async move { bridge.pages().await })
			.await?;

		let mut contexts = Vec::with_capacity(pages.len() + 1);
		contexts.push(Context::native());
		contexts.extend(pages.into_iter().map(|page| Context {
			title: Some(page.title),
			url: Some(page.url),
			..Context::webview(&page.id)
		}));
		debug!(target = "uidrive.contexts", count = contexts.len(), "listed contexts");
		Ok(contexts)
	}

	/// Switches to `id` after validating it against one fresh snapshot.
	///
	/// Only bookkeeping changes here; the bridge attaches on first use.
	pub(crate) async fn set_active_context(&mut self, id: &str, guard: &CallGuard) -> Result<&Context> {
		let snapshot = self.list_contexts(guard).await?;
		let Some(context) = snapshot.into_iter().find(|c| c.id == id) else {
			return Err(Error::UnknownContext { id: id.to_string() });
		};
		info!(target = "uidrive.contexts", from = %self.active.id, to = %context.id, "switching context");
		self.active = context;
		Ok(&self.active)
	}

	/// The active context. Defaults to native.
	pub fn active_context(&self) -> &Context {
		&self.active
	}

	/// Confirms a web-view active context is still attached.
	///
	/// Fails fast instead of falling back to native when it has gone.
	pub(crate) async fn resolve_active(&self, guard: &CallGuard) -> Result<&Context> {
		if self.active.kind == ContextKind::Native {
			return Ok(&self.active);
		}
		let snapshot = self.list_contexts(guard).await?;
		if snapshot.iter().any(|c| c.id == self.active.id) {
			Ok(&self.active)
		} else {
			Err(Error::StaleContext {
				id: self.active.id.clone(),
			})
		}
	}
}
