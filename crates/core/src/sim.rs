//! In-memory simulated device.
//!
//! [`SimDevice`] implements every collaborator trait against a small
//! catalog-style application: a native screen stack with a "Web View"
//! screen that attaches one web page after a configurable delay. It backs
//! the integration tests and lets the server run without hardware.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::time::Instant;
use uidrive_protocol::{
	CapabilityMap, ElementRef, Locator, LocatorStrategy, LogEntry, LogType, Orientation, Screenshot,
	SourceFormat, WindowSize,
};

use crate::backend::{
	AppLauncher, BackendError, BackendResult, DeviceServices, LaunchedApp, LogSource, NativeEngine,
	WebPage, WebviewBridge,
};
use crate::health::HealthReporter;

/// Page shipped with the simulator for web-view navigation.
pub const GUINEA_PIG_URL: &str = "http://localhost:4994/test/guinea-pig";
pub const GUINEA_PIG_TITLE: &str = "I am a page title";

const WEB_PAGE_ID: &str = "1";
const WEB_HOME_URL: &str = "about:blank";
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Static description of the simulated device and application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimProfile {
	pub bundle_id: String,
	pub app_name: String,
	pub device: String,
	pub sdk_version: String,
	pub udid: String,
	/// Portrait window size.
	pub window: WindowSize,
	/// Delay between opening the web-view screen and its page attaching.
	pub webview_attach_delay_ms: u64,
	/// Time the engine takes to come up after the application starts.
	pub bootstrap_delay_ms: u64,
	/// Whether the engine reports `CFBundleIdentifier` at launch.
	pub report_bundle_id: bool,
	/// Launch failure to simulate.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub fail_launch: Option<String>,
	/// Known page titles by URL; unknown URLs use the URL as title.
	pub titles: BTreeMap<String, String>,
}

impl Default for SimProfile {
	fn default() -> Self {
		Self {
			bundle_id: "com.example.apple-samplecode.UICatalog".to_string(),
			app_name: "UICatalog".to_string(),
			device: "iphone".to_string(),
			sdk_version: "10.3.1".to_string(),
			udid: "00000000-0000-0000-0000-000000000000".to_string(),
			window: WindowSize {
				width: 375,
				height: 667,
			},
			webview_attach_delay_ms: 0,
			bootstrap_delay_ms: 0,
			report_bundle_id: true,
			fail_launch: None,
			titles: BTreeMap::from([(GUINEA_PIG_URL.to_string(), GUINEA_PIG_TITLE.to_string())]),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
	Catalog,
	Buttons,
	WebView,
}

impl Screen {
	fn key(self) -> &'static str {
		match self {
			Screen::Catalog => "catalog",
			Screen::Buttons => "buttons",
			Screen::WebView => "webview",
		}
	}

	/// (element type, label) pairs shown on this screen.
	fn elements(self) -> &'static [(&'static str, &'static str)] {
		match self {
			Screen::Catalog => &[
				("XCUIElementTypeStaticText", "Action Sheets"),
				("XCUIElementTypeStaticText", "Alert Views"),
				("XCUIElementTypeStaticText", "Buttons"),
				("XCUIElementTypeStaticText", "Date Picker"),
				("XCUIElementTypeStaticText", "Web View"),
			],
			Screen::Buttons => &[
				("XCUIElementTypeButton", "UICatalog"),
				("XCUIElementTypeButton", "Button"),
				("XCUIElementTypeButton", "X Button"),
			],
			Screen::WebView => &[
				("XCUIElementTypeButton", "UICatalog"),
				("XCUIElementTypeWebView", "Web Content"),
			],
		}
	}

	fn destination(self, label: &str) -> Option<Screen> {
		match (self, label) {
			(Screen::Catalog, "Buttons") => Some(Screen::Buttons),
			(Screen::Catalog, "Web View") => Some(Screen::WebView),
			_ => None,
		}
	}
}

struct WebState {
	history: Vec<String>,
	attached: Option<String>,
	attaches: u32,
}

struct SimState {
	running: bool,
	reporter: Option<HealthReporter>,
	screens: Vec<Screen>,
	webview_opened_at: Option<Instant>,
	web: WebState,
	orientation: Orientation,
	location: Option<(f64, f64)>,
	shakes: u32,
	stall: Option<Duration>,
	logs: BTreeMap<LogType, Vec<LogEntry>>,
}

impl SimState {
	fn new() -> Self {
		Self {
			running: false,
			reporter: None,
			screens: vec![Screen::Catalog],
			webview_opened_at: None,
			web: WebState {
				history: vec![WEB_HOME_URL.to_string()],
				attached: None,
				attaches: 0,
			},
			orientation: Orientation::Portrait,
			location: None,
			shakes: 0,
			stall: None,
			logs: BTreeMap::new(),
		}
	}

	fn screen(&self) -> Screen {
		self.screens.last().copied().unwrap_or(Screen::Catalog)
	}

	fn log(&mut self, log_type: LogType, level: &str, message: impl Into<String>) {
		self.logs.entry(log_type).or_default().push(LogEntry {
			timestamp: now_ms(),
			level: level.to_string(),
			message: message.into(),
		});
	}

	fn ensure_running(&self) -> BackendResult<()> {
		if self.running {
			Ok(())
		} else {
			Err(BackendError::Terminated("application is not running".to_string()))
		}
	}
}

/// Simulated device; clones share state.
#[derive(Clone)]
pub struct SimDevice {
	profile: Arc<SimProfile>,
	state: Arc<Mutex<SimState>>,
}

impl Default for SimDevice {
	fn default() -> Self {
		Self::new(SimProfile::default())
	}
}

impl SimDevice {
	pub fn new(profile: SimProfile) -> Self {
		Self {
			profile: Arc::new(profile),
			state: Arc::new(Mutex::new(SimState::new())),
		}
	}

	pub fn profile(&self) -> &SimProfile {
		&self.profile
	}

	pub fn is_running(&self) -> bool {
		self.state.lock().running
	}

	/// Last geolocation set, if any.
	pub fn location(&self) -> Option<(f64, f64)> {
		self.state.lock().location
	}

	pub fn shake_count(&self) -> u32 {
		self.state.lock().shakes
	}

	/// Number of times the web-view bridge connected to a page.
	pub fn attach_count(&self) -> u32 {
		self.state.lock().web.attaches
	}

	/// Makes native-engine calls take `delay` before answering.
	pub fn set_stall(&self, delay: Option<Duration>) {
		self.state.lock().stall = delay;
	}

	/// Kills the application and reports the backend down.
	pub fn crash(&self, reason: &str) {
		let reporter = {
			let mut state = self.state.lock();
			state.running = false;
			state.log(LogType::Crashlog, "ERROR", format!("{} crashed: {reason}", self.profile.app_name));
			state.reporter.clone()
		};
		if let Some(reporter) = reporter {
			reporter.backend_down(reason);
		}
	}

	fn reported_capabilities(&self) -> CapabilityMap {
		let mut caps = CapabilityMap::new();
		if self.profile.report_bundle_id {
			caps.insert("CFBundleIdentifier".into(), json!(self.profile.bundle_id));
		}
		caps.insert("browserName".into(), json!(self.profile.app_name));
		caps.insert("device".into(), json!(self.profile.device));
		caps.insert("sdkVersion".into(), json!(self.profile.sdk_version));
		caps.insert("udid".into(), json!(self.profile.udid));
		caps
	}

	async fn stall(&self) {
		let delay = self.state.lock().stall;
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
	}

	fn web_page(&self, state: &SimState) -> Option<WebPage> {
		if state.screen() != Screen::WebView {
			return None;
		}
		let opened_at = state.webview_opened_at?;
		if opened_at.elapsed() < Duration::from_millis(self.profile.webview_attach_delay_ms) {
			return None;
		}
		let url = state.web.history.last().cloned().unwrap_or_else(|| WEB_HOME_URL.to_string());
		Some(WebPage {
			id: WEB_PAGE_ID.to_string(),
			title: self.title_for(&url),
			url,
		})
	}

	fn title_for(&self, url: &str) -> String {
		self.profile.titles.get(url).cloned().unwrap_or_else(|| url.to_string())
	}

	/// Fails unless the bridge is attached to a page that is still present.
	fn attached_page(&self, state: &SimState) -> BackendResult<WebPage> {
		state.ensure_running()?;
		let page = self.web_page(state);
		match (&state.web.attached, page) {
			(Some(attached), Some(page)) if *attached == page.id => Ok(page),
			(Some(attached), _) => Err(BackendError::Failed(format!("page {attached} is no longer attached"))),
			(None, _) => Err(BackendError::Failed("bridge is not attached to a page".to_string())),
		}
	}

	fn xml_source(&self, state: &SimState) -> String {
		let size = self.current_size(state);
		let children: String = state
			.screen()
			.elements()
			.iter()
			.map(|(kind, label)| format!(r#"<{kind} type="{kind}" name="{label}" label="{label}" visible="true"/>"#))
			.collect();
		format!(
			r#"<?xml version="1.0" encoding="UTF-8"?><AppiumAUT><XCUIElementTypeApplication type="XCUIElementTypeApplication" name="{name}" label="{name}" width="{w}" height="{h}">{children}</XCUIElementTypeApplication></AppiumAUT>"#,
			name = self.profile.app_name,
			w = size.width,
			h = size.height,
		)
	}

	fn json_source(&self, state: &SimState) -> String {
		let size = self.current_size(state);
		let children: Vec<Value> = state
			.screen()
			.elements()
			.iter()
			.map(|(kind, label)| json!({"type": kind, "name": label, "label": label, "isVisible": true}))
			.collect();
		json!({
			"AppiumAUT": {
				"type": "XCUIElementTypeApplication",
				"name": self.profile.app_name,
				"rect": {"x": 0, "y": 0, "width": size.width, "height": size.height},
				"children": children,
			}
		})
		.to_string()
	}

	fn current_size(&self, state: &SimState) -> WindowSize {
		match state.orientation {
			Orientation::Portrait => self.profile.window,
			Orientation::Landscape => self.profile.window.rotated(),
		}
	}
}

#[async_trait]
impl AppLauncher for SimDevice {
	async fn launch(&self, _requested: &CapabilityMap, health: HealthReporter) -> BackendResult<LaunchedApp> {
		if let Some(reason) = &self.profile.fail_launch {
			return Err(BackendError::Failed(reason.clone()));
		}
		{
			let mut state = self.state.lock();
			*state = SimState::new();
			state.running = true;
			state.reporter = Some(health.clone());
			state.log(LogType::Syslog, "INFO", format!("launched {}", self.profile.bundle_id));
		}
		if self.profile.bootstrap_delay_ms > 0 {
			tokio::time::sleep(Duration::from_millis(self.profile.bootstrap_delay_ms)).await;
		}
		self.state.lock().log(LogType::Performance, "INFO", "launch completed");
		health.backend_up();

		Ok(LaunchedApp {
			reported: self.reported_capabilities(),
			native: Arc::new(self.clone()),
			webview: Arc::new(self.clone()),
			device: Arc::new(self.clone()),
			logs: Arc::new(self.clone()),
		})
	}

	async fn terminate(&self) -> BackendResult<()> {
		let mut state = self.state.lock();
		if state.running {
			state.running = false;
			state.log(LogType::Syslog, "INFO", format!("terminated {}", self.profile.bundle_id));
		}
		state.reporter = None;
		Ok(())
	}
}

#[async_trait]
impl NativeEngine for SimDevice {
	async fn source(&self, format: SourceFormat) -> BackendResult<String> {
		self.stall().await;
		let state = self.state.lock();
		state.ensure_running()?;
		Ok(match format {
			SourceFormat::Xml => self.xml_source(&state),
			SourceFormat::Json => self.json_source(&state),
		})
	}

	async fn find(&self, locator: &Locator) -> BackendResult<Vec<ElementRef>> {
		self.stall().await;
		let state = self.state.lock();
		state.ensure_running()?;
		let screen = state.screen();
		let matches = |kind: &str, label: &str| match locator.using {
			LocatorStrategy::Id | LocatorStrategy::AccessibilityId => label == locator.value,
			LocatorStrategy::ClassName => kind == locator.value,
			LocatorStrategy::Xpath | LocatorStrategy::CssSelector => false,
		};
		if matches!(locator.using, LocatorStrategy::Xpath | LocatorStrategy::CssSelector) {
			return Err(BackendError::NotSupported(format!("native lookup by {locator}")));
		}
		Ok(screen
			.elements()
			.iter()
			.filter(|(kind, label)| matches(*kind, *label))
			.map(|(_, label)| ElementRef::new(format!("{}:{label}", screen.key())))
			.collect())
	}

	async fn click(&self, element: &ElementRef) -> BackendResult<()> {
		self.stall().await;
		let mut state = self.state.lock();
		state.ensure_running()?;
		let screen = state.screen();
		let label = element
			.id
			.strip_prefix(screen.key())
			.and_then(|rest| rest.strip_prefix(':'))
			.filter(|label| screen.elements().iter().any(|(_, l)| l == label))
			.ok_or_else(|| BackendError::Failed(format!("element {} is not on screen", element.id)))?
			.to_string();

		if let Some(next) = screen.destination(&label) {
			if next == Screen::WebView {
				state.webview_opened_at = Some(Instant::now());
			}
			state.screens.push(next);
		}
		state.log(LogType::Syslog, "INFO", format!("tap '{label}'"));
		Ok(())
	}

	async fn back(&self) -> BackendResult<()> {
		let mut state = self.state.lock();
		state.ensure_running()?;
		if state.screens.len() > 1 && state.screens.pop() == Some(Screen::WebView) {
			// Closing the screen tears down the page and its debugger connection.
			state.webview_opened_at = None;
			state.web.attached = None;
		}
		Ok(())
	}

	async fn execute(&self, name: &str, params: &Value) -> BackendResult<Value> {
		let state = self.state.lock();
		state.ensure_running()?;
		match name {
			"mobile: scroll" => {
				let element = params
					.get("element")
					.and_then(|e| e.as_str().or_else(|| e.get("ELEMENT").and_then(Value::as_str)));
				if let Some(id) = element {
					let screen = state.screen();
					let visible = screen
						.elements()
						.iter()
						.any(|(_, label)| format!("{}:{label}", screen.key()) == id);
					if !visible {
						return Err(BackendError::Failed(format!("cannot scroll to missing element {id}")));
					}
					return Ok(Value::Null);
				}
				match params.get("direction").and_then(Value::as_str) {
					Some("up" | "down" | "left" | "right") => Ok(Value::Null),
					Some(other) => Err(BackendError::Failed(format!("unknown scroll direction '{other}'"))),
					None => Err(BackendError::Failed(
						"mobile: scroll needs an element or a direction".to_string(),
					)),
				}
			}
			other => Err(BackendError::NotSupported(other.to_string())),
		}
	}
}

#[async_trait]
impl WebviewBridge for SimDevice {
	async fn pages(&self) -> BackendResult<Vec<WebPage>> {
		let state = self.state.lock();
		state.ensure_running()?;
		Ok(self.web_page(&state).into_iter().collect())
	}

	async fn attach(&self, page_id: &str) -> BackendResult<()> {
		let mut state = self.state.lock();
		state.ensure_running()?;
		match self.web_page(&state) {
			Some(page) if page.id == page_id => {
				state.web.attached = Some(page.id);
				state.web.attaches += 1;
				Ok(())
			}
			_ => Err(BackendError::Failed(format!("no page with id {page_id}"))),
		}
	}

	async fn source(&self) -> BackendResult<String> {
		let state = self.state.lock();
		let page = self.attached_page(&state)?;
		Ok(format!(
			r#"<html><head><title>{}</title></head><body><div id="i_am_an_id">I am a div</div><input id="i_am_a_textbox" type="text"/></body></html>"#,
			page.title
		))
	}

	async fn find(&self, locator: &Locator) -> BackendResult<Vec<ElementRef>> {
		let state = self.state.lock();
		self.attached_page(&state)?;
		let ids = ["i_am_an_id", "i_am_a_textbox"];
		let wanted = match locator.using {
			LocatorStrategy::Id => Some(locator.value.as_str()),
			LocatorStrategy::CssSelector => locator.value.strip_prefix('#'),
			_ => return Err(BackendError::NotSupported(format!("web lookup by {locator}"))),
		};
		Ok(ids
			.iter()
			.filter(|id| Some(**id) == wanted)
			.map(|id| ElementRef::new(format!("web:{id}")))
			.collect())
	}

	async fn click(&self, element: &ElementRef) -> BackendResult<()> {
		let state = self.state.lock();
		self.attached_page(&state)?;
		if element.id.starts_with("web:") {
			Ok(())
		} else {
			Err(BackendError::Failed(format!("element {} is not in the page", element.id)))
		}
	}

	async fn back(&self) -> BackendResult<()> {
		let mut state = self.state.lock();
		self.attached_page(&state)?;
		if state.web.history.len() > 1 {
			state.web.history.pop();
		}
		Ok(())
	}

	async fn navigate(&self, url: &str) -> BackendResult<()> {
		let mut state = self.state.lock();
		self.attached_page(&state)?;
		state.web.history.push(url.to_string());
		state.log(LogType::Syslog, "INFO", format!("web view loaded {url}"));
		Ok(())
	}

	async fn title(&self) -> BackendResult<String> {
		let state = self.state.lock();
		Ok(self.attached_page(&state)?.title)
	}

	async fn execute_script(&self, script: &str, _args: &Value) -> BackendResult<Value> {
		let state = self.state.lock();
		let page = self.attached_page(&state)?;
		match script.trim() {
			"return document.title" | "return document.title;" => Ok(json!(page.title)),
			"return window.location.href" | "return window.location.href;" => Ok(json!(page.url)),
			_ => Ok(Value::Null),
		}
	}
}

#[async_trait]
impl DeviceServices for SimDevice {
	async fn screenshot(&self) -> BackendResult<Screenshot> {
		let state = self.state.lock();
		state.ensure_running()?;
		let size = self.current_size(&state);
		let mut bytes = PNG_SIGNATURE.to_vec();
		bytes.extend_from_slice(&size.width.to_be_bytes());
		bytes.extend_from_slice(&size.height.to_be_bytes());
		bytes.extend_from_slice(state.orientation.as_str().as_bytes());
		bytes.extend_from_slice(state.screen().key().as_bytes());
		Ok(Screenshot(bytes))
	}

	async fn orientation(&self) -> BackendResult<Orientation> {
		let state = self.state.lock();
		state.ensure_running()?;
		Ok(state.orientation)
	}

	async fn set_orientation(&self, orientation: Orientation) -> BackendResult<()> {
		let mut state = self.state.lock();
		state.ensure_running()?;
		state.orientation = orientation;
		state.log(LogType::Syslog, "INFO", format!("orientation {orientation}"));
		Ok(())
	}

	async fn window_size(&self) -> BackendResult<WindowSize> {
		let state = self.state.lock();
		state.ensure_running()?;
		Ok(self.current_size(&state))
	}

	async fn set_geolocation(&self, latitude: f64, longitude: f64) -> BackendResult<()> {
		let mut state = self.state.lock();
		state.ensure_running()?;
		state.location = Some((latitude, longitude));
		Ok(())
	}

	async fn shake(&self) -> BackendResult<()> {
		let mut state = self.state.lock();
		state.ensure_running()?;
		state.shakes += 1;
		state.log(LogType::Syslog, "INFO", "shake gesture");
		Ok(())
	}

	async fn background(&self, duration: Duration) -> BackendResult<()> {
		{
			let mut state = self.state.lock();
			state.ensure_running()?;
			state.log(LogType::Syslog, "INFO", "application entered background");
		}
		tokio::time::sleep(duration).await;
		let mut state = self.state.lock();
		state.ensure_running()?;
		state.log(LogType::Syslog, "INFO", "application resumed");
		Ok(())
	}
}

#[async_trait]
impl LogSource for SimDevice {
	async fn read(&self, log_type: LogType) -> BackendResult<Vec<LogEntry>> {
		Ok(self.state.lock().logs.get(&log_type).cloned().unwrap_or_default())
	}
}

fn now_ms() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_millis() as u64
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::health::HealthBoard;

	async fn launched() -> (SimDevice, LaunchedApp) {
		let sim = SimDevice::default();
		let board = HealthBoard::new();
		let app = sim.launch(&CapabilityMap::new(), board.reporter()).await.unwrap();
		(sim, app)
	}

	#[tokio::test]
	async fn reports_engine_capabilities() {
		let (_sim, app) = launched().await;
		assert_eq!(app.reported["CFBundleIdentifier"], "com.example.apple-samplecode.UICatalog");
		assert_eq!(app.reported["browserName"], "UICatalog");
		assert_eq!(app.reported["device"], "iphone");
	}

	#[tokio::test]
	async fn tapping_web_view_attaches_a_page() {
		let (_sim, app) = launched().await;
		assert!(app.webview.pages().await.unwrap().is_empty());

		let el = app.native.find(&Locator::accessibility_id("Web View")).await.unwrap();
		app.native.click(&el[0]).await.unwrap();
		let pages = app.webview.pages().await.unwrap();
		assert_eq!(pages.len(), 1);

		app.webview.attach(&pages[0].id).await.unwrap();
		assert_eq!(app.webview.title().await.unwrap(), WEB_HOME_URL);

		app.native.back().await.unwrap();
		assert!(app.webview.pages().await.unwrap().is_empty());

		// Reopening shows the same page id, but the old connection is gone.
		let el = app.native.find(&Locator::accessibility_id("Web View")).await.unwrap();
		app.native.click(&el[0]).await.unwrap();
		assert_eq!(app.webview.pages().await.unwrap()[0].id, pages[0].id);
		assert!(app.webview.title().await.is_err());
	}

	#[tokio::test]
	async fn screenshot_changes_with_orientation() {
		let (_sim, app) = launched().await;
		let portrait = app.device.screenshot().await.unwrap();
		app.device.set_orientation(Orientation::Landscape).await.unwrap();
		let landscape = app.device.screenshot().await.unwrap();
		assert_ne!(portrait, landscape);
		assert!(landscape.as_bytes().starts_with(&PNG_SIGNATURE));
	}

	#[tokio::test]
	async fn crash_stops_the_engine() {
		let (sim, app) = launched().await;
		sim.crash("segfault");
		let err = app.native.source(SourceFormat::Xml).await.unwrap_err();
		assert!(matches!(err, BackendError::Terminated(_)));
		assert_eq!(app.logs.read(LogType::Crashlog).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn unknown_extension_is_not_supported() {
		let (_sim, app) = launched().await;
		let err = app.native.execute("mobile: pinch", &Value::Null).await.unwrap_err();
		assert_eq!(err, BackendError::NotSupported("mobile: pinch".into()));
	}
}
