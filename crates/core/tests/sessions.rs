//! Session lifecycle and the status path against the simulated device.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use uidrive::protocol::{CapabilityMap, Locator};
use uidrive::sim::{SimDevice, SimProfile};
use uidrive::{DriverConfig, Error, SessionCoordinator};

fn caps(value: serde_json::Value) -> CapabilityMap {
	value.as_object().cloned().unwrap_or_default()
}

fn coordinator(sim: &SimDevice, config: DriverConfig) -> Arc<SessionCoordinator> {
	Arc::new(SessionCoordinator::new(Arc::new(sim.clone()), config))
}

#[tokio::test]
async fn status_without_session_is_ready_and_idle() {
	let sim = SimDevice::default();
	let driver = coordinator(&sim, DriverConfig::default());
	let status = driver.status();
	assert!(status.ready);
	assert!(!status.busy);
	assert_eq!(status.session_id, None);
	assert!(!status.build.version.is_empty());
}

#[tokio::test]
async fn start_session_merges_engine_capabilities() {
	let sim = SimDevice::default();
	let driver = coordinator(&sim, DriverConfig::default());

	let requested = caps(json!({
		"platformName": "iOS",
		"platformVersion": "10.3",
		"app": "/apps/UICatalog.app",
		"CFBundleIdentifier": "wrong.bundle.id",
		"noReset": true,
	}));
	let created = driver.start_session(requested.clone()).await.unwrap();

	assert_eq!(created.capabilities["CFBundleIdentifier"], "com.example.apple-samplecode.UICatalog");
	assert_eq!(created.capabilities["sdkVersion"], "10.3.1");
	assert_eq!(created.capabilities["noReset"], true);
	for key in requested.keys() {
		assert!(created.capabilities.contains_key(key), "missing requested key {key}");
	}
	assert_eq!(created.settings["useJSONSource"], false);
	assert!(created.created_at > 0);
	let again = driver.session_capabilities(false).await.unwrap();
	assert_eq!(again.created_at, created.created_at);

	let status = driver.status();
	assert_eq!(status.session_id.as_deref(), Some(created.session_id.as_str()));
	assert!(status.ready);
	assert!(status.backend.ready);
}

#[tokio::test(start_paused = true)]
async fn bootstrap_timeout_tears_the_application_down() {
	let sim = SimDevice::new(SimProfile {
		bootstrap_delay_ms: 5_000,
		..SimProfile::default()
	});
	let driver = coordinator(&sim, DriverConfig::default().with_command_timeout_ms(1_000));

	let err = driver.start_session(CapabilityMap::new()).await.unwrap_err();
	assert!(matches!(err, Error::SessionStart(_)));
	assert!(err.to_string().contains("1000ms"));
	assert!(!sim.is_running());
	assert_eq!(driver.status().session_id, None);
}

#[tokio::test]
async fn second_session_is_rejected() {
	let sim = SimDevice::default();
	let driver = coordinator(&sim, DriverConfig::default());
	driver.start_session(CapabilityMap::new()).await.unwrap();
	let err = driver.start_session(CapabilityMap::new()).await.unwrap_err();
	assert!(matches!(err, Error::SessionStart(_)));
	assert_eq!(err.code(), "session not created");
}

#[tokio::test]
async fn missing_bundle_id_fails_and_tears_down() {
	let sim = SimDevice::new(SimProfile {
		report_bundle_id: false,
		..SimProfile::default()
	});
	let driver = coordinator(&sim, DriverConfig::default());

	let err = driver.start_session(CapabilityMap::new()).await.unwrap_err();
	assert!(matches!(err, Error::SessionStart(_)));
	assert!(!sim.is_running());
	assert_eq!(driver.status().session_id, None);

	// Client-side spelling is enough.
	let created = driver
		.start_session(caps(json!({"bundleId": "com.example.client"})))
		.await
		.unwrap();
	assert_eq!(created.capabilities["bundleId"], "com.example.client");
}

#[tokio::test]
async fn platform_version_must_prefix_sdk_version() {
	let sim = SimDevice::default();
	let driver = coordinator(&sim, DriverConfig::default());
	let err = driver
		.start_session(caps(json!({"platformVersion": "11.0"})))
		.await
		.unwrap_err();
	assert!(err.to_string().contains("11.0"));
}

#[tokio::test]
async fn bootstrap_failure_is_fatal() {
	let sim = SimDevice::new(SimProfile {
		fail_launch: Some("app not installed".into()),
		..SimProfile::default()
	});
	let driver = coordinator(&sim, DriverConfig::default());
	let err = driver.start_session(CapabilityMap::new()).await.unwrap_err();
	assert!(err.to_string().contains("app not installed"));
	assert!(driver.status().ready);
}

#[tokio::test]
async fn delete_session_is_idempotent() {
	let sim = SimDevice::default();
	let driver = coordinator(&sim, DriverConfig::default());
	driver.delete_session().await.unwrap();

	driver.start_session(CapabilityMap::new()).await.unwrap();
	driver.delete_session().await.unwrap();
	assert!(!sim.is_running());
	assert_eq!(driver.status().session_id, None);
	driver.delete_session().await.unwrap();

	// A fresh session can follow.
	driver.start_session(CapabilityMap::new()).await.unwrap();
	assert!(driver.status().ready);
}

#[tokio::test]
async fn commands_without_session_fail() {
	let sim = SimDevice::default();
	let driver = coordinator(&sim, DriverConfig::default());
	let err = driver.screenshot().await.unwrap_err();
	assert!(matches!(err, Error::NoSession));
	assert_eq!(err.code(), "invalid session id");
	assert!(!driver.status().busy);
}

#[tokio::test(start_paused = true)]
async fn status_answers_while_find_is_in_flight() {
	let sim = SimDevice::default();
	let driver = coordinator(&sim, DriverConfig::default());
	driver.start_session(CapabilityMap::new()).await.unwrap();
	driver.set_implicit_wait(10_000).await.unwrap();

	let worker = Arc::clone(&driver);
	let find = tokio::spawn(async move { worker.find_element(Locator::accessibility_id("Nonexistent")).await });

	while !driver.status().busy {
		tokio::task::yield_now().await;
	}
	let status = driver.status();
	assert!(status.busy);
	assert!(status.ready);

	let err = find.await.unwrap().unwrap_err();
	assert!(matches!(err, Error::NoSuchElement { waited_ms: 10_000, .. }));
	assert_eq!(err.code(), "no such element");
	assert!(!driver.status().busy);
}

#[tokio::test(start_paused = true)]
async fn crash_fails_in_flight_command_and_flips_readiness() {
	let sim = SimDevice::default();
	let driver = coordinator(&sim, DriverConfig::default());
	driver.start_session(CapabilityMap::new()).await.unwrap();
	sim.set_stall(Some(Duration::from_secs(30)));

	let worker = Arc::clone(&driver);
	let source = tokio::spawn(async move { worker.source(None).await });
	while !driver.status().busy {
		tokio::task::yield_now().await;
	}

	sim.crash("EXC_BAD_ACCESS");
	let err = source.await.unwrap().unwrap_err();
	assert!(err.is_terminated(), "unexpected error: {err}");

	let status = driver.status();
	assert!(!status.ready);
	assert!(!status.busy);
	assert_eq!(status.backend.reason.as_deref(), Some("EXC_BAD_ACCESS"));

	// Application calls fail fast until the session is replaced.
	assert!(driver.screenshot().await.unwrap_err().is_terminated());

	// Device collectors still answer.
	let crashes = driver.log("crashlog").await.unwrap();
	assert_eq!(crashes.len(), 1);
	assert!(crashes[0].message.contains("EXC_BAD_ACCESS"));

	driver.delete_session().await.unwrap();
	assert!(driver.status().ready);
}

#[tokio::test(start_paused = true)]
async fn command_deadline_produces_timeout() {
	let sim = SimDevice::default();
	let driver = coordinator(&sim, DriverConfig::default().with_command_timeout_ms(500));
	driver.start_session(CapabilityMap::new()).await.unwrap();
	sim.set_stall(Some(Duration::from_secs(5)));

	let err = driver.source(None).await.unwrap_err();
	assert!(err.is_timeout());
	assert_eq!(err.code(), "timeout");

	// The lock was released on the error path.
	sim.set_stall(None);
	assert!(driver.source(None).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn delete_interrupts_in_flight_command() {
	let sim = SimDevice::default();
	let driver = coordinator(&sim, DriverConfig::default());
	driver.start_session(CapabilityMap::new()).await.unwrap();
	sim.set_stall(Some(Duration::from_secs(30)));

	let worker = Arc::clone(&driver);
	let source = tokio::spawn(async move { worker.source(None).await });
	while !driver.status().busy {
		tokio::task::yield_now().await;
	}

	driver.delete_session().await.unwrap();
	let err = source.await.unwrap().unwrap_err();
	assert!(err.is_terminated());
	assert_eq!(driver.status().session_id, None);
	assert!(!sim.is_running());
}

#[tokio::test]
async fn capabilities_snapshot_hides_events_unless_asked() {
	let sim = SimDevice::default();
	let driver = coordinator(&sim, DriverConfig::default());
	driver.start_session(CapabilityMap::new()).await.unwrap();
	driver.source(None).await.unwrap();
	driver.shake_device().await.unwrap();

	let plain = driver.session_capabilities(false).await.unwrap();
	assert!(!plain.capabilities.contains_key("events"));

	let detailed = driver.session_capabilities(true).await.unwrap();
	let events = &detailed.capabilities["events"];
	assert_eq!(events["getSource"].as_array().map(Vec::len), Some(1));
	assert_eq!(events["shakeDevice"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn settings_toggle_json_source() {
	let sim = SimDevice::default();
	let driver = coordinator(&sim, DriverConfig::default());
	driver.start_session(CapabilityMap::new()).await.unwrap();

	let xml = driver.source(None).await.unwrap();
	assert!(xml.contains("<AppiumAUT>"));
	assert!(xml.contains("XCUIElementTypeApplication"));

	let settings = driver
		.update_settings(caps(json!({"useJSONSource": true})))
		.await
		.unwrap();
	assert_eq!(settings["useJSONSource"], true);

	let source = driver.source(None).await.unwrap();
	let tree: serde_json::Value = serde_json::from_str(&source).unwrap();
	assert_eq!(tree["AppiumAUT"]["type"], "XCUIElementTypeApplication");

	let err = driver
		.update_settings(caps(json!({"useJSONSource": "yes"})))
		.await
		.unwrap_err();
	assert!(err.is_validation());
	assert_eq!(driver.settings().await.unwrap()["useJSONSource"], true);
}
