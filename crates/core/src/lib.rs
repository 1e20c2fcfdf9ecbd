//! uidrive core: session coordination and context-aware command routing.
//!
//! One [`SessionCoordinator`] owns the single live session of a server
//! process. Commands are serialized through its execution lock and routed
//! to the native automation engine or the web-view bridge depending on the
//! active context, while `status` answers from published health state
//! without ever contending for that lock.
//!
//! # Architecture
//!
//! ```text
//! client ─► SessionCoordinator ──status()──► HealthBoard (published snapshot)
//!                 │
//!                 │ execute() holds the execution lock
//!                 ▼
//!           ContextRegistry ── active context ──┐
//!                 │                             ▼
//!                 └──────────────────────► CommandRouter
//!                                  ┌───────────┼────────────┐
//!                                  ▼           ▼            ▼
//!                            NativeEngine WebviewBridge DeviceServices
//! ```
//!
//! Backends are consumed through the traits in [`backend`]; [`sim`] provides
//! an in-memory device implementing all of them.

pub mod backend;
pub mod capabilities;
pub mod command;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod logs;
pub mod router;
pub mod sim;

pub use backend::{
	AppLauncher, BackendError, BackendKind, BackendResult, DeviceServices, LaunchedApp, LogSource,
	NativeEngine, WebPage, WebviewBridge,
};
pub use command::{Command, DeviceCommand, Reply, RoutedCommand, RoutedKind};
pub use config::DriverConfig;
pub use context::ContextRegistry;
pub use coordinator::{Session, SessionCoordinator, USE_JSON_SOURCE};
pub use error::{Error, Result};
pub use health::{HealthBoard, HealthReporter, HealthSnapshot};
pub use logs::LogAggregator;
pub use router::{CommandRouter, Handler};
pub use uidrive_protocol as protocol;
