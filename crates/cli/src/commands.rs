//! Subcommand implementations.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::info;
use uidrive::SessionCoordinator;
use uidrive::sim::SimDevice;

use crate::cli::{Cli, Commands, ServeArgs};
use crate::config::ServerConfig;
use crate::daemon::{self, Request, Response, Server};

pub async fn dispatch(cli: Cli) -> Result<ExitCode> {
	let mut config = ServerConfig::load(cli.config.as_deref())?;
	if let Some(socket) = cli.socket {
		config.socket = Some(socket);
	}

	match cli.command {
		Commands::Serve(args) => serve(apply_overrides(config, &args)).await.map(|()| ExitCode::SUCCESS),
		Commands::Status => send(&config, &Request::Status).await,
		Commands::Send { request } => {
			let request: Request = serde_json::from_str(&request).context("Invalid request JSON")?;
			send(&config, &request).await
		}
	}
}

/// Applies command-line flags on top of file values.
pub fn apply_overrides(mut config: ServerConfig, args: &ServeArgs) -> ServerConfig {
	if let Some(ms) = args.implicit_wait_ms {
		config.driver = config.driver.with_implicit_wait_ms(ms);
	}
	if let Some(ms) = args.command_timeout_ms {
		config.driver = config.driver.with_command_timeout_ms(ms);
	}
	config
}

async fn serve(config: ServerConfig) -> Result<()> {
	let socket = config.socket_path();
	let device = SimDevice::new(config.device.clone());
	info!(
		target = "uidrive.server",
		bundle_id = %device.profile().bundle_id,
		implicit_wait_ms = config.driver.implicit_wait_ms,
		command_timeout_ms = config.driver.command_timeout_ms,
		"starting server"
	);
	let coordinator = Arc::new(SessionCoordinator::new(Arc::new(device), config.driver));
	Server::bind(&socket, coordinator)?.run().await
}

async fn send(config: &ServerConfig, request: &Request) -> Result<ExitCode> {
	let socket = config.socket_path();
	let response = match daemon::send_request(&socket, request).await {
		Ok(response) => response,
		Err(err) if daemon::is_not_running(&err) => {
			bail!("no server listening on {} (start one with `uidrive serve`)", socket.display())
		}
		Err(err) => return Err(err),
	};

	println!("{}", serde_json::to_string_pretty(&response)?);
	Ok(match response {
		Response::Error { .. } => ExitCode::FAILURE,
		_ => ExitCode::SUCCESS,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn flags_override_file_values() {
		let mut config = ServerConfig::default();
		config.driver = config.driver.with_implicit_wait_ms(100).with_command_timeout_ms(9_000);

		let args = ServeArgs {
			implicit_wait_ms: Some(250),
			command_timeout_ms: None,
		};
		let config = apply_overrides(config, &args);
		assert_eq!(config.driver.implicit_wait_ms, 250);
		assert_eq!(config.driver.command_timeout_ms, 9_000);
	}
}
