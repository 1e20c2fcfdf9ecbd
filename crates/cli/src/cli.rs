use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Root CLI for the uidrive automation server.
#[derive(Parser, Debug)]
#[command(name = "uidrive")]
#[command(about = "Mobile app automation server with native and web-view contexts")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Server socket path (defaults to $XDG_RUNTIME_DIR/uidrive.sock)
	#[arg(long, global = true, value_name = "PATH")]
	pub socket: Option<PathBuf>,

	/// Config file (defaults to $XDG_CONFIG_HOME/uidrive/config.json)
	#[arg(long, global = true, value_name = "PATH")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run the server against the simulated device.
	Serve(ServeArgs),
	/// Print the status descriptor of a running server.
	Status,
	/// Send one raw JSON request and print the response.
	Send {
		#[arg(value_name = "JSON")]
		request: String,
	},
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
	/// Initial implicit wait for element lookups.
	#[arg(long, value_name = "MS")]
	pub implicit_wait_ms: Option<u64>,

	/// Deadline for each backend call.
	#[arg(long, value_name = "MS")]
	pub command_timeout_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn serve_flags_parse() {
		let cli = Cli::try_parse_from(["uidrive", "-vv", "serve", "--implicit-wait-ms", "500"]).unwrap();
		assert_eq!(cli.verbose, 2);
		let Commands::Serve(args) = cli.command else {
			panic!("expected serve");
		};
		assert_eq!(args.implicit_wait_ms, Some(500));
		assert_eq!(args.command_timeout_ms, None);
	}

	#[test]
	fn socket_is_global() {
		let cli = Cli::try_parse_from(["uidrive", "status", "--socket", "/tmp/x.sock"]).unwrap();
		assert_eq!(cli.socket, Some(PathBuf::from("/tmp/x.sock")));
		assert!(matches!(cli.command, Commands::Status));
	}

	#[test]
	fn send_takes_raw_json() {
		let cli = Cli::try_parse_from(["uidrive", "send", r#"{"type":"status"}"#]).unwrap();
		assert!(matches!(cli.command, Commands::Send { ref request } if request.contains("status")));
	}
}
