//! nettables demo binary.
//!
//! Runs either side of the example exchange:
//! - `nettables server` publishes `FromServer` and prints `FromClient`
//! - `nettables client <ENDPOINT>` publishes `FromClient` and prints `FromServer`

mod app;
mod config;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nettables_tcp::TcpConnector;
use tracing::info;

use crate::config::DemoConfig;

/// Demo command line arguments.
#[derive(Parser, Debug)]
#[command(name = "nettables")]
#[command(about = "Exchange directional key-value tables over TCP")]
struct Args {
	/// TOML configuration file
	#[arg(short, long, value_name = "PATH", global = true)]
	config: Option<PathBuf>,

	/// Verbose logging
	#[arg(short, long, global = true)]
	verbose: bool,

	/// Stop after this many sends
	#[arg(short = 'n', long, global = true)]
	iterations: Option<u64>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Accept clients and publish `FromServer`
	Server {
		/// Listen address, overriding `bind` and `port` from the config
		#[arg(long, value_name = "ADDR")]
		bind: Option<SocketAddr>,
	},
	/// Connect to a server and publish `FromClient`
	Client {
		/// IP address, `host:port`, or team number
		endpoint: String,
	},
}

fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	setup_tracing(args.verbose);

	let config = DemoConfig::load(args.config.as_deref())?;
	let connector = TcpConnector::default().with_bind(config.bind_addr()).with_port(config.port);

	match args.command {
		Command::Server { bind } => {
			let connector = match bind {
				Some(bind) => connector.with_bind(bind),
				None => connector,
			};
			info!(bind = %connector.bind, "starting server");
			app::run_server(&connector, &config, args.iterations)
		}
		Command::Client { endpoint } => {
			info!(%endpoint, "starting client");
			app::run_client(&connector, &endpoint, &config, args.iterations)
		}
	}
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("nettables=trace,nettables_tcp=trace,debug")
		} else {
			EnvFilter::new("info")
		}
	});

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[cfg(test)]
mod tests {
	use clap::CommandFactory;

	use super::*;

	#[test]
	fn cli_definition_is_consistent() {
		Args::command().debug_assert();
	}

	#[test]
	fn client_takes_endpoint_and_global_flags() {
		let args = Args::try_parse_from(["nettables", "client", "4030", "-n", "3", "--verbose"]).unwrap();
		assert!(args.verbose);
		assert_eq!(args.iterations, Some(3));
		assert!(matches!(args.command, Command::Client { ref endpoint } if endpoint == "4030"));
	}

	#[test]
	fn server_bind_override_parses() {
		let args = Args::try_parse_from(["nettables", "server", "--bind", "127.0.0.1:5800"]).unwrap();
		let Command::Server { bind } = args.command else {
			panic!("expected server command");
		};
		assert_eq!(bind, Some("127.0.0.1:5800".parse().unwrap()));
	}
}
