use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "rdp-bridge")]
#[command(about = "Remote debugging protocol bridge for Chromium-style debug targets")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Read settings from FILE instead of the user config directory
	#[arg(short, long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

/// Where the debug target's HTTP endpoint lives.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
	/// Host of the target's remote debugging endpoint
	#[arg(long, value_name = "HOST")]
	pub target_host: Option<String>,

	/// Port of the target's remote debugging endpoint
	#[arg(long, value_name = "PORT")]
	pub target_port: Option<u16>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Accept front-end connections and bridge them to the target
	Serve {
		/// Address to listen on
		#[arg(long, value_name = "HOST")]
		listen: Option<String>,

		/// Port to listen on
		#[arg(short, long)]
		port: Option<u16>,

		#[command(flatten)]
		target: TargetArgs,
	},

	/// Forward the target's HTTP and WebSocket endpoints through this host
	Proxy {
		/// Address to listen on
		#[arg(long, value_name = "HOST")]
		listen: Option<String>,

		/// Port to listen on
		#[arg(short, long)]
		port: Option<u16>,

		/// Backend debugging endpoint as host:port
		#[arg(long, value_name = "HOST:PORT")]
		backend: Option<String>,
	},

	/// List the target's debuggable pages
	Tabs {
		#[command(flatten)]
		target: TargetArgs,
	},
}
