use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use sockgate::config::RawConfig;
use sockgate_core::telemetry::{self, LogFormat};
use tracing::info;

mod client;

#[derive(Parser, Debug)]
#[command(name = "sockgate")]
#[command(about = "Policy-enforcing reverse proxy for the Docker Engine API", version)]
struct Args {
	/// Management API socket path
	#[arg(long, global = true, value_name = "path")]
	management_socket: Option<PathBuf>,

	/// Upstream Docker daemon socket
	#[arg(long, global = true, value_name = "path")]
	docker_socket: Option<PathBuf>,

	/// Directory holding proxy sockets and their configs
	#[arg(long, global = true, value_name = "dir")]
	socket_dir: Option<PathBuf>,

	#[arg(long, global = true, value_name = "level", default_value = "info")]
	log_level: String,

	#[arg(long, global = true, value_enum, default_value_t = Output::Text)]
	output: Output,

	/// Daemon config file (YAML or JSON)
	#[arg(short, long, global = true, value_name = "file")]
	file: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the proxy daemon
	Daemon,
	/// Manage proxy sockets through a running daemon
	Socket {
		#[command(subcommand)]
		command: SocketCommand,
	},
}

#[derive(Subcommand, Debug)]
pub enum SocketCommand {
	/// Mint a new proxy socket
	Create {
		/// Socket config file (YAML or JSON); "-" reads stdin, omitted sends
		/// an empty config
		config: Option<PathBuf>,
	},
	/// Delete a proxy socket
	Delete { socket: String },
	/// List proxy sockets
	List,
	/// Show the config bound to a socket
	Describe { socket: String },
	/// Delete every proxy socket
	Clean,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum Output {
	Text,
	Json,
	Yaml,
	Silent,
}

fn main() {
	let args = Args::parse();
	if let Err(err) = run(args) {
		eprintln!("error: {err:#}");
		std::process::exit(1);
	}
}

fn run(args: Args) -> anyhow::Result<()> {
	let overrides = RawConfig {
		socket_dir: args.socket_dir,
		docker_socket: args.docker_socket,
		management_socket: args.management_socket,
		..Default::default()
	};
	let contents = match &args.file {
		Some(file) => Some(fs_err::read_to_string(file)?),
		None => None,
	};
	let config = sockgate::config::parse_config(contents, overrides)?;

	let runtime = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()?;
	match args.command {
		Command::Daemon => {
			let format = match args.output {
				Output::Json => LogFormat::Json,
				_ => LogFormat::Text,
			};
			telemetry::setup_logging(&args.log_level, format)?;
			runtime.block_on(async move {
				info!(version = env!("CARGO_PKG_VERSION"), "starting sockgate");
				sockgate::app::run(Arc::new(config))
					.await?
					.wait_termination()
					.await
			})
		},
		Command::Socket { command } => {
			runtime.block_on(client::run(&config, command, args.output))
		},
	}
}
