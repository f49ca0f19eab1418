use std::env;

use serde::{Deserialize, Serialize};

use crate::serdes;
use crate::*;

/// Environment override for the management socket path.
pub const MANAGEMENT_SOCKET_ENV: &str = "DOCKER_PROXY_MANAGEMENT_SOCKET";

const MANAGEMENT_SOCKET_NAME: &str = "sockgate.sock";
const DEFAULT_SOCKET_DIR: &str = "/var/run/sockgate";
const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";
const DEFAULT_MAX_REQUEST_BODY_BYTES: usize = 64 * 1024 * 1024;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
	/// Directory holding the management socket, every proxy socket, and their
	/// persisted configs.
	pub socket_dir: PathBuf,
	/// The upstream Docker daemon socket requests are forwarded to.
	pub docker_socket: PathBuf,
	/// The socket the management API is served on.
	pub management_socket: PathBuf,
	/// Requests with bodies larger than this are never buffered; policies that
	/// need the body fail closed instead.
	pub max_request_body_bytes: usize,
	pub shutdown_grace_secs: u64,
}

impl Config {
	pub fn shutdown_grace(&self) -> Duration {
		Duration::from_secs(self.shutdown_grace_secs)
	}
}

/// The file/flag-facing shape of [`Config`]: everything optional, resolved
/// against defaults (and the environment) by [`parse_config`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RawConfig {
	pub socket_dir: Option<PathBuf>,
	pub docker_socket: Option<PathBuf>,
	pub management_socket: Option<PathBuf>,
	pub max_request_body_bytes: Option<usize>,
	pub shutdown_grace_secs: Option<u64>,
}

impl RawConfig {
	/// Later values win; used to layer CLI flags over a config file.
	pub fn merge(self, over: RawConfig) -> RawConfig {
		RawConfig {
			socket_dir: over.socket_dir.or(self.socket_dir),
			docker_socket: over.docker_socket.or(self.docker_socket),
			management_socket: over.management_socket.or(self.management_socket),
			max_request_body_bytes: over.max_request_body_bytes.or(self.max_request_body_bytes),
			shutdown_grace_secs: over.shutdown_grace_secs.or(self.shutdown_grace_secs),
		}
	}
}

pub fn parse_config(contents: Option<String>, overrides: RawConfig) -> anyhow::Result<Config> {
	let env_management = env::var_os(MANAGEMENT_SOCKET_ENV).map(PathBuf::from);
	parse_layered(contents, overrides, env_management)
}

/// Precedence, lowest to highest: config file, then the environment override,
/// then explicit flags.
fn parse_layered(
	contents: Option<String>,
	overrides: RawConfig,
	env_management: Option<PathBuf>,
) -> anyhow::Result<Config> {
	let raw: RawConfig = match contents {
		Some(contents) => serdes::yamlviajson::from_str(&contents).context("parse config file")?,
		None => RawConfig::default(),
	};
	let env = RawConfig {
		management_socket: env_management,
		..Default::default()
	};
	resolve(raw.merge(env).merge(overrides))
}

fn resolve(raw: RawConfig) -> anyhow::Result<Config> {
	let socket_dir = raw
		.socket_dir
		.unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_DIR));
	let management_socket = raw
		.management_socket
		.unwrap_or_else(|| socket_dir.join(MANAGEMENT_SOCKET_NAME));
	Ok(Config {
		docker_socket: raw
			.docker_socket
			.unwrap_or_else(|| PathBuf::from(DEFAULT_DOCKER_SOCKET)),
		management_socket,
		max_request_body_bytes: raw
			.max_request_body_bytes
			.unwrap_or(DEFAULT_MAX_REQUEST_BODY_BYTES),
		shutdown_grace_secs: raw
			.shutdown_grace_secs
			.unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
		socket_dir,
	})
}

/// Resolves a user-supplied socket name: anything with a path separator is
/// taken as-is, a bare name is looked up in the socket directory.
pub fn resolve_socket_path(socket_dir: &Path, name: &str) -> PathBuf {
	if name.contains('/') {
		PathBuf::from(name)
	} else {
		socket_dir.join(name)
	}
}
