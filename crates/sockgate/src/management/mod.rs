use serde::Serialize;
use sockgate_core::drain::DrainWatcher;

use crate::config::resolve_socket_path;
use crate::http::{Body, Method, Request, Response, StatusCode, json_response, read_body};
use crate::policy::SocketConfig;
use crate::registry::{RegistryError, SocketRegistry};
use crate::serve::UnixServer;
use crate::*;

/// Control-plane payloads are tiny; anything bigger than this is a mistake.
const MAX_CONFIG_BYTES: usize = 1024 * 1024;

const SOCKET_PATH_HEADER: &str = "socket-path";

pub(crate) struct State {
	registry: Arc<SocketRegistry>,
	cfg: Arc<Config>,
}

/// The management API, served on its own UNIX socket. Every mutation funnels
/// into the registry, which keeps listeners and persisted configs in step.
pub struct Service {
	s: UnixServer<State>,
}

impl Service {
	pub fn bind(
		cfg: Arc<Config>,
		registry: Arc<SocketRegistry>,
		drain_rx: DrainWatcher,
	) -> anyhow::Result<Self> {
		UnixServer::bind(
			"management",
			cfg.management_socket.clone(),
			drain_rx,
			State { registry, cfg },
		)
		.map(|s| Service { s })
	}

	pub fn path(&self) -> &Path {
		self.s.path()
	}

	pub fn spawn(self) {
		self
			.s
			.spawn(|state, req| async move { Ok(handle(state, req.map(Body::new)).await) })
	}
}

pub(crate) async fn handle(state: Arc<State>, req: Request) -> Response {
	let (parts, body) = req.into_parts();
	match (&parts.method, parts.uri.path()) {
		(&Method::POST, "/socket/create") => handle_create(&state, body).await,
		(&Method::GET, "/socket/list") => handle_list(&state),
		(&Method::GET, "/socket/describe") => handle_describe(&state, &parts),
		(&Method::DELETE, "/socket/delete") => handle_delete(&state, &parts).await,
		(&Method::DELETE, "/socket/clean") => handle_clean(&state).await,
		_ => failure(StatusCode::NOT_FOUND, "unknown endpoint"),
	}
}

#[derive(Serialize)]
struct Envelope<T: Serialize> {
	status: &'static str,
	response: T,
}

fn success<T: Serialize>(payload: T) -> Response {
	json_response(
		StatusCode::OK,
		&Envelope {
			status: "success",
			response: payload,
		},
	)
}

fn failure(code: StatusCode, message: impl ToString) -> Response {
	json_response(
		code,
		&Envelope {
			status: "error",
			response: message.to_string(),
		},
	)
}

fn registry_error(err: RegistryError) -> Response {
	let code = match &err {
		RegistryError::Invalid(_) => StatusCode::BAD_REQUEST,
		RegistryError::Store(_)
		| RegistryError::Bind { .. }
		| RegistryError::Cleanup(_)
		| RegistryError::Clean { .. } => StatusCode::INTERNAL_SERVER_ERROR,
	};
	failure(code, err)
}

#[derive(Serialize)]
struct CreateResponse {
	socket: PathBuf,
}

#[derive(Serialize)]
struct ListResponse {
	sockets: Vec<String>,
}

#[derive(Serialize)]
struct DescribeResponse {
	config: Arc<SocketConfig>,
}

#[derive(Serialize)]
struct MessageResponse {
	message: String,
}

async fn handle_create(state: &State, body: Body) -> Response {
	let bytes = match read_body(body, MAX_CONFIG_BYTES).await {
		Ok(bytes) => bytes,
		Err(err) => return failure(StatusCode::BAD_REQUEST, err),
	};
	let config: SocketConfig = if bytes.is_empty() {
		SocketConfig::default()
	} else {
		match serde_json::from_slice(&bytes) {
			Ok(config) => config,
			Err(err) => return failure(StatusCode::BAD_REQUEST, format!("invalid socket config: {err}")),
		}
	};
	match state.registry.create(config) {
		Ok(socket) => success(CreateResponse { socket }),
		Err(err) => registry_error(err),
	}
}

fn handle_list(state: &State) -> Response {
	let sockets = state
		.registry
		.list()
		.iter()
		.map(|path| {
			path
				.file_name()
				.map(|name| name.to_string_lossy().into_owned())
				.unwrap_or_else(|| path.display().to_string())
		})
		.collect();
	success(ListResponse { sockets })
}

fn handle_describe(state: &State, parts: &::http::request::Parts) -> Response {
	let Some(name) = query_param(parts, "socket") else {
		return failure(StatusCode::BAD_REQUEST, "missing socket parameter");
	};
	let path = resolve_socket_path(&state.cfg.socket_dir, &name);
	match state.registry.describe(&path) {
		Some(config) => success(DescribeResponse { config }),
		None => failure(
			StatusCode::NOT_FOUND,
			format!("socket not found: {}", path.display()),
		),
	}
}

async fn handle_delete(state: &State, parts: &::http::request::Parts) -> Response {
	let name = query_param(parts, "socket").or_else(|| {
		parts
			.headers
			.get(SOCKET_PATH_HEADER)
			.and_then(|v| v.to_str().ok())
			.map(str::to_string)
	});
	let Some(name) = name else {
		return failure(StatusCode::BAD_REQUEST, "missing socket parameter");
	};
	let path = resolve_socket_path(&state.cfg.socket_dir, &name);
	match state.registry.delete(&path).await {
		Ok(()) => success(MessageResponse {
			message: format!("Socket {} deleted successfully", path.display()),
		}),
		Err(err) => registry_error(err),
	}
}

async fn handle_clean(state: &State) -> Response {
	match state.registry.clean().await {
		Ok(deleted) => success(MessageResponse {
			message: format!("Deleted {deleted} sockets"),
		}),
		Err(err) => registry_error(err),
	}
}

fn query_param(parts: &::http::request::Parts, key: &str) -> Option<String> {
	let query = parts.uri.query()?;
	serde_urlencoded::from_str::<Vec<(String, String)>>(query)
		.ok()?
		.into_iter()
		.find(|(k, _)| k == key)
		.map(|(_, v)| v)
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
