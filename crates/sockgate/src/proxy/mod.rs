pub mod upstream;

use crate::http::{
	Body, HeaderMap, HeaderValue, Request, Response, StatusCode, header, plaintext_response,
};
use crate::policy::{self, Verdict};
use crate::registry::SocketRegistry;
use crate::*;

#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
	#[error("Access denied: {0}")]
	Denied(String),
	/// The policy needs the body but it exceeds the buffering cap; fail closed.
	#[error("request body too large")]
	BodyRequiredTooLarge,
	#[error("request body too large")]
	BodyTooLarge,
	#[error("no configuration registered for this socket")]
	MissingConfig,
	#[error(transparent)]
	BodyRead(crate::http::BodyError),
	#[error("docker daemon unreachable: {0}")]
	UpstreamUnreachable(std::io::Error),
	#[error("upstream call failed: {0}")]
	UpstreamCallFailed(hyper::Error),
	#[error("request upgrade failed, backend tried {1:?} but {0:?} was requested")]
	UpgradeFailed(Option<HeaderValue>, Option<HeaderValue>),
}

impl ProxyError {
	pub fn into_response(self) -> Response {
		let code = match &self {
			ProxyError::Denied(_) => StatusCode::FORBIDDEN,
			ProxyError::BodyRequiredTooLarge => StatusCode::FORBIDDEN,
			ProxyError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,

			ProxyError::MissingConfig => StatusCode::INTERNAL_SERVER_ERROR,
			ProxyError::BodyRead(_) => StatusCode::INTERNAL_SERVER_ERROR,

			ProxyError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
			ProxyError::UpstreamCallFailed(_) => StatusCode::BAD_GATEWAY,
			ProxyError::UpgradeFailed(_, _) => StatusCode::BAD_GATEWAY,
		};
		plaintext_response(code, self.to_string())
	}
}

/// Per-socket request state. The config is deliberately not held here: every
/// request looks it up through the registry, so the registry stays the single
/// source of truth.
pub struct ProxyState {
	registry: Arc<SocketRegistry>,
	socket_path: PathBuf,
}

impl ProxyState {
	pub fn new(registry: Arc<SocketRegistry>, socket_path: PathBuf) -> Self {
		Self {
			registry,
			socket_path,
		}
	}
}

pub async fn handle(
	state: Arc<ProxyState>,
	req: ::http::Request<hyper::body::Incoming>,
) -> anyhow::Result<Response> {
	handle_request(state, req.map(Body::new)).await
}

pub async fn handle_request(state: Arc<ProxyState>, req: Request) -> anyhow::Result<Response> {
	match proxy_request(&state, req).await {
		Ok(resp) => Ok(resp),
		Err(err) => {
			debug!(socket = %state.socket_path.display(), %err, "request not forwarded");
			Ok(err.into_response())
		},
	}
}

async fn proxy_request(state: &ProxyState, req: Request) -> Result<Response, ProxyError> {
	let config = state
		.registry
		.config_for(&state.socket_path)
		.ok_or(ProxyError::MissingConfig)?;
	let cfg = state.registry.config();
	let (mut parts, body) = req.into_parts();
	let upgrade = upstream::UpgradeIntent::extract(&mut parts);
	let needs_body = config.requires_body();

	// Requests advertising an oversize body are never buffered. When the
	// policy does not inspect bodies they pass through untouched; otherwise
	// the request fails closed.
	let advertised = content_length(&parts.headers);
	if advertised.is_some_and(|len| len > cfg.max_request_body_bytes as u64) {
		if needs_body {
			return Err(ProxyError::BodyRequiredTooLarge);
		}
		let eval = policy::evaluate(&parts, Bytes::new(), &config);
		return match eval.verdict {
			Verdict::Deny { reason } => Err(ProxyError::Denied(reason)),
			Verdict::Allow { .. } => {
				upstream::forward(&cfg.docker_socket, parts, body, upgrade).await
			},
		};
	}

	let buffered = match crate::http::read_body(body, cfg.max_request_body_bytes).await {
		Ok(buffered) => buffered,
		Err(crate::http::BodyError::TooLarge) => {
			return Err(if needs_body {
				ProxyError::BodyRequiredTooLarge
			} else {
				ProxyError::BodyTooLarge
			});
		},
		Err(err) => return Err(ProxyError::BodyRead(err)),
	};

	let eval = policy::evaluate(&parts, buffered, &config);
	match eval.verdict {
		Verdict::Deny { reason } => return Err(ProxyError::Denied(reason)),
		Verdict::Allow { reason } => {
			if let Some(reason) = reason {
				debug!(socket = %state.socket_path.display(), %reason, "request allowed");
			}
		},
	}

	set_body_headers(&mut parts.headers, eval.body.len());
	upstream::forward(&cfg.docker_socket, parts, Body::from(eval.body), upgrade).await
}

/// The body is buffered (and possibly rewritten), so the outgoing framing is
/// always a plain Content-Length matching the bytes actually sent.
fn set_body_headers(headers: &mut HeaderMap, len: usize) {
	if len > 0 {
		headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
	} else {
		headers.remove(header::CONTENT_LENGTH);
	}
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
	headers
		.get(header::CONTENT_LENGTH)?
		.to_str()
		.ok()?
		.parse()
		.ok()
}
