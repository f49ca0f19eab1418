use ::http::request::Parts;
use headers::HeaderMapExt;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;

use super::ProxyError;
use crate::http::{Body, HeaderMap, HeaderValue, Response, StatusCode, header, uri};
use crate::*;

/// A client's request to take over the connection. Docker hijacks
/// `attach`/`exec` streams this way, sending `Connection: Upgrade` plus
/// `Upgrade: tcp`; the intent holds what is needed to splice the two sides
/// together once Docker agrees.
pub(crate) struct UpgradeIntent {
	protocol: HeaderValue,
	client: OnUpgrade,
}

impl UpgradeIntent {
	/// Scrubs the request of hop-by-hop headers and, when the client asked to
	/// upgrade, re-arms the upgrade pair on the outgoing request and captures
	/// the client's upgrade handle.
	pub(crate) fn extract(parts: &mut Parts) -> Option<UpgradeIntent> {
		let protocol = strip_hop_headers(&mut parts.headers)?;
		parts.headers.typed_insert(headers::Connection::upgrade());
		parts.headers.insert(header::UPGRADE, protocol.clone());
		let client = parts.extensions.remove::<OnUpgrade>()?;
		Some(UpgradeIntent { protocol, client })
	}

	/// Docker answered 101; hand the response back to the client and splice
	/// the two upgraded streams in the background.
	fn bridge(self, mut resp: ::http::Response<hyper::body::Incoming>) -> Result<Response, ProxyError> {
		let offered = resp.headers().get(header::UPGRADE).cloned();
		if offered.as_ref() != Some(&self.protocol) {
			return Err(ProxyError::UpgradeFailed(Some(self.protocol), offered));
		}
		let docker = resp
			.extensions_mut()
			.remove::<OnUpgrade>()
			.ok_or(ProxyError::UpgradeFailed(Some(self.protocol), None))?;
		tokio::spawn(splice(self.client, docker));
		Ok(resp.map(Body::new))
	}
}

/// Hop-by-hop headers are meaningful only on the incoming connection and never
/// forwarded. Returns the requested upgrade protocol, if there was a coherent
/// `Connection: Upgrade` + `Upgrade:` pair.
fn strip_hop_headers(headers: &mut HeaderMap) -> Option<HeaderValue> {
	let protocol = headers
		.typed_get::<headers::Connection>()
		.filter(|connection| connection.contains(header::UPGRADE))
		.and_then(|_| headers.get(header::UPGRADE).cloned());
	for name in [
		header::CONNECTION,
		header::PROXY_AUTHENTICATE,
		header::PROXY_AUTHORIZATION,
		header::TE,
		header::TRAILER,
		header::TRANSFER_ENCODING,
		header::UPGRADE,
	] {
		headers.remove(name);
	}
	headers.remove("keep-alive");
	protocol
}

/// Copies bytes both ways between the hijacked client connection and the
/// hijacked Docker connection until either side closes.
async fn splice(client: OnUpgrade, docker: OnUpgrade) {
	let (client, docker) = match tokio::join!(client, docker) {
		(Ok(client), Ok(docker)) => (client, docker),
		(Err(err), _) | (_, Err(err)) => {
			error!(%err, "connection hijack failed");
			return;
		},
	};
	let mut client = TokioIo::new(client);
	let mut docker = TokioIo::new(docker);
	match tokio::io::copy_bidirectional(&mut client, &mut docker).await {
		Ok((from_client, from_docker)) => {
			debug!(from_client, from_docker, "hijacked stream closed");
		},
		Err(err) => debug!(%err, "hijacked stream closed with error"),
	}
}

/// Forwards one request over a fresh connection to the Docker daemon socket
/// and streams the response back verbatim. Scheme and authority are dropped
/// from the URI; over a UNIX socket only the origin-form matters.
pub(crate) async fn forward(
	docker: &Path,
	mut parts: Parts,
	body: Body,
	upgrade: Option<UpgradeIntent>,
) -> Result<Response, ProxyError> {
	let mut origin_form = uri::Parts::default();
	origin_form.path_and_query = parts
		.uri
		.path_and_query()
		.cloned()
		.or_else(|| Some(uri::PathAndQuery::from_static("/")));
	parts.uri = http::Uri::from_parts(origin_form).expect("origin-form uri from existing path");

	let stream = UnixStream::connect(docker)
		.await
		.map_err(ProxyError::UpstreamUnreachable)?;
	let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
		.await
		.map_err(ProxyError::UpstreamCallFailed)?;
	tokio::spawn(async move {
		if let Err(err) = conn.with_upgrades().await {
			debug!(%err, "upstream connection closed with error");
		}
	});

	let resp = sender
		.send_request(::http::Request::from_parts(parts, body))
		.await
		.map_err(ProxyError::UpstreamCallFailed)?;
	if resp.status() == StatusCode::SWITCHING_PROTOCOLS {
		return match upgrade {
			Some(intent) => intent.bridge(resp),
			None => Err(ProxyError::UpgradeFailed(
				None,
				resp.headers().get(header::UPGRADE).cloned(),
			)),
		};
	}
	Ok(resp.map(Body::new))
}
