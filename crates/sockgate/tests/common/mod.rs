use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper_util::rt::TokioIo;
use serde_json::{Value, json};
use sockgate::Config;
use sockgate::http::{Response, StatusCode, json_response};
use sockgate::serve::UnixServer;
use sockgate_core::drain::{self, DrainTrigger};
use tokio::net::UnixStream;

pub fn test_config(dir: &Path) -> Arc<Config> {
	Arc::new(Config {
		socket_dir: dir.to_path_buf(),
		docker_socket: dir.join("docker.sock"),
		management_socket: dir.join("sockgate.sock"),
		max_request_body_bytes: 1024 * 1024,
		shutdown_grace_secs: 1,
	})
}

/// A stand-in Docker daemon that echoes back what it received, so tests can
/// assert on exactly what crossed the socket.
pub fn spawn_docker_stub(path: &Path) -> DrainTrigger {
	let (trigger, watcher) = drain::new();
	let server = UnixServer::bind("docker-stub", path, watcher, ()).expect("bind docker stub");
	server.spawn(|_: Arc<()>, req| async move { echo(req).await });
	trigger
}

async fn echo(mut req: http::Request<hyper::body::Incoming>) -> anyhow::Result<Response> {
	if req.headers().contains_key(http::header::UPGRADE) {
		return hijack(&mut req);
	}
	let (parts, body) = req.into_parts();
	let content_length = parts
		.headers
		.get(http::header::CONTENT_LENGTH)
		.and_then(|v| v.to_str().ok())
		.map(str::to_string);
	let bytes = body.collect().await?.to_bytes();
	let payload = json!({
		"method": parts.method.as_str(),
		"path": parts.uri.path(),
		"contentLength": content_length,
		"receivedBytes": bytes.len(),
		"body": serde_json::from_slice::<Value>(&bytes).ok(),
	});
	Ok(json_response(StatusCode::OK, &payload))
}

/// Accepts the hijack the way Docker does for `attach`: answer 101 and then
/// echo every byte back over the raw connection.
fn hijack(req: &mut http::Request<hyper::body::Incoming>) -> anyhow::Result<Response> {
	use tokio::io::{AsyncReadExt, AsyncWriteExt};

	let upgrade = hyper::upgrade::on(req);
	tokio::spawn(async move {
		let Ok(upgraded) = upgrade.await else { return };
		let mut io = TokioIo::new(upgraded);
		let mut buf = [0u8; 1024];
		loop {
			match io.read(&mut buf).await {
				Ok(0) | Err(_) => break,
				Ok(n) => {
					if io.write_all(&buf[..n]).await.is_err() {
						break;
					}
				},
			}
		}
	});
	Ok(
		http::Response::builder()
			.status(StatusCode::SWITCHING_PROTOCOLS)
			.header(http::header::CONNECTION, "Upgrade")
			.header(http::header::UPGRADE, "tcp")
			.body(sockgate::http::Body::empty())
			.expect("builder with known status code should not fail"),
	)
}

/// Sends one request over a UNIX socket and parses the JSON response.
pub async fn request(
	socket: &Path,
	method: &str,
	uri: &str,
	body: Option<Value>,
) -> (StatusCode, Value) {
	let body = body.map(|v| serde_json::to_vec(&v).expect("serialize request body"));
	let (status, bytes) = raw_request(socket, method, uri, body, &[]).await;
	let value = serde_json::from_slice(&bytes).expect("response is JSON");
	(status, value)
}

pub async fn raw_request(
	socket: &Path,
	method: &str,
	uri: &str,
	body: Option<Vec<u8>>,
	headers: &[(&str, &str)],
) -> (StatusCode, Vec<u8>) {
	let stream = UnixStream::connect(socket).await.expect("connect socket");
	let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
		.await
		.expect("handshake");
	tokio::spawn(async move {
		let _ = conn.await;
	});
	let mut builder = http::Request::builder()
		.method(method)
		.uri(uri)
		.header(http::header::HOST, "test")
		.header(http::header::CONTENT_TYPE, "application/json");
	for (name, value) in headers {
		builder = builder.header(*name, *value);
	}
	let req = builder
		.body(http_body_util::Full::new(Bytes::from(body.unwrap_or_default())))
		.expect("build request");
	let resp = sender.send_request(req).await.expect("send request");
	let status = resp.status();
	let bytes = resp
		.into_body()
		.collect()
		.await
		.expect("read response")
		.to_bytes();
	(status, bytes.to_vec())
}

/// Triggers the daemon's shutdown path and waits for it to finish.
pub async fn shutdown(bound: sockgate::app::Bound) {
	let trigger = bound.shutdown.trigger();
	let wait = tokio::spawn(bound.wait_termination());
	trigger.shutdown_now().await;
	wait.await.expect("join").expect("clean shutdown");
}
