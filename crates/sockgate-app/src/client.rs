use std::io::Read;
use std::path::Path;

use anyhow::{Context, bail};
use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use sockgate::{Config, serdes};
use tokio::net::UnixStream;

use crate::{Output, SocketCommand};

/// Runs one `socket` subcommand against the daemon's management API and
/// renders the result.
pub async fn run(config: &Config, command: SocketCommand, output: Output) -> anyhow::Result<()> {
	let (method, uri, body) = match &command {
		SocketCommand::Create { config } => {
			(Method::POST, "/socket/create".to_string(), create_body(config.as_deref())?)
		},
		SocketCommand::List => (Method::GET, "/socket/list".to_string(), String::new()),
		SocketCommand::Describe { socket } => (
			Method::GET,
			format!("/socket/describe?{}", socket_query(socket)?),
			String::new(),
		),
		SocketCommand::Delete { socket } => (
			Method::DELETE,
			format!("/socket/delete?{}", socket_query(socket)?),
			String::new(),
		),
		SocketCommand::Clean => (Method::DELETE, "/socket/clean".to_string(), String::new()),
	};

	let (status, envelope) = call(&config.management_socket, method, &uri, body).await?;
	let ok = envelope.get("status").and_then(Value::as_str) == Some("success");
	let payload = envelope.get("response").cloned().unwrap_or(Value::Null);
	if !ok {
		match payload.as_str() {
			Some(message) => bail!("{message}"),
			None => bail!("request failed with status {status}"),
		}
	}
	render(&command, &payload, output)
}

fn create_body(path: Option<&Path>) -> anyhow::Result<String> {
	let contents = match path {
		None => String::new(),
		Some(path) if path == Path::new("-") => {
			let mut contents = String::new();
			std::io::stdin().read_to_string(&mut contents)?;
			contents
		},
		Some(path) => fs_err::read_to_string(path)?,
	};
	if contents.trim().is_empty() {
		return Ok("{}".to_string());
	}
	// Configs are written in YAML or JSON; the wire speaks JSON.
	let parsed: Value = serdes::yamlviajson::from_str(&contents)?;
	Ok(serde_json::to_string(&parsed)?)
}

fn socket_query(socket: &str) -> anyhow::Result<String> {
	Ok(serde_urlencoded::to_string([("socket", socket)])?)
}

async fn call(
	management: &Path,
	method: Method,
	uri: &str,
	body: String,
) -> anyhow::Result<(StatusCode, Value)> {
	let stream = UnixStream::connect(management)
		.await
		.with_context(|| format!("connect {} (is the daemon running?)", management.display()))?;
	let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
	tokio::spawn(async move {
		let _ = conn.await;
	});

	let req = http::Request::builder()
		.method(method)
		.uri(uri)
		.header(http::header::HOST, "sockgate")
		.header(http::header::CONTENT_TYPE, "application/json")
		.body(Full::new(Bytes::from(body)))?;
	let resp = sender.send_request(req).await?;
	let status = resp.status();
	let bytes = resp.into_body().collect().await?.to_bytes();
	let envelope =
		serde_json::from_slice(&bytes).context("management API returned a malformed response")?;
	Ok((status, envelope))
}

fn render(command: &SocketCommand, payload: &Value, output: Output) -> anyhow::Result<()> {
	match output {
		Output::Silent => Ok(()),
		Output::Json => {
			println!("{}", serde_json::to_string_pretty(payload)?);
			Ok(())
		},
		Output::Yaml => {
			print!("{}", serdes::yamlviajson::to_string(payload)?);
			Ok(())
		},
		Output::Text => {
			match command {
				SocketCommand::Create { .. } => {
					println!("{}", payload.get("socket").and_then(Value::as_str).unwrap_or_default());
				},
				SocketCommand::List => {
					for socket in payload
						.get("sockets")
						.and_then(Value::as_array)
						.into_iter()
						.flatten()
					{
						if let Some(socket) = socket.as_str() {
							println!("{socket}");
						}
					}
				},
				SocketCommand::Describe { .. } => {
					let config = payload.get("config").cloned().unwrap_or(Value::Null);
					print!("{}", serdes::yamlviajson::to_string(&config)?);
				},
				SocketCommand::Delete { .. } | SocketCommand::Clean => {
					println!(
						"{}",
						payload.get("message").and_then(Value::as_str).unwrap_or_default()
					);
				},
			}
			Ok(())
		},
	}
}
