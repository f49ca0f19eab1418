// Originally derived from https://github.com/istio/ztunnel (Apache 2.0 licensed)

use std::convert::Infallible;
use std::io;
use std::os::unix::fs::PermissionsExt;

use futures_util::TryFutureExt;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use sockgate_core::drain::DrainWatcher;
use tokio::net::UnixListener;

use crate::http::{Body, Response};
use crate::*;

pub fn http1_server() -> http1::Builder {
	let mut b = http1::Builder::new();
	b.timer(TokioTimer::new());
	b
}

/// A plaintext HTTP/1.1 server on a UNIX socket with the behavior every
/// listener here needs:
/// * stale socket files are unlinked before binding, and the fresh socket is
///   chmodded 0660;
/// * draining: accepting stops on the drain signal and in-flight connections
///   get a graceful shutdown;
/// * connection upgrades are supported (the Docker API hijacks
///   `attach`/`exec` streams this way).
pub struct UnixServer<S> {
	name: String,
	path: PathBuf,
	listener: UnixListener,
	drain_rx: DrainWatcher,
	state: S,
}

impl<S> UnixServer<S> {
	pub fn bind(
		name: &str,
		path: impl Into<PathBuf>,
		drain_rx: DrainWatcher,
		state: S,
	) -> anyhow::Result<Self> {
		let path = path.into();
		match fs_err::remove_file(&path) {
			Ok(()) => debug!(path = %path.display(), "removed stale socket file"),
			Err(err) if err.kind() == io::ErrorKind::NotFound => {},
			Err(err) => return Err(err.into()),
		}
		let listener =
			UnixListener::bind(&path).with_context(|| format!("bind {}", path.display()))?;
		fs_err::set_permissions(&path, std::fs::Permissions::from_mode(0o660))?;
		Ok(UnixServer {
			name: name.to_string(),
			path,
			listener,
			drain_rx,
			state,
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn spawn<F, R>(self, f: F)
	where
		S: Send + Sync + 'static,
		F: Fn(Arc<S>, ::http::Request<hyper::body::Incoming>) -> R + Send + Sync + 'static,
		R: Future<Output = Result<Response, anyhow::Error>> + Send + 'static,
	{
		use futures_util::StreamExt as _;
		let name = self.name;
		let path = self.path;
		let drain = self.drain_rx;
		let state = Arc::new(self.state);
		let f = Arc::new(f);
		info!(path = %path.display(), component = %name, "listener established");
		tokio::spawn(async move {
			let drain_accepts = drain.clone();
			let stream = tokio_stream::wrappers::UnixListenerStream::new(self.listener);
			let mut stream = stream.take_until(Box::pin(drain_accepts.wait_for_drain()));
			while let Some(Ok(socket)) = stream.next().await {
				let drain = drain.clone();
				let f = f.clone();
				let state = state.clone();
				tokio::spawn(async move {
					let serve = http1_server()
						.half_close(true)
						.serve_connection(
							TokioIo::new(socket),
							hyper::service::service_fn(move |req| {
								let state = state.clone();

								// Failures would abort the whole connection; we just want to
								// return an HTTP error.
								f(state, req).or_else(|err| async move {
									Ok::<_, Infallible>(
										::http::Response::builder()
											.status(hyper::StatusCode::INTERNAL_SERVER_ERROR)
											.body(Body::from(err.to_string()))
											.expect("builder with known status code should not fail"),
									)
								})
							}),
						)
						.with_upgrades();
					let mut serve = std::pin::pin!(serve);
					tokio::select! {
						res = &mut serve => {
							if let Err(err) = res {
								debug!(%err, "connection closed with error");
							}
						},
						blocker = drain.clone().wait_for_drain() => {
							// Stop taking new requests and give pending ones a chance
							// to finish before the blocker is released.
							serve.as_mut().graceful_shutdown();
							let _ = serve.await;
							drop(blocker);
						},
					}
				});
			}
			info!(path = %path.display(), component = %name, "listener drained");
		});
	}
}
