// Originally derived from https://github.com/istio/ztunnel (Apache 2.0 licensed)

use std::process;

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::info;

/// Shutdown is the process-wide termination gate. It completes when SIGINT or
/// SIGTERM is received, or when an explicit [`ShutdownTrigger`] fires.
pub struct Shutdown {
	shutdown_tx: mpsc::Sender<()>,
	shutdown_rx: mpsc::Receiver<()>,
}

impl Shutdown {
	pub fn new() -> Self {
		let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
		Shutdown {
			shutdown_tx,
			shutdown_rx,
		}
	}

	/// Trigger returns a handle that starts a shutdown without any signal.
	pub fn trigger(&self) -> ShutdownTrigger {
		ShutdownTrigger {
			shutdown_tx: self.shutdown_tx.clone(),
		}
	}

	/// Wait completes once a shutdown has been requested.
	pub async fn wait(mut self) {
		tokio::select! {
			_ = watch_signal(SignalKind::interrupt(), "SIGINT") => {
				// A second interrupt skips draining entirely.
				tokio::spawn(async move {
					watch_signal(SignalKind::interrupt(), "SIGINT").await;
					info!("second interrupt, exiting immediately");
					process::exit(1);
				});
			}
			_ = watch_signal(SignalKind::terminate(), "SIGTERM") => {}
			_ = self.shutdown_rx.recv() => {
				info!("received explicit shutdown request")
			}
		};
	}
}

impl Default for Shutdown {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Clone, Debug)]
pub struct ShutdownTrigger {
	shutdown_tx: mpsc::Sender<()>,
}

impl ShutdownTrigger {
	pub async fn shutdown_now(&self) {
		let _ = self.shutdown_tx.send(()).await;
	}
}

async fn watch_signal(kind: SignalKind, name: &'static str) {
	signal(kind)
		.expect("failed to register signal handler")
		.recv()
		.await;
	info!("received signal {name}, starting shutdown");
}
