use std::io;
use std::os::unix::fs::PermissionsExt;

use sockgate_core::drain::{self, DrainMode, DrainTrigger};
use sockgate_core::signal;

use crate::management;
use crate::registry::SocketRegistry;
use crate::*;

/// Starts the daemon: prepares the socket directory, restores every persisted
/// proxy socket, then brings up the management API. The returned [`Bound`]
/// waits for a signal and runs the shutdown sequence.
pub async fn run(config: Arc<Config>) -> anyhow::Result<Bound> {
	fs_err::create_dir_all(&config.socket_dir)?;
	fs_err::set_permissions(
		&config.socket_dir,
		std::fs::Permissions::from_mode(0o755),
	)?;

	let shutdown = signal::Shutdown::new();
	let (drain_tx, drain_rx) = drain::new();

	let registry = SocketRegistry::new(config.clone());
	let restored = registry.restore().context("restore persisted sockets")?;
	info!(restored, "restored persisted sockets");

	// Management traffic is only accepted once every surviving socket is back.
	let management = management::Service::bind(config.clone(), registry.clone(), drain_rx)
		.context("management server starts")?;
	management.spawn();

	Ok(Bound {
		config,
		shutdown,
		drain_tx,
		registry,
	})
}

pub struct Bound {
	config: Arc<Config>,
	pub shutdown: signal::Shutdown,
	drain_tx: DrainTrigger,
	registry: Arc<SocketRegistry>,
}

impl Bound {
	pub fn registry(&self) -> &Arc<SocketRegistry> {
		&self.registry
	}

	/// Blocks until SIGINT/SIGTERM (or an explicit trigger), then tears down:
	/// the management server gets the bounded grace period, then every
	/// per-socket server is drained and all socket files are removed.
	pub async fn wait_termination(self) -> anyhow::Result<()> {
		self.shutdown.wait().await;

		let grace = self.config.shutdown_grace();
		if tokio::time::timeout(
			grace,
			self.drain_tx.start_drain_and_wait(DrainMode::Graceful),
		)
		.await
		.is_err()
		{
			warn!("management server did not drain within {grace:?}");
		}
		self.registry.shutdown().await;
		match fs_err::remove_file(&self.config.management_socket) {
			Ok(()) => {},
			Err(err) if err.kind() == io::ErrorKind::NotFound => {},
			Err(err) => warn!(%err, "failed to remove management socket file"),
		}
		info!("shutdown complete");
		Ok(())
	}
}
