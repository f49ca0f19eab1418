use std::collections::HashMap;
use std::io;
use std::sync::RwLock;
use std::time::SystemTime;

use sockgate_core::drain::{self, DrainMode, DrainTrigger};
use uuid::Uuid;

use crate::policy::{SocketConfig, ValidationError};
use crate::proxy::{self, ProxyState};
use crate::serve::UnixServer;
use crate::store::{ConfigStore, StoreError};
use crate::*;

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
	#[error("invalid socket config: {0}")]
	Invalid(#[from] ValidationError),
	#[error(transparent)]
	Store(#[from] StoreError),
	#[error("failed to bind {path}: {source}")]
	Bind {
		path: PathBuf,
		#[source]
		source: anyhow::Error,
	},
	#[error("socket file cleanup failed: {0}")]
	Cleanup(io::Error),
	#[error("failed to delete {} of {} sockets: {}", .errors.len(), .total, .errors.join("; "))]
	Clean { total: usize, errors: Vec<String> },
}

/// What the registry tracks per live proxy socket. The drain trigger is the
/// only handle onto the per-socket HTTP server; consuming it stops the server.
struct SocketRecord {
	config: Arc<SocketConfig>,
	drain: DrainTrigger,
	created_at: SystemTime,
}

/// The authoritative in-memory mapping from proxy-socket path to its policy
/// and server. Every structural mutation (create/delete/clean/restore) goes
/// through here, under the write lock; request handlers only ever read.
///
/// The lock is never held across anything that blocks: records are prepared
/// outside it and draining happens after the record has been removed.
pub struct SocketRegistry {
	cfg: Arc<Config>,
	store: ConfigStore,
	sockets: RwLock<HashMap<PathBuf, SocketRecord>>,
}

impl SocketRegistry {
	pub fn new(cfg: Arc<Config>) -> Arc<Self> {
		Arc::new(Self {
			store: ConfigStore::new(&cfg.socket_dir),
			cfg,
			sockets: RwLock::new(HashMap::new()),
		})
	}

	pub fn config(&self) -> &Config {
		&self.cfg
	}

	/// Mints a new proxy socket bound to `config`: validates, persists the
	/// config, binds the listener (mode 0660), and starts its server. Any
	/// failure after persistence rolls the socket back completely.
	pub fn create(self: &Arc<Self>, config: SocketConfig) -> Result<PathBuf, RegistryError> {
		config.validate()?;
		let path = self.cfg.socket_dir.join(format!("{}.sock", Uuid::new_v4()));
		self.store.save(&path, &config)?;
		match self.attach(path.clone(), Arc::new(config)) {
			Ok(()) => {
				info!(socket = %path.display(), "socket created");
				Ok(path)
			},
			Err(err) => {
				if let Err(err) = self.store.remove(&path) {
					warn!(socket = %path.display(), %err, "rollback: failed to remove persisted config");
				}
				if let Err(err) = remove_socket_file(&path) {
					warn!(socket = %path.display(), %err, "rollback: failed to remove socket file");
				}
				Err(err)
			},
		}
	}

	/// Binds and serves an already-persisted socket and registers its record.
	fn attach(self: &Arc<Self>, path: PathBuf, config: Arc<SocketConfig>) -> Result<(), RegistryError> {
		let (drain_tx, drain_rx) = drain::new();
		let state = ProxyState::new(self.clone(), path.clone());
		let server =
			UnixServer::bind("proxy", path.clone(), drain_rx, state).map_err(|source| {
				RegistryError::Bind {
					path: path.clone(),
					source,
				}
			})?;
		{
			let mut sockets = self.sockets.write().expect("registry lock poisoned");
			sockets.insert(
				path,
				SocketRecord {
					config,
					drain: drain_tx,
					created_at: SystemTime::now(),
				},
			);
		}
		server.spawn(proxy::handle);
		Ok(())
	}

	/// The config currently bound to `path`; what every proxy request reads.
	pub fn config_for(&self, path: &Path) -> Option<Arc<SocketConfig>> {
		self
			.sockets
			.read()
			.expect("registry lock poisoned")
			.get(path)
			.map(|record| record.config.clone())
	}

	pub fn describe(&self, path: &Path) -> Option<Arc<SocketConfig>> {
		self.config_for(path)
	}

	pub fn list(&self) -> Vec<PathBuf> {
		let mut paths: Vec<PathBuf> = self
			.sockets
			.read()
			.expect("registry lock poisoned")
			.keys()
			.cloned()
			.collect();
		paths.sort();
		paths
	}

	/// Stops the server, removes the socket file, and drops the persisted
	/// config, in that order. Cleanup is best-effort: later steps run even
	/// when earlier ones fail, and an unknown path is a success.
	pub async fn delete(&self, path: &Path) -> Result<(), RegistryError> {
		let record = {
			self
				.sockets
				.write()
				.expect("registry lock poisoned")
				.remove(path)
		};
		if let Some(record) = record {
			self.stop_server(path, record.drain).await;
			let age = record.created_at.elapsed().unwrap_or_default();
			info!(socket = %path.display(), ?age, "socket deleted");
		}
		let mut result = Ok(());
		if let Err(err) = remove_socket_file(path) {
			warn!(socket = %path.display(), %err, "failed to remove socket file");
			result = Err(RegistryError::Cleanup(err));
		}
		if let Err(err) = self.store.remove(path) {
			warn!(socket = %path.display(), %err, "failed to remove persisted config");
			if result.is_ok() {
				result = Err(err.into());
			}
		}
		result
	}

	/// Deletes every registered socket, reporting the stragglers collectively.
	pub async fn clean(&self) -> Result<usize, RegistryError> {
		let paths = self.list();
		let total = paths.len();
		let mut errors = vec![];
		for path in paths {
			if let Err(err) = self.delete(&path).await {
				errors.push(format!("{}: {err}", path.display()));
			}
		}
		if errors.is_empty() {
			Ok(total)
		} else {
			Err(RegistryError::Clean { total, errors })
		}
	}

	/// Rebinds every persisted socket at daemon start. Individual sockets that
	/// fail to validate or bind are logged and skipped; startup proceeds.
	pub fn restore(self: &Arc<Self>) -> Result<usize, StoreError> {
		let mut restored = 0;
		for (path, config) in self.store.enumerate()? {
			if let Err(err) = config.validate() {
				warn!(socket = %path.display(), %err, "skipping persisted config that fails validation");
				continue;
			}
			match self.attach(path.clone(), Arc::new(config)) {
				Ok(()) => {
					info!(socket = %path.display(), "socket restored");
					restored += 1;
				},
				Err(err) => {
					warn!(socket = %path.display(), %err, "failed to restore socket");
				},
			}
		}
		Ok(restored)
	}

	/// Drains every proxy server and removes the socket files. Persisted
	/// configs are kept so the sockets come back on the next start.
	pub async fn shutdown(&self) {
		let records: Vec<(PathBuf, SocketRecord)> = {
			self
				.sockets
				.write()
				.expect("registry lock poisoned")
				.drain()
				.collect()
		};
		futures_util::future::join_all(records.into_iter().map(|(path, record)| async move {
			self.stop_server(&path, record.drain).await;
			if let Err(err) = remove_socket_file(&path) {
				warn!(socket = %path.display(), %err, "failed to remove socket file");
			}
		}))
		.await;
	}

	async fn stop_server(&self, path: &Path, drain: DrainTrigger) {
		let grace = self.cfg.shutdown_grace();
		if tokio::time::timeout(grace, drain.start_drain_and_wait(DrainMode::Graceful))
			.await
			.is_err()
		{
			warn!(socket = %path.display(), "proxy server did not drain within {grace:?}");
		}
	}
}

fn remove_socket_file(path: &Path) -> io::Result<()> {
	match fs_err::remove_file(path) {
		Ok(()) => Ok(()),
		Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
		Err(err) => Err(err),
	}
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
