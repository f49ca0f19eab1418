use std::io;
use std::os::unix::fs::PermissionsExt;

use crate::policy::SocketConfig;
use crate::*;

/// Suffix appended to a socket path to name its persisted config; startup
/// enumeration only considers files carrying it.
pub const CONFIG_SUFFIX: &str = ".config";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
	#[error("config io: {0}")]
	Io(#[from] io::Error),
	#[error("config serialization: {0}")]
	Serde(#[from] serde_json::Error),
}

/// Durable socket-path → config mapping, persisted as JSON files next to the
/// socket files themselves. The registry is the only writer.
#[derive(Debug, Clone)]
pub struct ConfigStore {
	dir: PathBuf,
}

impl ConfigStore {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	fn config_path(&self, socket: &Path) -> PathBuf {
		let mut path = socket.as_os_str().to_owned();
		path.push(CONFIG_SUFFIX);
		PathBuf::from(path)
	}

	pub fn save(&self, socket: &Path, config: &SocketConfig) -> Result<(), StoreError> {
		let path = self.config_path(socket);
		let contents = serde_json::to_vec_pretty(config)?;
		fs_err::write(&path, contents)?;
		fs_err::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
		Ok(())
	}

	pub fn load(&self, socket: &Path) -> Result<Option<SocketConfig>, StoreError> {
		let path = self.config_path(socket);
		let contents = match fs_err::read(&path) {
			Ok(contents) => contents,
			Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
			Err(err) => return Err(err.into()),
		};
		Ok(Some(serde_json::from_slice(&contents)?))
	}

	/// Missing entries are fine; remove is called on best-effort cleanup paths.
	pub fn remove(&self, socket: &Path) -> Result<(), StoreError> {
		match fs_err::remove_file(self.config_path(socket)) {
			Ok(()) => Ok(()),
			Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
			Err(err) => Err(err.into()),
		}
	}

	/// Enumerates every persisted config, returning the socket path each one
	/// belongs to. Directories and unrelated files are skipped; entries that
	/// fail to parse are logged and skipped so one corrupt file cannot keep
	/// the daemon from starting.
	pub fn enumerate(&self) -> Result<Vec<(PathBuf, SocketConfig)>, StoreError> {
		let mut configs = vec![];
		for entry in fs_err::read_dir(&self.dir)? {
			let entry = entry?;
			let path = entry.path();
			if !entry.file_type()?.is_file() {
				continue;
			}
			let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
				continue;
			};
			let Some(socket_name) = name.strip_suffix(CONFIG_SUFFIX) else {
				continue;
			};
			if socket_name.is_empty() {
				continue;
			}
			let socket = self.dir.join(socket_name);
			match self.load(&socket) {
				Ok(Some(config)) => configs.push((socket, config)),
				Ok(None) => {},
				Err(err) => {
					warn!(config = %path.display(), %err, "skipping unreadable socket config");
				},
			}
		}
		Ok(configs)
	}
}
