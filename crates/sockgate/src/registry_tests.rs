use assert_matches::assert_matches;

use super::*;
use crate::policy::{Action, Rule, RuleMatch};
use crate::*;

fn test_config(dir: &Path) -> Arc<Config> {
	Arc::new(Config {
		socket_dir: dir.to_path_buf(),
		docker_socket: dir.join("docker.sock"),
		management_socket: dir.join("sockgate.sock"),
		max_request_body_bytes: 1024 * 1024,
		shutdown_grace_secs: 1,
	})
}

fn allow_all() -> SocketConfig {
	SocketConfig {
		rules: vec![Rule {
			matches: RuleMatch {
				path: ".*".to_string(),
				..Default::default()
			},
			actions: vec![Action::Allow { reason: None }],
		}],
		..Default::default()
	}
}

/// The set of persisted configs must equal the set of live sockets after any
/// sequence of mutations.
fn assert_consistent(registry: &SocketRegistry) {
	let mut persisted: Vec<PathBuf> = registry
		.store
		.enumerate()
		.unwrap()
		.into_iter()
		.map(|(path, _)| path)
		.collect();
	persisted.sort();
	assert_eq!(persisted, registry.list());
}

#[tokio::test]
async fn create_persists_binds_and_registers() {
	let dir = tempfile::tempdir().unwrap();
	let registry = SocketRegistry::new(test_config(dir.path()));

	let path = registry.create(allow_all()).unwrap();
	assert!(path.starts_with(dir.path()));
	assert_eq!(path.extension().unwrap(), "sock");
	assert!(path.exists());
	assert_eq!(*registry.config_for(&path).unwrap(), allow_all());
	assert_eq!(registry.list(), vec![path.clone()]);
	assert_consistent(&registry);
}

#[tokio::test]
async fn create_rejects_invalid_configs_without_residue() {
	let dir = tempfile::tempdir().unwrap();
	let registry = SocketRegistry::new(test_config(dir.path()));

	assert_matches!(
		registry.create(SocketConfig::default()),
		Err(RegistryError::Invalid(_))
	);
	assert!(registry.list().is_empty());
	assert!(registry.store.enumerate().unwrap().is_empty());
}

#[tokio::test]
async fn create_rolls_back_when_bind_fails() {
	let dir = tempfile::tempdir().unwrap();
	// sun_path caps UNIX socket paths at ~108 bytes; a directory this deep
	// persists configs fine but cannot be bound.
	let deep = dir.path().join("x".repeat(120));
	fs_err::create_dir_all(&deep).unwrap();
	let registry = SocketRegistry::new(test_config(&deep));

	assert_matches!(
		registry.create(allow_all()),
		Err(RegistryError::Bind { .. })
	);
	assert!(registry.list().is_empty());
	assert!(registry.store.enumerate().unwrap().is_empty());
}

#[tokio::test]
async fn delete_removes_server_file_and_config() {
	let dir = tempfile::tempdir().unwrap();
	let registry = SocketRegistry::new(test_config(dir.path()));

	let path = registry.create(allow_all()).unwrap();
	registry.delete(&path).await.unwrap();
	assert!(!path.exists());
	assert!(registry.config_for(&path).is_none());
	assert_consistent(&registry);

	// Deleting a socket that does not exist is a success.
	registry.delete(Path::new("/nonexistent/socket.sock")).await.unwrap();
}

#[tokio::test]
async fn clean_deletes_every_socket() {
	let dir = tempfile::tempdir().unwrap();
	let registry = SocketRegistry::new(test_config(dir.path()));

	for _ in 0..3 {
		registry.create(allow_all()).unwrap();
	}
	let first = registry.list()[0].clone();
	registry.delete(&first).await.unwrap();

	assert_eq!(registry.clean().await.unwrap(), 2);
	assert!(registry.list().is_empty());
	assert!(registry.store.enumerate().unwrap().is_empty());
	assert_consistent(&registry);
}

#[tokio::test]
async fn restore_rebinds_persisted_configs() {
	let dir = tempfile::tempdir().unwrap();
	let cfg = test_config(dir.path());

	let saved = {
		let registry = SocketRegistry::new(cfg.clone());
		let a = registry.create(allow_all()).unwrap();
		let b = registry.create(allow_all()).unwrap();
		// Simulate a crash: servers go away, files and configs stay.
		registry.shutdown().await;
		let mut saved = vec![a, b];
		saved.sort();
		saved
	};

	let registry = SocketRegistry::new(cfg);
	// A corrupt entry must not block the others.
	fs_err::write(dir.path().join("broken.sock.config"), b"{nope").unwrap();
	assert_eq!(registry.restore().unwrap(), 2);
	assert_eq!(registry.list(), saved);
	for path in &saved {
		assert!(path.exists());
		assert_eq!(*registry.describe(path).unwrap(), allow_all());
	}
}

#[tokio::test]
async fn shutdown_keeps_configs_for_next_start() {
	let dir = tempfile::tempdir().unwrap();
	let registry = SocketRegistry::new(test_config(dir.path()));

	let path = registry.create(allow_all()).unwrap();
	registry.shutdown().await;
	assert!(!path.exists());
	assert_eq!(registry.store.enumerate().unwrap().len(), 1);
	assert!(registry.list().is_empty());
}
