// Originally derived from https://github.com/istio/ztunnel (Apache 2.0 licensed)

use std::fmt::Debug;

use tokio::sync::{mpsc, watch};

/// Creates a drain channel pair.
///
/// The [`DrainTrigger`] starts a drain and waits for it to complete. A
/// [`DrainWatcher`] should be held (cloned freely) by anything that wants to
/// participate: the drain does not complete until every outstanding watcher,
/// and every [`DrainBlocker`] obtained from one, has been dropped.
pub fn new() -> (DrainTrigger, DrainWatcher) {
	let (signal_tx, signal_rx) = watch::channel(None);
	let (drained_tx, drained_rx) = mpsc::channel(1);
	(
		DrainTrigger {
			drained_rx,
			signal_tx,
		},
		DrainWatcher {
			drained_tx,
			signal_rx,
		},
	)
}

enum Never {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
	/// Terminate without waiting for in-flight work.
	Immediate,
	/// Stop accepting and let in-flight work finish.
	Graceful,
}

/// Starts a drain and waits for all watchers to acknowledge it.
pub struct DrainTrigger {
	drained_rx: mpsc::Receiver<Never>,
	signal_tx: watch::Sender<Option<DrainMode>>,
}

impl DrainTrigger {
	/// Signals all watchers to drain with `mode`, then waits until every
	/// watcher and blocker has been dropped.
	pub async fn start_drain_and_wait(mut self, mode: DrainMode) {
		let _ = self.signal_tx.send(Some(mode));
		match self.drained_rx.recv().await {
			None => {},
			Some(n) => match n {},
		}
	}
}

/// Watches for a drain request.
#[derive(Clone)]
pub struct DrainWatcher {
	drained_tx: mpsc::Sender<Never>,
	signal_rx: watch::Receiver<Option<DrainMode>>,
}

impl DrainWatcher {
	/// Completes once a drain has been requested. The returned blocker must be
	/// dropped when the holder has finished shutting down; the trigger is not
	/// released until then.
	pub async fn wait_for_drain(mut self) -> DrainBlocker {
		let mode = self
			.signal_rx
			.wait_for(Option::is_some)
			.await
			.map(|mode| mode.expect("checked is_some"))
			// The trigger was dropped without draining; nothing to wait for.
			.unwrap_or(DrainMode::Immediate);
		DrainBlocker(self.drained_tx, mode)
	}
}

/// Held by a watcher between the drain request and the completion of its own
/// shutdown.
#[must_use = "dropping the blocker is what releases the drain"]
#[derive(Clone)]
pub struct DrainBlocker(mpsc::Sender<Never>, DrainMode);

impl DrainBlocker {
	pub fn mode(&self) -> DrainMode {
		self.1
	}
}

impl Debug for DrainTrigger {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DrainTrigger").finish_non_exhaustive()
	}
}

impl Debug for DrainWatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DrainWatcher").finish_non_exhaustive()
	}
}
