pub use std::fmt::{Debug, Display};
pub use std::path::{Path, PathBuf};
pub use std::pin::Pin;
pub use std::sync::{Arc, Mutex};
pub use std::time::{Duration, Instant};

pub use anyhow::Context as _;
pub use bytes::Bytes;
pub use tokio::sync::Mutex as AsyncMutex;
pub use tracing::{Instrument, debug, error, info, trace, warn};
