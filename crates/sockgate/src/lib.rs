pub mod app;
pub mod config;
pub mod http;
pub mod management;
pub mod policy;
pub mod proxy;
pub mod registry;
pub mod serdes;
pub mod serve;
pub mod store;

pub use config::Config;
pub use sockgate_core::prelude::*;
