pub mod drain;
pub mod prelude;
pub mod signal;
pub mod telemetry;
