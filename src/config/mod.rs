//! Configuration
//!
//! Layered configuration: built-in defaults, an optional `examloom.toml`,
//! and `EXAMLOOM_*` environment variables, merged in that order.

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{AudioConfig, Config, DatabaseConfig, LlmConfig};
