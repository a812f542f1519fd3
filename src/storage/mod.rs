//! Storage
//!
//! SQLite persistence (pooled, transactional) plus the filesystem audio
//! store.

mod audio;
mod database;

pub use audio::{AudioStore, FsAudioStore};
pub use database::{Database, SharedDatabase};
