pub mod configuration;
pub mod kv;

pub use configuration::{Configuration, ConfigurationStore};
pub use kv::{FileStore, KeyValueStore, MemoryStore};
