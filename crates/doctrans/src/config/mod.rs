pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, resolve_api_key};
pub use schema::{Config, QueueConfig, RetentionConfig, TranslatorConfig};
