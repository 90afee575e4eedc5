//! Configuration schema and loading.

pub mod loader;
pub mod schema;

pub use loader::{default_config_path, load_config, load_default_config};
pub use schema::{
    ForemanConfig, HooksConfig, ProviderConfig, RecorderConfig, SchedulerSection, SecurityConfig,
};
