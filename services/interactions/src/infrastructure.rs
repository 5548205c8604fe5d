// Infrastructure layer modules
pub mod command_registrar;
pub mod config;
pub mod dynamo_user_store;
pub mod logging;
pub mod store_guard;
pub mod user_store;

// Re-exports
pub use command_registrar::{CommandRegistrar, RegistrationError, DEFAULT_API_BASE};
pub use config::{ConfigError, DynamoDbConfig, WebhookConfig};
pub use dynamo_user_store::DynamoUserStore;
pub use logging::{init_cli_logging, init_logging};
pub use store_guard::GuardedUserStore;
pub use user_store::{StoreError, UserStore};
