// アプリケーション層モジュール
pub mod command_dispatcher;
pub mod commands;
pub mod interaction_parser;
pub mod webhook_handler;

// 再エクスポート
pub use command_dispatcher::{CommandDispatcher, CommandError, CommandHandler, CommandRegistry};
pub use commands::{command_definitions, default_registry};
pub use interaction_parser::{InteractionParser, ParseError};
pub use webhook_handler::WebhookHandler;
