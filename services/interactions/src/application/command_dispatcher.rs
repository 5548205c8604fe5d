/// コマンドディスパッチャー
///
/// 検証・パース済みのInteractionを登録済みハンドラーに振り分け、
/// 必ずInteractionResponseを返す。ハンドラーの失敗はERROR応答に変換する。
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::domain::{CommandInteraction, ErrorCode, Interaction, InteractionResponse};
use crate::infrastructure::{StoreError, UserStore};

/// ハンドラーが返すエラー型
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    /// 引数が欠落または不正
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// ストア操作に失敗
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CommandError {
    /// 診断コード
    pub fn code(&self) -> ErrorCode {
        match self {
            CommandError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            CommandError::Store(StoreError::Timeout(_)) => ErrorCode::StoreTimeout,
            CommandError::Store(StoreError::ConditionFailed(_)) => ErrorCode::StoreConflict,
            CommandError::Store(_) => ErrorCode::StoreUnavailable,
        }
    }

    /// ユーザーに見せてよいメッセージ（内部情報は含めない）
    pub fn user_message(&self) -> &'static str {
        match self {
            CommandError::InvalidArgument(_) => "Sorry, that command was given an invalid argument.",
            CommandError::Store(StoreError::Timeout(_)) => "Sorry, that took too long. Please try again.",
            CommandError::Store(_) => "Sorry, something went wrong. Please try again later.",
        }
    }

    /// ERROR応答に変換
    pub fn into_response(self) -> InteractionResponse {
        InteractionResponse::error(self.user_message(), self.code())
    }
}

/// コマンドハンドラー用トレイト
///
/// ストアは呼び出しごとに注入される。ハンドラー自身は状態を持たない前提。
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(
        &self,
        command: &CommandInteraction,
        store: &dyn UserStore,
    ) -> Result<InteractionResponse, CommandError>;
}

/// コマンド名からハンドラーへの対応表
///
/// 起動時に一度だけ構築し、以降は読み取り専用で共有する。
#[derive(Clone, Default)]
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// ハンドラーを登録（同名の登録は置き換える）
    pub fn register(mut self, name: impl Into<String>, handler: impl CommandHandler + 'static) -> Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(name).cloned()
    }

    /// 登録済みコマンド名（ソート済み）
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// コマンドディスパッチャー
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    registry: Arc<CommandRegistry>,
}

impl CommandDispatcher {
    pub fn new(registry: CommandRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Interactionを処理して応答を返す
    ///
    /// - Ping: ストアに触れずにPong
    /// - Command: 名前でハンドラーを引いて実行（未登録ならERROR）
    /// - Unknown: ERROR（unsupported_interaction）
    pub async fn dispatch(&self, interaction: &Interaction, store: &dyn UserStore) -> InteractionResponse {
        match interaction {
            Interaction::Ping => InteractionResponse::Pong,

            Interaction::Command(command) => self.dispatch_command(command, store).await,

            Interaction::Unknown { kind } => {
                warn!(interaction_type = kind, "未対応のインタラクション種別");
                InteractionResponse::unsupported_interaction()
            }
        }
    }

    async fn dispatch_command(&self, command: &CommandInteraction, store: &dyn UserStore) -> InteractionResponse {
        let Some(handler) = self.registry.get(command.name()) else {
            warn!(command = command.name(), "未登録のコマンド");
            return InteractionResponse::unknown_command();
        };

        debug!(command = command.name(), user_id = command.user_id(), "コマンド実行");

        match handler.handle(command, store).await {
            Ok(response) => response,
            Err(err) => {
                let code = err.code();
                match &err {
                    CommandError::InvalidArgument(_) => {
                        warn!(command = command.name(), code = %code, error = %err, "コマンド引数エラー");
                    }
                    CommandError::Store(_) => {
                        error!(command = command.name(), code = %code, error = %err, "コマンド実行中のストアエラー");
                    }
                }
                err.into_response()
            }
        }
    }
}
