// CommandRegistrar - コマンド定義登録用HTTPクライアント
//
// プラットフォームのREST APIにアプリケーションコマンドを登録する。
// レート制限（429）や一時的なエラーは指数バックオフで再試行する。

use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::domain::CommandDefinition;

/// デフォルトのAPIベースURL
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// 最大再試行回数
const MAX_RETRIES: u32 = 3;

/// リクエストタイムアウト（秒）
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// 接続タイムアウト（秒）
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// コマンド登録のエラー型
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// APIベースURLが不正
    #[error("APIベースURLが不正です: {0}")]
    InvalidApiBase(String),

    /// HTTPクライアントの構築に失敗
    #[error("HTTPクライアントの構築に失敗: {0}")]
    ClientBuild(String),

    /// HTTPエラー（ステータスコード付き）
    #[error("HTTPエラー: status={status}, message={message}")]
    HttpError { status: u16, message: String },

    /// ネットワークエラー
    #[error("ネットワークエラー: {0}")]
    NetworkError(String),

    /// シリアライズエラー
    #[error("シリアライズエラー: {0}")]
    SerializationError(String),

    /// 再試行回数超過エラー
    #[error("再試行回数超過: {0}")]
    RetryExhausted(String),
}

/// コマンド登録クライアント
///
/// ボットトークンはDebug出力に含めない。
#[derive(Clone)]
pub struct CommandRegistrar {
    /// HTTPクライアント（再試行ミドルウェア付き）
    client: ClientWithMiddleware,
    /// `{api_base}/applications/{application_id}/commands`
    commands_url: Url,
    /// ボットトークン
    bot_token: String,
}

impl std::fmt::Debug for CommandRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistrar")
            .field("commands_url", &self.commands_url.as_str())
            .finish_non_exhaustive()
    }
}

/// コマンド登録エンドポイントURLを構築
fn build_commands_url(api_base: &str, application_id: &str) -> Result<Url, RegistrationError> {
    let mut url = Url::parse(api_base).map_err(|e| RegistrationError::InvalidApiBase(e.to_string()))?;

    if application_id.is_empty() || application_id.contains('/') {
        return Err(RegistrationError::InvalidApiBase(format!(
            "invalid application id: {}",
            application_id
        )));
    }

    url.path_segments_mut()
        .map_err(|_| RegistrationError::InvalidApiBase(api_base.to_string()))?
        .pop_if_empty()
        .extend(["applications", application_id, "commands"]);

    Ok(url)
}

impl CommandRegistrar {
    /// 新しいCommandRegistrarを作成
    ///
    /// # 引数
    /// * `api_base` - APIのベースURL（例: `https://discord.com/api/v10`）
    /// * `application_id` - アプリケーションID
    /// * `bot_token` - ボットトークン
    pub fn new(api_base: &str, application_id: &str, bot_token: impl Into<String>) -> Result<Self, RegistrationError> {
        let commands_url = build_commands_url(api_base, application_id)?;

        let base_client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| RegistrationError::ClientBuild(e.to_string()))?;

        // 指数バックオフ再試行ポリシー（429・5xx・接続エラーを再試行）
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);

        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        info!(commands_url = %commands_url, "CommandRegistrarを初期化");

        Ok(Self {
            client,
            commands_url,
            bot_token: bot_token.into(),
        })
    }

    pub fn commands_url(&self) -> &Url {
        &self.commands_url
    }

    /// コマンド定義を1件登録（POST）
    ///
    /// 同名のコマンドが既に存在する場合はプラットフォーム側で上書きされる。
    #[instrument(skip(self, definition), fields(command = %definition.name))]
    pub async fn register(&self, definition: &CommandDefinition) -> Result<(), RegistrationError> {
        let body = serde_json::to_string(definition).map_err(|e| {
            error!(error = %e, "コマンド定義のシリアライズに失敗");
            RegistrationError::SerializationError(e.to_string())
        })?;

        debug!(url = %self.commands_url, "コマンド定義を登録");

        let response = self
            .client
            .post(self.commands_url.clone())
            .header("Authorization", format!("Bot {}", self.bot_token))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "コマンド登録リクエスト失敗");
                if e.is_timeout() || e.is_connect() {
                    RegistrationError::NetworkError(e.to_string())
                } else {
                    RegistrationError::RetryExhausted(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            info!(status = %status, "コマンドの登録に成功");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, "コマンド登録エラー");

        Err(RegistrationError::HttpError {
            status: status.as_u16(),
            message: body,
        })
    }

    /// コマンド定義をすべて登録
    ///
    /// 失敗したコマンドがあっても残りの登録は続行し、失敗したコマンド名を返す。
    pub async fn register_all(&self, definitions: &[CommandDefinition]) -> Vec<(String, RegistrationError)> {
        let mut failures = Vec::new();
        for definition in definitions {
            if let Err(e) = self.register(definition).await {
                failures.push((definition.name.clone(), e));
            }
        }
        failures
    }
}
