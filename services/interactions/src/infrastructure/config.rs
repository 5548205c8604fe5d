/// Webhookサービスの設定
///
/// 起動時に一度だけ環境変数から読み込み、以降は読み取り専用で共有する。
use std::time::Duration;

use aws_sdk_dynamodb::Client as DynamoDbClient;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::signature_verifier::DEFAULT_TOLERANCE_SECONDS;
use crate::domain::SignatureVerifier;

/// 環境変数名: アプリケーションの公開鍵（64文字hex）
pub const ENV_PUBLIC_KEY: &str = "DISCORD_PUBLIC_KEY";
/// 環境変数名: ユーザーテーブル名
pub const ENV_TABLE_NAME: &str = "DYNAMODB_TABLE_NAME";
/// 環境変数名: タイムスタンプの鮮度ウィンドウ（秒）
pub const ENV_SIGNATURE_TOLERANCE: &str = "SIGNATURE_TOLERANCE_SECONDS";
/// 環境変数名: ストア呼び出しのタイムアウト（ミリ秒）
pub const ENV_STORE_TIMEOUT: &str = "STORE_TIMEOUT_MS";

/// ストアタイムアウトのデフォルト値（ミリ秒）
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 1500;

/// 設定読み込みのエラー型
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

/// Webhook処理の設定
///
/// 以下の環境変数から読み込む:
/// - DISCORD_PUBLIC_KEY: 署名検証用の公開鍵（必須）
/// - SIGNATURE_TOLERANCE_SECONDS: 鮮度ウィンドウ（デフォルト: 300）
/// - STORE_TIMEOUT_MS: ストア呼び出しのタイムアウト（デフォルト: 1500）
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// 公開鍵から構築済みの検証器
    verifier: SignatureVerifier,
    /// ストア呼び出しのタイムアウト
    store_timeout: Duration,
}

impl WebhookConfig {
    /// 環境変数から設定を読み込む
    ///
    /// 公開鍵の欠落・不正は起動失敗とする。数値設定の不正はデフォルト値で続行する。
    pub fn from_env() -> Result<Self, ConfigError> {
        let public_key_hex =
            std::env::var(ENV_PUBLIC_KEY).map_err(|_| ConfigError::MissingEnvVar(ENV_PUBLIC_KEY.to_string()))?;

        let tolerance = Duration::from_secs(parse_env_u64(ENV_SIGNATURE_TOLERANCE, DEFAULT_TOLERANCE_SECONDS));
        let store_timeout = Duration::from_millis(parse_env_u64(ENV_STORE_TIMEOUT, DEFAULT_STORE_TIMEOUT_MS));

        let verifier =
            SignatureVerifier::from_hex(&public_key_hex, tolerance).map_err(|e| ConfigError::InvalidValue {
                name: ENV_PUBLIC_KEY.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            verifier,
            store_timeout,
        })
    }

    /// 明示的な値で設定を作成（テスト用）
    pub fn new(verifier: SignatureVerifier, store_timeout: Duration) -> Self {
        Self {
            verifier,
            store_timeout,
        }
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }
}

/// テーブル名とクライアントを持つDynamoDB設定
#[derive(Debug, Clone)]
pub struct DynamoDbConfig {
    /// DynamoDBクライアントインスタンス
    client: DynamoDbClient,
    /// ユーザーテーブル名
    table_name: String,
}

impl DynamoDbConfig {
    /// 環境からAWS設定を読み込み、DYNAMODB_TABLE_NAMEからテーブル名を読み取る
    pub async fn from_env() -> Result<Self, ConfigError> {
        let table_name =
            std::env::var(ENV_TABLE_NAME).map_err(|_| ConfigError::MissingEnvVar(ENV_TABLE_NAME.to_string()))?;

        // 環境からAWS設定を読み込み（認証情報、リージョンなど）
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = DynamoDbClient::new(&aws_config);

        Ok(Self { client, table_name })
    }

    /// 明示的な値で新しいDynamoDbConfigを作成（テスト用）
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        Self { client, table_name }
    }

    pub fn client(&self) -> &DynamoDbClient {
        &self.client
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

/// 環境変数からu64値を読み込む
///
/// 未設定の場合はデフォルト値、パースエラーの場合は警告してデフォルト値を返す。
fn parse_env_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(parsed) if parsed > 0 => {
                info!(key, value = parsed, "Environment variable loaded");
                parsed
            }
            _ => {
                warn!(
                    key,
                    value = %value,
                    default,
                    "Environment variable parse error, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signature_verifier::tests::test_signing_key;
    use serial_test::serial;

    // 安全性: シングルスレッドテスト環境（#[serial]）で使用
    unsafe fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    unsafe fn cleanup_env() {
        unsafe {
            remove_env(ENV_PUBLIC_KEY);
            remove_env(ENV_TABLE_NAME);
            remove_env(ENV_SIGNATURE_TOLERANCE);
            remove_env(ENV_STORE_TIMEOUT);
        }
    }

    fn public_key_hex() -> String {
        hex::encode(test_signing_key().verifying_key().to_bytes())
    }

    #[test]
    fn test_missing_env_var_error_display() {
        let error = ConfigError::MissingEnvVar("TEST_VAR".to_string());
        assert_eq!(error.to_string(), "Missing environment variable: TEST_VAR");
    }

    #[test]
    #[serial]
    fn test_webhook_config_requires_public_key() {
        unsafe { cleanup_env() };

        let result = WebhookConfig::from_env();

        match result {
            Err(ConfigError::MissingEnvVar(var)) => assert_eq!(var, ENV_PUBLIC_KEY),
            other => panic!("Expected MissingEnvVar, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_webhook_config_rejects_malformed_public_key() {
        unsafe {
            cleanup_env();
            set_env(ENV_PUBLIC_KEY, "not-a-key");
        }

        let result = WebhookConfig::from_env();

        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        unsafe { cleanup_env() };
    }

    #[test]
    #[serial]
    fn test_webhook_config_defaults() {
        unsafe {
            cleanup_env();
            set_env(ENV_PUBLIC_KEY, &public_key_hex());
        }

        let config = WebhookConfig::from_env().unwrap();

        assert_eq!(config.verifier().tolerance(), Duration::from_secs(DEFAULT_TOLERANCE_SECONDS));
        assert_eq!(config.store_timeout(), Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS));
        unsafe { cleanup_env() };
    }

    #[test]
    #[serial]
    fn test_webhook_config_reads_overrides() {
        unsafe {
            cleanup_env();
            set_env(ENV_PUBLIC_KEY, &public_key_hex());
            set_env(ENV_SIGNATURE_TOLERANCE, "60");
            set_env(ENV_STORE_TIMEOUT, "800");
        }

        let config = WebhookConfig::from_env().unwrap();

        assert_eq!(config.verifier().tolerance(), Duration::from_secs(60));
        assert_eq!(config.store_timeout(), Duration::from_millis(800));
        unsafe { cleanup_env() };
    }

    #[test]
    #[serial]
    fn test_webhook_config_invalid_numbers_fall_back_to_defaults() {
        unsafe {
            cleanup_env();
            set_env(ENV_PUBLIC_KEY, &public_key_hex());
            set_env(ENV_SIGNATURE_TOLERANCE, "five minutes");
            set_env(ENV_STORE_TIMEOUT, "0");
        }

        let config = WebhookConfig::from_env().unwrap();

        assert_eq!(config.verifier().tolerance(), Duration::from_secs(DEFAULT_TOLERANCE_SECONDS));
        assert_eq!(config.store_timeout(), Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS));
        unsafe { cleanup_env() };
    }

    #[tokio::test]
    #[serial]
    async fn test_dynamodb_config_requires_table_name() {
        unsafe { cleanup_env() };

        let result = DynamoDbConfig::from_env().await;

        match result {
            Err(ConfigError::MissingEnvVar(var)) => assert_eq!(var, ENV_TABLE_NAME),
            other => panic!("Expected MissingEnvVar, got {:?}", other.map(|c| c.table_name().to_string())),
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_dynamodb_config_from_env() {
        unsafe {
            cleanup_env();
            set_env(ENV_TABLE_NAME, "users-table");
        }

        let config = DynamoDbConfig::from_env().await.unwrap();

        assert_eq!(config.table_name(), "users-table");
        let _client_ref = config.client();
        unsafe { cleanup_env() };
    }
}
