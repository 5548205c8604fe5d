/// インタラクションWebhook Lambdaエントリポイント
///
/// API GatewayのPOSTルート経由で署名付きインタラクションを受け取り、
/// 検証・パース・ディスパッチした結果をHTTPレスポンスとして返す。
///
/// # 環境変数
/// - DISCORD_PUBLIC_KEY: 署名検証用の公開鍵（必須）
/// - DYNAMODB_TABLE_NAME: ユーザーテーブル名（未設定の場合はPINGのみ応答）
/// - SIGNATURE_TOLERANCE_SECONDS: 鮮度ウィンドウ（デフォルト: 300）
/// - STORE_TIMEOUT_MS: ストア呼び出しのタイムアウト（デフォルト: 1500）
use interactions::application::{default_registry, CommandDispatcher, WebhookHandler};
use interactions::infrastructure::{
    init_logging, ConfigError, DynamoDbConfig, DynamoUserStore, GuardedUserStore, WebhookConfig,
};
use lambda_http::http::StatusCode;
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use tokio::sync::OnceCell;
use tracing::{error, info};

type Handler = WebhookHandler<GuardedUserStore<Option<DynamoUserStore>>>;

/// WebhookHandlerの静的インスタンス
///
/// Lambda warm start時に検証器・コマンド表・DynamoDBクライアントを再利用する。
static HANDLER: OnceCell<Handler> = OnceCell::const_new();

/// WebhookHandlerを取得（初期化されていなければ初期化）
async fn get_handler() -> Result<&'static Handler, ConfigError> {
    HANDLER.get_or_try_init(build_handler).await
}

/// 環境変数からWebhookHandlerを構築
///
/// 公開鍵の設定は必須。ストア設定が欠けている場合はストアなしで構築し、
/// PINGには応答したままコマンドはstore_unavailableのERRORで返す。
async fn build_handler() -> Result<Handler, ConfigError> {
    let webhook_config = WebhookConfig::from_env()?;

    let user_store = match DynamoDbConfig::from_env().await {
        Ok(dynamodb_config) => {
            info!(table_name = dynamodb_config.table_name(), "ユーザーテーブルを設定");
            Some(DynamoUserStore::new(
                dynamodb_config.client().clone(),
                dynamodb_config.table_name().to_string(),
            ))
        }
        Err(err) => {
            error!(error = %err, "ストア設定の読み込みに失敗（PINGのみ応答可能）");
            None
        }
    };

    let store = GuardedUserStore::new(user_store, webhook_config.store_timeout());
    let dispatcher = CommandDispatcher::new(default_registry());

    info!(
        store_timeout_ms = webhook_config.store_timeout().as_millis() as u64,
        tolerance_seconds = webhook_config.verifier().tolerance().as_secs(),
        commands = ?dispatcher.registry().names(),
        "WebhookHandlerを初期化"
    );

    Ok(WebhookHandler::new(webhook_config.verifier().clone(), dispatcher, store))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // 構造化ログを初期化
    init_logging();

    info!("インタラクションLambda関数を起動");

    run(service_fn(handler)).await
}

/// HTTPリクエストハンドラー
///
/// 設定の読み込みに失敗した場合は500を返す（詳細はログのみに出す）。
async fn handler(request: Request) -> Result<Response<Body>, Error> {
    let webhook_handler = match get_handler().await {
        Ok(handler) => handler,
        Err(err) => {
            error!(error = %err, "設定読み込み失敗");
            return Ok(interactions::application::webhook_handler::json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({"error": "internal server error"}).to_string(),
            ));
        }
    };

    Ok(webhook_handler.handle(&request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use interactions::domain::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
    use lambda_http::http::Request as HttpRequest;
    use serial_test::serial;

    const NOW: i64 = 1_700_000_000;

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    unsafe fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) };
    }

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn signed_request(body: &str) -> Request {
        let timestamp = NOW.to_string();
        let mut message = timestamp.as_bytes().to_vec();
        message.extend_from_slice(body.as_bytes());
        let signature = hex::encode(signing_key().sign(&message).to_bytes());

        HttpRequest::builder()
            .method("POST")
            .uri("/interactions")
            .header(SIGNATURE_HEADER, signature)
            .header(TIMESTAMP_HEADER, timestamp)
            .body(Body::Text(body.to_string()))
            .unwrap()
    }

    /// 設定が欠けている場合は500を返す
    #[tokio::test]
    #[serial]
    async fn test_handler_returns_500_without_config() {
        init_logging();
        unsafe {
            remove_env("DISCORD_PUBLIC_KEY");
            remove_env("DYNAMODB_TABLE_NAME");
        }

        let request = HttpRequest::builder()
            .method("POST")
            .uri("/interactions")
            .body(Body::Text(r#"{"type":1}"#.to_string()))
            .unwrap();

        let response = handler(request).await.unwrap();

        assert_eq!(response.status(), 500);
        assert_eq!(response.headers().get("content-type").unwrap(), "application/json");
    }

    /// ストア設定がなくてもPINGにはPONGを返す
    #[tokio::test]
    #[serial]
    async fn test_ping_answered_without_store_config() {
        init_logging();
        unsafe {
            set_env("DISCORD_PUBLIC_KEY", &hex::encode(signing_key().verifying_key().to_bytes()));
            remove_env("DYNAMODB_TABLE_NAME");
        }

        let handler = build_handler().await.unwrap();
        let response = handler.handle_at(&signed_request(r#"{"type":1}"#), NOW).await;

        assert_eq!(response.status(), 200);
        match response.body() {
            Body::Text(text) => assert_eq!(text, r#"{"type":1}"#),
            other => panic!("予期しないBody: {:?}", other),
        }

        unsafe { remove_env("DISCORD_PUBLIC_KEY") };
    }

    /// ストア設定がない場合、コマンドはERROR応答になる
    #[tokio::test]
    #[serial]
    async fn test_command_without_store_config_is_error_response() {
        init_logging();
        unsafe {
            set_env("DISCORD_PUBLIC_KEY", &hex::encode(signing_key().verifying_key().to_bytes()));
            remove_env("DYNAMODB_TABLE_NAME");
        }

        let handler = build_handler().await.unwrap();
        let body = r#"{"type":2,"id":"i-1","data":{"name":"balance"},"member":{"user":{"id":"user-1"}}}"#;
        let response = handler.handle_at(&signed_request(body), NOW).await;

        assert_eq!(response.status(), 200);
        let json: serde_json::Value = match response.body() {
            Body::Text(text) => serde_json::from_str(text).unwrap(),
            other => panic!("予期しないBody: {:?}", other),
        };
        assert_eq!(json["type"], 4);
        assert_eq!(json["data"]["flags"], 64);

        unsafe { remove_env("DISCORD_PUBLIC_KEY") };
    }
}
