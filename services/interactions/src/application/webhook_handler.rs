/// Webhookエントリポイントのハンドラー
///
/// 1リクエストを次の順で処理する:
/// 1. POST以外 → 405
/// 2. 署名・鮮度の検証に失敗 → 401（ボディは見ない）
/// 3. パースに失敗 → 400
/// 4. ディスパッチ中のパニック → 500
/// 5. それ以外 → 200（InteractionResponseのJSON）
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::FutureExt;
use lambda_http::http::header::{HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use lambda_http::http::{Method, StatusCode};
use lambda_http::{Body, Request, Response};
use serde_json::json;
use std::panic::AssertUnwindSafe;
use tracing::{error, info, instrument, warn};

use super::command_dispatcher::CommandDispatcher;
use super::interaction_parser::InteractionParser;
use crate::domain::{InteractionResponse, SignatureVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::infrastructure::UserStore;

/// 現在のUNIX時刻（秒）
fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Webhookハンドラー
///
/// 検証器・ディスパッチャー・ストアは起動時に一度だけ構築し、全リクエストで共有する。
pub struct WebhookHandler<S>
where
    S: UserStore,
{
    verifier: SignatureVerifier,
    dispatcher: CommandDispatcher,
    store: Arc<S>,
}

impl<S> WebhookHandler<S>
where
    S: UserStore,
{
    /// 新しいWebhookHandlerを作成
    pub fn new(verifier: SignatureVerifier, dispatcher: CommandDispatcher, store: S) -> Self {
        Self {
            verifier,
            dispatcher,
            store: Arc::new(store),
        }
    }

    /// リクエストを処理してHTTPレスポンスを返す
    pub async fn handle(&self, request: &Request) -> Response<Body> {
        self.handle_at(request, unix_now()).await
    }

    /// 指定した現在時刻でリクエストを処理（テスト用に時刻を固定できる）
    #[instrument(skip_all, fields(method = %request.method()))]
    pub async fn handle_at(&self, request: &Request, now: i64) -> Response<Body> {
        if *request.method() != Method::POST {
            warn!("POST以外のリクエストを拒否");
            return json_response(StatusCode::METHOD_NOT_ALLOWED, json!({"error": "method not allowed"}).to_string());
        }

        let body: &[u8] = request.body().as_ref();
        let timestamp = header_str(request.headers(), TIMESTAMP_HEADER);
        let signature = header_str(request.headers(), SIGNATURE_HEADER);

        // 検証に失敗したボディはパースしない
        if let Err(err) = self.verifier.verify_request(body, timestamp, signature, now) {
            warn!(reason = %err, "署名検証に失敗");
            return json_response(
                StatusCode::UNAUTHORIZED,
                json!({"error": "invalid request signature"}).to_string(),
            );
        }

        let interaction = match InteractionParser::parse(body) {
            Ok(interaction) => interaction,
            Err(err) => {
                warn!(error = %err, "検証済みボディのパースに失敗");
                return json_response(
                    StatusCode::BAD_REQUEST,
                    json!({"error": "invalid request payload"}).to_string(),
                );
            }
        };

        info!(interaction_type = interaction.kind_name(), "インタラクション受信");

        let dispatched = AssertUnwindSafe(self.dispatcher.dispatch(&interaction, self.store.as_ref()))
            .catch_unwind()
            .await;

        match dispatched {
            Ok(response) => {
                if let InteractionResponse::Error { code, .. } = &response {
                    info!(code = %code, "ERROR応答を返却");
                }
                json_response(StatusCode::OK, response.to_json())
            }
            Err(_) => {
                error!(interaction_type = interaction.kind_name(), "ディスパッチ中にパニック");
                json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "internal server error"}).to_string(),
                )
            }
        }
    }
}

/// ヘッダー値を文字列として取得（非ASCIIは欠落扱い）
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// 応答ヘッダーを生成
///
/// - Content-Type: application/json
/// - Access-Control-Allow-Origin: *
pub fn build_response_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers
}

/// JSONボディのレスポンスを構築
pub fn json_response(status: StatusCode, body: String) -> Response<Body> {
    let mut response = Response::new(Body::Text(body));
    *response.status_mut() = status;
    *response.headers_mut() = build_response_headers();
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::command_dispatcher::tests::PanickingHandler;
    use crate::application::{default_registry, CommandRegistry};
    use crate::domain::signature_verifier::tests::{sign_hex, test_signing_key};
    use crate::infrastructure::user_store::tests::{FailingUserStore, MockUserStore};
    use crate::infrastructure::GuardedUserStore;
    use lambda_http::http::Request as HttpRequest;
    use serde_json::Value;
    use std::time::{Duration, Instant};

    const NOW: i64 = 1_700_000_000;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(&test_signing_key().verifying_key().to_bytes(), Duration::from_secs(300)).unwrap()
    }

    fn handler<S: UserStore>(store: S) -> WebhookHandler<S> {
        WebhookHandler::new(verifier(), CommandDispatcher::new(default_registry()), store)
    }

    fn signed_request(body: &str, timestamp: i64) -> Request {
        let timestamp = timestamp.to_string();
        let signature = sign_hex(&test_signing_key(), &timestamp, body.as_bytes());
        HttpRequest::builder()
            .method("POST")
            .uri("/interactions")
            .header(SIGNATURE_HEADER, signature)
            .header(TIMESTAMP_HEADER, timestamp)
            .body(Body::Text(body.to_string()))
            .unwrap()
    }

    fn body_json(response: &Response<Body>) -> Value {
        let body = match response.body() {
            Body::Text(text) => text.clone(),
            Body::Binary(bytes) => String::from_utf8(bytes.clone()).unwrap(),
            Body::Empty => String::new(),
            _ => panic!("予期しないBody型"),
        };
        serde_json::from_str(&body).unwrap()
    }

    fn balance_body() -> String {
        json!({
            "type": 2,
            "id": "interaction-1",
            "data": {"name": "balance"},
            "member": {"user": {"id": "user-1"}}
        })
        .to_string()
    }

    // ==================== 正常系 ====================

    #[tokio::test]
    async fn test_signed_ping_returns_pong() {
        let response = handler(FailingUserStore)
            .handle_at(&signed_request(r#"{"type":1}"#, NOW), NOW)
            .await;

        assert_eq!(response.status(), 200);
        assert_eq!(body_json(&response), json!({"type": 1}));
    }

    #[tokio::test]
    async fn test_response_headers() {
        let response = handler(FailingUserStore)
            .handle_at(&signed_request(r#"{"type":1}"#, NOW), NOW)
            .await;

        assert_eq!(response.headers().get("content-type").unwrap(), "application/json");
        assert_eq!(response.headers().get("access-control-allow-origin").unwrap(), "*");
    }

    #[tokio::test]
    async fn test_signed_command_reaches_store() {
        let store = MockUserStore::new();

        let response = handler(store.clone())
            .handle_at(&signed_request(&balance_body(), NOW), NOW)
            .await;

        assert_eq!(response.status(), 200);
        assert_eq!(
            body_json(&response),
            json!({"type": 4, "data": {"content": "<@user-1>, you have 0 tokens."}})
        );
        assert_eq!(store.call_count(), 1);
    }

    // ==================== 401 ====================

    #[tokio::test]
    async fn test_flipped_body_bit_is_unauthorized() {
        let store = MockUserStore::new();
        let body = balance_body();
        let mut request = signed_request(&body, NOW);

        let mut tampered = body.into_bytes();
        tampered[10] ^= 0x01;
        *request.body_mut() = Body::Binary(tampered);

        let response = handler(store.clone()).handle_at(&request, NOW).await;

        assert_eq!(response.status(), 401);
        assert_eq!(body_json(&response), json!({"error": "invalid request signature"}));
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_timestamp_is_unauthorized() {
        let store = MockUserStore::new();
        let stale = NOW - 301;

        let response = handler(store.clone())
            .handle_at(&signed_request(&balance_body(), stale), NOW)
            .await;

        assert_eq!(response.status(), 401);
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_headers_are_unauthorized() {
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/interactions")
            .body(Body::Text(r#"{"type":1}"#.to_string()))
            .unwrap();

        let response = handler(FailingUserStore).handle_at(&request, NOW).await;

        assert_eq!(response.status(), 401);
    }

    #[tokio::test]
    async fn test_unsigned_garbage_is_unauthorized_not_bad_request() {
        let mut request = signed_request(r#"{"type":1}"#, NOW);
        *request.body_mut() = Body::Text("not json".to_string());

        let response = handler(FailingUserStore).handle_at(&request, NOW).await;

        assert_eq!(response.status(), 401);
    }

    // ==================== 400 / 405 ====================

    #[tokio::test]
    async fn test_signed_malformed_body_is_bad_request() {
        let response = handler(FailingUserStore)
            .handle_at(&signed_request("not json", NOW), NOW)
            .await;

        assert_eq!(response.status(), 400);
        assert_eq!(body_json(&response), json!({"error": "invalid request payload"}));
    }

    #[tokio::test]
    async fn test_non_post_is_method_not_allowed() {
        let request = HttpRequest::builder()
            .method("GET")
            .uri("/interactions")
            .body(Body::Empty)
            .unwrap();

        let response = handler(FailingUserStore).handle_at(&request, NOW).await;

        assert_eq!(response.status(), 405);
    }

    // ==================== ERROR応答 ====================

    #[tokio::test]
    async fn test_unknown_command_is_ephemeral_error() {
        let store = MockUserStore::new();
        let body = json!({
            "type": 2,
            "data": {"name": "does_not_exist"},
            "user": {"id": "user-1"}
        })
        .to_string();

        let response = handler(store.clone()).handle_at(&signed_request(&body, NOW), NOW).await;

        assert_eq!(response.status(), 200);
        let json = body_json(&response);
        assert_eq!(json["type"], 4);
        assert_eq!(json["data"]["flags"], 64);
        assert!(json["data"]["content"].is_string());
        assert!(json.get("code").is_none());
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_interaction_type_is_error_not_bad_request() {
        let response = handler(MockUserStore::new())
            .handle_at(&signed_request(r#"{"type":3,"data":{"custom_id":"x"}}"#, NOW), NOW)
            .await;

        assert_eq!(response.status(), 200);
        assert_eq!(body_json(&response)["data"]["flags"], 64);
    }

    #[tokio::test]
    async fn test_store_timeout_returns_error_within_bound() {
        let slow = MockUserStore::new().with_delay(Duration::from_millis(500));
        let store = GuardedUserStore::new(slow, Duration::from_millis(20));

        let started = Instant::now();
        let response = handler(store).handle_at(&signed_request(&balance_body(), NOW), NOW).await;

        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(response.status(), 200);
        let json = body_json(&response);
        assert_eq!(json["type"], 4);
        assert_eq!(json["data"]["flags"], 64);
    }

    // ==================== 500 ====================

    #[tokio::test]
    async fn test_panicking_handler_is_internal_error() {
        let handler = WebhookHandler::new(
            verifier(),
            CommandDispatcher::new(CommandRegistry::new().register("boom", PanickingHandler)),
            MockUserStore::new(),
        );
        let body = json!({"type": 2, "data": {"name": "boom"}, "user": {"id": "user-1"}}).to_string();

        let response = handler.handle_at(&signed_request(&body, NOW), NOW).await;

        assert_eq!(response.status(), 500);
        assert_eq!(body_json(&response), json!({"error": "internal server error"}));
    }
}
