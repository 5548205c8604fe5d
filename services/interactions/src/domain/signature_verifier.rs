/// インタラクションWebhookの署名検証
///
/// プラットフォームが付与する`x-signature-ed25519`と`x-signature-timestamp`を使い、
/// `timestamp ‖ body`に対するEd25519署名を検証する。
/// 署名比較はed25519-dalekの検証処理に委ね、独自のバイト比較は行わない。
use std::time::Duration;

use ed25519_dalek::{Signature, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use thiserror::Error;

/// 署名ヘッダー名
pub const SIGNATURE_HEADER: &str = "x-signature-ed25519";

/// タイムスタンプヘッダー名
pub const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

/// タイムスタンプ鮮度のデフォルト許容幅（秒）
pub const DEFAULT_TOLERANCE_SECONDS: u64 = 300;

/// リクエスト検証エラー
///
/// 呼び出し元にはすべて同じ401として返す。種別はサーバー側ログ専用。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// 署名またはタイムスタンプヘッダーが欠落
    #[error("missing header: {0}")]
    MissingHeader(&'static str),
    /// タイムスタンプが10進Unix秒でない
    #[error("timestamp must be decimal unix seconds")]
    InvalidTimestamp,
    /// タイムスタンプが鮮度ウィンドウ外
    #[error("timestamp outside freshness window (skew {skew_seconds}s)")]
    StaleTimestamp { skew_seconds: i64 },
    /// 署名の形式不正または暗号検証失敗
    #[error("signature verification failed")]
    InvalidSignature,
}

/// 公開鍵設定のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublicKeyError {
    /// 64文字の16進数でない
    #[error("public key must be 64 hex characters")]
    InvalidHex,
    /// Ed25519の公開鍵として不正
    #[error("public key is not a valid Ed25519 point")]
    InvalidPoint,
}

/// 署名を検証する
///
/// `signature_hex`が64バイトにデコードできない場合も、暗号検証に失敗した場合も
/// 同じく`false`を返す。
pub fn verify(
    raw_body: &[u8],
    timestamp: &str,
    signature_hex: &str,
    public_key: &[u8; PUBLIC_KEY_LENGTH],
) -> bool {
    match VerifyingKey::from_bytes(public_key) {
        Ok(key) => verify_with_key(&key, raw_body, timestamp, signature_hex),
        Err(_) => false,
    }
}

fn verify_with_key(key: &VerifyingKey, raw_body: &[u8], timestamp: &str, signature_hex: &str) -> bool {
    let mut signature_bytes = [0u8; SIGNATURE_LENGTH];
    if hex::decode_to_slice(signature_hex, &mut signature_bytes).is_err() {
        return false;
    }
    let signature = Signature::from_bytes(&signature_bytes);

    let mut message = Vec::with_capacity(timestamp.len() + raw_body.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.extend_from_slice(raw_body);

    key.verify(&message, &signature).is_ok()
}

/// タイムスタンプの鮮度を検証する
///
/// 過去・未来どちらの方向にも`tolerance_seconds`を超えてずれていれば拒否する。
///
/// # 戻り値
/// * `Ok(i64)` - パース済みのタイムスタンプ
/// * `Err(VerificationError)` - 形式不正または鮮度ウィンドウ外
pub fn check_freshness(timestamp: &str, now: i64, tolerance_seconds: u64) -> Result<i64, VerificationError> {
    if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VerificationError::InvalidTimestamp);
    }
    let parsed = timestamp
        .parse::<i64>()
        .map_err(|_| VerificationError::InvalidTimestamp)?;

    let skew_seconds = now.saturating_sub(parsed);
    if skew_seconds.unsigned_abs() > tolerance_seconds {
        return Err(VerificationError::StaleTimestamp { skew_seconds });
    }

    Ok(parsed)
}

/// 起動時に一度だけ構築される署名検証器
///
/// 公開鍵と鮮度ウィンドウを保持し、以降は読み取り専用で共有される。
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    key: VerifyingKey,
    tolerance: Duration,
}

impl SignatureVerifier {
    /// 32バイトの公開鍵から検証器を作成
    pub fn new(public_key: &[u8; PUBLIC_KEY_LENGTH], tolerance: Duration) -> Result<Self, PublicKeyError> {
        let key = VerifyingKey::from_bytes(public_key).map_err(|_| PublicKeyError::InvalidPoint)?;
        Ok(Self { key, tolerance })
    }

    /// 16進文字列の公開鍵から検証器を作成
    pub fn from_hex(public_key_hex: &str, tolerance: Duration) -> Result<Self, PublicKeyError> {
        let mut bytes = [0u8; PUBLIC_KEY_LENGTH];
        hex::decode_to_slice(public_key_hex.trim(), &mut bytes).map_err(|_| PublicKeyError::InvalidHex)?;
        Self::new(&bytes, tolerance)
    }

    /// 鮮度ウィンドウを取得
    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// 署名のみを検証（鮮度は見ない）
    pub fn verify(&self, raw_body: &[u8], timestamp: &str, signature_hex: &str) -> bool {
        verify_with_key(&self.key, raw_body, timestamp, signature_hex)
    }

    /// ヘッダー有無・タイムスタンプ鮮度・署名をまとめて検証
    ///
    /// 鮮度チェックは署名検証より先に行う。どちらの失敗も呼び出し元では同じ拒否として扱う。
    pub fn verify_request(
        &self,
        raw_body: &[u8],
        timestamp: Option<&str>,
        signature_hex: Option<&str>,
        now: i64,
    ) -> Result<(), VerificationError> {
        let timestamp = timestamp.ok_or(VerificationError::MissingHeader(TIMESTAMP_HEADER))?;
        let signature_hex = signature_hex.ok_or(VerificationError::MissingHeader(SIGNATURE_HEADER))?;

        check_freshness(timestamp, now, self.tolerance.as_secs())?;

        if self.verify(raw_body, timestamp, signature_hex) {
            Ok(())
        } else {
            Err(VerificationError::InvalidSignature)
        }
    }
}
