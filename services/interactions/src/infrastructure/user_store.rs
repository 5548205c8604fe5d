/// ユーザーレコードストアの抽象化
///
/// ユーザーIDによるポイント操作のみを提供する（スキャン・クエリは持たない）。
use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{AttributePatch, AttributeValue, UserRecord};

/// ストア操作のエラー型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// 呼び出しがタイムアウトした
    #[error("Store timed out after {0}ms")]
    Timeout(u64),

    /// スループット超過・レート制限
    #[error("Throttled: {0}")]
    Throttled(String),

    /// ストアに到達できない、またはその他のサービスエラー
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// 条件付き書き込みの条件を満たさない
    #[error("Condition failed: {0}")]
    ConditionFailed(String),

    /// 保存データの変換に失敗
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl StoreError {
    /// 即時の再試行で回復しうるエラーか
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Throttled(_) | StoreError::Unavailable(_))
    }

    /// ストアが書き込みを適用せずに拒否したことが確実なエラーか
    ///
    /// `Unavailable`は送信後の失敗も含むため対象外。
    pub fn is_rejected_before_commit(&self) -> bool {
        matches!(self, StoreError::Throttled(_))
    }
}

/// ユーザーレコードストア用トレイト
///
/// 実際のDynamoDB実装とテスト用モックを差し替えられるようにする。
#[async_trait]
pub trait UserStore: Send + Sync {
    /// ユーザーレコードを取得
    ///
    /// # 戻り値
    /// * 見つかった場合は`Ok(Some(UserRecord))`
    /// * 見つからなかった場合は`Ok(None)`
    /// * 失敗時は`Err(StoreError)`
    async fn get(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError>;

    /// ユーザーレコードを属性ごと置き換えて保存
    async fn put(&self, user_id: &str, attributes: &HashMap<String, AttributeValue>) -> Result<(), StoreError>;

    /// 部分更新を1回の書き込みで適用し、更新後のレコードを返す
    ///
    /// 事前の読み取りは行わない。レコードが存在しなければ作成する。
    /// ガード条件を満たさない場合は`StoreError::ConditionFailed`。
    async fn update(&self, user_id: &str, patch: &AttributePatch) -> Result<UserRecord, StoreError>;

    /// ユーザーレコードを削除（存在しなかった場合も成功）
    async fn delete(&self, user_id: &str) -> Result<(), StoreError>;
}

/// 未設定のストア（`None`）は全操作を`Unavailable`で失敗させる
///
/// ストア設定が欠けていてもPINGには応答できるようにする。
#[async_trait]
impl<S> UserStore for Option<S>
where
    S: UserStore,
{
    async fn get(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        configured(self)?.get(user_id).await
    }

    async fn put(&self, user_id: &str, attributes: &HashMap<String, AttributeValue>) -> Result<(), StoreError> {
        configured(self)?.put(user_id, attributes).await
    }

    async fn update(&self, user_id: &str, patch: &AttributePatch) -> Result<UserRecord, StoreError> {
        configured(self)?.update(user_id, patch).await
    }

    async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        configured(self)?.delete(user_id).await
    }
}

fn configured<S>(store: &Option<S>) -> Result<&S, StoreError> {
    store
        .as_ref()
        .ok_or_else(|| StoreError::Unavailable("user store is not configured".to_string()))
}
