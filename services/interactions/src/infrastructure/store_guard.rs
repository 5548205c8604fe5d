/// ストア呼び出しのタイムアウトと再試行
///
/// プラットフォームの応答期限内に必ず戻るため、1回の操作全体に1つの期限を設定する。
/// 再試行は期限内に即時1回のみ。加算を含む書き込みは、コミット前に拒否されたと
/// 分かる`Throttled`だけを再試行する（`Unavailable`は応答だけ失われた可能性がある）。
/// 書き込みはランタイム上にspawnし、リクエスト側が待つのをやめても中断されない。
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use super::user_store::{StoreError, UserStore};
use crate::domain::{AttributePatch, AttributeValue, UserRecord};

/// 即時再試行の最大回数
const MAX_IMMEDIATE_RETRIES: usize = 1;

/// 再試行に必要な残り時間の下限
const MIN_RETRY_BUDGET: Duration = Duration::from_millis(50);

/// 同じ呼び出しを繰り返しても結果が変わらないか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Idempotency {
    Idempotent,
    NonIdempotent,
}

/// タイムアウトと再試行を付与したUserStore
pub struct GuardedUserStore<S> {
    inner: Arc<S>,
    timeout: Duration,
}

impl<S> Clone for GuardedUserStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            timeout: self.timeout,
        }
    }
}

impl<S> GuardedUserStore<S>
where
    S: UserStore + 'static,
{
    /// 新しいGuardedUserStoreを作成
    ///
    /// # 引数
    /// * `inner` - 実際のストア
    /// * `timeout` - 1回の操作（再試行を含む）全体のタイムアウト
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn timeout_error(&self) -> StoreError {
        StoreError::Timeout(self.timeout.as_millis() as u64)
    }

    /// 失敗した試行を期限内に再試行するか
    fn should_retry(&self, err: &StoreError, attempt: usize, deadline: Instant, idempotency: Idempotency) -> bool {
        if attempt >= MAX_IMMEDIATE_RETRIES {
            return false;
        }
        let retryable = match idempotency {
            Idempotency::Idempotent => err.is_retryable(),
            Idempotency::NonIdempotent => err.is_rejected_before_commit(),
        };
        retryable && deadline.saturating_duration_since(Instant::now()) >= MIN_RETRY_BUDGET
    }

    /// 読み取りを実行（タイムアウト時はそのまま破棄してよい）
    async fn run_read<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Fn(Arc<S>) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut attempt = 0;
        loop {
            let result = match timeout_at(deadline, call(Arc::clone(&self.inner))).await {
                Ok(result) => result,
                Err(_) => Err(self.timeout_error()),
            };

            match result {
                Err(err) if self.should_retry(&err, attempt, deadline, Idempotency::Idempotent) => {
                    attempt += 1;
                    debug!(operation = operation, error = %err, "ストア読み取りを再試行");
                }
                other => return other,
            }
        }
    }

    /// 書き込みを実行
    ///
    /// 書き込みは別タスクで走らせ、タイムアウト後も完了まで継続させる。
    async fn run_write<T, F, Fut>(
        &self,
        operation: &'static str,
        idempotency: Idempotency,
        call: F,
    ) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: Fn(Arc<S>) -> Fut,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
    {
        let deadline = Instant::now() + self.timeout;
        let mut attempt = 0;
        loop {
            let handle = tokio::spawn(call(Arc::clone(&self.inner)));

            let result = match timeout_at(deadline, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_error)) => Err(StoreError::Unavailable(join_error.to_string())),
                Err(_) => {
                    warn!(
                        operation = operation,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "ストア書き込みがタイムアウト（書き込み自体は継続）"
                    );
                    Err(self.timeout_error())
                }
            };

            match result {
                Err(err) if self.should_retry(&err, attempt, deadline, idempotency) => {
                    attempt += 1;
                    debug!(operation = operation, error = %err, "ストア書き込みを再試行");
                }
                Err(err) if idempotency == Idempotency::NonIdempotent && err.is_retryable() => {
                    warn!(operation = operation, error = %err, "コミット済みの可能性があるため再試行しない");
                    return Err(err);
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl<S> UserStore for GuardedUserStore<S>
where
    S: UserStore + 'static,
{
    async fn get(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.run_read("get", |store| async move { store.get(user_id).await })
            .await
    }

    async fn put(&self, user_id: &str, attributes: &HashMap<String, AttributeValue>) -> Result<(), StoreError> {
        let user_id = user_id.to_string();
        let attributes = attributes.clone();
        self.run_write("put", Idempotency::Idempotent, move |store| {
            let user_id = user_id.clone();
            let attributes = attributes.clone();
            async move { store.put(&user_id, &attributes).await }
        })
        .await
    }

    async fn update(&self, user_id: &str, patch: &AttributePatch) -> Result<UserRecord, StoreError> {
        let user_id = user_id.to_string();
        let idempotency = if patch.is_idempotent() {
            Idempotency::Idempotent
        } else {
            Idempotency::NonIdempotent
        };
        let patch = patch.clone();
        self.run_write("update", idempotency, move |store| {
            let user_id = user_id.clone();
            let patch = patch.clone();
            async move { store.update(&user_id, &patch).await }
        })
        .await
    }

    async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        let user_id = user_id.to_string();
        self.run_write("delete", Idempotency::Idempotent, move |store| {
            let user_id = user_id.clone();
            async move { store.delete(&user_id).await }
        })
        .await
    }
}
