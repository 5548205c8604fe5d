/// DynamoDBによるユーザーレコードストア
///
/// パーティションキー`user_id`へのポイント操作のみを行う。
/// 部分更新はUpdateItemの更新式で表現し、読み取りなしで原子的に適用する。
use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{AttributeValue as DynamoValue, ReturnValue};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use tracing::{trace, warn};

use super::user_store::{StoreError, UserStore};
use crate::domain::{AttributePatch, AttributeValue, PatchOp, UserRecord};

/// パーティションキー属性名
pub const USER_ID_KEY: &str = "user_id";

/// DynamoDB UpdateItemの式一式
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateExpression {
    pub update_expression: String,
    pub condition_expression: Option<String>,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, DynamoValue>,
}

impl UpdateExpression {
    /// AttributePatchからUpdateItemの式を組み立てる
    ///
    /// - `Set` → `#aN = :vN`
    /// - `Add` → `#aN = if_not_exists(#aN, :zero) + :vN`
    /// - ガード → `#g >= :min`（最小値が0以下なら未設定も許容）
    pub fn from_patch(patch: &AttributePatch) -> Self {
        let mut expression = Self::default();
        let mut assignments = Vec::with_capacity(patch.operations().len());
        let mut needs_zero = false;

        for (index, (name, operation)) in patch.operations().iter().enumerate() {
            let name_placeholder = format!("#a{}", index);
            let value_placeholder = format!(":v{}", index);
            expression.names.insert(name_placeholder.clone(), name.clone());

            match operation {
                PatchOp::Set(value) => {
                    assignments.push(format!("{} = {}", name_placeholder, value_placeholder));
                    expression.values.insert(value_placeholder, to_dynamo(value));
                }
                PatchOp::Add(delta) => {
                    needs_zero = true;
                    assignments.push(format!(
                        "{0} = if_not_exists({0}, :zero) + {1}",
                        name_placeholder, value_placeholder
                    ));
                    expression
                        .values
                        .insert(value_placeholder, DynamoValue::N(delta.to_string()));
                }
            }
        }

        if needs_zero {
            expression.values.insert(":zero".to_string(), DynamoValue::N("0".to_string()));
        }

        if !assignments.is_empty() {
            expression.update_expression = format!("SET {}", assignments.join(", "));
        }

        if let Some(guard) = patch.guard() {
            expression.names.insert("#g".to_string(), guard.attribute.clone());
            expression
                .values
                .insert(":min".to_string(), DynamoValue::N(guard.minimum.to_string()));
            expression.condition_expression = Some(if guard.minimum <= 0 {
                "attribute_not_exists(#g) OR #g >= :min".to_string()
            } else {
                "#g >= :min".to_string()
            });
        }

        expression
    }
}

/// ドメインの属性値をDynamoDBの属性値に変換
fn to_dynamo(value: &AttributeValue) -> DynamoValue {
    match value {
        AttributeValue::String(s) => DynamoValue::S(s.clone()),
        AttributeValue::Number(n) => DynamoValue::N(n.to_string()),
        AttributeValue::Boolean(b) => DynamoValue::Bool(*b),
    }
}

/// DynamoDBの属性値をドメインの属性値に変換
///
/// 整数として読めない数値はエラー。対応外の型（リスト、マップ等）は無視する。
fn from_dynamo(name: &str, value: &DynamoValue) -> Result<Option<AttributeValue>, StoreError> {
    match value {
        DynamoValue::S(s) => Ok(Some(AttributeValue::String(s.clone()))),
        DynamoValue::N(n) => parse_number(name, n).map(|n| Some(AttributeValue::Number(n))),
        DynamoValue::Bool(b) => Ok(Some(AttributeValue::Boolean(*b))),
        _ => {
            trace!(attribute = name, "対応外の属性型を無視");
            Ok(None)
        }
    }
}

/// N型の値を整数に変換
///
/// DynamoDBの数値は38桁まで持てるため、i64に収まらない整数は上下限に丸める。
fn parse_number(name: &str, n: &str) -> Result<i64, StoreError> {
    if let Ok(value) = n.parse::<i64>() {
        return Ok(value);
    }

    let (negative, digits) = match n.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, n),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StoreError::SerializationError(format!(
            "attribute {} is not an integer: {}",
            name, n
        )));
    }

    warn!(attribute = name, value = n, "i64の範囲外の数値を丸めて読み取り");
    Ok(if negative { i64::MIN } else { i64::MAX })
}

/// DynamoDBのアイテムをUserRecordに変換
fn item_to_record(user_id: &str, item: &HashMap<String, DynamoValue>) -> Result<UserRecord, StoreError> {
    let mut record = UserRecord::new(user_id);
    for (name, value) in item {
        if name == USER_ID_KEY {
            continue;
        }
        if let Some(converted) = from_dynamo(name, value)? {
            record.attributes.insert(name.clone(), converted);
        }
    }
    Ok(record)
}

/// SDKエラーをStoreErrorに分類
fn map_sdk_error<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = err.to_string();
    match err.code() {
        Some("ConditionalCheckFailedException") => StoreError::ConditionFailed(message),
        Some("ProvisionedThroughputExceededException" | "ThrottlingException" | "RequestLimitExceeded") => {
            StoreError::Throttled(message)
        }
        _ => StoreError::Unavailable(message),
    }
}

/// UserStoreのDynamoDB実装
#[derive(Debug, Clone)]
pub struct DynamoUserStore {
    /// DynamoDBクライアント
    client: DynamoDbClient,
    /// ユーザーテーブル名
    table_name: String,
}

impl DynamoUserStore {
    /// 新しいDynamoUserStoreを作成
    ///
    /// # 引数
    /// * `client` - DynamoDBクライアント
    /// * `table_name` - ユーザーテーブルの名前
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        Self { client, table_name }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

#[async_trait]
impl UserStore for DynamoUserStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(USER_ID_KEY, DynamoValue::S(user_id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(map_sdk_error)?;

        match result.item {
            Some(item) => Ok(Some(item_to_record(user_id, &item)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, user_id: &str, attributes: &HashMap<String, AttributeValue>) -> Result<(), StoreError> {
        let mut item: HashMap<String, DynamoValue> = attributes
            .iter()
            .filter(|(name, _)| name.as_str() != USER_ID_KEY)
            .map(|(name, value)| (name.clone(), to_dynamo(value)))
            .collect();
        item.insert(USER_ID_KEY.to_string(), DynamoValue::S(user_id.to_string()));

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(())
    }

    async fn update(&self, user_id: &str, patch: &AttributePatch) -> Result<UserRecord, StoreError> {
        if patch.is_empty() {
            // 空の更新式はDynamoDBが受け付けないため、現在値を返す
            return Ok(self.get(user_id).await?.unwrap_or_else(|| UserRecord::new(user_id)));
        }

        let expression = UpdateExpression::from_patch(patch);

        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(USER_ID_KEY, DynamoValue::S(user_id.to_string()))
            .update_expression(expression.update_expression)
            .set_condition_expression(expression.condition_expression)
            .set_expression_attribute_names(Some(expression.names))
            .set_expression_attribute_values(Some(expression.values))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(map_sdk_error)?;

        match result.attributes {
            Some(item) => item_to_record(user_id, &item),
            None => Ok(UserRecord::new(user_id)),
        }
    }

    async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key(USER_ID_KEY, DynamoValue::S(user_id.to_string()))
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(())
    }
}
