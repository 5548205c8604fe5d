/// ユーザーレコードと部分更新のモデル
///
/// ユーザーIDをキーに任意の属性を保持する。スキーマは外部テーブル側が持つため、
/// ここでは「ID → 属性マップ」以上の制約は課さない。
use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

/// 属性値
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    String(String),
    Number(i64),
    Boolean(bool),
}

impl AttributeValue {
    pub fn as_number(&self) -> Option<i64> {
        match self {
            AttributeValue::Number(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Boolean(value)
    }
}

/// ユーザーレコード
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// 呼び出し元ユーザーID（パーティションキー）
    pub user_id: String,
    /// 属性
    pub attributes: HashMap<String, AttributeValue>,
}

impl UserRecord {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// 数値属性を取得（未設定や型違いは0）
    pub fn number_or_zero(&self, name: &str) -> i64 {
        self.get(name).and_then(AttributeValue::as_number).unwrap_or(0)
    }
}

/// 属性ごとの更新操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOp {
    /// 値を上書き
    Set(AttributeValue),
    /// 数値を加算（未設定は0として扱う）
    Add(i64),
}

/// 更新条件: 属性値が最小値以上であること（未設定は0）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinimumGuard {
    pub attribute: String,
    pub minimum: i64,
}

/// ガード条件を満たさない
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("attribute {attribute} is below {minimum}")]
pub struct GuardViolation {
    pub attribute: String,
    pub minimum: i64,
}

/// 読み取りなしで適用できる部分更新
///
/// 同一属性への操作は後から指定したものが優先される。
/// 属性はBTreeMapで保持し、更新式の組み立て順を決定的にする。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributePatch {
    operations: BTreeMap<String, PatchOp>,
    guard: Option<MinimumGuard>,
}

impl AttributePatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// 属性値を上書きする操作を追加
    pub fn set(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.operations.insert(name.into(), PatchOp::Set(value.into()));
        self
    }

    /// 数値を加算する操作を追加
    pub fn add(mut self, name: impl Into<String>, delta: i64) -> Self {
        self.operations.insert(name.into(), PatchOp::Add(delta));
        self
    }

    /// 更新条件を設定
    pub fn require_at_least(mut self, name: impl Into<String>, minimum: i64) -> Self {
        self.guard = Some(MinimumGuard {
            attribute: name.into(),
            minimum,
        });
        self
    }

    pub fn operations(&self) -> &BTreeMap<String, PatchOp> {
        &self.operations
    }

    pub fn guard(&self) -> Option<&MinimumGuard> {
        self.guard.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// 同じ更新を2回適用しても結果が変わらないか（加算を含まない）
    pub fn is_idempotent(&self) -> bool {
        !self.operations.values().any(|op| matches!(op, PatchOp::Add(_)))
    }

    /// 属性マップに更新を適用する
    ///
    /// ガードを満たさない場合は何も変更せずにエラーを返す。
    pub fn apply(&self, attributes: &mut HashMap<String, AttributeValue>) -> Result<(), GuardViolation> {
        if let Some(guard) = &self.guard {
            let current = attributes
                .get(&guard.attribute)
                .and_then(AttributeValue::as_number)
                .unwrap_or(0);
            if current < guard.minimum {
                return Err(GuardViolation {
                    attribute: guard.attribute.clone(),
                    minimum: guard.minimum,
                });
            }
        }

        for (name, operation) in &self.operations {
            match operation {
                PatchOp::Set(value) => {
                    attributes.insert(name.clone(), value.clone());
                }
                PatchOp::Add(delta) => {
                    let current = attributes.get(name).and_then(AttributeValue::as_number).unwrap_or(0);
                    attributes.insert(name.clone(), AttributeValue::Number(current.saturating_add(*delta)));
                }
            }
        }

        Ok(())
    }
}
