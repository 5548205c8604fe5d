/// 検証済みインタラクションのドメインモデル
///
/// プラットフォームから届くインタラクションを、ディスパッチャーが網羅的に
/// 扱える直和型として表現する。

/// インタラクション種別の数値タグ
pub mod interaction_type {
    /// 疎通確認（PING）
    pub const PING: u64 = 1;
    /// アプリケーションコマンド
    pub const APPLICATION_COMMAND: u64 = 2;
}

/// コマンド引数の値
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    /// 文字列（STRING / USER / CHANNEL / ROLE などのID型も含む）
    String(String),
    /// 整数
    Integer(i64),
    /// 浮動小数点数
    Number(f64),
    /// 真偽値
    Boolean(bool),
}

impl OptionValue {
    /// 文字列値として取得
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// 整数値として取得
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            OptionValue::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

/// 名前付きのコマンド引数
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOption {
    pub name: String,
    pub value: OptionValue,
}

impl CommandOption {
    pub fn new(name: impl Into<String>, value: OptionValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// アプリケーションコマンドのインタラクション
///
/// コマンド名は常に空でない（`new`で保証）。
#[derive(Debug, Clone, PartialEq)]
pub struct CommandInteraction {
    /// プラットフォーム側のインタラクションID（ログ用）
    interaction_id: Option<String>,
    /// コマンド名
    name: String,
    /// 引数（受信順）
    options: Vec<CommandOption>,
    /// 呼び出し元ユーザーID
    user_id: String,
}

impl CommandInteraction {
    /// コマンドインタラクションを作成
    ///
    /// # 戻り値
    /// * `Some(CommandInteraction)` - コマンド名が空でない場合
    /// * `None` - コマンド名が空（空白のみを含む）の場合
    pub fn new(name: impl Into<String>, user_id: impl Into<String>, options: Vec<CommandOption>) -> Option<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return None;
        }
        Some(Self {
            interaction_id: None,
            name,
            options,
            user_id: user_id.into(),
        })
    }

    /// インタラクションIDを付与
    pub fn with_interaction_id(mut self, interaction_id: impl Into<String>) -> Self {
        self.interaction_id = Some(interaction_id.into());
        self
    }

    pub fn interaction_id(&self) -> Option<&str> {
        self.interaction_id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &[CommandOption] {
        &self.options
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// 名前で引数を検索（最初に一致したもの）
    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        self.options
            .iter()
            .find(|option| option.name == name)
            .map(|option| &option.value)
    }
}

/// 検証済みのインタラクション
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    /// 疎通確認
    Ping,
    /// アプリケーションコマンド
    Command(CommandInteraction),
    /// 未対応の種別（前方互換のため失敗にはしない）
    Unknown { kind: u64 },
}

impl Interaction {
    /// ログ用の種別名
    pub fn kind_name(&self) -> &'static str {
        match self {
            Interaction::Ping => "ping",
            Interaction::Command(_) => "command",
            Interaction::Unknown { .. } => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_interaction_rejects_empty_name() {
        assert!(CommandInteraction::new("", "user-1", vec![]).is_none());
        assert!(CommandInteraction::new("   ", "user-1", vec![]).is_none());
    }

    #[test]
    fn test_command_interaction_accessors() {
        let command = CommandInteraction::new(
            "earn",
            "user-1",
            vec![CommandOption::new("amount", OptionValue::Integer(5))],
        )
        .unwrap()
        .with_interaction_id("i-1");

        assert_eq!(command.name(), "earn");
        assert_eq!(command.user_id(), "user-1");
        assert_eq!(command.interaction_id(), Some("i-1"));
        assert_eq!(command.option("amount"), Some(&OptionValue::Integer(5)));
        assert_eq!(command.option("missing"), None);
    }

    #[test]
    fn test_option_value_accessors() {
        assert_eq!(OptionValue::String("item1".to_string()).as_str(), Some("item1"));
        assert_eq!(OptionValue::Integer(3).as_str(), None);
        assert_eq!(OptionValue::Integer(3).as_integer(), Some(3));
        assert_eq!(OptionValue::Boolean(true).as_integer(), None);
    }

    #[test]
    fn test_kind_name() {
        assert_eq!(Interaction::Ping.kind_name(), "ping");
        assert_eq!(Interaction::Unknown { kind: 9 }.kind_name(), "unknown");
    }
}
