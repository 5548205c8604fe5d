/// プラットフォームに登録するアプリケーションコマンド定義
///
/// 登録APIにそのままJSONとして送信する。
use serde::Serialize;

/// コマンド種別: チャット入力（スラッシュコマンド）
pub const CHAT_INPUT: u8 = 1;

/// 引数の型タグ
pub mod option_type {
    pub const SUB_COMMAND: u8 = 1;
    pub const SUB_COMMAND_GROUP: u8 = 2;
    pub const STRING: u8 = 3;
    pub const INTEGER: u8 = 4;
    pub const BOOLEAN: u8 = 5;
    pub const USER: u8 = 6;
    pub const CHANNEL: u8 = 7;
    pub const ROLE: u8 = 8;
    pub const MENTIONABLE: u8 = 9;
    pub const NUMBER: u8 = 10;
    pub const ATTACHMENT: u8 = 11;
}

/// 選択肢
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionChoice {
    pub name: String,
    pub value: String,
}

/// 引数定義
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOptionDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<OptionChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<i64>,
}

impl CommandOptionDefinition {
    /// 必須の文字列引数
    pub fn required_string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: option_type::STRING,
            required: true,
            choices: Vec::new(),
            min_value: None,
            max_value: None,
        }
    }

    /// 必須の整数引数
    pub fn required_integer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: option_type::INTEGER,
            required: true,
            choices: Vec::new(),
            min_value: None,
            max_value: None,
        }
    }

    /// 選択肢を追加
    pub fn with_choice(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.choices.push(OptionChoice {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// 最小値を設定
    pub fn with_min_value(mut self, min_value: i64) -> Self {
        self.min_value = Some(min_value);
        self
    }

    /// 最大値を設定
    pub fn with_max_value(mut self, max_value: i64) -> Self {
        self.max_value = Some(max_value);
        self
    }
}

/// コマンド定義
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOptionDefinition>,
}

impl CommandDefinition {
    /// チャット入力コマンドを作成
    pub fn chat_input(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: CHAT_INPUT,
            description: description.into(),
            options: Vec::new(),
        }
    }

    /// 引数定義を追加
    pub fn with_option(mut self, option: CommandOptionDefinition) -> Self {
        self.options.push(option);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialize_command_without_options() {
        let definition = CommandDefinition::chat_input("balance", "Check your token balance");
        let value = serde_json::to_value(&definition).unwrap();

        assert_eq!(
            value,
            json!({"name": "balance", "type": 1, "description": "Check your token balance"})
        );
    }

    #[test]
    fn test_serialize_command_with_choices() {
        let definition = CommandDefinition::chat_input("buy", "Buy an item").with_option(
            CommandOptionDefinition::required_string("item", "Item to buy").with_choice("Item 1 (10 tokens)", "item1"),
        );
        let value = serde_json::to_value(&definition).unwrap();

        assert_eq!(value["options"][0]["type"], 3);
        assert_eq!(value["options"][0]["required"], true);
        assert_eq!(value["options"][0]["choices"][0]["value"], "item1");
        assert!(value["options"][0].get("min_value").is_none());
    }

    #[test]
    fn test_serialize_integer_min_value() {
        let option = CommandOptionDefinition::required_integer("amount", "Amount").with_min_value(1);
        let value = serde_json::to_value(&option).unwrap();

        assert_eq!(value["type"], 4);
        assert_eq!(value["min_value"], 1);
        assert!(value.get("max_value").is_none());
        assert!(value.get("choices").is_none());
    }

    #[test]
    fn test_serialize_integer_max_value() {
        let option = CommandOptionDefinition::required_integer("amount", "Amount")
            .with_min_value(1)
            .with_max_value(100);
        let value = serde_json::to_value(&option).unwrap();

        assert_eq!(value["max_value"], 100);
    }
}
