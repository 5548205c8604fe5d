/// インタラクションパーサー
///
/// 署名検証を通過したボディをInteractionに変換する。
/// 未知の種別タグはUnknownとして扱い、JSONとして壊れているものだけをエラーにする。
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::command_definition::option_type;
use crate::domain::interaction::interaction_type;
use crate::domain::{CommandInteraction, CommandOption, Interaction, OptionValue};

/// ボディのパースエラー
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    /// JSONパースに失敗
    #[error("failed to parse JSON")]
    InvalidJson,

    /// ボディがJSONオブジェクトでない
    #[error("interaction must be a JSON object")]
    NotObject,

    /// typeが欠落または非負整数でない
    #[error("interaction type must be a non-negative integer")]
    InvalidType,

    /// コマンドの構造が不正
    #[error("malformed command payload: {0}")]
    MalformedCommand(String),

    /// コマンド名が欠落または空
    #[error("command name is missing")]
    MissingCommandName,

    /// 呼び出し元ユーザーが特定できない
    #[error("originating user is missing")]
    MissingUser,

    /// 引数の値が宣言された型と一致しない
    #[error("option {name} has a value that does not match its type")]
    InvalidOptionValue { name: String },
}

#[derive(Debug, Deserialize)]
struct RawCommand {
    id: Option<String>,
    data: Option<RawCommandData>,
    member: Option<RawMember>,
    user: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawCommandData {
    name: Option<String>,
    #[serde(default)]
    options: Vec<RawOption>,
}

#[derive(Debug, Deserialize)]
struct RawOption {
    name: String,
    #[serde(rename = "type")]
    kind: u8,
    value: Option<Value>,
    #[serde(default)]
    options: Vec<RawOption>,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    user: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: String,
}

/// インタラクションパーサー
pub struct InteractionParser;

impl InteractionParser {
    /// 検証済みボディをパースしてInteractionに変換
    ///
    /// # 引数
    /// * `verified_body` - 署名検証済みのリクエストボディ
    ///
    /// # 戻り値
    /// * `Ok(Interaction)` - パース成功時（未知の種別はUnknown）
    /// * `Err(ParseError)` - ボディが壊れている場合
    ///
    /// # 例
    /// ```
    /// use interactions::application::InteractionParser;
    /// use interactions::domain::Interaction;
    ///
    /// let interaction = InteractionParser::parse(br#"{"type": 1}"#).unwrap();
    /// assert_eq!(interaction, Interaction::Ping);
    /// ```
    pub fn parse(verified_body: &[u8]) -> Result<Interaction, ParseError> {
        let value: Value = serde_json::from_slice(verified_body).map_err(|_| ParseError::InvalidJson)?;

        let object = value.as_object().ok_or(ParseError::NotObject)?;

        let kind = object
            .get("type")
            .and_then(Value::as_u64)
            .ok_or(ParseError::InvalidType)?;

        match kind {
            interaction_type::PING => Ok(Interaction::Ping),
            interaction_type::APPLICATION_COMMAND => Self::parse_command(value),
            other => Ok(Interaction::Unknown { kind: other }),
        }
    }

    /// アプリケーションコマンドをパース
    ///
    /// ユーザーIDはギルド内なら`member.user.id`、DMなら`user.id`から取得する。
    fn parse_command(value: Value) -> Result<Interaction, ParseError> {
        let raw: RawCommand =
            serde_json::from_value(value).map_err(|e| ParseError::MalformedCommand(e.to_string()))?;

        let data = raw.data.ok_or(ParseError::MissingCommandName)?;
        let name = data.name.ok_or(ParseError::MissingCommandName)?;

        let user_id = raw
            .member
            .and_then(|member| member.user)
            .or(raw.user)
            .map(|user| user.id)
            .filter(|id| !id.is_empty())
            .ok_or(ParseError::MissingUser)?;

        let mut options = Vec::new();
        Self::collect_options(data.options, &mut options)?;

        let command = CommandInteraction::new(name, user_id, options).ok_or(ParseError::MissingCommandName)?;

        Ok(Interaction::Command(match raw.id {
            Some(id) => command.with_interaction_id(id),
            None => command,
        }))
    }

    /// 引数を受信順に平坦化して収集
    ///
    /// サブコマンド（グループ）は値を持たないため、その配下の引数を展開する。
    fn collect_options(raw_options: Vec<RawOption>, out: &mut Vec<CommandOption>) -> Result<(), ParseError> {
        for raw in raw_options {
            match raw.kind {
                option_type::SUB_COMMAND | option_type::SUB_COMMAND_GROUP => {
                    Self::collect_options(raw.options, out)?;
                }
                kind => {
                    let value = Self::convert_value(kind, raw.value.as_ref())
                        .ok_or_else(|| ParseError::InvalidOptionValue { name: raw.name.clone() })?;
                    out.push(CommandOption::new(raw.name, value));
                }
            }
        }
        Ok(())
    }

    /// 宣言された型に従って値を変換
    fn convert_value(kind: u8, value: Option<&Value>) -> Option<OptionValue> {
        let value = value?;
        match kind {
            option_type::INTEGER => value.as_i64().map(OptionValue::Integer),
            option_type::NUMBER => value.as_f64().map(OptionValue::Number),
            option_type::BOOLEAN => value.as_bool().map(OptionValue::Boolean),
            // STRING と各種ID（USER, CHANNEL, ROLE, MENTIONABLE, ATTACHMENT）
            _ => value.as_str().map(|s| OptionValue::String(s.to_string())),
        }
    }
}
