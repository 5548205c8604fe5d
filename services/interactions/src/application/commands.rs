/// トークン台帳コマンド
///
/// ユーザーテーブルの`tokens`属性を残高として扱う。
/// 減算は「残高 >= 価格」のガード付き原子更新で行い、読み取りを挟まない。
use async_trait::async_trait;
use tracing::info;

use super::command_dispatcher::{CommandError, CommandHandler, CommandRegistry};
use crate::domain::{
    AttributePatch, CommandDefinition, CommandInteraction, CommandOptionDefinition, InteractionResponse,
};
use crate::infrastructure::{StoreError, UserStore};

/// 残高を保持する属性名
pub const TOKENS_ATTRIBUTE: &str = "tokens";

/// 1回のearnで加算できる上限
pub const MAX_EARN_AMOUNT: i64 = 1_000_000;

/// ショップの品目と価格
pub const SHOP_ITEMS: [(&str, i64); 3] = [("item1", 10), ("item2", 20), ("item3", 30)];

/// 品目の価格を引く
pub fn item_price(item: &str) -> Option<i64> {
    SHOP_ITEMS
        .iter()
        .find(|(name, _)| *name == item)
        .map(|(_, price)| *price)
}

/// 正の整数引数`amount`を取り出す
fn positive_amount(command: &CommandInteraction) -> Result<i64, CommandError> {
    let amount = command
        .option("amount")
        .and_then(|v| v.as_integer())
        .ok_or_else(|| CommandError::InvalidArgument("amount is required".to_string()))?;

    if amount <= 0 {
        return Err(CommandError::InvalidArgument(format!("amount must be positive: {}", amount)));
    }
    Ok(amount)
}

fn mention(command: &CommandInteraction) -> String {
    format!("<@{}>", command.user_id())
}

/// 残高照会
pub struct BalanceCommand;

#[async_trait]
impl CommandHandler for BalanceCommand {
    async fn handle(
        &self,
        command: &CommandInteraction,
        store: &dyn UserStore,
    ) -> Result<InteractionResponse, CommandError> {
        let tokens = store
            .get(command.user_id())
            .await?
            .map(|record| record.number_or_zero(TOKENS_ATTRIBUTE))
            .unwrap_or(0);

        Ok(InteractionResponse::message(format!(
            "{}, you have {} tokens.",
            mention(command),
            tokens
        )))
    }
}

/// 品目一覧
pub struct ShopCommand;

#[async_trait]
impl CommandHandler for ShopCommand {
    async fn handle(
        &self,
        _command: &CommandInteraction,
        _store: &dyn UserStore,
    ) -> Result<InteractionResponse, CommandError> {
        let list = SHOP_ITEMS
            .iter()
            .map(|(item, price)| format!("{}: {} tokens", item, price))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(InteractionResponse::message(format!("**Shop Items:**\n{}", list)))
    }
}

/// 品目の購入
pub struct BuyCommand;

#[async_trait]
impl CommandHandler for BuyCommand {
    async fn handle(
        &self,
        command: &CommandInteraction,
        store: &dyn UserStore,
    ) -> Result<InteractionResponse, CommandError> {
        let item = command
            .option("item")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CommandError::InvalidArgument("item is required".to_string()))?;

        let Some(price) = item_price(item) else {
            return Ok(InteractionResponse::message(format!(
                "{}, the item {} does not exist in the shop.",
                mention(command),
                item
            )));
        };

        let patch = AttributePatch::new()
            .add(TOKENS_ATTRIBUTE, -price)
            .require_at_least(TOKENS_ATTRIBUTE, price);

        match store.update(command.user_id(), &patch).await {
            Ok(_) => {
                info!(user_id = command.user_id(), item, price, "品目を購入");
                Ok(InteractionResponse::message(format!(
                    "{}, you bought {} for {} tokens!",
                    mention(command),
                    item,
                    price
                )))
            }
            Err(StoreError::ConditionFailed(_)) => Ok(InteractionResponse::message(format!(
                "{}, you don't have enough tokens to buy {}!",
                mention(command),
                item
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

/// 残高の加算
pub struct EarnCommand;

#[async_trait]
impl CommandHandler for EarnCommand {
    async fn handle(
        &self,
        command: &CommandInteraction,
        store: &dyn UserStore,
    ) -> Result<InteractionResponse, CommandError> {
        let amount = positive_amount(command)?;
        if amount > MAX_EARN_AMOUNT {
            return Err(CommandError::InvalidArgument(format!(
                "amount must be at most {}: {}",
                MAX_EARN_AMOUNT, amount
            )));
        }

        let record = store
            .update(command.user_id(), &AttributePatch::new().add(TOKENS_ATTRIBUTE, amount))
            .await?;

        Ok(InteractionResponse::message(format!(
            "{}, you earned {} tokens. Your new balance is {} tokens.",
            mention(command),
            amount,
            record.number_or_zero(TOKENS_ATTRIBUTE)
        )))
    }
}

/// 残高の減算
pub struct SpendCommand;

#[async_trait]
impl CommandHandler for SpendCommand {
    async fn handle(
        &self,
        command: &CommandInteraction,
        store: &dyn UserStore,
    ) -> Result<InteractionResponse, CommandError> {
        let amount = positive_amount(command)?;

        let patch = AttributePatch::new()
            .add(TOKENS_ATTRIBUTE, -amount)
            .require_at_least(TOKENS_ATTRIBUTE, amount);

        match store.update(command.user_id(), &patch).await {
            Ok(record) => Ok(InteractionResponse::message(format!(
                "{}, you spent {} tokens. Your new balance is {} tokens.",
                mention(command),
                amount,
                record.number_or_zero(TOKENS_ATTRIBUTE)
            ))),
            Err(StoreError::ConditionFailed(_)) => Ok(InteractionResponse::message(format!(
                "{}, you don't have enough tokens to spend {}!",
                mention(command),
                amount
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

/// 起動時に使うコマンド表
pub fn default_registry() -> CommandRegistry {
    CommandRegistry::new()
        .register("balance", BalanceCommand)
        .register("shop", ShopCommand)
        .register("buy", BuyCommand)
        .register("earn", EarnCommand)
        .register("spend", SpendCommand)
}

/// プラットフォームに登録するコマンド定義
pub fn command_definitions() -> Vec<CommandDefinition> {
    let item_option = SHOP_ITEMS.iter().enumerate().fold(
        CommandOptionDefinition::required_string("item", "Item to buy"),
        |option, (index, (item, price))| {
            option.with_choice(format!("Item {} ({} tokens)", index + 1, price), *item)
        },
    );

    vec![
        CommandDefinition::chat_input("balance", "Check your token balance"),
        CommandDefinition::chat_input("earn", "Earn tokens").with_option(
            CommandOptionDefinition::required_integer("amount", "Amount of tokens to earn")
                .with_min_value(1)
                .with_max_value(MAX_EARN_AMOUNT),
        ),
        CommandDefinition::chat_input("spend", "Spend tokens").with_option(
            CommandOptionDefinition::required_integer("amount", "Amount of tokens to spend").with_min_value(1),
        ),
        CommandDefinition::chat_input("shop", "View shop items"),
        CommandDefinition::chat_input("buy", "Buy an item from the shop").with_option(item_option),
    ]
}
