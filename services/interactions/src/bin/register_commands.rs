/// アプリケーションコマンド登録ツール
///
/// インタラクションLambdaが処理するコマンドの定義をプラットフォームに登録する。
/// デプロイ時に手元から一度実行する想定。
///
/// # ローカル実行
/// ```bash
/// export APPLICATION_ID=123456789012345678
/// export BOT_TOKEN=your-bot-token
///
/// # 登録内容の確認のみ
/// cargo run --bin register_commands -- --dry-run
///
/// # 登録
/// cargo run --bin register_commands
/// ```
use clap::Parser;
use interactions::application::command_definitions;
use interactions::infrastructure::{init_cli_logging, CommandRegistrar, DEFAULT_API_BASE};
use tracing::{error, info};

/// コマンドライン引数
#[derive(Parser, Debug)]
#[command(name = "register_commands")]
#[command(about = "アプリケーションコマンドの定義をプラットフォームに登録")]
struct CliArgs {
    /// アプリケーションID
    #[arg(long, env = "APPLICATION_ID")]
    application_id: Option<String>,

    /// ボットトークン
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    bot_token: Option<String>,

    /// APIのベースURL
    #[arg(long, env = "DISCORD_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// 登録せずにJSON定義を表示する
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_cli_logging();

    let args = CliArgs::parse();
    let definitions = command_definitions();

    if args.dry_run {
        println!("{}", serde_json::to_string_pretty(&definitions)?);
        return Ok(());
    }

    let (Some(application_id), Some(bot_token)) = (args.application_id, args.bot_token) else {
        error!("APPLICATION_IDとBOT_TOKENの両方が必要です");
        return Err("missing APPLICATION_ID or BOT_TOKEN".into());
    };

    let registrar = CommandRegistrar::new(&args.api_base, &application_id, bot_token)?;

    info!(count = definitions.len(), "コマンド登録を開始");
    let failures = registrar.register_all(&definitions).await;

    if failures.is_empty() {
        info!(count = definitions.len(), "すべてのコマンドを登録");
        return Ok(());
    }

    for (name, err) in &failures {
        error!(command = %name, error = %err, "コマンド登録に失敗");
    }
    Err(format!("{} of {} commands failed to register", failures.len(), definitions.len()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args_dry_run() {
        let args = CliArgs::parse_from(["register_commands", "--dry-run"]);
        assert!(args.dry_run);
    }

    #[test]
    fn test_cli_args_explicit_values() {
        let args = CliArgs::parse_from([
            "register_commands",
            "--application-id",
            "42",
            "--bot-token",
            "token",
            "--api-base",
            "https://example.com/api",
        ]);

        assert_eq!(args.application_id.as_deref(), Some("42"));
        assert_eq!(args.bot_token.as_deref(), Some("token"));
        assert_eq!(args.api_base, "https://example.com/api");
        assert!(!args.dry_run);
    }
}
