//! claude-swarm CLI
//!
//! 在 git worktree 中启动 N 个 AI CLI 实例（Claude Code、Gemini、Codex），统一放进一个 tmux session

use anyhow::Result;
use claude_swarm::cli::{handle_ship, handle_start, ShipArgs, StartArgs};
use claude_swarm::SwarmConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "claude-swarm")]
#[command(about = "在 git worktree 中启动 N 个 AI CLI 实例，并放进同一个 tmux session")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    start: StartArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// 从当前 worktree 分支创建 PR，然后清理
    Ship(ShipArgs),
    /// 显示生效的配置（配置文件 + 环境变量）
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    // 例如: RUST_LOG=debug claude-swarm -n 2
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("claude_swarm=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Ship(args)) => handle_ship(args)?,
        Some(Commands::Config) => {
            let config = SwarmConfig::load()?;
            print!("{}", serde_yaml::to_string(&config)?);
        }
        None => handle_start(cli.start).await?,
    }

    Ok(())
}
