//! Start 命令 - 创建 worktree、布置 tmux、启动 AI CLI 并运行 watchdog
//!
//! 流程：校验 → 分配 CLI → 健康检查 → worktree → tmux 布局 → 启动 → watchdog → attach → 清理

use super::layout::{self, SWARM_WINDOW};
use crate::config::{ConfigOverrides, SwarmConfig};
use crate::health::{normalize_workers, SystemProbe};
use crate::infra::{TmuxManager, WorktreeManager};
use crate::watchdog::{ActivityLog, PaneSession, Supervisor};
use crate::worker::{
    assign_specs, pane_title, unique_specs, worktree_branch, worktree_dir, AssistantSpec, Worker,
};
use anyhow::{anyhow, Context, Result};
use clap::Args;
use dialoguer::Confirm;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Start 命令参数
#[derive(Args, Debug, Default)]
pub struct StartArgs {
    /// AI 实例数量（默认 4）
    #[arg(long, short = 'n')]
    pub num: Option<usize>,

    /// tmux session 名称（默认 claude-swarm）
    #[arg(long, short)]
    pub session: Option<String>,

    /// worktree 的基础分支（默认当前分支）
    #[arg(long, short = 'b')]
    pub base_branch: Option<String>,

    /// 使用的 AI CLI: claude|gemini|codex，可用逗号分隔混用，如 claude,gemini:gemini-2.0-flash
    #[arg(long = "type", short = 't')]
    pub cli_type: Option<String>,

    /// 传给每个 AI CLI 的额外参数
    #[arg(long, allow_hyphen_values = true)]
    pub cli_flags: Option<String>,

    /// 向已有 session 追加 worker，而不是重新创建
    #[arg(long = "add", short = 'a')]
    pub add_mode: bool,
}

impl From<StartArgs> for ConfigOverrides {
    fn from(args: StartArgs) -> Self {
        ConfigOverrides {
            num: args.num,
            session: args.session,
            base_branch: args.base_branch,
            cli_type: args.cli_type,
            cli_flags: args.cli_flags,
            add_mode: args.add_mode,
        }
    }
}

/// 处理 start 命令
pub async fn handle_start(args: StartArgs) -> Result<()> {
    let mut config = SwarmConfig::load().context("loading config")?;
    config.apply_overrides(args.into());

    let tmux = TmuxManager::new();
    let specs = validate(&tmux, &config)?;
    let specs = assign_specs(&specs, config.num);
    let specs = tokio::task::spawn_blocking(move || normalize_workers(specs, &SystemProbe)).await?;

    let git = WorktreeManager::new();
    let repo_root = git.repo_root().map_err(|_| anyhow!("not inside a git repository"))?;
    if config.base_branch.is_empty() {
        config.base_branch = git.current_branch()?;
    }

    let log_path = config.log_path();
    println!("仓库: {}", repo_root.display());
    println!("分支: {}", config.base_branch);
    println!("实例: {} (CLI: {})", specs.len(), layout::cli_label(&specs));
    println!("Session: {}", config.session);
    println!("日志: {}", log_path.display());
    println!();

    if config.add_mode {
        return add_workers(&tmux, &git, &config, &repo_root, &specs);
    }
    start_swarm(tmux, &git, &config, &repo_root, specs).await
}

/// 检查 tmux 与各 CLI 是否可用，返回解析后的 CLI 列表
fn validate(tmux: &TmuxManager, config: &SwarmConfig) -> Result<Vec<AssistantSpec>> {
    if !tmux.is_available() {
        return Err(anyhow!("tmux not found - install it first"));
    }
    let specs = config.validate()?;
    for spec in unique_specs(&specs) {
        let binary = spec.kind.binary();
        if which::which(binary).is_err() {
            return Err(anyhow!("{} not found - install it first", binary));
        }
    }
    Ok(specs)
}

/// 为 workers 创建 worktree，返回目录列表（下标 i 对应 worker i+1）
fn create_worktrees(
    git: &WorktreeManager,
    config: &SwarmConfig,
    repo_root: &Path,
    specs: &[AssistantSpec],
    first_index: usize,
) -> Result<Vec<PathBuf>> {
    specs
        .iter()
        .enumerate()
        .map(|(offset, spec)| {
            let index = first_index + offset;
            let dir = worktree_dir(repo_root, &config.worktree_prefix, index);
            let branch = worktree_branch(&config.base_branch, index);
            git.recreate_worktree(&dir, &branch, &config.base_branch)?;
            println!("Worktree {} → {} (分支: {}, CLI: {})", index, dir.display(), branch, spec);
            Ok(dir)
        })
        .collect()
}

async fn start_swarm(
    tmux: TmuxManager,
    git: &WorktreeManager,
    config: &SwarmConfig,
    repo_root: &Path,
    specs: Vec<AssistantSpec>,
) -> Result<()> {
    let session = config.session.as_str();
    if tmux.session_exists(session) {
        warn!(session = %session, "Session already exists, killing it");
        let _ = tmux.kill_session(session);
    }

    let dirs = create_worktrees(git, config, repo_root, &specs, 1)?;

    println!("\n正在启动 tmux session...");
    let first_dir = dirs
        .first()
        .ok_or_else(|| anyhow!("no workers to launch"))?;
    tmux.create_session(session, &first_dir.to_string_lossy(), 220, 50, SWARM_WINDOW)?;
    layout::apply_status_bar(&tmux, session, &specs);

    let panes = layout::setup_swarm_window(&tmux, session, &dirs)?;
    let workers: Vec<Worker> = specs
        .into_iter()
        .zip(panes)
        .enumerate()
        .map(|(i, (spec, pane))| Worker::new(i + 1, spec, &config.cli_flags, pane))
        .collect();
    for (worker, dir) in workers.iter().zip(&dirs) {
        layout::launch_in_pane(&tmux, &worker.pane, &worker.label(), dir, &worker.command.to_string());
    }
    if let Some(first) = workers.first() {
        let _ = tmux.select_pane(first.pane.as_str());
    }

    let hub = layout::setup_hub_window(&tmux, session, repo_root)?;
    layout::bind_keys(&tmux, session, &hub);

    run_and_monitor(tmux, config, workers).await?;
    cleanup_worktrees(git, &dirs);
    Ok(())
}

/// 启动 watchdog 并 attach；detach 后停止所有 watchdog
async fn run_and_monitor(tmux: TmuxManager, config: &SwarmConfig, workers: Vec<Worker>) -> Result<()> {
    let session = config.session.clone();
    let _ = tmux.select_window(&format!("{}:{}", session, SWARM_WINDOW));

    println!("已启动全部 {} 个实例", workers.len());
    println!("Watchdog 已运行 (日志: {})", config.log_path().display());
    println!("正在 attach 到 session {:?}...", session);
    println!("  Detach: Ctrl+b d  |  Hub: Alt+2  |  Agents: Alt+1");
    println!();

    let log = Arc::new(ActivityLog::open(&config.log_path()));
    let pane_session: Arc<dyn PaneSession> = Arc::new(tmux);
    let supervisor = Supervisor::start(
        workers,
        &session,
        pane_session,
        config.watchdog_settings(),
        log,
    );

    let attach_session = session.clone();
    let attached = tokio::task::spawn_blocking(move || tmux.attach(&attach_session)).await;

    println!("\n正在停止 watchdog...");
    supervisor.shutdown().await;
    attached??;
    info!(session = %session, "Swarm session detached");
    Ok(())
}

/// detach 后询问是否删除 worktree 和分支
fn cleanup_worktrees(git: &WorktreeManager, dirs: &[PathBuf]) {
    let remove = Confirm::new()
        .with_prompt("删除 worktree 和 swarm 分支？")
        .default(true)
        .interact()
        .unwrap_or(true);

    if !remove {
        println!("已保留 worktree。手动删除: git worktree remove <path>");
        return;
    }

    for dir in dirs {
        git.remove_with_branch(dir);
    }
    let _ = git.prune();
    println!("已清理。");
}

/// 向已有 session 追加 worker（不启动 watchdog）
fn add_workers(
    tmux: &TmuxManager,
    git: &WorktreeManager,
    config: &SwarmConfig,
    repo_root: &Path,
    specs: &[AssistantSpec],
) -> Result<()> {
    let session = config.session.as_str();
    if !tmux.session_exists(session) {
        return Err(anyhow!(
            "session {:?} not found - start a swarm first (without -a)",
            session
        ));
    }

    let first_index = next_free_index(repo_root, &config.worktree_prefix);
    let dirs = create_worktrees(git, config, repo_root, specs, first_index)?;
    let window = format!("{}:{}", session, SWARM_WINDOW);

    for (offset, (spec, dir)) in specs.iter().zip(&dirs).enumerate() {
        let index = first_index + offset;
        let pane = tmux
            .split_window(&window, &dir.to_string_lossy(), 50, false)
            .with_context(|| format!("creating pane for worker {}", index))?;
        let _ = tmux.select_layout(&window, "tiled");
        let command = spec.command(&config.cli_flags);
        layout::launch_in_pane(tmux, &pane, &pane_title(index, spec), dir, &command.to_string());
    }

    println!("已向 session {:?} 添加 {} 个 worker。", session, specs.len());
    Ok(())
}

/// 第一个不存在 worktree 目录的编号
fn next_free_index(repo_root: &Path, prefix: &str) -> usize {
    (1..)
        .find(|&i| !worktree_dir(repo_root, prefix, i).exists())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        start: StartArgs,
    }

    #[test]
    fn test_start_args_defaults() {
        let cli = TestCli::parse_from(["claude-swarm"]);
        assert_eq!(cli.start.num, None);
        assert!(!cli.start.add_mode);

        let overrides: ConfigOverrides = cli.start.into();
        let mut config = SwarmConfig::default();
        config.apply_overrides(overrides);
        assert_eq!(config, SwarmConfig::default());
    }

    #[test]
    fn test_start_args_flags() {
        let cli = TestCli::parse_from([
            "claude-swarm", "-n", "3", "-s", "demo", "-t", "claude,codex", "--cli-flags", "--verbose", "-a",
        ]);
        let mut config = SwarmConfig::default();
        config.apply_overrides(cli.start.into());

        assert_eq!(config.num, 3);
        assert_eq!(config.session, "demo");
        assert_eq!(config.cli_type, "claude,codex");
        assert_eq!(config.cli_flags, "--verbose");
        assert!(config.add_mode);
    }

    #[test]
    fn test_next_free_index() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(next_free_index(dir.path(), ".wt"), 1);

        std::fs::create_dir(dir.path().join(".wt-1")).unwrap();
        std::fs::create_dir(dir.path().join(".wt-2")).unwrap();
        assert_eq!(next_free_index(dir.path(), ".wt"), 3);
    }
}
