//! Ship 命令 - 推送当前 worktree 分支并创建 PR，然后清理 worktree

use crate::infra::WorktreeManager;
use anyhow::{anyhow, Context, Result};
use clap::Args;
use dialoguer::Confirm;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// swarm worktree 分支的前缀
pub const SWARM_BRANCH_PREFIX: &str = "swarm/";

/// Ship 命令参数
#[derive(Args, Debug)]
pub struct ShipArgs {
    /// PR 的目标分支
    #[arg(long, short, default_value = "main")]
    pub base: String,

    /// 创建 PR 后不清理 worktree
    #[arg(long)]
    pub no_cleanup: bool,
}

pub fn is_swarm_branch(branch: &str) -> bool {
    branch.starts_with(SWARM_BRANCH_PREFIX)
}

/// 处理 ship 命令
pub fn handle_ship(args: ShipArgs) -> Result<()> {
    let git = WorktreeManager::new();
    git.repo_root().map_err(|_| anyhow!("not inside a git repository"))?;
    let branch = git.current_branch().context("getting current branch")?;
    let cwd = std::env::current_dir()?;

    if !is_swarm_branch(&branch) {
        let proceed = Confirm::new()
            .with_prompt(format!("当前分支 {:?} 看起来不是 swarm worktree 分支，仍然继续？", branch))
            .default(false)
            .interact()
            .unwrap_or(false);
        if !proceed {
            return Ok(());
        }
    }

    println!("分支: {}", branch);
    println!("目标: {}", args.base);
    println!();

    if which::which("gh").is_err() {
        return Err(anyhow!("gh CLI not found - install it from https://cli.github.com"));
    }

    println!("正在推送分支...");
    run_inherited("git", &["push", "-u", "origin", branch.as_str()]).context("git push failed")?;

    println!("\n正在创建 pull request...");
    run_inherited("gh", &["pr", "create", "--base", args.base.as_str(), "--head", branch.as_str()])
        .context("gh pr create failed")?;

    if args.no_cleanup {
        println!("\n跳过清理 (--no-cleanup)。");
        return Ok(());
    }

    let remove = Confirm::new()
        .with_prompt("删除 worktree 和分支？")
        .default(true)
        .interact()
        .unwrap_or(true);
    if remove {
        cleanup(&git, &cwd, &branch)?;
        println!("已清理。");
    } else {
        println!("已保留。手动删除: git worktree remove {}", cwd.display());
    }
    Ok(())
}

/// 在主仓库中删除当前 worktree 和分支
fn cleanup(git: &WorktreeManager, worktree: &Path, branch: &str) -> Result<()> {
    let main_root = git.main_repo_root()?;
    std::env::set_current_dir(&main_root)?;

    let main_git = WorktreeManager::in_dir(&main_root);
    if let Err(e) = main_git.remove_worktree(worktree) {
        debug!(error = %e, "Worktree removal failed");
    }
    let _ = main_git.delete_branch(branch);
    let _ = main_git.prune();
    Ok(())
}

/// 继承 stdio 执行命令（用于交互式的 push / gh）
fn run_inherited(program: &str, args: &[&str]) -> Result<()> {
    let status = Command::new(program).args(args).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(anyhow!("{} exited with {}", program, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_swarm_branch() {
        assert!(is_swarm_branch("swarm/main/worker-1"));
        assert!(!is_swarm_branch("main"));
        assert!(!is_swarm_branch("feature/swarm"));
    }

    #[test]
    fn test_run_inherited_reports_failure() {
        assert!(run_inherited("claude-swarm-definitely-missing", &[]).is_err());
    }
}
