//! git worktree 管理 - 为每个 worker 创建独立的工作副本和分支

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// git worktree 管理器
#[derive(Debug, Clone, Default)]
pub struct WorktreeManager {
    /// 执行 git 命令的目录，None 表示当前目录
    repo_dir: Option<PathBuf>,
}

impl WorktreeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在指定仓库目录下执行
    pub fn in_dir(repo_dir: impl Into<PathBuf>) -> Self {
        Self { repo_dir: Some(repo_dir.into()) }
    }

    fn git(&self) -> Command {
        let mut cmd = Command::new("git");
        if let Some(dir) = &self.repo_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = self
            .git()
            .args(args)
            .output()
            .context("failed to execute git")?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(anyhow!(
                "git {}: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }

    /// 仓库根目录
    pub fn repo_root(&self) -> Result<PathBuf> {
        self.run(&["rev-parse", "--show-toplevel"]).map(PathBuf::from)
    }

    /// 主仓库根目录（在 worktree 内调用时返回主工作副本的位置）
    pub fn main_repo_root(&self) -> Result<PathBuf> {
        let common_dir = self.run(&["rev-parse", "--path-format=absolute", "--git-common-dir"])?;
        PathBuf::from(&common_dir)
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow!("unexpected git common dir: {}", common_dir))
    }

    /// 当前分支名；detached HEAD 时返回 commit hash
    pub fn current_branch(&self) -> Result<String> {
        match self.run(&["symbolic-ref", "--short", "HEAD"]) {
            Ok(branch) => Ok(branch),
            Err(_) => self.run(&["rev-parse", "HEAD"]),
        }
    }

    /// 在 dir 创建基于 base 的新分支 worktree
    pub fn add_worktree(&self, dir: &Path, branch: &str, base: &str) -> Result<()> {
        let dir_str = dir.to_string_lossy().into_owned();
        debug!(dir = %dir_str, branch = %branch, base = %base, "Adding git worktree");
        self.run(&["worktree", "add", "-b", branch, dir_str.as_str(), base, "-q"])?;
        info!(dir = %dir_str, branch = %branch, "Git worktree created");
        Ok(())
    }

    /// 强制删除 worktree
    pub fn remove_worktree(&self, dir: &Path) -> Result<()> {
        let dir_str = dir.to_string_lossy().into_owned();
        self.run(&["worktree", "remove", "--force", dir_str.as_str()])
            .map(|_| ())
    }

    /// 清理失效的 worktree 记录
    pub fn prune(&self) -> Result<()> {
        self.run(&["worktree", "prune"]).map(|_| ())
    }

    /// 强制删除本地分支
    pub fn delete_branch(&self, branch: &str) -> Result<()> {
        self.run(&["branch", "-D", branch]).map(|_| ())
    }

    /// worktree 中检出的分支
    pub fn branch_of_worktree(&self, dir: &Path) -> Result<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(["symbolic-ref", "--short", "HEAD"])
            .output()
            .context("failed to execute git")?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(anyhow!("no branch checked out in {}", dir.display()))
        }
    }

    /// 删除旧的 worktree/分支后重新创建
    pub fn recreate_worktree(&self, dir: &Path, branch: &str, base: &str) -> Result<()> {
        let _ = self.remove_worktree(dir);
        let _ = self.delete_branch(branch);
        self.add_worktree(dir, branch, base)
    }

    /// 删除 worktree 以及它检出的分支
    pub fn remove_with_branch(&self, dir: &Path) {
        let branch = self.branch_of_worktree(dir).ok();
        if let Err(e) = self.remove_worktree(dir) {
            debug!(dir = %dir.display(), error = %e, "Worktree removal failed");
        }
        if let Some(branch) = branch {
            let _ = self.delete_branch(&branch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_repo(dir: &Path) {
        for args in [
            vec!["init", "-q", "-b", "main"],
            vec!["config", "user.email", "swarm@example.com"],
            vec!["config", "user.name", "swarm"],
            vec!["commit", "-q", "--allow-empty", "-m", "init"],
        ] {
            let status = Command::new("git").args(&args).current_dir(dir).status().unwrap();
            assert!(status.success());
        }
    }

    #[test]
    #[ignore = "requires git"]
    fn test_worktree_lifecycle() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("repo");
        std::fs::create_dir(&repo).unwrap();
        init_repo(&repo);

        let git = WorktreeManager::in_dir(&repo);
        assert_eq!(git.current_branch().unwrap(), "main");

        let dir = tmp.path().join("repo-wt-1");
        let main_root = git.main_repo_root().unwrap();
        assert_eq!(main_root.file_name(), repo.file_name());
        git.recreate_worktree(&dir, "swarm/main/worker-1", "main").unwrap();
        assert!(dir.exists());
        assert_eq!(git.branch_of_worktree(&dir).unwrap(), "swarm/main/worker-1");
        let inside = WorktreeManager::in_dir(&dir);
        assert_eq!(inside.main_repo_root().unwrap(), main_root);

        // 再次创建会先清理旧的 worktree 和分支
        git.recreate_worktree(&dir, "swarm/main/worker-1", "main").unwrap();

        git.remove_with_branch(&dir);
        git.prune().unwrap();
        assert!(!dir.exists());
        assert!(git.delete_branch("swarm/main/worker-1").is_err());
    }
}
