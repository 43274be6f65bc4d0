//! tmux 管理模块 - 封装 tmux 操作

use crate::watchdog::PaneSession;
use crate::worker::PaneTarget;
use anyhow::{anyhow, Context, Result};
use std::process::Command;
use tracing::{debug, error, info};

/// tmux 管理器
#[derive(Debug, Clone, Copy, Default)]
pub struct TmuxManager;

impl TmuxManager {
    pub fn new() -> Self {
        Self
    }

    /// tmux 是否可用
    pub fn is_available(&self) -> bool {
        which::which("tmux").is_ok()
    }

    fn run(&self, args: &[&str]) -> Result<()> {
        let output = Command::new("tmux")
            .args(args)
            .output()
            .context("failed to execute tmux")?;

        if output.status.success() {
            Ok(())
        } else {
            Err(anyhow!(
                "tmux {}: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }

    fn query(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("tmux")
            .args(args)
            .output()
            .context("failed to execute tmux")?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(anyhow!(
                "tmux {}: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }

    /// 创建 detached session，首个窗口在 cwd 下，并命名为 window_name
    pub fn create_session(&self, session_name: &str, cwd: &str, width: u16, height: u16, window_name: &str) -> Result<()> {
        debug!(session = %session_name, cwd = %cwd, "Creating tmux session");

        let width = width.to_string();
        let height = height.to_string();
        let result = self.run(&[
            "new-session", "-d",
            "-s", session_name,
            "-c", cwd,
            "-x", width.as_str(),
            "-y", height.as_str(),
            "-n", window_name,
        ]);

        match &result {
            Ok(()) => info!(session = %session_name, "Tmux session created"),
            Err(e) => error!(session = %session_name, error = %e, "Failed to create tmux session"),
        }
        result
    }

    /// 检查 session 是否存在
    pub fn session_exists(&self, session_name: &str) -> bool {
        Command::new("tmux")
            .args(["has-session", "-t", session_name])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// 终止 session
    pub fn kill_session(&self, session_name: &str) -> Result<()> {
        debug!(session = %session_name, "Killing tmux session");
        self.run(&["kill-session", "-t", session_name])?;
        info!(session = %session_name, "Tmux session killed");
        Ok(())
    }

    /// 在 session 末尾新建窗口
    pub fn create_window(&self, session_name: &str, cwd: &str, name: &str) -> Result<()> {
        self.run(&["new-window", "-t", session_name, "-c", cwd, "-n", name])
    }

    /// 获取 target 当前 pane 的稳定 id（`%N`）
    pub fn pane_id(&self, target: &str) -> Result<PaneTarget> {
        let id = self.query(&["display-message", "-t", target, "-p", "#{pane_id}"])?;
        Ok(PaneTarget::new(id))
    }

    /// 拆分 pane 并返回新 pane 的 id；horizontal 表示左右拆分
    pub fn split_window(&self, target: &str, cwd: &str, percent: u8, horizontal: bool) -> Result<PaneTarget> {
        let percent = percent.to_string();
        let mut args = vec!["split-window", "-t", target, "-P", "-F", "#{pane_id}"];
        if horizontal {
            args.push("-h");
        }
        args.extend(["-p", percent.as_str(), "-c", cwd]);
        Ok(PaneTarget::new(self.query(&args)?))
    }

    pub fn select_layout(&self, target: &str, layout: &str) -> Result<()> {
        self.run(&["select-layout", "-t", target, layout])
    }

    /// 向 pane 发送文本并回车
    /// 使用 -l 标志确保文本被字面解释，避免 "Enter" 等特殊字符串被解释为按键
    pub fn send_keys(&self, target: &str, keys: &str) -> Result<()> {
        info!(target = %target, keys_len = keys.len(), "Sending keys to tmux pane");

        self.run(&["send-keys", "-t", target, "-l", keys])
            .map_err(|e| anyhow!("Failed to send keys to {}: {}", target, e))?;

        // 单独发送 Enter（不使用 -l，因为这里需要解释为按键）
        self.run(&["send-keys", "-t", target, "Enter"])
            .map_err(|e| anyhow!("Failed to send Enter to {}: {}", target, e))
    }

    /// 捕获 pane 当前可见内容
    pub fn capture_pane(&self, target: &str) -> Result<String> {
        let output = Command::new("tmux")
            .args(["capture-pane", "-t", target, "-p"])
            .output()?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(anyhow!("Failed to capture pane: {}", target))
        }
    }

    pub fn set_pane_title(&self, target: &str, title: &str) -> Result<()> {
        self.run(&["select-pane", "-t", target, "-T", title])
    }

    /// 设置 session 级别的选项
    pub fn set_option(&self, session_name: &str, key: &str, value: &str) -> Result<()> {
        self.run(&["set-option", "-t", session_name, key, value])
    }

    /// 绑定按键；flags 可以是 "-n"（无需前缀）或空字符串
    pub fn bind_key(&self, flags: &str, key: &str, command: &str) -> Result<()> {
        let mut args = vec!["bind-key"];
        if !flags.is_empty() {
            args.push(flags);
        }
        args.extend([key, command]);
        self.run(&args)
    }

    pub fn select_window(&self, target: &str) -> Result<()> {
        self.run(&["select-window", "-t", target])
    }

    pub fn select_pane(&self, target: &str) -> Result<()> {
        self.run(&["select-pane", "-t", target])
    }

    /// attach 到 session，阻塞直到用户 detach 或 session 结束
    pub fn attach(&self, session_name: &str) -> Result<()> {
        let status = Command::new("tmux")
            .args(["attach-session", "-t", session_name])
            .status()
            .context("failed to execute tmux attach-session")?;
        debug!(session = %session_name, ?status, "Detached from tmux session");
        Ok(())
    }
}

impl PaneSession for TmuxManager {
    fn capture_visible_text(&self, target: &PaneTarget) -> Result<String> {
        self.capture_pane(target.as_str())
    }

    fn send_text(&self, target: &PaneTarget, text: &str) -> Result<()> {
        self.send_keys(target.as_str(), text)
    }

    fn session_exists(&self, session_name: &str) -> bool {
        TmuxManager::session_exists(self, session_name)
    }

    fn set_pane_label(&self, target: &PaneTarget, label: &str) -> Result<()> {
        self.set_pane_title(target.as_str(), label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// 全局计数器，确保测试 session 名称唯一
    static TEST_SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn unique_session_name(prefix: &str) -> String {
        let counter = TEST_SESSION_COUNTER.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}-{}", prefix, std::process::id(), counter)
    }

    #[test]
    fn test_session_exists_false_for_nonexistent() {
        let manager = TmuxManager::new();
        assert!(!manager.session_exists("claude-swarm-nonexistent-session-xyz"));
    }

    #[test]
    #[ignore = "requires tmux"]
    fn test_create_split_and_capture() {
        let manager = TmuxManager::new();
        let session = unique_session_name("swarm-test");
        manager.create_session(&session, "/tmp", 120, 40, "swarm").unwrap();
        assert!(manager.session_exists(&session));

        let first = manager.pane_id(&format!("{}:swarm", session)).unwrap();
        assert!(first.as_str().starts_with('%'));
        let second = manager.split_window(first.as_str(), "/tmp", 50, true).unwrap();
        assert_ne!(first, second);

        manager.send_keys(second.as_str(), "echo 'swarm test output'").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(500));
        let output = manager.capture_visible_text(&second).unwrap();
        assert!(output.contains("swarm test output"));

        manager.set_pane_label(&second, "worker-2 (claude)").unwrap();

        manager.kill_session(&session).unwrap();
        assert!(manager.capture_visible_text(&second).is_err());
    }
}
