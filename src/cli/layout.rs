//! tmux 布局 - swarm 窗口（每个 worker 一个 pane）、hub 窗口、状态栏与快捷键

use crate::infra::TmuxManager;
use crate::worker::{unique_specs, AssistantSpec, PaneTarget};
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

pub const SWARM_WINDOW: &str = "swarm";
pub const HUB_WINDOW: &str = "hub";

/// hub 窗口中的 pane
#[derive(Debug, Clone)]
pub struct HubPanes {
    pub editor: PaneTarget,
    pub lazygit: Option<PaneTarget>,
}

/// 用单引号包裹路径，转义内部的单引号
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// 在 pane 中执行的启动命令
pub fn launch_command(dir: &Path, command: &str) -> String {
    format!("cd {} && {}", shell_quote(&dir.to_string_lossy()), command)
}

/// 状态栏左侧显示的 CLI 组合
pub fn cli_label(specs: &[AssistantSpec]) -> String {
    unique_specs(specs)
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// 在 swarm 窗口中为每个 worker 准备一个 pane，返回按 worker 顺序排列的 pane id
pub fn setup_swarm_window(tmux: &TmuxManager, session: &str, dirs: &[PathBuf]) -> Result<Vec<PaneTarget>> {
    let window = format!("{}:{}", session, SWARM_WINDOW);
    let first = tmux
        .pane_id(&window)
        .context("getting initial pane ID")?;

    let mut panes = vec![first];
    for (i, dir) in dirs.iter().enumerate().skip(1) {
        let last = panes
            .last()
            .ok_or_else(|| anyhow!("swarm window has no panes"))?
            .clone();
        let pane = tmux
            .split_window(last.as_str(), &dir.to_string_lossy(), 50, i % 2 == 1)
            .with_context(|| format!("creating pane for worker {}", i + 1))?;
        // 每次拆分后重新平铺，避免 pane 过小导致拆分失败
        let _ = tmux.select_layout(&window, "tiled");
        panes.push(pane);
    }

    let _ = tmux.select_layout(&window, "tiled");
    Ok(panes)
}

/// 设置 pane 标题并启动 CLI
pub fn launch_in_pane(tmux: &TmuxManager, pane: &PaneTarget, title: &str, dir: &Path, command: &str) {
    let _ = tmux.set_pane_title(pane.as_str(), title);
    let _ = tmux.send_keys(pane.as_str(), &launch_command(dir, command));
}

/// hub 窗口：左侧 nvim，右侧 lazygit（已安装时）
pub fn setup_hub_window(tmux: &TmuxManager, session: &str, repo_root: &Path) -> Result<HubPanes> {
    let root = repo_root.to_string_lossy();
    tmux.create_window(session, &root, HUB_WINDOW)?;
    let editor = tmux
        .pane_id(&format!("{}:{}", session, HUB_WINDOW))
        .context("getting hub pane ID")?;

    if which::which("nvim").is_ok() {
        let _ = tmux.send_keys(editor.as_str(), "nvim .");
    }

    let lazygit = if which::which("lazygit").is_ok() {
        let pane = tmux
            .split_window(editor.as_str(), &root, 40, true)
            .context("splitting hub for lazygit")?;
        let _ = tmux.send_keys(pane.as_str(), "lazygit");
        let _ = tmux.select_pane(editor.as_str());
        Some(pane)
    } else {
        println!("未找到 lazygit，hub 窗口不包含 git pane。");
        None
    };

    Ok(HubPanes { editor, lazygit })
}

/// session 级别的状态栏样式
pub fn apply_status_bar(tmux: &TmuxManager, session: &str, specs: &[AssistantSpec]) {
    let status_left = format!(
        "#[bg=colour33,fg=colour15,bold] SWARM ({}) #[bg=colour235] ",
        cli_label(specs)
    );
    let status_right = format!(
        "#[bg=colour235,fg=colour245] {} agents  \
         #[fg=colour39]Alt+1#[fg=colour245]:agents  \
         #[fg=colour39]Alt+2#[fg=colour245]:hub  \
         #[fg=colour39]Ctrl+b g#[fg=colour245]:git  \
         #[fg=colour39]Ctrl+b e#[fg=colour245]:editor  \
         #[fg=colour39]Ctrl+b d#[fg=colour245]:detach  \
         #[fg=colour196]Ctrl+Q#[fg=colour245]:quit",
        specs.len()
    );

    let options = [
        ("status", "on"),
        ("status-position", "bottom"),
        ("status-style", "bg=colour235,fg=colour245"),
        ("status-left", status_left.as_str()),
        ("status-left-length", "40"),
        ("status-right", status_right.as_str()),
        ("status-right-length", "140"),
        ("window-status-format", "#[fg=colour245] #I:#W "),
        ("window-status-current-format", "#[bg=colour33,fg=colour15,bold] #I:#W "),
        ("pane-border-style", "fg=colour238"),
        ("pane-active-border-style", "fg=colour39"),
        ("pane-border-status", "top"),
        ("pane-border-format", " #{pane_title} "),
    ];
    for (key, value) in options {
        let _ = tmux.set_option(session, key, value);
    }
}

/// 快捷键：Alt+1/Alt+2 切换窗口，prefix+e/g 跳到编辑器/lazygit，prefix+S 发布，Ctrl+Q 退出
pub fn bind_keys(tmux: &TmuxManager, session: &str, hub: &HubPanes) {
    let _ = tmux.bind_key("-n", "M-1", &format!("select-window -t '{}:{}'", session, SWARM_WINDOW));
    let _ = tmux.bind_key("-n", "M-2", &format!("select-window -t '{}:{}'", session, HUB_WINDOW));
    let _ = tmux.bind_key(
        "",
        "S",
        "confirm-before -p \"Ship this worktree as a PR? (y/n)\" \
         \"new-window -c '#{pane_current_path}' 'claude-swarm ship; echo; read -p \\\"Press Enter to close...\\\"'\"",
    );
    let _ = tmux.bind_key("-n", "C-q", &format!("kill-session -t '{}'", session));

    let focus = |pane: &PaneTarget| {
        format!(
            "run-shell \"tmux select-window -t '{}:{}' && tmux select-pane -t '{}'\"",
            session, HUB_WINDOW, pane
        )
    };
    let _ = tmux.bind_key("", "e", &focus(&hub.editor));
    if let Some(lazygit) = &hub.lazygit {
        let _ = tmux.bind_key("", "g", &focus(lazygit));
    }
}
