//! Worker 数据模型 - assistant 类型、命令行、pane 句柄与状态

use anyhow::{anyhow, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// 支持的 AI CLI 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssistantKind {
    Claude,
    Gemini,
    Codex,
}

impl AssistantKind {
    /// 可执行文件名
    pub fn binary(&self) -> &'static str {
        match self {
            AssistantKind::Claude => "claude",
            AssistantKind::Gemini => "gemini",
            AssistantKind::Codex => "codex",
        }
    }
}

impl fmt::Display for AssistantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

impl FromStr for AssistantKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "claude" => Ok(AssistantKind::Claude),
            "gemini" => Ok(AssistantKind::Gemini),
            "codex" => Ok(AssistantKind::Codex),
            other => Err(anyhow!("unknown CLI type {:?} - use claude, gemini, or codex", other)),
        }
    }
}

/// assistant 类型 + 可选的模型变体，例如 `gemini:gemini-2.0-flash`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssistantSpec {
    pub kind: AssistantKind,
    pub variant: Option<String>,
}

impl AssistantSpec {
    pub fn new(kind: AssistantKind) -> Self {
        Self { kind, variant: None }
    }

    /// 解析逗号分隔的列表，忽略空项
    pub fn parse_list(raw: &str) -> Result<Vec<AssistantSpec>> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }

    /// 解析出完整的启动命令
    pub fn command(&self, extra_flags: &str) -> AssistantCommand {
        let mut args = Vec::new();
        if let Some(model) = &self.variant {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.extend(extra_flags.split_whitespace().map(str::to_string));
        AssistantCommand {
            binary: self.kind.binary().to_string(),
            args,
        }
    }
}

impl fmt::Display for AssistantSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{}:{}", self.kind, variant),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl FromStr for AssistantSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, variant) = match s.split_once(':') {
            Some((name, variant)) => (name, Some(variant.trim())),
            None => (s, None),
        };
        Ok(Self {
            kind: name.parse()?,
            variant: variant.filter(|v| !v.is_empty()).map(str::to_string),
        })
    }
}

/// 已解析的 assistant 命令行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantCommand {
    pub binary: String,
    pub args: Vec<String>,
}

impl AssistantCommand {
    /// 恢复会话的命令：原命令 + `--continue`
    pub fn continue_command(&self) -> String {
        format!("{} --continue", self)
    }
}

impl fmt::Display for AssistantCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.binary)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// tmux pane 的稳定标识（`%N`），pane 标题变化时依然有效
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaneTarget(String);

impl PaneTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaneTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Worker 生命周期状态，只由该 worker 的 watchdog 修改
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    LimitDetected,
    Waiting,
    Resuming,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Running => "running",
            WorkerState::LimitDetected => "limit_detected",
            WorkerState::Waiting => "waiting",
            WorkerState::Resuming => "resuming",
        };
        f.write_str(s)
    }
}

/// 一个 worker：一个 assistant 进程 + 一个 worktree + 一个 pane
#[derive(Debug, Clone)]
pub struct Worker {
    /// 从 1 开始
    pub index: usize,
    pub spec: AssistantSpec,
    pub command: AssistantCommand,
    pub pane: PaneTarget,
}

impl Worker {
    pub fn new(index: usize, spec: AssistantSpec, extra_flags: &str, pane: PaneTarget) -> Self {
        let command = spec.command(extra_flags);
        Self { index, spec, command, pane }
    }

    /// 正常状态下的 pane 标题
    pub fn label(&self) -> String {
        pane_title(self.index, &self.spec)
    }

    /// 等待中的 pane 标题
    pub fn waiting_label(&self, total_secs: u64) -> String {
        let (h, m) = split_hours_minutes(total_secs);
        format!("worker-{} [wait {}h{}m]", self.index, h, m)
    }
}

/// 按顺序循环分配 CLI 类型到 num 个 worker
pub fn assign_specs(specs: &[AssistantSpec], num: usize) -> Vec<AssistantSpec> {
    if specs.is_empty() {
        return Vec::new();
    }
    (0..num).map(|i| specs[i % specs.len()].clone()).collect()
}

/// 去重后的类型列表（保持首次出现顺序）
pub fn unique_specs(specs: &[AssistantSpec]) -> Vec<AssistantSpec> {
    let mut unique: Vec<AssistantSpec> = Vec::new();
    for spec in specs {
        if !unique.contains(spec) {
            unique.push(spec.clone());
        }
    }
    unique
}

pub fn worktree_dir(repo_root: &Path, prefix: &str, index: usize) -> PathBuf {
    repo_root.join(format!("{}-{}", prefix, index))
}

pub fn worktree_branch(base_branch: &str, index: usize) -> String {
    format!("swarm/{}/worker-{}", base_branch, index)
}

pub fn pane_title(index: usize, spec: &AssistantSpec) -> String {
    format!("worker-{} ({})", index, spec)
}

pub fn split_hours_minutes(total_secs: u64) -> (u64, u64) {
    (total_secs / 3600, (total_secs % 3600) / 60)
}
