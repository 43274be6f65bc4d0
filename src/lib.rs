//! claude-swarm - 在 tmux 中并行运行多个 AI 编码 CLI，每个 CLI 使用独立的 git worktree，
//! 并在触发 usage limit 后自动恢复

pub mod cli;
pub mod config;
pub mod health;
pub mod infra;
pub mod usage_limit;
pub mod watchdog;
pub mod worker;

pub use config::{ConfigOverrides, SwarmConfig};
pub use health::{normalize_workers, CliProbe, ProbeOutcome, SystemProbe};
pub use infra::{TmuxManager, WorktreeManager};
pub use usage_limit::{extract_wait_seconds, has_usage_limit_error, UsageLimitEvent};
pub use watchdog::{ActivityLog, PaneSession, Supervisor, Watchdog, WatchdogExit, WatchdogSettings};
pub use worker::{AssistantCommand, AssistantKind, AssistantSpec, PaneTarget, Worker, WorkerState};
