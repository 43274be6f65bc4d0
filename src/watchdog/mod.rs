//! Watchdog 子系统 - 检测 usage limit 并在等待结束后自动恢复 worker
//!
//! 每个 worker 一个独立的 tokio 任务，只通过一个共享的 `CancellationToken` 协作。

mod activity_log;
mod monitor;
mod supervisor;

pub use activity_log::ActivityLog;
pub use monitor::{Watchdog, WatchdogExit};
pub use supervisor::Supervisor;

use crate::worker::PaneTarget;
use anyhow::Result;
use std::time::Duration;

/// 倒计时期间的固定检查间隔，决定取消的响应延迟
pub const WAIT_TICK: Duration = Duration::from_secs(5);

/// watchdog 依赖的终端会话接口
///
/// 每个 watchdog 只访问自己的 pane，实现方需要支持多个任务并发调用。
pub trait PaneSession: Send + Sync {
    /// 捕获 pane 当前可见内容；出错表示 pane 已不存在
    fn capture_visible_text(&self, target: &PaneTarget) -> Result<String>;

    /// 输入文本并回车
    fn send_text(&self, target: &PaneTarget, text: &str) -> Result<()>;

    /// session 是否存在
    fn session_exists(&self, session_name: &str) -> bool;

    /// 设置 pane 标题（失败可忽略）
    fn set_pane_label(&self, target: &PaneTarget, label: &str) -> Result<()>;
}

/// Watchdog 配置，由 `SwarmConfig` 派生后显式传入
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogSettings {
    /// Running 状态下的轮询间隔
    pub poll_interval: Duration,
    /// 在服务端给出的等待时间之上额外等待的秒数
    pub resume_buffer_secs: u64,
    /// 倒计时的检查间隔
    pub wait_tick: Duration,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            resume_buffer_secs: 120,
            wait_tick: WAIT_TICK,
        }
    }
}
