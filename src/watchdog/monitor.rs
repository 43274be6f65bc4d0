//! 单个 worker 的 watchdog - Running → LimitDetected → Waiting → Resuming → Running

use super::{ActivityLog, PaneSession, WatchdogSettings};
use crate::usage_limit::{UsageLimitEvent, MAX_WAIT_SECS};
use crate::worker::{split_hours_minutes, Worker, WorkerState};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// watchdog 退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogExit {
    /// 收到取消信号
    Cancelled,
    /// pane 已无法捕获
    PaneGone,
    /// 恢复前发现 session 已不存在
    SessionGone,
}

/// 单个 worker 的监控任务，独占该 worker 的状态
pub struct Watchdog {
    worker: Worker,
    session_name: String,
    session: Arc<dyn PaneSession>,
    settings: WatchdogSettings,
    log: Arc<ActivityLog>,
    state: WorkerState,
    deadline: Option<Instant>,
    resume_failures: u32,
}

impl Watchdog {
    pub fn new(
        worker: Worker,
        session_name: impl Into<String>,
        session: Arc<dyn PaneSession>,
        settings: WatchdogSettings,
        log: Arc<ActivityLog>,
    ) -> Self {
        Self {
            worker,
            session_name: session_name.into(),
            session,
            settings,
            log,
            state: WorkerState::Running,
            deadline: None,
            resume_failures: 0,
        }
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 恢复命令发送失败的次数
    pub fn resume_failures(&self) -> u32 {
        self.resume_failures
    }

    /// 主循环：轮询 pane，命中 usage limit 后倒计时并恢复
    ///
    /// 只在轮询间隔和倒计时 tick 两处挂起，两处都会检查取消信号。
    pub async fn run(mut self, cancel: CancellationToken) -> WatchdogExit {
        info!(worker = self.worker.index, pane = %self.worker.pane, "Watchdog started");

        let exit = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break WatchdogExit::Cancelled,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }

            let text = match self.session.capture_visible_text(&self.worker.pane) {
                Ok(text) => text,
                Err(e) => {
                    debug!(worker = self.worker.index, error = %e, "Pane no longer capturable");
                    break WatchdogExit::PaneGone;
                }
            };

            if self.observe(&text).is_none() {
                continue;
            }

            if let Err(exit) = self.wait_and_resume(&cancel).await {
                break exit;
            }
        };

        debug!(worker = self.worker.index, ?exit, state = %self.state, "Watchdog stopped");
        exit
    }

    /// 处理一次捕获内容；Running 状态下命中 usage limit 时进入 Waiting 并返回 deadline
    ///
    /// 已经在等待中时直接忽略，屏幕上残留的提示不会重置倒计时。
    pub fn observe(&mut self, text: &str) -> Option<Instant> {
        if self.state != WorkerState::Running {
            return None;
        }
        let event = UsageLimitEvent::detect(text)?;
        Some(self.enter_waiting(event.wait_seconds))
    }

    /// 记录 usage limit 并开始倒计时，总时长（含 buffer）不超过 `MAX_WAIT_SECS`
    pub fn enter_waiting(&mut self, wait_seconds: u64) -> Instant {
        self.state = WorkerState::LimitDetected;

        let total_secs = wait_seconds
            .saturating_add(self.settings.resume_buffer_secs)
            .min(MAX_WAIT_SECS);
        let (hours, minutes) = split_hours_minutes(total_secs);
        self.log.log(
            self.worker.index,
            &format!("API usage limit hit. Resuming in {}h {}m.", hours, minutes),
        );
        let _ = self
            .session
            .set_pane_label(&self.worker.pane, &self.worker.waiting_label(total_secs));

        let deadline = Instant::now() + Duration::from_secs(total_secs);
        self.deadline = Some(deadline);
        self.state = WorkerState::Waiting;
        deadline
    }

    /// 等到 deadline，确认 session 仍在后发送恢复命令
    ///
    /// 返回 `Err` 表示 watchdog 应当退出，此时不会发送任何按键。
    pub async fn wait_and_resume(&mut self, cancel: &CancellationToken) -> Result<(), WatchdogExit> {
        let Some(deadline) = self.deadline else {
            return Ok(());
        };

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let tick = self.settings.wait_tick.min(deadline - now);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WatchdogExit::Cancelled),
                _ = tokio::time::sleep(tick) => {}
            }
        }

        if cancel.is_cancelled() {
            return Err(WatchdogExit::Cancelled);
        }
        if !self.session.session_exists(&self.session_name) {
            debug!(worker = self.worker.index, session = %self.session_name, "Session gone, skipping resume");
            return Err(WatchdogExit::SessionGone);
        }

        self.resume();
        Ok(())
    }

    fn resume(&mut self) {
        self.state = WorkerState::Resuming;

        let command = self.worker.command.continue_command();
        self.log.log(self.worker.index, &format!("Resuming with {}.", command));

        if let Err(e) = self.session.send_text(&self.worker.pane, &command) {
            self.resume_failures += 1;
            warn!(worker = self.worker.index, error = %e, failures = self.resume_failures, "Failed to send resume command");
            self.log.log(
                self.worker.index,
                &format!("Resume command not delivered ({} failure(s) so far).", self.resume_failures),
            );
        }

        let _ = self.session.set_pane_label(&self.worker.pane, &self.worker.label());
        self.deadline = None;
        self.state = WorkerState::Running;
    }
}
