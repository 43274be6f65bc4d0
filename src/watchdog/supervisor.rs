//! Watchdog Supervisor - 为每个 worker 启动一个 watchdog，并统一取消

use super::{ActivityLog, PaneSession, Watchdog, WatchdogExit, WatchdogSettings};
use crate::worker::Worker;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 管理所有 watchdog 的生命周期，不汇总结果
pub struct Supervisor {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<WatchdogExit>>,
}

impl Supervisor {
    /// 为每个 worker 启动独立任务后立即返回，需在 tokio runtime 内调用
    pub fn start(
        workers: Vec<Worker>,
        session_name: &str,
        session: Arc<dyn PaneSession>,
        settings: WatchdogSettings,
        log: Arc<ActivityLog>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let handles = workers
            .into_iter()
            .map(|worker| {
                let watchdog = Watchdog::new(
                    worker,
                    session_name,
                    Arc::clone(&session),
                    settings.clone(),
                    Arc::clone(&log),
                );
                tokio::spawn(watchdog.run(cancel.clone()))
            })
            .collect::<Vec<_>>();

        info!(session = %session_name, count = handles.len(), "Watchdogs started");
        Self { cancel, handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// 只发出取消信号，不等待
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 发出取消信号并等待所有 watchdog 退出
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            match handle.await {
                Ok(exit) => debug!(?exit, "Watchdog joined"),
                Err(e) => debug!(error = %e, "Watchdog task aborted"),
            }
        }
        info!("All watchdogs stopped");
    }
}
