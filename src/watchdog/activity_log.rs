//! Watchdog 活动日志 - 带 UTC 时间戳的行同时写入 stdout 和可选的日志文件

use chrono::{DateTime, Utc};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

/// 活动日志，多个 watchdog 共享
pub struct ActivityLog {
    sink: Option<Mutex<File>>,
}

impl ActivityLog {
    /// 只输出到 stdout
    pub fn stdout_only() -> Self {
        Self { sink: None }
    }

    /// 以追加方式打开日志文件，打开失败时退化为只输出 stdout
    pub fn open(path: &Path) -> Self {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Self { sink: Some(Mutex::new(file)) },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot open log file, logging to stdout only");
                Self::stdout_only()
            }
        }
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// 记录一条 worker 相关的日志
    pub fn log(&self, worker: usize, message: &str) {
        let line = format_line(Utc::now(), worker, message);
        print!("{}", line);
        debug!(worker, "{}", message);

        if let Some(sink) = &self.sink {
            if let Ok(mut file) = sink.lock() {
                let _ = file.write_all(line.as_bytes());
                let _ = file.flush();
            }
        }
    }
}

fn format_line(now: DateTime<Utc>, worker: usize, message: &str) -> String {
    format!("{} [worker-{}] {}\n", now.format("%Y-%m-%dT%H:%M:%SZ"), worker, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_line() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            format_line(now, 3, "API usage limit hit."),
            "2026-01-02T03:04:05Z [worker-3] API usage limit hit.\n"
        );
    }

    #[test]
    fn test_appends_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swarm.log");
        std::fs::write(&path, "existing\n").unwrap();

        let log = ActivityLog::open(&path);
        assert!(log.has_sink());
        log.log(1, "first");
        log.log(2, "second");

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "existing");
        assert!(lines[1].ends_with("[worker-1] first"));
        assert!(lines[2].ends_with("[worker-2] second"));
    }

    #[test]
    fn test_unopenable_path_degrades_to_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("swarm.log");

        let log = ActivityLog::open(&path);
        assert!(!log.has_sink());
        log.log(1, "still fine");
    }
}
