//! CLI 健康检查 - 启动前探测不稳定的 AI CLI，失败时替换为可用的其他 CLI
//!
//! 只做降级，不会让启动失败。

use crate::worker::{AssistantKind, AssistantSpec};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 探测命令的硬超时
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(4);

/// gemini-cli 在 Node.js 版本不匹配时的启动报错
const GEMINI_BROKEN_RUNTIME: &str = "ReferenceError: File is not defined";

/// 一次探测的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    /// 非零退出或无法启动，附带输出
    Failed { output: String },
    TimedOut,
}

impl ProbeOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy)
    }
}

/// 探测外部命令的接口
pub trait CliProbe: Send + Sync {
    /// 运行短命令，超过 timeout 视为失败
    fn probe(&self, binary: &str, args: &[&str], timeout: Duration) -> ProbeOutcome;

    /// 是否在 PATH 中
    fn is_on_path(&self, binary: &str) -> bool;
}

/// 基于真实进程的探测
pub struct SystemProbe;

impl CliProbe for SystemProbe {
    fn probe(&self, binary: &str, args: &[&str], timeout: Duration) -> ProbeOutcome {
        let mut child = match Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return ProbeOutcome::Failed { output: e.to_string() },
        };

        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return ProbeOutcome::TimedOut;
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(50)),
                Err(e) => return ProbeOutcome::Failed { output: e.to_string() },
            }
        }

        match child.wait_with_output() {
            Ok(output) if output.status.success() => ProbeOutcome::Healthy,
            Ok(output) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                ProbeOutcome::Failed { output: text }
            }
            Err(e) => ProbeOutcome::Failed { output: e.to_string() },
        }
    }

    fn is_on_path(&self, binary: &str) -> bool {
        which::which(binary).is_ok()
    }
}

/// 已知偶尔无法启动的 CLI 及其替换顺序
fn fallback_order(kind: AssistantKind) -> Option<&'static [AssistantKind]> {
    match kind {
        AssistantKind::Gemini => Some(&[AssistantKind::Claude, AssistantKind::Codex]),
        AssistantKind::Codex => Some(&[AssistantKind::Claude, AssistantKind::Gemini]),
        AssistantKind::Claude => None,
    }
}

/// 对配置中出现的不稳定 CLI 做健康检查，必要时整体替换
pub fn normalize_workers(specs: Vec<AssistantSpec>, probe: &dyn CliProbe) -> Vec<AssistantSpec> {
    [AssistantKind::Gemini, AssistantKind::Codex]
        .into_iter()
        .fold(specs, |specs, kind| normalize_kind(specs, kind, probe))
}

fn normalize_kind(specs: Vec<AssistantSpec>, kind: AssistantKind, probe: &dyn CliProbe) -> Vec<AssistantSpec> {
    let Some(order) = fallback_order(kind) else {
        return specs;
    };
    if !specs.iter().any(|s| s.kind == kind) {
        return specs;
    }

    let outcome = probe.probe(kind.binary(), &["--version"], PROBE_TIMEOUT);
    if outcome.is_healthy() {
        debug!(cli = %kind, "Health check passed");
        return specs;
    }

    match &outcome {
        ProbeOutcome::Failed { output } if output.contains(GEMINI_BROKEN_RUNTIME) => {
            warn!(cli = %kind, "CLI fails to start (likely Node.js runtime mismatch)");
        }
        ProbeOutcome::TimedOut => warn!(cli = %kind, timeout_secs = PROBE_TIMEOUT.as_secs(), "Health check timed out"),
        _ => warn!(cli = %kind, "Health check failed"),
    }

    let Some(fallback) = order.iter().copied().find(|k| probe.is_on_path(k.binary())) else {
        warn!(cli = %kind, "No fallback CLI found on PATH, keeping workers as configured");
        return specs;
    };

    let mut replaced = 0;
    let specs = specs
        .into_iter()
        .map(|spec| {
            if spec.kind == kind {
                replaced += 1;
                AssistantSpec::new(fallback)
            } else {
                spec
            }
        })
        .collect();

    info!(cli = %kind, fallback = %fallback, replaced, "Replaced unhealthy CLI workers");
    specs
}
