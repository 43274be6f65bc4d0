//! 配置模块 - 默认值 → ~/.claude-swarm.yaml → CLAUDE_SWARM_* 环境变量 → 命令行参数

use crate::watchdog::{WatchdogSettings, WAIT_TICK};
use crate::worker::AssistantSpec;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 用户配置文件名（位于 home 目录）
pub const CONFIG_FILE_NAME: &str = ".claude-swarm.yaml";

/// 环境变量前缀
pub const ENV_PREFIX: &str = "CLAUDE_SWARM_";

/// 全部运行配置，显式传递，不存在全局单例
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// worker 数量
    pub num: usize,
    /// tmux session 名称
    pub session: String,
    /// worktree 的基础分支，空表示当前分支
    pub base_branch: String,
    /// 逗号分隔的 CLI 类型，例如 `claude,gemini:gemini-2.0-flash`
    pub cli_type: String,
    /// 追加到每个 CLI 命令的参数
    pub cli_flags: String,
    /// 向已有 session 追加 worker
    pub add_mode: bool,
    /// 恢复前额外等待的秒数
    pub resume_buffer_secs: u64,
    /// 轮询间隔（秒）
    pub monitor_interval: u64,
    /// worktree 目录前缀
    pub worktree_prefix: String,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            num: 4,
            session: "claude-swarm".to_string(),
            base_branch: String::new(),
            cli_type: "claude,claude,claude,gemini".to_string(),
            cli_flags: String::new(),
            add_mode: false,
            resume_buffer_secs: 120,
            monitor_interval: 30,
            worktree_prefix: ".wt".to_string(),
        }
    }
}

/// 命令行给出的覆盖项
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub num: Option<usize>,
    pub session: Option<String>,
    pub base_branch: Option<String>,
    pub cli_type: Option<String>,
    pub cli_flags: Option<String>,
    pub add_mode: bool,
}

/// 默认配置文件路径
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
}

impl SwarmConfig {
    /// 加载配置文件和环境变量
    pub fn load() -> Result<Self> {
        Self::load_from(config_path().as_deref(), |key| std::env::var(key).ok())
    }

    /// 从指定文件（可不存在）和环境变量查找函数加载
    pub fn load_from(path: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_env(env)?;
        Ok(config)
    }

    /// 读取 YAML 配置文件，未出现的字段使用默认值
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| env(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("NUM") {
            self.num = parse_env("NUM", &v)?;
        }
        if let Some(v) = var("SESSION") {
            self.session = v;
        }
        if let Some(v) = var("BASE_BRANCH") {
            self.base_branch = v;
        }
        if let Some(v) = var("CLI_TYPE") {
            self.cli_type = v;
        }
        if let Some(v) = var("CLI_FLAGS") {
            self.cli_flags = v;
        }
        if let Some(v) = var("ADD_MODE") {
            self.add_mode = parse_env("ADD_MODE", &v)?;
        }
        if let Some(v) = var("RESUME_BUFFER_SECS") {
            self.resume_buffer_secs = parse_env("RESUME_BUFFER_SECS", &v)?;
        }
        if let Some(v) = var("MONITOR_INTERVAL") {
            self.monitor_interval = parse_env("MONITOR_INTERVAL", &v)?;
        }
        if let Some(v) = var("WORKTREE_PREFIX") {
            self.worktree_prefix = v;
        }
        Ok(())
    }

    /// 应用命令行覆盖项
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(num) = overrides.num {
            self.num = num;
        }
        if let Some(session) = overrides.session {
            self.session = session;
        }
        if let Some(base_branch) = overrides.base_branch {
            self.base_branch = base_branch;
        }
        if let Some(cli_type) = overrides.cli_type {
            self.cli_type = cli_type;
        }
        if let Some(cli_flags) = overrides.cli_flags {
            self.cli_flags = cli_flags;
        }
        self.add_mode |= overrides.add_mode;
    }

    /// 校验并解析 CLI 类型列表
    pub fn validate(&self) -> Result<Vec<AssistantSpec>> {
        if self.num < 1 {
            return Err(anyhow!("-n must be a positive integer"));
        }
        if self.monitor_interval < 1 {
            return Err(anyhow!("monitor_interval must be at least 1 second"));
        }
        if self.session.trim().is_empty() {
            return Err(anyhow!("session name must not be empty"));
        }
        let specs = AssistantSpec::parse_list(&self.cli_type)?;
        if specs.is_empty() {
            return Err(anyhow!("no valid CLI types provided"));
        }
        Ok(specs)
    }

    pub fn watchdog_settings(&self) -> WatchdogSettings {
        WatchdogSettings {
            poll_interval: Duration::from_secs(self.monitor_interval),
            resume_buffer_secs: self.resume_buffer_secs,
            wait_tick: WAIT_TICK,
        }
    }

    /// watchdog 活动日志路径
    pub fn log_path(&self) -> PathBuf {
        std::env::temp_dir().join(format!("claude-swarm-{}.log", self.session))
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow!("invalid {}{}={:?}: {}", ENV_PREFIX, name, value, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let config = SwarmConfig::default();
        assert_eq!(config.num, 4);
        assert_eq!(config.session, "claude-swarm");
        assert_eq!(config.resume_buffer_secs, 120);
        assert_eq!(config.monitor_interval, 30);
        assert_eq!(config.worktree_prefix, ".wt");
        assert_eq!(config.validate().unwrap().len(), 4);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SwarmConfig::load_from(Some(&dir.path().join("nope.yaml")), no_env).unwrap();
        assert_eq!(config, SwarmConfig::default());

        let config = SwarmConfig::load_from(None, no_env).unwrap();
        assert_eq!(config, SwarmConfig::default());
    }

    #[test]
    fn test_partial_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "num: 2\ncli_type: codex\nmonitor_interval: 10\n").unwrap();

        let config = SwarmConfig::load_from(Some(&path), no_env).unwrap();
        assert_eq!(config.num, 2);
        assert_eq!(config.cli_type, "codex");
        assert_eq!(config.monitor_interval, 10);
        assert_eq!(config.session, "claude-swarm");
    }

    #[test]
    fn test_empty_and_invalid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.yaml");
        std::fs::write(&empty, "\n").unwrap();
        assert_eq!(SwarmConfig::from_file(&empty).unwrap(), SwarmConfig::default());

        let broken = dir.path().join("broken.yaml");
        std::fs::write(&broken, "num: [not a number").unwrap();
        assert!(SwarmConfig::from_file(&broken).is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "num: 2\nsession: from-file\n").unwrap();

        let env: HashMap<&str, &str> = [
            ("CLAUDE_SWARM_SESSION", "from-env"),
            ("CLAUDE_SWARM_RESUME_BUFFER_SECS", "60"),
            ("CLAUDE_SWARM_ADD_MODE", "true"),
        ]
        .into_iter()
        .collect();
        let config =
            SwarmConfig::load_from(Some(&path), |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.num, 2);
        assert_eq!(config.session, "from-env");
        assert_eq!(config.resume_buffer_secs, 60);
        assert!(config.add_mode);
    }

    #[test]
    fn test_invalid_env_value() {
        let result = SwarmConfig::load_from(None, |k| {
            (k == "CLAUDE_SWARM_NUM").then(|| "many".to_string())
        });
        let err = result.unwrap_err().to_string();
        assert!(err.contains("CLAUDE_SWARM_NUM"));
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut config = SwarmConfig::default();
        config.apply_overrides(ConfigOverrides {
            num: Some(6),
            cli_type: Some("claude,codex".to_string()),
            add_mode: true,
            ..Default::default()
        });
        assert_eq!(config.num, 6);
        assert_eq!(config.cli_type, "claude,codex");
        assert_eq!(config.session, "claude-swarm");
        assert!(config.add_mode);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SwarmConfig { num: 0, ..Default::default() };
        assert!(config.validate().is_err());

        config.num = 2;
        config.cli_type = " , ".to_string();
        assert!(config.validate().is_err());

        config.cli_type = "claude,cursor".to_string();
        assert!(config.validate().is_err());

        config.cli_type = "claude".to_string();
        config.monitor_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_watchdog_settings() {
        let config = SwarmConfig {
            monitor_interval: 15,
            resume_buffer_secs: 90,
            ..Default::default()
        };
        let settings = config.watchdog_settings();
        assert_eq!(settings.poll_interval, Duration::from_secs(15));
        assert_eq!(settings.resume_buffer_secs, 90);
        assert_eq!(settings.wait_tick, WAIT_TICK);
    }

    #[test]
    fn test_log_path_includes_session() {
        let config = SwarmConfig { session: "demo".to_string(), ..Default::default() };
        assert!(config.log_path().ends_with("claude-swarm-demo.log"));
    }
}
