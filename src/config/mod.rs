use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::api::session::DEFAULT_MAX_SESSIONS;

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub session: SessionConfig,
    pub metrics: MetricsConfig,
}

/// 日志配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub dir: String,
    pub file: String,
    pub max_file_size: u64,
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: "logs".to_string(),
            file: "sqlexec".to_string(),
            max_file_size: 100 * 1024 * 1024, // 100MB
            max_files: 5,
        }
    }
}

/// 会话配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub max_sessions: usize,
    /// 新会话的 autocommit 初始值
    pub default_autocommit: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            default_autocommit: true,
        }
    }
}

/// 指标配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// 服务模式下输出指标快照的间隔（秒），0 表示不输出
    pub snapshot_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_secs: 60,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 文件不存在时使用默认配置，其他错误照常返回
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
