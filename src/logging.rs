//! 日志模块
//!
//! 引擎内部只通过 `tracing` 宏输出；这里提供给宿主进程用的
//! 文件日志初始化（按天滚动、限制文件数量）。

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否启用文件日志
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
    /// 最多保留的滚动日志文件数
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

fn default_max_files() -> usize {
    7
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            level: default_level(),
            max_files: default_max_files(),
        }
    }
}

impl LogConfig {
    /// 从配置目录的 config.json 读取日志配置（缺失/损坏时用默认值）
    pub fn load(config_dir: &Path) -> Self {
        let config_file = config_dir.join("config.json");
        std::fs::read_to_string(&config_file)
            .ok()
            .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
            .and_then(|config| {
                serde_json::from_value::<LogConfig>(config.get("log")?.clone()).ok()
            })
            .unwrap_or_default()
    }

    /// 把日志配置写回 config.json 的 "log" 段，保留其它段
    pub fn save(&self, config_dir: &Path) -> std::io::Result<()> {
        let config_file = config_dir.join("config.json");

        let mut config: serde_json::Value = std::fs::read_to_string(&config_file)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_else(|| serde_json::json!({}));

        config["log"] = serde_json::to_value(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let content = serde_json::to_string_pretty(&config)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&config_file, content)
    }

    /// 把配置的级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

/// 初始化文件日志；返回的 guard 需要持有到进程退出，否则缓冲会丢失
pub fn init_logging(config: &LogConfig, log_dir: &Path) -> Option<WorkerGuard> {
    if !config.enabled {
        return None;
    }
    let _ = std::fs::create_dir_all(log_dir);

    let appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("synccore")
        .filename_suffix("log")
        .max_log_files(config.max_files.max(1))
        .build(log_dir)
        .ok()?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let env_filter = EnvFilter::from_default_env().add_directive(config.tracing_level().into());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .finish();
    // 宿主可能已经装过 subscriber，失败只是保持现状
    let _ = tracing::subscriber::set_global_default(subscriber);
    Some(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        let mut config = LogConfig::default();
        assert_eq!(config.tracing_level(), tracing::Level::INFO);
        config.level = "debug".to_string();
        assert_eq!(config.tracing_level(), tracing::Level::DEBUG);
        config.level = "bogus".to_string();
        assert_eq!(config.tracing_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_disabled_logging_returns_no_guard() {
        let config = LogConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(init_logging(&config, std::env::temp_dir().as_path()).is_none());
    }

    #[test]
    fn test_config_roundtrip_preserves_other_sections() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"cache": {"remoteTtl": 60}}"#,
        )
        .unwrap();

        let config = LogConfig {
            enabled: true,
            level: "debug".to_string(),
            max_files: 3,
        };
        config.save(dir.path()).unwrap();

        let loaded = LogConfig::load(dir.path());
        assert_eq!(loaded.level, "debug");
        assert_eq!(loaded.max_files, 3);

        // 其它配置段不受影响
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("config.json")).unwrap())
                .unwrap();
        assert_eq!(raw["cache"]["remoteTtl"], 60);
    }
}
