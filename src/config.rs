//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存、数据库和同步引擎的配置结构和解析逻辑。

use crate::error::{CacheError, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;

/// 顶层配置
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// 调试模式：把生成的SQL语句输出到日志
    #[serde(default)]
    pub debug: bool,
    /// 缓存（Redis）配置
    #[serde(default)]
    pub cache: CacheConfig,
    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,
    /// 同步引擎配置
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Redis模式枚举
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RedisMode {
    /// 单机模式
    #[default]
    Standalone,
    /// 哨兵模式
    Sentinel,
}

/// 缓存配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis模式
    pub mode: RedisMode,
    /// 连接字符串
    pub connection_string: SecretString,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
    /// 每次SCAN请求的COUNT提示
    pub scan_count: usize,
    /// 哨兵配置
    pub sentinel: Option<SentinelConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mode: RedisMode::Standalone,
            connection_string: SecretString::new("redis://127.0.0.1:6379".to_string().into()),
            connection_timeout_ms: 5000,
            command_timeout_ms: 3000,
            scan_count: 10,
            sentinel: None,
        }
    }
}

/// 哨兵配置
#[derive(Deserialize, Clone, Debug)]
pub struct SentinelConfig {
    /// 主节点名称
    pub master_name: String,
    /// 哨兵节点列表
    pub nodes: Vec<String>,
}

/// 数据库配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 数据库连接URL（mysql://、postgres://、sqlite:）
    pub url: SecretString,
    /// 连接池最大连接数
    pub max_connections: u32,
    /// 连接超时时间（毫秒）
    pub connect_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: SecretString::new("sqlite::memory:".to_string().into()),
            max_connections: 10,
            connect_timeout_ms: 10000,
        }
    }
}

/// 同步引擎配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SyncConfig {
    /// 刷新间隔（毫秒）
    pub flush_interval_ms: u64,
    /// 同时执行的数据库任务数
    pub parallelism: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 5000,
            parallelism: 4,
        }
    }
}

impl Config {
    /// 从TOML字符串解析配置并验证
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| CacheError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate().map_err(CacheError::ConfigError)?;
        Ok(config)
    }

    /// 从TOML文件加载配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有值在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        let timeout = self.cache.connection_timeout_ms;
        if !(100..=30000).contains(&timeout) {
            return Err("cache connection_timeout_ms must be between 100 and 30000 ms".to_string());
        }

        let timeout = self.cache.command_timeout_ms;
        if !(100..=60000).contains(&timeout) {
            return Err("cache command_timeout_ms must be between 100 and 60000 ms".to_string());
        }

        if self.cache.scan_count == 0 {
            return Err("cache scan_count cannot be zero".to_string());
        }

        if self.cache.mode == RedisMode::Sentinel {
            match &self.cache.sentinel {
                None => {
                    return Err("sentinel mode requires a [cache.sentinel] section".to_string())
                }
                Some(sentinel) if sentinel.nodes.is_empty() => {
                    return Err("sentinel nodes cannot be empty".to_string())
                }
                Some(_) => {}
            }
        }

        if self.database.max_connections == 0 {
            return Err("database max_connections cannot be zero".to_string());
        }

        if self.sync.parallelism == 0 || self.sync.parallelism > 256 {
            return Err("sync parallelism must be between 1 and 256".to_string());
        }

        if !(10..=3_600_000).contains(&self.sync.flush_interval_ms) {
            return Err("sync flush_interval_ms must be between 10 and 3600000 ms".to_string());
        }

        Ok(())
    }
}
