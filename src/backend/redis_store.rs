//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis哈希的缓存后端实现。

use crate::backend::redis_provider::{DefaultRedisProvider, RedisProvider};
use crate::backend::CacheStore;
use crate::config::{CacheConfig, RedisMode};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::RedisResult;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, instrument};

/// Redis缓存后端
///
/// 单机和哨兵模式都通过 `ConnectionManager` 访问，连接断开时自动重连
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    command_timeout_ms: u64,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("command_timeout_ms", &self.command_timeout_ms)
            .finish()
    }
}

impl RedisStore {
    /// 创建新的Redis缓存后端实例
    ///
    /// # 参数
    ///
    /// * `config` - 缓存配置
    ///
    /// # 返回值
    ///
    /// 返回新的RedisStore实例或错误
    #[instrument(skip(config), level = "info", name = "init_redis_store")]
    pub async fn new(config: &CacheConfig) -> Result<Self> {
        Self::new_with_provider(config, Arc::new(DefaultRedisProvider)).await
    }

    /// 使用指定的Redis提供者创建新的Redis缓存后端实例
    ///
    /// # 参数
    ///
    /// * `config` - 缓存配置
    /// * `provider` - Redis提供者
    #[instrument(skip(config, provider), level = "info", fields(mode = ?config.mode))]
    pub async fn new_with_provider(
        config: &CacheConfig,
        provider: Arc<dyn RedisProvider>,
    ) -> Result<Self> {
        debug!("Initializing RedisStore with mode: {:?}", config.mode);
        let (_client, manager) = match config.mode {
            RedisMode::Standalone => provider.get_standalone_client(config).await?,
            RedisMode::Sentinel => provider.get_sentinel_client(config).await?,
        };
        Ok(Self {
            manager,
            command_timeout_ms: config.command_timeout_ms,
        })
    }

    /// 获取命令超时时间（毫秒）
    pub fn command_timeout_ms(&self) -> u64 {
        self.command_timeout_ms
    }

    /// 检查连接是否正常
    #[instrument(skip(self), level = "debug")]
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let response: String = self
            .run("PING", redis::cmd("PING").query_async(&mut conn))
            .await?;
        debug!("RedisStore ping: {}", response);
        Ok(())
    }

    async fn run<T, F>(&self, command: &str, fut: F) -> Result<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match timeout(Duration::from_millis(self.command_timeout_ms), fut).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(CacheError::Timeout(format!(
                "{} timed out after {}ms",
                command, self.command_timeout_ms
            ))),
        }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    #[instrument(skip(self, fields), level = "debug", fields(field_count = fields.len()))]
    async fn hset_all(&self, key: &str, fields: &HashMap<String, String>) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        let mut conn = self.manager.clone();
        let _: () = self.run("HSET", cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.manager.clone();
        self.run(
            "HGETALL",
            redis::cmd("HGETALL").arg(key).query_async(&mut conn),
        )
        .await
    }

    #[instrument(skip(self, keys), level = "debug", fields(key_count = keys.len()))]
    async fn del(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("DEL");
        for key in keys {
            cmd.arg(key);
        }
        let mut conn = self.manager.clone();
        let _: () = self.run("DEL", cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>)> {
        let mut conn = self.manager.clone();
        self.run(
            "SCAN",
            redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(count)
                .query_async(&mut conn),
        )
        .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        self.run("EXISTS", redis::cmd("EXISTS").arg(key).query_async(&mut conn))
            .await
    }
}
