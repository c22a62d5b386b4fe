//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了Redis连接提供者接口和默认实现。

use crate::{
    config::CacheConfig,
    error::{CacheError, Result},
    utils::redact_url,
};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use secrecy::ExposeSecret;
use tokio::time::{timeout, Duration};

#[async_trait]
pub trait RedisProvider: Send + Sync {
    async fn get_standalone_client(&self, config: &CacheConfig)
        -> Result<(Client, ConnectionManager)>;
    async fn get_sentinel_client(&self, config: &CacheConfig)
        -> Result<(Client, ConnectionManager)>;
}

pub struct DefaultRedisProvider;

impl DefaultRedisProvider {
    async fn connect(client: &Client, config: &CacheConfig, target: &str) -> Result<ConnectionManager> {
        match timeout(
            Duration::from_millis(config.connection_timeout_ms),
            client.get_connection_manager(),
        )
        .await
        {
            Ok(res) => Ok(res?),
            Err(_) => Err(CacheError::Timeout(format!(
                "Connection timed out after {}ms. Target: {}",
                config.connection_timeout_ms, target
            ))),
        }
    }
}

#[async_trait]
impl RedisProvider for DefaultRedisProvider {
    async fn get_standalone_client(
        &self,
        config: &CacheConfig,
    ) -> Result<(Client, ConnectionManager)> {
        let connection_string = config.connection_string.expose_secret();
        let client = Client::open(connection_string)?;
        let manager = Self::connect(&client, config, &redact_url(connection_string)).await?;
        Ok((client, manager))
    }

    async fn get_sentinel_client(
        &self,
        config: &CacheConfig,
    ) -> Result<(Client, ConnectionManager)> {
        let sentinel_config = config.sentinel.as_ref().ok_or_else(|| {
            CacheError::ConfigError("Sentinel configuration is missing".to_string())
        })?;

        tracing::info!("Initializing Sentinel client with automatic failover support");

        // redis+sentinel://host:port[,host:port]/service_name
        let nodes: Vec<String> = sentinel_config
            .nodes
            .iter()
            .map(|n| {
                n.trim_start_matches("redis://")
                    .trim_start_matches("redis+sentinel://")
                    .to_string()
            })
            .collect();

        if nodes.is_empty() {
            return Err(CacheError::ConfigError(
                "No sentinel nodes provided".to_string(),
            ));
        }

        let url = format!(
            "redis+sentinel://{}/{}",
            nodes.join(","),
            sentinel_config.master_name
        );

        let client = Client::open(url.as_str())?;
        let manager = Self::connect(&client, config, &url).await?;
        Ok((client, manager))
    }
}
