//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了上下文对象，负责初始化缓存、数据库和同步引擎并管理其生命周期。

use crate::backend::{CacheStore, RedisStore};
use crate::config::Config;
use crate::database::Database;
use crate::error::{CacheError, Result};
use crate::metrics::SyncMetrics;
use crate::schema::Registry;
use crate::store::EntityStore;
use crate::sync::{DatabaseSyncTarget, FlushOutcome, FlushTimer, Synchronizer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// 上下文
///
/// 构造一次，持有注册表、缓存、数据库和同步器；实体存储从这里获取
pub struct RowCache {
    config: Config,
    registry: Arc<Registry>,
    cache: Arc<dyn CacheStore>,
    database: Arc<Database>,
    synchronizer: Arc<Synchronizer>,
    timer: FlushTimer,
}

impl std::fmt::Debug for RowCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowCache")
            .field("struct_count", &self.registry.len())
            .field("database", &self.database)
            .field("pending", &self.synchronizer.pending_len())
            .finish_non_exhaustive()
    }
}

impl RowCache {
    /// 初始化上下文
    ///
    /// 连接Redis和数据库，为每个已注册的实体建表，并启动刷新定时器
    ///
    /// # 参数
    ///
    /// * `config` - 配置
    /// * `registry` - 实体结构注册表
    ///
    /// # 返回值
    ///
    /// 返回初始化好的上下文，失败时返回相应的错误
    #[instrument(skip(config, registry), level = "info", fields(struct_count = registry.len()))]
    pub async fn init(config: Config, registry: Registry) -> Result<Self> {
        config.validate().map_err(CacheError::ConfigError)?;

        let cache: Arc<dyn CacheStore> = Arc::new(RedisStore::new(&config.cache).await?);
        let database = Database::connect(&config.database, config.debug).await?;
        Self::with_backends(config, registry, cache, database).await
    }

    /// 使用调用方提供的缓存和数据库初始化上下文
    ///
    /// # 参数
    ///
    /// * `config` - 配置
    /// * `registry` - 实体结构注册表
    /// * `cache` - 缓存后端
    /// * `database` - 数据库
    #[instrument(skip_all, level = "info", fields(struct_count = registry.len()))]
    pub async fn with_backends(
        config: Config,
        registry: Registry,
        cache: Arc<dyn CacheStore>,
        database: Database,
    ) -> Result<Self> {
        config.validate().map_err(CacheError::ConfigError)?;

        for table in registry.tables() {
            database.create_table(&table).await?;
        }
        info!("Created {} table(s)", registry.len());

        let database = Arc::new(database);
        let target = Arc::new(DatabaseSyncTarget::new(cache.clone(), database.clone()));
        let synchronizer = Arc::new(Synchronizer::new(
            target,
            config.sync.parallelism,
            SyncMetrics::default(),
        ));
        let timer = FlushTimer::start(
            synchronizer.clone(),
            Duration::from_millis(config.sync.flush_interval_ms),
        );

        info!(
            "RowCache initialized: parallelism={}, flush_interval_ms={}",
            config.sync.parallelism, config.sync.flush_interval_ms
        );
        Ok(Self {
            config,
            registry: Arc::new(registry),
            cache,
            database,
            synchronizer,
            timer,
        })
    }

    /// 获取实体存储
    ///
    /// # 返回值
    ///
    /// 实体类型未注册时返回 `NotRegistered`
    pub fn store<E>(&self) -> Result<EntityStore<E>>
    where
        E: Send + Sync + 'static,
    {
        let schema = self.registry.schema::<E>()?;
        Ok(EntityStore::new(
            schema,
            self.cache.clone(),
            self.database.clone(),
            self.synchronizer.clone(),
            self.config.cache.scan_count,
        ))
    }

    /// 配置
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 注册表
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// 同步器
    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.synchronizer
    }

    /// 同步指标
    pub fn metrics(&self) -> &SyncMetrics {
        self.synchronizer.metrics()
    }

    /// 数据库
    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    /// 立即刷新一次（不等待定时器）
    pub async fn flush(&self) -> FlushOutcome {
        self.synchronizer.flush().await
    }

    /// 停止
    ///
    /// 依次停止定时器、执行同步器关闭（最后一次刷新完成后才返回），最后关闭数据库连接
    #[instrument(skip(self), level = "info")]
    pub async fn stop(self) -> Result<()> {
        info!("开始关闭 RowCache...");
        let RowCache {
            mut timer,
            synchronizer,
            database,
            cache,
            ..
        } = self;

        timer.stop().await?;
        let outcome = synchronizer.shutdown().await?;
        info!("最后一次刷新结果: {:?}", outcome);

        // 同步目标持有数据库引用，先释放同步器
        drop(synchronizer);
        drop(cache);

        match Arc::try_unwrap(database) {
            Ok(database) => database.close().await?,
            Err(database) => warn!(
                "数据库仍被 {} 个实体存储引用，连接将在最后一个引用释放时关闭",
                Arc::strong_count(&database) - 1
            ),
        }

        info!("RowCache 已关闭");
        Ok(())
    }
}
