//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和设置。

use rowcache::config::Config;
use rowcache::{ColumnDecl, Database, MemoryStore, Registry, RowCache};
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(EnvFilter::new("debug"))
            .try_init()
            .ok();
    });
}

/// 测试实体
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Users {
    pub id: Option<String>,
    pub name: Option<String>,
    pub age: Option<i32>,
}

#[allow(dead_code)]
impl Users {
    pub fn new(id: &str, name: &str, age: i32) -> Self {
        Self {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            age: Some(age),
        }
    }

    pub fn with_id(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Default::default()
        }
    }
}

/// `Users{id, name, age}` 的列声明
pub fn users_columns() -> Vec<ColumnDecl<Users>> {
    vec![
        ColumnDecl::new("id", "VARCHAR", |u: &Users| &u.id, |u: &mut Users| &mut u.id)
            .length(36)
            .id(),
        ColumnDecl::new("name", "VARCHAR", |u: &Users| &u.name, |u: &mut Users| &mut u.name)
            .length(64)
            .nullable(),
        ColumnDecl::new("age", "INT", |u: &Users| &u.age, |u: &mut Users| &mut u.age)
            .nullable(),
    ]
}

/// 注册了 `Users` 的注册表
pub fn users_registry(name: &str) -> Registry {
    let mut registry = Registry::new();
    registry
        .register(name, users_columns())
        .expect("Users schema should register");
    registry
}

/// 测试配置：刷新间隔很长，由测试手动触发刷新
#[allow(dead_code)]
pub fn manual_flush_config(parallelism: usize) -> Config {
    let mut config = Config::default();
    config.sync.flush_interval_ms = 3_600_000;
    config.sync.parallelism = parallelism;
    config.debug = true;
    config
}

/// 基于进程内缓存和SQLite内存库的上下文
#[allow(dead_code)]
pub async fn memory_context(config: Config, registry: Registry) -> (RowCache, Arc<MemoryStore>) {
    setup_logging();
    let cache = Arc::new(MemoryStore::new());
    let database = Database::connect(&config.database, config.debug)
        .await
        .expect("sqlite memory database should open");
    let ctx = RowCache::with_backends(config, registry, cache.clone(), database)
        .await
        .expect("context should initialize");
    (ctx, cache)
}

/// 生成唯一的实体名称
#[allow(dead_code)]
pub fn generate_unique_name(base: &str) -> String {
    format!("{}_{}", base, uuid::Uuid::new_v4().simple())
}

/// 测试使用的Redis地址
#[allow(dead_code)]
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// 检查Redis是否可用
#[allow(dead_code)]
pub async fn is_redis_available() -> bool {
    if std::env::var("ROWCACHE_SKIP_REDIS_TESTS").is_ok() {
        return false;
    }
    let client = match redis::Client::open(redis_url().as_str()) {
        Ok(c) => c,
        Err(_) => return false,
    };
    matches!(
        tokio::time::timeout(
            Duration::from_secs(1),
            client.get_multiplexed_async_connection(),
        )
        .await,
        Ok(Ok(_))
    )
}
