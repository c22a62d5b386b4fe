//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 生命周期集成测试：初始化、关闭时的最后一次刷新以及关闭后的行为

#[path = "../common/mod.rs"]
mod common;

use common::{manual_flush_config, memory_context, setup_logging, users_registry, Users};
use rowcache::config::Config;
use rowcache::{CacheError, Database, FetchResult, MemoryStore, Registry, RowCache};
use secrecy::SecretString;
use std::sync::Arc;

fn file_config(path: &std::path::Path) -> Config {
    let mut config = manual_flush_config(2);
    config.database.url = SecretString::new(format!("sqlite://{}", path.display()).into());
    config
}

async fn file_context(config: Config) -> (RowCache, Arc<MemoryStore>) {
    setup_logging();
    let cache = Arc::new(MemoryStore::new());
    let database = Database::connect(&config.database, config.debug)
        .await
        .unwrap();
    let ctx = RowCache::with_backends(config, users_registry("Users"), cache.clone(), database)
        .await
        .unwrap();
    (ctx, cache)
}

#[tokio::test]
async fn test_stop_drains_pending_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("rowcache.db");

    let (ctx, _cache) = file_context(file_config(&path)).await;
    {
        let users = ctx.store::<Users>().unwrap();
        users.upsert_all(&Users::new("u1", "Alice", 30)).await.unwrap();
        users.upsert_all(&Users::new("u2", "Bob", 25)).await.unwrap();
    }
    assert_eq!(ctx.synchronizer().pending_len(), 2);
    ctx.stop().await.unwrap();
    assert!(path.exists());

    // 重新打开：缓存为空，读取回落到数据库
    let (ctx, cache) = file_context(file_config(&path)).await;
    let users = ctx.store::<Users>().unwrap();
    assert!(cache.is_empty());

    let mut user = Users::with_id("u2");
    assert_eq!(users.fetch_by_id(&mut user).await, FetchResult::Found);
    assert_eq!(user, Users::new("u2", "Bob", 25));

    let mut fetch = users.fetch_all_from_database().await;
    let mut count = 0;
    while fetch.next(&mut user).await == FetchResult::Found {
        count += 1;
    }
    assert_eq!(count, 2);
    assert!(fetch.is_finished());

    drop(fetch);
    drop(users);
    ctx.stop().await.unwrap();
}

/// 数据库遍历在第一次 `next` 时才执行查询
#[tokio::test]
async fn test_database_fetch_reads_rows_on_demand() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rowcache.db");

    let (ctx, _cache) = file_context(file_config(&path)).await;
    let users = ctx.store::<Users>().unwrap();
    users.upsert_all(&Users::new("u1", "Alice", 30)).await.unwrap();
    users.upsert_all(&Users::new("u2", "Bob", 25)).await.unwrap();
    ctx.flush().await;

    let mut fetch = users.fetch_all_from_database().await;
    let table = users.schema().table().clone();
    assert_eq!(ctx.database().delete_all_rows(&table).await.unwrap(), 2);

    let mut user = Users::default();
    assert_eq!(fetch.next(&mut user).await, FetchResult::Complete);
    assert!(fetch.is_finished());

    drop(fetch);
    drop(users);
    ctx.stop().await.unwrap();
}

#[tokio::test]
async fn test_modifications_rejected_after_stop() {
    let (ctx, cache) = memory_context(manual_flush_config(2), users_registry("Users")).await;
    let users = ctx.store::<Users>().unwrap();
    users.upsert_all(&Users::new("u1", "Alice", 30)).await.unwrap();

    let synchronizer = ctx.synchronizer().clone();
    // 存储仍被持有时数据库不会被关闭，只记录警告
    ctx.stop().await.unwrap();
    assert!(synchronizer.is_shutting_down());
    assert_eq!(synchronizer.pending_len(), 0);

    let err = users
        .upsert_all(&Users::new("u1", "Alice", 31))
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::ShuttingDown(_)));
    // 被拒绝的写入不修改缓存
    let hash = rowcache::CacheStore::hget_all(cache.as_ref(), "Users:u1")
        .await
        .unwrap();
    assert_eq!(hash.get("age").unwrap(), "30");

    let err = users.delete_all(true).await.unwrap_err();
    assert!(matches!(err, CacheError::ShuttingDown(_)));

    // 不需要同步的写入仍然生效
    users
        .upsert(&Users::new("u1", "Alice", 32), false, false)
        .await
        .unwrap();
    let mut user = Users::with_id("u1");
    assert_eq!(users.fetch_by_id(&mut user).await, FetchResult::Found);
    assert_eq!(user.age, Some(32));
}

#[tokio::test]
async fn test_unregistered_type_is_rejected() {
    #[derive(Default)]
    struct Orders {
        #[allow(dead_code)]
        id: Option<i64>,
    }

    let (ctx, _cache) = memory_context(manual_flush_config(2), users_registry("Users")).await;
    let err = ctx.store::<Orders>().unwrap_err();
    assert!(matches!(err, CacheError::NotRegistered(_)));
    assert!(format!("{:?}", ctx.store::<Users>().unwrap()).contains("Users"));
    assert!(ctx.store::<Users>().is_ok());
    ctx.stop().await.unwrap();
}

#[tokio::test]
async fn test_invalid_config_fails_before_connecting() {
    setup_logging();
    let mut config = Config::default();
    config.sync.parallelism = 0;

    let err = RowCache::init(config, Registry::new()).await.unwrap_err();
    assert!(matches!(err, CacheError::ConfigError(_)));
}

#[tokio::test]
async fn test_empty_registry_initializes() {
    let (ctx, _cache) = memory_context(manual_flush_config(2), Registry::new()).await;
    assert!(ctx.registry().is_empty());
    assert!(matches!(
        ctx.store::<Users>().unwrap_err(),
        CacheError::NotRegistered(_)
    ));
    ctx.stop().await.unwrap();
}
