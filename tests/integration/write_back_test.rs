//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 写回流程集成测试：缓存写入、读取、刷新到数据库以及删除

#[path = "../common/mod.rs"]
mod common;

use common::{manual_flush_config, memory_context, users_registry, Users};
use rowcache::{CacheStore, FetchResult, FlushOutcome, Operation};

#[tokio::test]
async fn test_users_scenario_end_to_end() {
    let (ctx, cache) = memory_context(manual_flush_config(4), users_registry("Users")).await;
    let users = ctx.store::<Users>().unwrap();

    users.upsert_all(&Users::new("u1", "Alice", 30)).await.unwrap();

    let hash = cache.hget_all("Users:u1").await.unwrap();
    assert_eq!(hash.len(), 3);
    assert_eq!(hash.get("id").unwrap(), "u1");
    assert_eq!(hash.get("name").unwrap(), "Alice");
    assert_eq!(hash.get("age").unwrap(), "30");

    let mut fetched = Users::with_id("u1");
    assert_eq!(users.fetch_by_id(&mut fetched).await, FetchResult::Found);
    assert_eq!(fetched, Users::new("u1", "Alice", 30));

    // 两次快速写入只保留一个待同步条目
    users.upsert_all(&Users::new("u1", "Alice", 31)).await.unwrap();
    assert_eq!(ctx.synchronizer().pending_len(), 1);

    assert_eq!(
        ctx.flush().await,
        FlushOutcome::Drained {
            synchronized: 1,
            dropped: 0
        }
    );
    let table = users.schema().table();
    let rows = ctx.database().select_all(table).await.unwrap();
    assert_eq!(rows.len(), 1);
    let row = ctx.database().select_by_id(table, "u1").await.unwrap().unwrap();
    assert_eq!(row.get("age").unwrap(), "31");

    assert_eq!(users.delete_all(true).await.unwrap(), 1);
    assert!(cache.is_empty());
    let pending = ctx.synchronizer().pending_entries();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].operation, Operation::DeleteAll);

    ctx.flush().await;
    assert!(ctx.database().select_all(table).await.unwrap().is_empty());

    ctx.stop().await.unwrap();
}

#[tokio::test]
async fn test_flush_writes_latest_cache_state() {
    let (ctx, _cache) = memory_context(manual_flush_config(2), users_registry("Users")).await;
    let users = ctx.store::<Users>().unwrap();

    users.upsert_all(&Users::new("u1", "Alice", 30)).await.unwrap();
    // 不同步的写入也会被下一次刷新读到
    users
        .upsert(&Users::new("u1", "Alicia", 32), false, false)
        .await
        .unwrap();

    ctx.flush().await;
    let row = ctx
        .database()
        .select_by_id(users.schema().table(), "u1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get("name").unwrap(), "Alicia");
    assert_eq!(row.get("age").unwrap(), "32");

    ctx.stop().await.unwrap();
}

#[tokio::test]
async fn test_upsert_some_only_touches_present_fields() {
    let (ctx, cache) = memory_context(manual_flush_config(2), users_registry("Users")).await;
    let users = ctx.store::<Users>().unwrap();

    users.upsert_all(&Users::new("u1", "Alice", 30)).await.unwrap();
    ctx.flush().await;

    let partial = Users {
        id: Some("u1".to_string()),
        name: None,
        age: Some(40),
    };
    users.upsert_some(&partial).await.unwrap();

    let hash = cache.hget_all("Users:u1").await.unwrap();
    assert_eq!(hash.get("name").unwrap(), "Alice");
    assert_eq!(hash.get("age").unwrap(), "40");

    ctx.flush().await;
    let row = ctx
        .database()
        .select_by_id(users.schema().table(), "u1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get("name").unwrap(), "Alice");
    assert_eq!(row.get("age").unwrap(), "40");

    ctx.stop().await.unwrap();
}

#[tokio::test]
async fn test_delete_by_id_removes_row() {
    let (ctx, cache) = memory_context(manual_flush_config(2), users_registry("Users")).await;
    let users = ctx.store::<Users>().unwrap();

    users.upsert_all(&Users::new("u1", "Alice", 30)).await.unwrap();
    users.upsert_all(&Users::new("u2", "Bob", 25)).await.unwrap();
    ctx.flush().await;

    users.delete_by_id(&Users::with_id("u1"), true).await.unwrap();
    assert!(!cache.exists("Users:u1").await.unwrap());
    ctx.flush().await;

    let table = users.schema().table();
    assert!(ctx.database().select_by_id(table, "u1").await.unwrap().is_none());
    assert!(ctx.database().select_by_id(table, "u2").await.unwrap().is_some());

    let mut gone = Users::with_id("u1");
    assert_eq!(users.fetch_by_id(&mut gone).await, FetchResult::NotFound);

    ctx.stop().await.unwrap();
}

#[tokio::test]
async fn test_upsert_then_delete_before_flush_keeps_only_delete() {
    let (ctx, _cache) = memory_context(manual_flush_config(2), users_registry("Users")).await;
    let users = ctx.store::<Users>().unwrap();

    users.upsert_all(&Users::new("u1", "Alice", 30)).await.unwrap();
    users.delete_by_id(&Users::with_id("u1"), true).await.unwrap();

    let pending = ctx.synchronizer().pending_entries();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].operation, Operation::Delete);

    ctx.flush().await;
    assert!(ctx
        .database()
        .select_all(users.schema().table())
        .await
        .unwrap()
        .is_empty());

    ctx.stop().await.unwrap();
}
