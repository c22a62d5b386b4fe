//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 直接数据库操作集成测试：绕过缓存和同步器的写入、读取与删除

#[path = "../common/mod.rs"]
mod common;

use common::{manual_flush_config, memory_context, users_registry, Users};
use rowcache::{CacheError, CacheStore, FetchResult, Value};

#[tokio::test]
async fn test_insert_and_fetch_bypass_cache() {
    let (ctx, cache) = memory_context(manual_flush_config(2), users_registry("Users")).await;
    let users = ctx.store::<Users>().unwrap();

    users.insert(&Users::new("u1", "Alice", 30)).await.unwrap();
    assert!(cache.is_empty());
    assert_eq!(ctx.synchronizer().pending_len(), 0);

    // 再次写入同一ID时更新
    users.insert(&Users::new("u1", "Alice", 31)).await.unwrap();

    let mut user = Users::with_id("u1");
    assert_eq!(
        users.fetch_by_id_from_database(&mut user).await,
        FetchResult::Found
    );
    assert_eq!(user, Users::new("u1", "Alice", 31));
    // 直接读取不回写缓存
    assert!(!cache.exists("Users:u1").await.unwrap());

    let mut missing = Users::with_id("nobody");
    assert_eq!(
        users.fetch_by_id_from_database(&mut missing).await,
        FetchResult::NotFound
    );
    assert_eq!(
        users.fetch_by_id_from_database(&mut Users::default()).await,
        FetchResult::Error
    );

    ctx.stop().await.unwrap();
}

#[tokio::test]
async fn test_insert_requires_id() {
    let (ctx, _cache) = memory_context(manual_flush_config(2), users_registry("Users")).await;
    let users = ctx.store::<Users>().unwrap();

    let err = users.insert(&Users::default()).await.unwrap_err();
    assert!(matches!(err, CacheError::InvalidId(_)));

    ctx.stop().await.unwrap();
}

#[tokio::test]
async fn test_delete_where_binds_values() {
    let (ctx, cache) = memory_context(manual_flush_config(2), users_registry("Users")).await;
    let users = ctx.store::<Users>().unwrap();

    for (id, name, age) in [("u1", "Alice", 30), ("u2", "Bob", 17), ("u3", "Carol", 12)] {
        users.insert(&Users::new(id, name, age)).await.unwrap();
    }
    users
        .upsert(&Users::new("u2", "Bob", 17), false, false)
        .await
        .unwrap();

    assert_eq!(
        users
            .delete_where("age < ?", vec![Value::from(18)])
            .await
            .unwrap(),
        2
    );
    let table = users.schema().table().clone();
    let rows = ctx.database().select_all(&table).await.unwrap();
    assert_eq!(rows.len(), 1);
    // 缓存不受影响
    assert!(cache.exists("Users:u2").await.unwrap());

    let err = users
        .delete_where("no_such_column = ?", vec![Value::from(1)])
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::SeaOrmError(_)));

    ctx.stop().await.unwrap();
}

#[tokio::test]
async fn test_direct_deletes() {
    let (ctx, _cache) = memory_context(manual_flush_config(2), users_registry("Users")).await;
    let users = ctx.store::<Users>().unwrap();

    for (id, name, age) in [("u1", "Alice", 30), ("u2", "Bob", 25), ("u3", "Carol", 41)] {
        users.insert(&Users::new(id, name, age)).await.unwrap();
    }

    assert_eq!(
        users
            .delete_by_id_from_database(&Users::with_id("u2"))
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        users
            .delete_by_id_from_database(&Users::with_id("u2"))
            .await
            .unwrap(),
        0
    );
    assert_eq!(users.delete_all_from_database().await.unwrap(), 2);

    let table = users.schema().table().clone();
    assert!(ctx.database().select_all(&table).await.unwrap().is_empty());
    assert_eq!(ctx.synchronizer().pending_len(), 0);

    ctx.stop().await.unwrap();
}
