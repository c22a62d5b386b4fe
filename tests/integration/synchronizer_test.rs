//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 同步引擎集成测试：并行度上限、失败丢弃、定时刷新和最终一致性

#[path = "../common/mod.rs"]
mod common;

use async_trait::async_trait;
use common::{manual_flush_config, memory_context, setup_logging, users_registry, Users};
use rowcache::metrics::SyncMetrics;
use rowcache::sea_orm::Statement;
use rowcache::sync::{ModifiedEntry, SyncTarget, Synchronizer};
use rowcache::{FlushOutcome, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 记录并发峰值的同步目标
#[derive(Default)]
struct GaugeTarget {
    running: AtomicUsize,
    peak: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl SyncTarget for GaugeTarget {
    async fn apply(&self, entry: &ModifiedEntry) -> Result<()> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.seen.lock().unwrap().push(entry.to_string());
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_parallelism_is_never_exceeded() {
    setup_logging();
    let registry = users_registry("Users");
    let table = registry.tables()[0].clone();

    let target = Arc::new(GaugeTarget::default());
    let sync = Synchronizer::new(target.clone(), 3, SyncMetrics::default());
    for i in 0..10 {
        sync.add_modified_key(ModifiedEntry::upsert(table.clone(), format!("u{}", i)))
            .unwrap();
    }

    assert_eq!(
        sync.flush().await,
        FlushOutcome::Drained {
            synchronized: 10,
            dropped: 0
        }
    );
    assert!(target.peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(target.seen.lock().unwrap().len(), 10);
    assert_eq!(sync.pending_len(), 0);
    assert_eq!(sync.flush().await, FlushOutcome::Empty);
}

#[tokio::test]
async fn test_failed_entries_are_dropped_and_counted() {
    let (ctx, _cache) = memory_context(manual_flush_config(2), users_registry("Users")).await;
    let users = ctx.store::<Users>().unwrap();

    users.upsert_all(&Users::new("u1", "Alice", 30)).await.unwrap();
    users.upsert_all(&Users::new("u2", "Bob", 25)).await.unwrap();

    // 表被删除后数据库写入失败
    let backend = ctx.database().backend();
    ctx.database()
        .execute(Statement::from_string(backend, "DROP TABLE Users".to_string()))
        .await
        .unwrap();

    assert_eq!(
        ctx.flush().await,
        FlushOutcome::Drained {
            synchronized: 0,
            dropped: 2
        }
    );
    assert_eq!(ctx.metrics().dropped_total(), 2);
    assert_eq!(ctx.metrics().enqueued_total(), 2);
    // 失败的条目不会重试
    assert_eq!(ctx.synchronizer().pending_len(), 0);
    assert_eq!(ctx.flush().await, FlushOutcome::Empty);

    ctx.stop().await.unwrap();
}

#[tokio::test]
async fn test_timer_flush_reaches_database() {
    let mut config = manual_flush_config(2);
    config.sync.flush_interval_ms = 50;
    let (ctx, _cache) = memory_context(config, users_registry("Users")).await;
    let users = ctx.store::<Users>().unwrap();

    users.upsert_all(&Users::new("u1", "Alice", 30)).await.unwrap();
    users.upsert_all(&Users::new("u2", "Bob", 25)).await.unwrap();

    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if ctx.metrics().synchronized_total() >= 2 {
            break;
        }
    }
    assert_eq!(ctx.metrics().synchronized_total(), 2);

    let table = users.schema().table().clone();
    assert_eq!(ctx.database().select_all(&table).await.unwrap().len(), 2);

    ctx.stop().await.unwrap();
}

#[tokio::test]
async fn test_metrics_render_after_flush() {
    let (ctx, _cache) = memory_context(manual_flush_config(2), users_registry("Users")).await;
    let users = ctx.store::<Users>().unwrap();

    users.upsert_all(&Users::new("u1", "Alice", 30)).await.unwrap();
    ctx.flush().await;

    let rendered = ctx.metrics().render();
    assert!(rendered.contains("rowcache_"));
    assert!(rendered.contains("Users"));
    assert_eq!(ctx.metrics().synchronized_total(), 1);

    ctx.stop().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_writers_converge() {
    let (ctx, _cache) = memory_context(manual_flush_config(4), users_registry("Users")).await;
    let users = ctx.store::<Users>().unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = users.clone();
        handles.push(tokio::spawn(async move {
            for round in 0..5 {
                store
                    .upsert_all(&Users::new(&format!("u{}", i), "Writer", round))
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(ctx.synchronizer().pending_len(), 8);
    ctx.flush().await;

    let table = users.schema().table().clone();
    assert_eq!(ctx.database().select_all(&table).await.unwrap().len(), 8);
    for i in 0..8 {
        let row = ctx
            .database()
            .select_by_id(&table, &format!("u{}", i))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get("age").unwrap(), "4");
    }

    ctx.stop().await.unwrap();
}
