//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了单个同步条目的执行目标及其数据库实现。

use crate::backend::CacheStore;
use crate::database::Database;
use crate::error::{CacheError, Result};
use crate::sync::entry::{ModifiedEntry, Operation};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// 同步目标
///
/// 把一个待同步条目应用到持久存储
#[async_trait]
pub trait SyncTarget: Send + Sync {
    /// 应用条目，失败的条目由调用方记录并丢弃
    async fn apply(&self, entry: &ModifiedEntry) -> Result<()>;
}

/// 数据库同步目标
///
/// 插入或更新时重新读取当前缓存哈希，入队之后的修改也会一并写入
pub struct DatabaseSyncTarget {
    cache: Arc<dyn CacheStore>,
    database: Arc<Database>,
}

impl DatabaseSyncTarget {
    /// 创建数据库同步目标
    pub fn new(cache: Arc<dyn CacheStore>, database: Arc<Database>) -> Self {
        Self { cache, database }
    }
}

#[async_trait]
impl SyncTarget for DatabaseSyncTarget {
    async fn apply(&self, entry: &ModifiedEntry) -> Result<()> {
        match entry.operation {
            Operation::Upsert => {
                let key = entry
                    .cache_key()
                    .ok_or_else(|| CacheError::InvalidId(format!("{} has no id", entry)))?;
                let fields = self.cache.hget_all(&key).await?;
                if fields.is_empty() {
                    warn!("Cache key {} vanished before synchronization, skipped", key);
                    return Ok(());
                }
                self.database.upsert_row(&entry.table, &fields).await
            }
            Operation::Delete => {
                let id = entry
                    .id
                    .as_deref()
                    .ok_or_else(|| CacheError::InvalidId(format!("{} has no id", entry)))?;
                let affected = self.database.delete_row(&entry.table, id).await?;
                debug!("{}: {} row(s) deleted", entry, affected);
                Ok(())
            }
            Operation::DeleteAll => {
                let affected = self.database.delete_all_rows(&entry.table).await?;
                debug!("{}: {} row(s) deleted", entry, affected);
                Ok(())
            }
        }
    }
}
