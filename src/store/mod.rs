//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了实体级的双存储访问层：缓存优先的读写，数据库兜底，修改交给同步器。

pub mod fetch;

pub use fetch::{CacheFetch, DatabaseFetch, FetchResult};

use crate::backend::{CacheStore, KeyScanner};
use crate::codec;
use crate::database::Database;
use crate::error::{CacheError, Result};
use crate::schema::StructSchema;
use crate::sync::{Admission, ModifiedEntry, Synchronizer};
use sea_orm::Value;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// 实体存储
///
/// 每个已注册的实体类型一个，克隆开销很小
pub struct EntityStore<E> {
    schema: Arc<StructSchema<E>>,
    cache: Arc<dyn CacheStore>,
    database: Arc<Database>,
    synchronizer: Arc<Synchronizer>,
    scan_count: usize,
}

impl<E> Clone for EntityStore<E> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            cache: self.cache.clone(),
            database: self.database.clone(),
            synchronizer: self.synchronizer.clone(),
            scan_count: self.scan_count,
        }
    }
}

impl<E> std::fmt::Debug for EntityStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("entity", &self.schema.name())
            .field("scan_count", &self.scan_count)
            .finish_non_exhaustive()
    }
}

fn logged<T>(operation: &str, entity: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        error!("{} on {} failed: {}", operation, entity, e);
    }
    result
}

impl<E> EntityStore<E>
where
    E: Send + Sync + 'static,
{
    pub(crate) fn new(
        schema: Arc<StructSchema<E>>,
        cache: Arc<dyn CacheStore>,
        database: Arc<Database>,
        synchronizer: Arc<Synchronizer>,
        scan_count: usize,
    ) -> Self {
        Self {
            schema,
            cache,
            database,
            synchronizer,
            scan_count,
        }
    }

    /// 实体结构
    pub fn schema(&self) -> &Arc<StructSchema<E>> {
        &self.schema
    }

    /// 需要同步时申请写入许可，许可持有到条目入队
    async fn admission(&self, synchronize: bool) -> Result<Option<Admission<'_>>> {
        if !synchronize {
            return Ok(None);
        }
        match self.synchronizer.admit().await {
            Some(admission) => Ok(Some(admission)),
            None => Err(CacheError::ShuttingDown(format!(
                "{} modification rejected",
                self.schema.name()
            ))),
        }
    }

    /// 写入实体
    ///
    /// 缓存写入立即生效，数据库写入由同步器延后完成
    ///
    /// # 参数
    ///
    /// * `entity` - 实体
    /// * `ignore_null_fields` - 是否跳过空值字段（只更新有值的字段）
    /// * `synchronize` - 是否同步到数据库
    #[instrument(skip(self, entity), level = "debug", fields(entity = %self.schema.name()))]
    pub async fn upsert(&self, entity: &E, ignore_null_fields: bool, synchronize: bool) -> Result<()> {
        logged(
            "upsert",
            self.schema.name(),
            self.upsert_inner(entity, ignore_null_fields, synchronize).await,
        )
    }

    async fn upsert_inner(&self, entity: &E, ignore_null_fields: bool, synchronize: bool) -> Result<()> {
        let id = self.schema.id_value(entity)?;
        let fields = codec::encode(entity, &self.schema, ignore_null_fields)?;
        let admission = self.admission(synchronize).await?;

        let key = self.schema.table().cache_key(&id);
        self.cache.hset_all(&key, &fields).await?;
        debug!("Cached {} ({} fields)", key, fields.len());

        if let Some(admission) = admission {
            admission.enqueue(ModifiedEntry::upsert(self.schema.table().clone(), id));
        }
        Ok(())
    }

    /// 写入实体的全部字段并同步
    pub async fn upsert_all(&self, entity: &E) -> Result<()> {
        self.upsert(entity, false, true).await
    }

    /// 只写入有值的字段并同步
    pub async fn upsert_some(&self, entity: &E) -> Result<()> {
        self.upsert(entity, true, true).await
    }

    /// 按ID删除实体
    #[instrument(skip(self, entity), level = "debug", fields(entity = %self.schema.name()))]
    pub async fn delete_by_id(&self, entity: &E, synchronize: bool) -> Result<()> {
        logged(
            "delete_by_id",
            self.schema.name(),
            self.delete_by_id_inner(entity, synchronize).await,
        )
    }

    async fn delete_by_id_inner(&self, entity: &E, synchronize: bool) -> Result<()> {
        let id = self.schema.id_value(entity)?;
        let admission = self.admission(synchronize).await?;

        let key = self.schema.table().cache_key(&id);
        self.cache.del(&[key]).await?;

        if let Some(admission) = admission {
            admission.enqueue(ModifiedEntry::delete(self.schema.table().clone(), id));
        }
        Ok(())
    }

    /// 删除该实体类型的全部缓存键，同步时只产生一个全部删除条目
    ///
    /// # 返回值
    ///
    /// 返回删除的缓存键数量
    #[instrument(skip(self), level = "debug", fields(entity = %self.schema.name()))]
    pub async fn delete_all(&self, synchronize: bool) -> Result<usize> {
        logged(
            "delete_all",
            self.schema.name(),
            self.delete_all_inner(synchronize).await,
        )
    }

    async fn delete_all_inner(&self, synchronize: bool) -> Result<usize> {
        let admission = self.admission(synchronize).await?;

        let mut scanner = KeyScanner::new(
            self.cache.clone(),
            self.schema.table().key_pattern(),
            self.scan_count,
        );
        let mut removed = 0;
        while let Some(keys) = scanner.next_page().await? {
            self.cache.del(&keys).await?;
            removed += keys.len();
        }
        debug!("Removed {} cache keys of {}", removed, self.schema.name());

        if let Some(admission) = admission {
            admission.enqueue(ModifiedEntry::delete_all(self.schema.table().clone()));
        }
        Ok(removed)
    }

    /// 按ID读取实体
    ///
    /// 缓存未命中时查询数据库，命中后回写缓存（不同步）
    #[instrument(skip(self, entity), level = "debug", fields(entity = %self.schema.name()))]
    pub async fn fetch_by_id(&self, entity: &mut E) -> FetchResult {
        match logged(
            "fetch_by_id",
            self.schema.name(),
            self.fetch_by_id_inner(entity).await,
        ) {
            Ok(result) => result,
            Err(_) => FetchResult::Error,
        }
    }

    async fn fetch_by_id_inner(&self, entity: &mut E) -> Result<FetchResult> {
        let id = self.schema.id_value(entity)?;
        let key = self.schema.table().cache_key(&id);

        let fields = self.cache.hget_all(&key).await?;
        if !fields.is_empty() {
            codec::decode(&fields, entity, &self.schema)?;
            return Ok(FetchResult::Found);
        }

        let table = self.schema.table();
        match self.database.select_by_id(table, &id).await? {
            Some(row) => {
                codec::decode(&row, entity, &self.schema)?;
                if let Err(e) = self.upsert_inner(entity, false, false).await {
                    warn!("Write-through of {} to cache failed: {}", key, e);
                }
                Ok(FetchResult::Found)
            }
            None => Ok(FetchResult::NotFound),
        }
    }

    /// 遍历缓存中该实体类型的全部行
    pub fn fetch_all(&self) -> CacheFetch<E> {
        let scanner = KeyScanner::new(
            self.cache.clone(),
            self.schema.table().key_pattern(),
            self.scan_count,
        );
        CacheFetch::new(self.clone(), scanner)
    }

    /// 遍历数据库中该实体类型的全部行
    pub async fn fetch_all_from_database(&self) -> DatabaseFetch<E> {
        let rows = self.database.stream_all(self.schema.table()).await;
        DatabaseFetch::new(self.clone(), rows)
    }

    /// 按条件查询数据库
    ///
    /// # 参数
    ///
    /// * `predicate` - `WHERE` 之后的条件文本，使用占位符
    /// * `values` - 绑定参数
    pub async fn fetch_where(&self, predicate: &str, values: Vec<Value>) -> DatabaseFetch<E> {
        let rows = self
            .database
            .stream_where(self.schema.table(), predicate, values)
            .await;
        DatabaseFetch::new(self.clone(), rows)
    }

    /// 执行自定义查询，`{table}` 替换为表名
    pub async fn fetch_custom(&self, query: &str, values: Vec<Value>) -> DatabaseFetch<E> {
        let rows = self
            .database
            .stream_custom(self.schema.table(), query, values)
            .await;
        DatabaseFetch::new(self.clone(), rows)
    }

    /// 直接写入数据库（全部字段），不经过缓存和同步器
    ///
    /// 同一行尚未同步的缓存修改会在下一次刷新时覆盖这次写入
    #[instrument(skip(self, entity), level = "debug", fields(entity = %self.schema.name()))]
    pub async fn insert(&self, entity: &E) -> Result<()> {
        logged("insert", self.schema.name(), self.insert_inner(entity).await)
    }

    async fn insert_inner(&self, entity: &E) -> Result<()> {
        self.schema.id_value(entity)?;
        let fields = codec::encode(entity, &self.schema, false)?;
        self.database.upsert_row(self.schema.table(), &fields).await
    }

    /// 直接从数据库按ID读取，不读写缓存
    #[instrument(skip(self, entity), level = "debug", fields(entity = %self.schema.name()))]
    pub async fn fetch_by_id_from_database(&self, entity: &mut E) -> FetchResult {
        match logged(
            "fetch_by_id_from_database",
            self.schema.name(),
            self.fetch_by_id_from_database_inner(entity).await,
        ) {
            Ok(result) => result,
            Err(_) => FetchResult::Error,
        }
    }

    async fn fetch_by_id_from_database_inner(&self, entity: &mut E) -> Result<FetchResult> {
        let id = self.schema.id_value(entity)?;
        match self.database.select_by_id(self.schema.table(), &id).await? {
            Some(row) => {
                codec::decode(&row, entity, &self.schema)?;
                Ok(FetchResult::Found)
            }
            None => Ok(FetchResult::NotFound),
        }
    }

    /// 直接按ID删除数据库行，不经过缓存和同步器
    ///
    /// # 返回值
    ///
    /// 返回删除的行数
    #[instrument(skip(self, entity), level = "debug", fields(entity = %self.schema.name()))]
    pub async fn delete_by_id_from_database(&self, entity: &E) -> Result<u64> {
        let result = match self.schema.id_value(entity) {
            Ok(id) => self.database.delete_row(self.schema.table(), &id).await,
            Err(e) => Err(e),
        };
        logged("delete_by_id_from_database", self.schema.name(), result)
    }

    /// 按条件删除数据库行，不经过缓存和同步器
    ///
    /// # 参数
    ///
    /// * `predicate` - `WHERE` 之后的条件文本，使用占位符
    /// * `values` - 绑定参数
    ///
    /// # 返回值
    ///
    /// 返回删除的行数
    #[instrument(skip(self, values), level = "debug", fields(entity = %self.schema.name()))]
    pub async fn delete_where(&self, predicate: &str, values: Vec<Value>) -> Result<u64> {
        logged(
            "delete_where",
            self.schema.name(),
            self.database
                .delete_where(self.schema.table(), predicate, values)
                .await,
        )
    }

    /// 删除数据库中该实体类型的全部行，不经过缓存和同步器
    #[instrument(skip(self), level = "debug", fields(entity = %self.schema.name()))]
    pub async fn delete_all_from_database(&self) -> Result<u64> {
        logged(
            "delete_all_from_database",
            self.schema.name(),
            self.database.delete_all_rows(self.schema.table()).await,
        )
    }

    pub(crate) fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }
}
