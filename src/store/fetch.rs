//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了读取结果以及缓存和数据库上的惰性遍历序列。

use crate::backend::KeyScanner;
use crate::codec;
use crate::database::row_to_map;
use crate::error::Result;
use crate::store::EntityStore;
use futures::StreamExt;
use sea_orm::QueryStream;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error};

/// 读取结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchResult {
    /// 已读取到实体
    Found,
    /// 未找到（或扫描到的键已没有数据）
    NotFound,
    /// 序列已遍历完
    Complete,
    /// 读取失败，错误已记录
    Error,
}

/// 缓存键空间上的遍历序列
///
/// 每次调用 `next` 把下一行写入调用方提供的实体
pub struct CacheFetch<E> {
    store: EntityStore<E>,
    scanner: KeyScanner,
}

impl<E> CacheFetch<E>
where
    E: Send + Sync + 'static,
{
    pub(crate) fn new(store: EntityStore<E>, scanner: KeyScanner) -> Self {
        Self { store, scanner }
    }

    /// 读取下一行
    pub async fn next(&mut self, entity: &mut E) -> FetchResult {
        match self.advance(entity).await {
            Ok(result) => result,
            Err(e) => {
                error!("Cache scan of {} failed: {}", self.store.schema().name(), e);
                FetchResult::Error
            }
        }
    }

    async fn advance(&mut self, entity: &mut E) -> Result<FetchResult> {
        let Some(key) = self.scanner.next_key().await? else {
            return Ok(FetchResult::Complete);
        };
        let fields = self.store.cache().hget_all(&key).await?;
        if fields.is_empty() {
            debug!("Scanned key {} has no data", key);
            return Ok(FetchResult::NotFound);
        }
        codec::decode(&fields, entity, self.store.schema())?;
        Ok(FetchResult::Found)
    }
}

/// 数据库查询结果上的遍历序列
///
/// 持有数据库游标，每次 `next` 拉取一行；遍历结束或出错后释放游标占用的连接
pub struct DatabaseFetch<E> {
    store: EntityStore<E>,
    // 游标本身不是Sync，互斥锁只用于让序列可以跨任务共享引用
    rows: Option<Mutex<QueryStream>>,
    failure: Option<String>,
    current: Option<HashMap<String, String>>,
}

impl<E> DatabaseFetch<E>
where
    E: Send + Sync + 'static,
{
    pub(crate) fn new(store: EntityStore<E>, rows: Result<QueryStream>) -> Self {
        let (rows, failure) = match rows {
            Ok(rows) => (Some(Mutex::new(rows)), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            store,
            rows,
            failure,
            current: None,
        }
    }

    /// 游标是否已释放
    pub fn is_finished(&self) -> bool {
        self.rows.is_none() && self.failure.is_none()
    }

    /// 当前行的原始字段
    pub fn current_row(&self) -> Option<&HashMap<String, String>> {
        self.current.as_ref()
    }

    /// 读取下一行
    pub async fn next(&mut self, entity: &mut E) -> FetchResult {
        self.current = None;
        if let Some(failure) = self.failure.take() {
            error!("Query on {} failed: {}", self.store.schema().name(), failure);
            return FetchResult::Error;
        }
        let Some(rows) = self.rows.as_mut() else {
            return FetchResult::Complete;
        };

        let next = rows
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .next()
            .await;
        let row = match next {
            Some(Ok(row)) => row,
            Some(Err(e)) => {
                self.rows = None;
                error!("Query on {} failed: {}", self.store.schema().name(), e);
                return FetchResult::Error;
            }
            None => {
                self.rows = None;
                return FetchResult::Complete;
            }
        };

        let table = self.store.schema().table();
        let decoded = row_to_map(&row, table)
            .and_then(|map| codec::decode(&map, entity, self.store.schema()).map(|_| map));
        match decoded {
            Ok(map) => {
                self.current = Some(map);
                FetchResult::Found
            }
            Err(e) => {
                error!("Decoding a row of {} failed: {}", table.name, e);
                FetchResult::Error
            }
        }
    }

    /// 把当前实体写入缓存（不同步）
    ///
    /// # 参数
    ///
    /// * `entity` - 最近一次 `next` 返回 `Found` 时写入的实体
    /// * `overwrite` - 键已存在时是否覆盖
    pub async fn cache_current(&self, entity: &E, overwrite: bool) -> Result<()> {
        if self.current.is_none() {
            return Ok(());
        }
        if !overwrite {
            let key = self
                .store
                .schema()
                .table()
                .cache_key(&self.store.schema().id_value(entity)?);
            if self.store.cache().exists(&key).await? {
                debug!("{} already cached, not overwritten", key);
                return Ok(());
            }
        }
        self.store.upsert(entity, false, false).await
    }
}
