//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了键空间扫描器，按页拉取匹配模式的键并在本地缓冲。

use crate::backend::CacheStore;
use crate::error::Result;
use std::collections::VecDeque;
use std::sync::Arc;

/// 键扫描器
///
/// 持有恢复游标和本地缓冲的一页键；服务端返回游标0且缓冲为空时扫描结束
pub struct KeyScanner {
    cache: Arc<dyn CacheStore>,
    pattern: String,
    count: usize,
    cursor: Option<u64>,
    buffer: VecDeque<String>,
}

impl KeyScanner {
    /// 创建扫描器
    ///
    /// # 参数
    ///
    /// * `cache` - 缓存后端
    /// * `pattern` - 匹配模式，如 `Users:*`
    /// * `count` - 每页数量提示
    pub fn new(cache: Arc<dyn CacheStore>, pattern: impl Into<String>, count: usize) -> Self {
        Self {
            cache,
            pattern: pattern.into(),
            count: count.max(1),
            cursor: Some(0),
            buffer: VecDeque::new(),
        }
    }

    /// 扫描是否结束
    pub fn is_exhausted(&self) -> bool {
        self.cursor.is_none() && self.buffer.is_empty()
    }

    /// 拉取下一页键
    ///
    /// 服务端可能返回空页而游标未结束，此时继续拉取；扫描结束后返回 `None`
    pub async fn next_page(&mut self) -> Result<Option<Vec<String>>> {
        if !self.buffer.is_empty() {
            return Ok(Some(self.buffer.drain(..).collect()));
        }
        while let Some(cursor) = self.cursor {
            let (next, keys) = self.cache.scan(cursor, &self.pattern, self.count).await?;
            self.cursor = (next != 0).then_some(next);
            if !keys.is_empty() {
                return Ok(Some(keys));
            }
        }
        Ok(None)
    }

    /// 返回下一个键，扫描结束后返回 `None`
    pub async fn next_key(&mut self) -> Result<Option<String>> {
        if self.buffer.is_empty() {
            match self.next_page().await? {
                Some(keys) => self.buffer.extend(keys),
                None => return Ok(None),
            }
        }
        Ok(self.buffer.pop_front())
    }
}
