//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内缓存后端，行为与Redis哈希命令一致，用于测试和单机部署。

use crate::backend::CacheStore;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{instrument, trace};

/// 进程内缓存后端
///
/// 扫描游标记录上一页的最后一个键，下一页从其后继续，
/// 因此扫描期间删除已返回的键不会跳过尚未返回的键
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: DashMap<String, HashMap<String, String>>,
    cursors: DashMap<u64, String>,
    last_cursor: AtomicU64,
}

impl MemoryStore {
    /// 创建空的进程内缓存
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前键数量
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 将Redis的glob模式转换为正则表达式（支持 `*` 和 `?`）
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let escaped = regex::escape(pattern)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    Regex::new(&format!("^{}$", escaped))
        .map_err(|e| CacheError::BackendError(format!("Invalid scan pattern '{}': {}", pattern, e)))
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn hset_all(&self, key: &str, fields: &HashMap<String, String>) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut entry = self.data.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self
            .data
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn del(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.data.remove(key);
        }
        Ok(())
    }

    /// 键按字典序返回，游标在使用一次后失效
    #[instrument(skip(self), level = "trace")]
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>)> {
        let after = match cursor {
            0 => None,
            cursor => match self.cursors.remove(&cursor) {
                Some((_, last)) => Some(last),
                None => {
                    return Err(CacheError::BackendError(format!(
                        "Invalid scan cursor {}",
                        cursor
                    )))
                }
            },
        };

        let regex = glob_to_regex(pattern)?;
        let mut keys: Vec<String> = self
            .data
            .iter()
            .filter(|entry| after.as_ref().map_or(true, |last| entry.key() > last))
            .filter(|entry| regex.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();

        let count = count.max(1);
        let next = match keys.get(count - 1) {
            Some(last) if keys.len() > count => {
                let next = self.last_cursor.fetch_add(1, Ordering::Relaxed) + 1;
                self.cursors.insert(next, last.clone());
                next
            }
            _ => 0,
        };
        keys.truncate(count);
        trace!("scan {} from {} -> {} keys, next {}", pattern, cursor, keys.len(), next);
        Ok((next, keys))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.data.contains_key(key))
    }
}
