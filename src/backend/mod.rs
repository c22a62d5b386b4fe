//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存后端接口及其实现，包括Redis后端、进程内后端和键扫描器。

pub mod memory;
pub mod redis_store;
pub mod redis_provider;
pub mod scanner;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use scanner::KeyScanner;

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// 缓存存储接口
///
/// 每行数据以哈希形式保存在 `实体名:ID值` 键下，字段为存储列名，值为字符串
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 写入哈希字段（与已有字段合并）
    async fn hset_all(&self, key: &str, fields: &HashMap<String, String>) -> Result<()>;

    /// 读取整个哈希，键不存在时返回空映射
    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>>;

    /// 批量删除键
    async fn del(&self, keys: &[String]) -> Result<()>;

    /// 按模式分页扫描键空间
    ///
    /// # 参数
    ///
    /// * `cursor` - 游标，首次调用传0
    /// * `pattern` - 匹配模式，如 `Users:*`
    /// * `count` - 每页数量提示
    ///
    /// # 返回值
    ///
    /// 返回下一个游标（0表示扫描结束）和本页的键
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>)>;

    /// 检查键是否存在
    async fn exists(&self, key: &str) -> Result<bool>;
}
