//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了待同步条目。

use crate::schema::TableInfo;
use std::fmt;
use std::sync::Arc;

/// 同步操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// 插入或更新一行
    Upsert,
    /// 按ID删除一行
    Delete,
    /// 删除该实体类型的全部行
    DeleteAll,
}

impl Operation {
    /// 指标和日志中使用的名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Upsert => "upsert",
            Operation::Delete => "delete",
            Operation::DeleteAll => "delete_all",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 待同步条目
///
/// 每次需要同步的修改产生一个，只在进程内存中存在，被同步引擎消费一次
#[derive(Debug, Clone)]
pub struct ModifiedEntry {
    /// 实体的表信息
    pub table: Arc<TableInfo>,
    /// ID值，`DeleteAll` 为 `None`
    pub id: Option<String>,
    /// 操作类型
    pub operation: Operation,
}

impl ModifiedEntry {
    /// 插入或更新条目
    pub fn upsert(table: Arc<TableInfo>, id: impl Into<String>) -> Self {
        Self {
            table,
            id: Some(id.into()),
            operation: Operation::Upsert,
        }
    }

    /// 删除条目
    pub fn delete(table: Arc<TableInfo>, id: impl Into<String>) -> Self {
        Self {
            table,
            id: Some(id.into()),
            operation: Operation::Delete,
        }
    }

    /// 全部删除条目
    pub fn delete_all(table: Arc<TableInfo>) -> Self {
        Self {
            table,
            id: None,
            operation: Operation::DeleteAll,
        }
    }

    /// 实体类型名
    pub fn entity(&self) -> &str {
        &self.table.name
    }

    /// 对应的缓存键，`DeleteAll` 返回 `None`
    pub fn cache_key(&self) -> Option<String> {
        self.id.as_deref().map(|id| self.table.cache_key(id))
    }

    /// 是否指向同一实体的同一行
    pub fn same_row(&self, other: &ModifiedEntry) -> bool {
        self.id.is_some() && self.id == other.id && self.entity() == other.entity()
    }
}

impl fmt::Display for ModifiedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} {}:{}", self.operation, self.table.name, id),
            None => write!(f, "{} {}", self.operation, self.table.name),
        }
    }
}
