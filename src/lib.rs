//! rowcache - 写回式双存储数据访问层
//!
//! 实体以Redis哈希的形式保存在缓存中，读写优先走缓存；
//! 修改被收集去重后，由同步引擎按有界并行度分批写入关系数据库。

#![doc(html_root_url = "https://docs.rs/rowcache/0.1.0")]

pub use sea_orm;
pub use sea_orm::Value;
pub use tokio;

pub mod backend;
pub mod codec;
pub mod config;
pub mod database;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod schema;
pub mod store;
pub mod sync;
pub mod utils;

// Re-export commonly used items
pub use backend::{CacheStore, MemoryStore, RedisStore};
pub use config::Config;
pub use database::Database;
pub use error::{CacheError, Result};
pub use manager::RowCache;
pub use schema::{ColumnDecl, FieldKind, FieldType, Registry};
pub use store::{EntityStore, FetchResult};
pub use sync::{FlushOutcome, Operation};

/// rowcache 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
