//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块封装关系数据库访问：连接、建表、行级写入删除以及查询。

pub mod query;
pub mod row;

pub use query::{to_value, QueryBuilder};
pub use row::row_to_map;

use crate::config::DatabaseConfig;
use crate::error::{CacheError, Result};
use crate::schema::TableInfo;
use crate::utils::redact_url;
use sea_orm::{
    ConnectOptions, ConnectionTrait, DatabaseConnection, DbBackend, QueryResult, QueryStream,
    Statement, StreamTrait, Value,
};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// 准备连接字符串
///
/// SQLite文件数据库会创建所在目录，并在未指定模式时追加 `mode=rwc`
pub fn prepare_connection_string(url: &str) -> Result<String> {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return Ok(url.to_string());
    };
    if rest.contains(":memory:") {
        return Ok(url.to_string());
    }

    let (path, params) = match rest.split_once('?') {
        Some((path, params)) => (path, Some(params)),
        None => (rest, None),
    };
    let path = path.trim_start_matches("//");
    if path.is_empty() {
        return Err(CacheError::ConfigError(format!(
            "SQLite connection string has no path: {}",
            url
        )));
    }

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::DatabaseError(format!(
                    "无法创建数据库目录 {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    Ok(match params {
        Some(params) if params.contains("mode=") => format!("sqlite://{}?{}", path, params),
        Some(params) => format!("sqlite://{}?{}&mode=rwc", path, params),
        None => format!("sqlite://{}?mode=rwc", path),
    })
}

/// 数据库访问
///
/// 所有语句都带绑定参数执行；调试模式下把语句输出到 `rowcache::sql` 日志目标
pub struct Database {
    conn: DatabaseConnection,
    builder: QueryBuilder,
    debug: bool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.builder.backend())
            .field("debug", &self.debug)
            .finish()
    }
}

impl Database {
    /// 连接数据库
    ///
    /// # 参数
    ///
    /// * `config` - 数据库配置
    /// * `debug` - 是否输出生成的SQL语句
    #[instrument(skip(config, debug), level = "info", name = "init_database")]
    pub async fn connect(config: &DatabaseConfig, debug: bool) -> Result<Self> {
        let url = prepare_connection_string(config.url.expose_secret())?;
        let in_memory = url.starts_with("sqlite:") && url.contains(":memory:");

        let mut opt = ConnectOptions::new(url.clone());
        if in_memory {
            // 每个连接各自拥有一个内存库，只能用单连接
            opt.max_connections(1).min_connections(1);
        } else {
            opt.max_connections(config.max_connections);
        }
        opt.connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .sqlx_logging(debug);

        let conn = sea_orm::Database::connect(opt).await.map_err(|e| {
            CacheError::DatabaseError(format!(
                "Failed to connect to {}: {}",
                redact_url(&url),
                e
            ))
        })?;
        info!("Database connected: {}", redact_url(&url));
        Ok(Self::from_connection(conn, debug))
    }

    /// 使用已建立的连接
    pub fn from_connection(conn: DatabaseConnection, debug: bool) -> Self {
        let builder = QueryBuilder::new(conn.get_database_backend());
        Self {
            conn,
            builder,
            debug,
        }
    }

    /// 数据库方言
    pub fn backend(&self) -> DbBackend {
        self.builder.backend()
    }

    /// 语句构建器
    pub fn query_builder(&self) -> QueryBuilder {
        self.builder
    }

    fn echo(&self, stmt: &Statement) {
        if self.debug {
            info!(target: "rowcache::sql", sql = %stmt.sql, values = ?stmt.values);
        }
    }

    /// 执行语句，返回受影响的行数
    pub async fn execute(&self, stmt: Statement) -> Result<u64> {
        self.echo(&stmt);
        let result = self.conn.execute(stmt).await?;
        Ok(result.rows_affected())
    }

    /// 查询多行
    pub async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>> {
        self.echo(&stmt);
        Ok(self.conn.query_all(stmt).await?)
    }

    /// 以游标方式查询，行在遍历时逐个拉取
    ///
    /// 游标存活期间占用一个连接池连接
    pub async fn stream(&self, stmt: Statement) -> Result<QueryStream> {
        self.echo(&stmt);
        Ok(StreamTrait::stream(&self.conn, stmt).await?)
    }

    /// 查询单行
    pub async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>> {
        self.echo(&stmt);
        Ok(self.conn.query_one(stmt).await?)
    }

    /// 建表（已存在时跳过）
    #[instrument(skip(self, table), level = "debug", fields(table = %table.name))]
    pub async fn create_table(&self, table: &TableInfo) -> Result<()> {
        self.execute(self.builder.create_table(table)).await?;
        debug!("Table {} ready", table.name);
        Ok(())
    }

    /// 插入或更新一行
    #[instrument(skip(self, table, fields), level = "debug", fields(table = %table.name))]
    pub async fn upsert_row(&self, table: &TableInfo, fields: &HashMap<String, String>) -> Result<()> {
        self.execute(self.builder.upsert(table, fields)?).await?;
        Ok(())
    }

    /// 按ID删除一行，返回受影响的行数
    #[instrument(skip(self, table), level = "debug", fields(table = %table.name))]
    pub async fn delete_row(&self, table: &TableInfo, id: &str) -> Result<u64> {
        self.execute(self.builder.delete_by_id(table, id)?).await
    }

    /// 按条件删除，返回受影响的行数
    #[instrument(skip(self, table, values), level = "debug", fields(table = %table.name))]
    pub async fn delete_where(
        &self,
        table: &TableInfo,
        predicate: &str,
        values: Vec<Value>,
    ) -> Result<u64> {
        self.execute(self.builder.delete_where(table, predicate, values))
            .await
    }

    /// 删除表中全部行，返回受影响的行数
    #[instrument(skip(self, table), level = "debug", fields(table = %table.name))]
    pub async fn delete_all_rows(&self, table: &TableInfo) -> Result<u64> {
        self.execute(self.builder.delete_all(table)).await
    }

    /// 按ID查询一行
    #[instrument(skip(self, table), level = "debug", fields(table = %table.name))]
    pub async fn select_by_id(
        &self,
        table: &TableInfo,
        id: &str,
    ) -> Result<Option<HashMap<String, String>>> {
        match self.query_one(self.builder.select_by_id(table, id)?).await? {
            Some(row) => Ok(Some(row_to_map(&row, table)?)),
            None => Ok(None),
        }
    }

    /// 查询全部行
    pub async fn select_all(&self, table: &TableInfo) -> Result<Vec<QueryResult>> {
        self.query_all(self.builder.select_all(table)).await
    }

    /// 查询全部行，返回游标
    pub async fn stream_all(&self, table: &TableInfo) -> Result<QueryStream> {
        self.stream(self.builder.select_all(table)).await
    }

    /// 按条件查询，返回游标
    pub async fn stream_where(
        &self,
        table: &TableInfo,
        predicate: &str,
        values: Vec<Value>,
    ) -> Result<QueryStream> {
        self.stream(self.builder.select_where(table, predicate, values))
            .await
    }

    /// 自定义查询，`{table}` 替换为表名，返回游标
    pub async fn stream_custom(
        &self,
        table: &TableInfo,
        query: &str,
        values: Vec<Value>,
    ) -> Result<QueryStream> {
        self.stream(self.builder.custom(table, query, values))
            .await
    }

    /// 关闭连接
    pub async fn close(self) -> Result<()> {
        self.conn.close().await?;
        info!("Database connection closed");
        Ok(())
    }
}
