//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块按数据库方言生成参数化SQL语句，所有值都通过参数绑定，不拼接进语句文本。

use crate::error::{CacheError, Result};
use crate::schema::{ColumnSchema, FieldKind, TableInfo};
use sea_orm::{DbBackend, Statement, Value};
use std::collections::HashMap;

/// 将字符串值转换为绑定参数
///
/// 可空列上的空字符串转换为对应类型的NULL
///
/// # 参数
///
/// * `column` - 列元数据
/// * `text` - 字符串值，`None` 表示NULL
pub fn to_value(column: &ColumnSchema, text: Option<&str>) -> Result<Value> {
    let text = match text {
        Some("") if column.nullable => None,
        other => other,
    };

    let parse_error = |t: &str, e: std::num::ParseIntError| {
        CacheError::Codec(format!(
            "column {}: cannot bind '{}' as {:?}: {}",
            column.name, t, column.kind, e
        ))
    };

    let value = match column.kind {
        FieldKind::Byte | FieldKind::Short => match text {
            Some(t) => Value::SmallInt(Some(t.trim().parse().map_err(|e| parse_error(t, e))?)),
            None => Value::SmallInt(None),
        },
        FieldKind::Int => match text {
            Some(t) => Value::Int(Some(t.trim().parse().map_err(|e| parse_error(t, e))?)),
            None => Value::Int(None),
        },
        FieldKind::Long => match text {
            Some(t) => Value::BigInt(Some(t.trim().parse().map_err(|e| parse_error(t, e))?)),
            None => Value::BigInt(None),
        },
        FieldKind::Char | FieldKind::Text => match text {
            Some(t) => Value::from(t.to_string()),
            None => Value::String(None),
        },
        FieldKind::Other(_) => {
            column.kind.ensure_supported()?;
            Value::String(None)
        }
    };
    Ok(value)
}

/// 方言相关的语句构建器
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder {
    backend: DbBackend,
}

impl QueryBuilder {
    /// 创建语句构建器
    pub fn new(backend: DbBackend) -> Self {
        Self { backend }
    }

    /// 数据库方言
    pub fn backend(&self) -> DbBackend {
        self.backend
    }

    /// 转义标识符
    pub fn quote(&self, identifier: &str) -> String {
        match self.backend {
            DbBackend::MySql => format!("`{}`", identifier),
            _ => format!("\"{}\"", identifier),
        }
    }

    /// 第 `index` 个参数占位符（从1开始）
    pub fn placeholder(&self, index: usize) -> String {
        match self.backend {
            DbBackend::Postgres => format!("${}", index),
            _ => "?".to_string(),
        }
    }

    fn placeholders(&self, from: usize, count: usize) -> String {
        (from..from + count)
            .map(|i| self.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// 列定义
    ///
    /// MySQL直接使用注册时组合的类型文本；其他方言把自增改写为各自的语法
    pub fn column_definition(&self, column: &ColumnSchema) -> String {
        let definition = match self.backend {
            DbBackend::MySql => column.sql_creation.clone(),
            DbBackend::Postgres if column.auto_increment => column
                .sql_creation
                .replace(" AUTO_INCREMENT", " GENERATED BY DEFAULT AS IDENTITY"),
            _ => column.sql_creation.replace(" AUTO_INCREMENT", ""),
        };
        format!("{} {}", self.quote(&column.name), definition)
    }

    /// `CREATE TABLE IF NOT EXISTS` 语句
    pub fn create_table(&self, table: &TableInfo) -> Statement {
        let mut definitions: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();
        definitions.push(format!(
            "PRIMARY KEY ({})",
            self.quote(&table.id_column().name)
        ));
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.quote(&table.name),
            definitions.join(", ")
        );
        Statement::from_string(self.backend, sql)
    }

    /// 插入或更新一行
    ///
    /// 只写入映射中存在的列，ID列必须存在且非空
    pub fn upsert(&self, table: &TableInfo, fields: &HashMap<String, String>) -> Result<Statement> {
        let id_column = table.id_column();
        match fields.get(&id_column.name) {
            Some(id) if !id.is_empty() => {}
            _ => {
                return Err(CacheError::InvalidId(format!(
                    "{}.{} is missing from the row",
                    table.name, id_column.name
                )))
            }
        }

        let mut names = Vec::new();
        let mut updates = Vec::new();
        let mut values = Vec::new();
        for column in &table.columns {
            let Some(text) = fields.get(&column.name) else {
                continue;
            };
            let quoted = self.quote(&column.name);
            if !column.id {
                updates.push(match self.backend {
                    DbBackend::MySql => format!("{} = VALUES({})", quoted, quoted),
                    _ => format!("{} = excluded.{}", quoted, quoted),
                });
            }
            names.push(quoted);
            values.push(to_value(column, Some(text))?);
        }

        let quoted_id = self.quote(&id_column.name);
        let conflict = match (self.backend, updates.is_empty()) {
            (DbBackend::MySql, true) => {
                format!("ON DUPLICATE KEY UPDATE {} = {}", quoted_id, quoted_id)
            }
            (DbBackend::MySql, false) => format!("ON DUPLICATE KEY UPDATE {}", updates.join(", ")),
            (_, true) => format!("ON CONFLICT ({}) DO NOTHING", quoted_id),
            (_, false) => format!(
                "ON CONFLICT ({}) DO UPDATE SET {}",
                quoted_id,
                updates.join(", ")
            ),
        };

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) {}",
            self.quote(&table.name),
            names.join(", "),
            self.placeholders(1, values.len()),
            conflict
        );
        Ok(Statement::from_sql_and_values(self.backend, sql, values))
    }

    /// 按ID删除一行
    pub fn delete_by_id(&self, table: &TableInfo, id: &str) -> Result<Statement> {
        let id_column = table.id_column();
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            self.quote(&table.name),
            self.quote(&id_column.name),
            self.placeholder(1)
        );
        let value = to_value(id_column, Some(id))?;
        Ok(Statement::from_sql_and_values(self.backend, sql, [value]))
    }

    /// 按条件删除
    ///
    /// `predicate` 为 `WHERE` 之后的条件文本，参数通过 `values` 绑定
    pub fn delete_where(&self, table: &TableInfo, predicate: &str, values: Vec<Value>) -> Statement {
        let sql = format!("DELETE FROM {} WHERE {}", self.quote(&table.name), predicate);
        Statement::from_sql_and_values(self.backend, sql, values)
    }

    /// 删除全部行
    pub fn delete_all(&self, table: &TableInfo) -> Statement {
        let sql = format!("DELETE FROM {}", self.quote(&table.name));
        Statement::from_string(self.backend, sql)
    }

    fn select_columns(&self, table: &TableInfo) -> String {
        table
            .columns
            .iter()
            .map(|c| self.quote(&c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// 按ID查询一行
    pub fn select_by_id(&self, table: &TableInfo, id: &str) -> Result<Statement> {
        let id_column = table.id_column();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {} LIMIT 1",
            self.select_columns(table),
            self.quote(&table.name),
            self.quote(&id_column.name),
            self.placeholder(1)
        );
        let value = to_value(id_column, Some(id))?;
        Ok(Statement::from_sql_and_values(self.backend, sql, [value]))
    }

    /// 查询全部行
    pub fn select_all(&self, table: &TableInfo) -> Statement {
        let sql = format!(
            "SELECT {} FROM {}",
            self.select_columns(table),
            self.quote(&table.name)
        );
        Statement::from_string(self.backend, sql)
    }

    /// 按条件查询
    ///
    /// `predicate` 为 `WHERE` 之后的条件文本，参数通过 `values` 绑定
    pub fn select_where(&self, table: &TableInfo, predicate: &str, values: Vec<Value>) -> Statement {
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            self.select_columns(table),
            self.quote(&table.name),
            predicate
        );
        Statement::from_sql_and_values(self.backend, sql, values)
    }

    /// 自定义查询，`{table}` 替换为转义后的表名
    pub fn custom(&self, table: &TableInfo, query: &str, values: Vec<Value>) -> Statement {
        let sql = query.replace("{table}", &self.quote(&table.name));
        Statement::from_sql_and_values(self.backend, sql, values)
    }
}
