//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块把查询结果行转换为 存储列名 → 字符串 的映射。

use crate::error::Result;
use crate::schema::{FieldKind, TableInfo};
use sea_orm::{DbErr, QueryResult};
use std::collections::HashMap;

/// 读取整数列，依次尝试各宽度的整数类型
fn read_integer(row: &QueryResult, column: &str) -> std::result::Result<Option<i64>, DbErr> {
    row.try_get::<Option<i64>>("", column)
        .or_else(|_| {
            row.try_get::<Option<i32>>("", column)
                .map(|v| v.map(i64::from))
        })
        .or_else(|_| {
            row.try_get::<Option<i16>>("", column)
                .map(|v| v.map(i64::from))
        })
}

/// 将一行转换为字符串映射
///
/// 数据库中的NULL视为缺失，不写入映射
///
/// # 参数
///
/// * `row` - 查询结果行
/// * `table` - 表信息
pub fn row_to_map(row: &QueryResult, table: &TableInfo) -> Result<HashMap<String, String>> {
    let mut map = HashMap::with_capacity(table.columns.len());
    for column in &table.columns {
        let value = match column.kind {
            kind if kind.is_integer() => read_integer(row, &column.name)?.map(|v| v.to_string()),
            FieldKind::Char | FieldKind::Text => row.try_get::<Option<String>>("", &column.name)?,
            kind => {
                kind.ensure_supported()?;
                None
            }
        };
        if let Some(value) = value {
            map.insert(column.name.clone(), value);
        }
    }
    Ok(map)
}
