//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块负责实体字段值与字符串映射之间的转换，缓存哈希和数据库参数共用此表示。

use crate::error::{CacheError, Result};
use crate::schema::StructSchema;
use std::collections::HashMap;

/// 将实体编码为 存储列名 → 字符串 的映射
///
/// 空值（包括空字符串）在 `ignore_null_fields` 为 true 时跳过，否则使用列默认值；
/// 没有默认值时，可空列写入空字符串，非空列返回 `ConfigError`。
///
/// # 参数
///
/// * `entity` - 要编码的实体
/// * `schema` - 实体结构
/// * `ignore_null_fields` - 是否跳过空值字段
pub fn encode<E>(
    entity: &E,
    schema: &StructSchema<E>,
    ignore_null_fields: bool,
) -> Result<HashMap<String, String>> {
    let mut map = HashMap::with_capacity(schema.table().columns.len());

    for (column, accessor) in schema.fields() {
        column.kind.ensure_supported()?;

        let value = accessor.read(entity).filter(|v| !v.is_empty());
        let value = match value {
            Some(value) => value,
            None if ignore_null_fields => continue,
            None => match &column.default_value {
                Some(default) => default.clone(),
                None if column.nullable => String::new(),
                None => {
                    return Err(CacheError::ConfigError(format!(
                        "{}.{} is null, not nullable and has no default value",
                        schema.name(),
                        column.name
                    )))
                }
            },
        };
        map.insert(column.name.clone(), value);
    }

    Ok(map)
}

/// 将字符串映射解码到实体字段
///
/// 可空列的缺失值或空字符串解码为 `None`；非空列缺失时返回 `Codec` 错误。
/// 所有字段解析成功后才写入实体，失败时实体保持不变。
///
/// # 参数
///
/// * `map` - 存储列名 → 字符串 的映射
/// * `entity` - 要写入的实体
/// * `schema` - 实体结构
pub fn decode<E>(
    map: &HashMap<String, String>,
    entity: &mut E,
    schema: &StructSchema<E>,
) -> Result<()> {
    let mut staged = Vec::with_capacity(schema.table().columns.len());
    for (column, accessor) in schema.fields() {
        column.kind.ensure_supported()?;

        let value = map.get(&column.name).map(String::as_str);
        let value = match value {
            Some("") if column.nullable => None,
            Some(value) => Some(value),
            None if column.nullable => None,
            None => {
                return Err(CacheError::Codec(format!(
                    "{}.{} is missing and not nullable",
                    schema.name(),
                    column.name
                )))
            }
        };
        staged.push(accessor.stage(value)?);
    }

    for write in staged {
        write.apply(entity);
    }
    Ok(())
}
