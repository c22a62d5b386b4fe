//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了实体结构注册表，负责验证并保存每种实体类型的列元数据。

pub mod column;

pub use column::{ColumnDecl, ColumnSchema, FieldAccessor, FieldKind, FieldType, StagedWrite};

use crate::error::{CacheError, Result};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// 表信息
///
/// 实体结构中与具体类型无关的部分，供数据库层和同步引擎使用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// 实体类型名（表名和缓存键前缀）
    pub name: String,
    /// 按声明顺序排列的列
    pub columns: Vec<ColumnSchema>,
    /// ID列在 `columns` 中的位置
    pub id_index: usize,
}

impl TableInfo {
    /// ID列
    pub fn id_column(&self) -> &ColumnSchema {
        &self.columns[self.id_index]
    }

    /// 按存储列名查找列
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// 实体的缓存键：`实体名:ID值`
    pub fn cache_key(&self, id: &str) -> String {
        format!("{}:{}", self.name, id)
    }

    /// 匹配该实体全部缓存键的模式
    pub fn key_pattern(&self) -> String {
        format!("{}:*", self.name)
    }
}

/// 实体结构
///
/// 表信息加上按列排列的字段访问器表
pub struct StructSchema<E> {
    table: Arc<TableInfo>,
    accessors: Vec<FieldAccessor<E>>,
}

impl<E> StructSchema<E> {
    /// 实体类型名
    pub fn name(&self) -> &str {
        &self.table.name
    }

    /// 表信息
    pub fn table(&self) -> &Arc<TableInfo> {
        &self.table
    }

    /// 列及其访问器
    pub fn fields(&self) -> impl Iterator<Item = (&ColumnSchema, &FieldAccessor<E>)> {
        self.table.columns.iter().zip(self.accessors.iter())
    }

    /// ID列及其访问器
    pub fn id_field(&self) -> (&ColumnSchema, &FieldAccessor<E>) {
        let index = self.table.id_index;
        (&self.table.columns[index], &self.accessors[index])
    }

    /// 读取实体的ID值，缺失或为空时返回 `InvalidId`
    pub fn id_value(&self, entity: &E) -> Result<String> {
        let (column, accessor) = self.id_field();
        match accessor.read(entity) {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(CacheError::InvalidId(format!(
                "{}.{} is empty",
                self.table.name, column.name
            ))),
        }
    }
}

/// 验证SQL标识符
///
/// 标识符只能包含ASCII字母、数字和下划线，且必须以字母或下划线开头
pub(crate) fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty() {
        return Err(CacheError::ConfigError(
            "Identifier cannot be empty".to_string(),
        ));
    }

    // 检查长度限制
    if identifier.len() > 64 {
        return Err(CacheError::ConfigError(format!(
            "Identifier '{}' exceeds maximum length of 64 characters",
            identifier
        )));
    }

    let mut chars = identifier.chars();
    if let Some(first) = chars.next() {
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(CacheError::ConfigError(format!(
                "Invalid identifier '{}': must start with a letter or underscore",
                identifier
            )));
        }
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(CacheError::ConfigError(format!(
            "Invalid identifier '{}': only alphanumeric characters and underscores are allowed",
            identifier
        )));
    }

    Ok(())
}

struct RegisteredStruct {
    table: Arc<TableInfo>,
    schema: Arc<dyn Any + Send + Sync>,
}

/// 实体结构注册表
///
/// 启动时填充，交给上下文后只读
#[derive(Default)]
pub struct Registry {
    structs: HashMap<TypeId, RegisteredStruct>,
}

impl Registry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册实体类型
    ///
    /// 同一类型重复注册会替换原有结构
    ///
    /// # 参数
    ///
    /// * `name` - 实体类型名，同时作为表名和缓存键前缀
    /// * `declarations` - 按顺序排列的列声明
    ///
    /// # 返回值
    ///
    /// 声明有误时返回 `ConfigError`
    pub fn register<E>(&mut self, name: &str, declarations: Vec<ColumnDecl<E>>) -> Result<()>
    where
        E: Send + Sync + 'static,
    {
        validate_identifier(name)?;

        let type_id = TypeId::of::<E>();
        if let Some((_, other)) = self
            .structs
            .iter()
            .find(|(id, s)| **id != type_id && s.table.name == name)
        {
            return Err(CacheError::ConfigError(format!(
                "Struct name '{}' is already used by another type",
                other.table.name
            )));
        }

        let mut columns = Vec::with_capacity(declarations.len());
        let mut accessors = Vec::with_capacity(declarations.len());
        let mut id_index = None;

        for decl in declarations {
            let column = ColumnSchema::from_decl(&decl);
            validate_identifier(&column.name)?;

            if !decl.holds_none {
                return Err(CacheError::ConfigError(format!(
                    "{}.{}: field type {} cannot hold a missing value, use Option<_>",
                    name, decl.field_name, decl.type_name
                )));
            }

            if column.auto_increment && !column.id {
                return Err(CacheError::ConfigError(format!(
                    "{}.{}: auto increment is only allowed on the id column",
                    name, column.field_name
                )));
            }

            if columns.iter().any(|c: &ColumnSchema| c.name == column.name) {
                return Err(CacheError::ConfigError(format!(
                    "{}: duplicate column '{}'",
                    name, column.name
                )));
            }

            if column.id {
                if id_index.is_some() {
                    return Err(CacheError::ConfigError(format!(
                        "{}: more than one id column declared",
                        name
                    )));
                }
                if column.nullable {
                    return Err(CacheError::ConfigError(format!(
                        "{}.{}: the id column cannot be nullable",
                        name, column.field_name
                    )));
                }
                id_index = Some(columns.len());
            }

            debug!("{}.{} -> {}", name, column.name, column.sql_creation);
            columns.push(column);
            accessors.push(decl.accessor);
        }

        let id_index = id_index.ok_or_else(|| {
            CacheError::ConfigError(format!("{}: no id column declared", name))
        })?;

        let table = Arc::new(TableInfo {
            name: name.to_string(),
            columns,
            id_index,
        });
        let schema: Arc<StructSchema<E>> = Arc::new(StructSchema {
            table: table.clone(),
            accessors,
        });

        if self
            .structs
            .insert(type_id, RegisteredStruct { table, schema })
            .is_some()
        {
            info!("Struct {} re-registered, previous schema replaced", name);
        } else {
            info!("Struct {} registered", name);
        }
        Ok(())
    }

    /// 获取实体类型的结构
    ///
    /// # 返回值
    ///
    /// 未注册时返回 `NotRegistered`
    pub fn schema<E>(&self) -> Result<Arc<StructSchema<E>>>
    where
        E: Send + Sync + 'static,
    {
        self.structs
            .get(&TypeId::of::<E>())
            .and_then(|s| s.schema.clone().downcast::<StructSchema<E>>().ok())
            .ok_or_else(|| CacheError::NotRegistered(std::any::type_name::<E>().to_string()))
    }

    /// 所有已注册实体的表信息
    pub fn tables(&self) -> Vec<Arc<TableInfo>> {
        let mut tables: Vec<_> = self.structs.values().map(|s| s.table.clone()).collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        tables
    }

    /// 已注册实体数量
    pub fn len(&self) -> usize {
        self.structs.len()
    }

    /// 注册表是否为空
    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }
}
