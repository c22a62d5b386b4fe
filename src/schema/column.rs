//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了列声明、列元数据以及字段访问器表。

use crate::error::{CacheError, Result};
use std::fmt;
use std::sync::Arc;

/// 字段值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// i8
    Byte,
    /// 单个字符
    Char,
    /// i16
    Short,
    /// i32
    Int,
    /// i64
    Long,
    /// 字符串
    Text,
    /// 编解码器不支持的类型（携带类型名）
    Other(&'static str),
}

impl FieldKind {
    /// 是否为整数类型
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldKind::Byte | FieldKind::Short | FieldKind::Int | FieldKind::Long
        )
    }

    /// 不支持的类型返回 `UnsupportedType`
    pub fn ensure_supported(&self) -> Result<()> {
        match self {
            FieldKind::Other(type_name) => Err(CacheError::UnsupportedType(format!(
                "{} type is not supported",
                type_name
            ))),
            _ => Ok(()),
        }
    }
}

/// 可作为实体字段的值类型
///
/// 字符串表示用于Redis哈希和SQL参数。`HOLDS_NONE` 为 false 的类型
/// （如裸 `i32`）无法表示空值，注册时会被拒绝。
pub trait FieldType: Send + Sync + 'static {
    /// 值类型
    const KIND: FieldKind;
    /// 是否可以表示"无值"
    const HOLDS_NONE: bool;

    /// 转换为字符串，`None` 表示无值
    fn to_text(&self) -> Option<String>;

    /// 从字符串解析，`None` 表示无值
    fn from_text(text: Option<&str>) -> Result<Self>
    where
        Self: Sized;
}

fn parse_error(text: &str, type_name: &str, reason: impl fmt::Display) -> CacheError {
    CacheError::Codec(format!("cannot parse '{}' as {}: {}", text, type_name, reason))
}

macro_rules! impl_numeric_field {
    ($ty:ty, $kind:expr) => {
        impl FieldType for Option<$ty> {
            const KIND: FieldKind = $kind;
            const HOLDS_NONE: bool = true;

            fn to_text(&self) -> Option<String> {
                self.map(|value| value.to_string())
            }

            fn from_text(text: Option<&str>) -> Result<Self> {
                text.map(|t| {
                    t.trim()
                        .parse::<$ty>()
                        .map_err(|e| parse_error(t, stringify!($ty), e))
                })
                .transpose()
            }
        }

        impl FieldType for $ty {
            const KIND: FieldKind = $kind;
            const HOLDS_NONE: bool = false;

            fn to_text(&self) -> Option<String> {
                Some(self.to_string())
            }

            fn from_text(text: Option<&str>) -> Result<Self> {
                let t = text.ok_or_else(|| {
                    CacheError::Codec(format!("missing value for {}", stringify!($ty)))
                })?;
                t.trim()
                    .parse::<$ty>()
                    .map_err(|e| parse_error(t, stringify!($ty), e))
            }
        }
    };
}

impl_numeric_field!(i8, FieldKind::Byte);
impl_numeric_field!(i16, FieldKind::Short);
impl_numeric_field!(i32, FieldKind::Int);
impl_numeric_field!(i64, FieldKind::Long);

fn first_char(text: &str) -> Result<char> {
    text.chars()
        .next()
        .ok_or_else(|| parse_error(text, "char", "empty string"))
}

impl FieldType for Option<char> {
    const KIND: FieldKind = FieldKind::Char;
    const HOLDS_NONE: bool = true;

    fn to_text(&self) -> Option<String> {
        self.map(|c| c.to_string())
    }

    fn from_text(text: Option<&str>) -> Result<Self> {
        text.map(first_char).transpose()
    }
}

impl FieldType for char {
    const KIND: FieldKind = FieldKind::Char;
    const HOLDS_NONE: bool = false;

    fn to_text(&self) -> Option<String> {
        Some(self.to_string())
    }

    fn from_text(text: Option<&str>) -> Result<Self> {
        first_char(text.unwrap_or_default())
    }
}

impl FieldType for Option<String> {
    const KIND: FieldKind = FieldKind::Text;
    const HOLDS_NONE: bool = true;

    fn to_text(&self) -> Option<String> {
        self.clone()
    }

    fn from_text(text: Option<&str>) -> Result<Self> {
        Ok(text.map(str::to_string))
    }
}

impl FieldType for String {
    const KIND: FieldKind = FieldKind::Text;
    const HOLDS_NONE: bool = false;

    fn to_text(&self) -> Option<String> {
        Some(self.clone())
    }

    fn from_text(text: Option<&str>) -> Result<Self> {
        Ok(text.unwrap_or_default().to_string())
    }
}

type ReadFn<E> = dyn Fn(&E) -> Option<String> + Send + Sync;
type StageFn<E> = dyn Fn(Option<&str>) -> Result<StagedWrite<E>> + Send + Sync;

/// 已解析但尚未写入实体的字段值
pub struct StagedWrite<E> {
    apply: Box<dyn FnOnce(&mut E) + Send>,
}

impl<E> StagedWrite<E> {
    /// 写入实体
    pub fn apply(self, entity: &mut E) {
        (self.apply)(entity)
    }
}

/// 字段访问器
///
/// 注册时由类型化的 getter 生成，之后按列读写实体字段
pub struct FieldAccessor<E> {
    read: Arc<ReadFn<E>>,
    stage: Arc<StageFn<E>>,
}

impl<E> Clone for FieldAccessor<E> {
    fn clone(&self) -> Self {
        Self {
            read: self.read.clone(),
            stage: self.stage.clone(),
        }
    }
}

impl<E: 'static> FieldAccessor<E> {
    fn new<T: FieldType>(get: fn(&E) -> &T, get_mut: fn(&mut E) -> &mut T) -> Self {
        Self {
            read: Arc::new(move |entity: &E| get(entity).to_text()),
            stage: Arc::new(move |text: Option<&str>| -> Result<StagedWrite<E>> {
                let value = T::from_text(text)?;
                Ok(StagedWrite {
                    apply: Box::new(move |entity: &mut E| *get_mut(entity) = value),
                })
            }),
        }
    }
}

impl<E> FieldAccessor<E> {
    /// 读取字段的字符串表示
    pub fn read(&self, entity: &E) -> Option<String> {
        (self.read)(entity)
    }

    /// 解析字段值，不修改实体
    pub fn stage(&self, text: Option<&str>) -> Result<StagedWrite<E>> {
        (self.stage)(text)
    }

    /// 解析并写入字段
    pub fn write(&self, entity: &mut E, text: Option<&str>) -> Result<()> {
        self.stage(text)?.apply(entity);
        Ok(())
    }
}

/// 列声明
///
/// 调用方在注册实体类型时提供，描述一个字段如何映射到存储列
pub struct ColumnDecl<E> {
    pub(crate) field_name: String,
    pub(crate) name: Option<String>,
    pub(crate) sql_type: String,
    pub(crate) length: u32,
    pub(crate) default_value: Option<String>,
    pub(crate) id: bool,
    pub(crate) auto_increment: bool,
    pub(crate) nullable: bool,
    pub(crate) kind: FieldKind,
    pub(crate) holds_none: bool,
    pub(crate) type_name: &'static str,
    pub(crate) accessor: FieldAccessor<E>,
}

impl<E: 'static> ColumnDecl<E> {
    /// 创建列声明
    ///
    /// # 参数
    ///
    /// * `field_name` - 字段名（存储列名默认与其相同）
    /// * `sql_type` - SQL基础类型，如 `VARCHAR`、`TINYINT`
    /// * `get` - 返回字段引用的函数
    /// * `get_mut` - 返回字段可变引用的函数
    pub fn new<T: FieldType>(
        field_name: &str,
        sql_type: &str,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> Self {
        Self {
            field_name: field_name.to_string(),
            name: None,
            sql_type: sql_type.to_string(),
            length: 0,
            default_value: None,
            id: false,
            auto_increment: false,
            nullable: false,
            kind: T::KIND,
            holds_none: T::HOLDS_NONE,
            type_name: std::any::type_name::<T>(),
            accessor: FieldAccessor::new(get, get_mut),
        }
    }

    /// 设置存储列名
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// 设置类型长度，如 `VARCHAR(36)`
    pub fn length(mut self, length: u32) -> Self {
        self.length = length;
        self
    }

    /// 设置默认值
    pub fn default_value(mut self, value: &str) -> Self {
        self.default_value = Some(value.to_string());
        self
    }

    /// 标记为ID列
    pub fn id(mut self) -> Self {
        self.id = true;
        self
    }

    /// 标记为自增列（仅ID列可用）
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// 允许为空
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// 列元数据
///
/// 注册时构建，之后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    /// 实体字段名
    pub field_name: String,
    /// 存储列名（Redis哈希字段名和SQL列名）
    pub name: String,
    /// SQL基础类型
    pub sql_type: String,
    /// 类型长度，0表示未指定
    pub length: u32,
    /// 默认值
    pub default_value: Option<String>,
    /// 是否为ID列
    pub id: bool,
    /// 是否自增
    pub auto_increment: bool,
    /// 是否允许为空
    pub nullable: bool,
    /// 字段值类型
    pub kind: FieldKind,
    /// 建表时使用的列定义文本
    pub sql_creation: String,
}

impl ColumnSchema {
    pub(crate) fn from_decl<E>(decl: &ColumnDecl<E>) -> Self {
        let name = decl
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| decl.field_name.clone());
        let default_value = decl.default_value.clone().filter(|v| !v.is_empty());

        let mut sql_creation = decl.sql_type.clone();
        if decl.length > 0 {
            sql_creation.push_str(&format!("({})", decl.length));
        }
        if !decl.nullable {
            sql_creation.push_str(" NOT NULL");
        }
        if decl.auto_increment {
            sql_creation.push_str(" AUTO_INCREMENT");
        }
        if let Some(default) = &default_value {
            sql_creation.push_str(&format!(" DEFAULT '{}'", default.replace('\'', "''")));
        }

        Self {
            field_name: decl.field_name.clone(),
            name,
            sql_type: decl.sql_type.clone(),
            length: decl.length,
            default_value,
            id: decl.id,
            auto_increment: decl.auto_increment,
            nullable: decl.nullable,
            kind: decl.kind,
            sql_creation,
        }
    }
}
