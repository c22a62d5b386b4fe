//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了数据访问层和同步引擎的错误类型。

use thiserror::Error;

/// 错误类型枚举
///
/// 公共操作不会panic，所有失败都以此类型返回（并记录日志）
#[derive(Error, Debug)]
pub enum CacheError {
    /// ID列的值缺失或为空
    #[error("Invalid id value: {0}")]
    InvalidId(String),

    /// 实体类型没有注册结构
    #[error("Struct not registered: {0}")]
    NotRegistered(String),

    /// 同步器已开始关闭，拒绝需要同步的修改
    #[error("Synchronizer is shutting down: {0}")]
    ShuttingDown(String),

    /// 字段类型不受编解码器支持
    #[error("Unsupported field type: {0}")]
    UnsupportedType(String),

    /// 配置错误（结构声明错误、配置文件错误）
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 字段编解码错误
    #[error("Codec error: {0}")]
    Codec(String),

    /// Redis错误
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// Sea-ORM数据库错误
    #[error("Sea-ORM error: {0}")]
    SeaOrmError(#[from] sea_orm::DbErr),

    /// 数据库连接或执行错误
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// 缓存后端错误
    #[error("Backend error: {0}")]
    BackendError(String),

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// 关闭错误
    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, CacheError>;
