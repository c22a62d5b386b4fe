//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步引擎的指标收集功能。指标归上下文所有，不使用全局实例。

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{span, Level};

/// 同步结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// 进入待同步队列
    Enqueued,
    /// 写入数据库成功
    Synchronized,
    /// 同步失败被丢弃
    Dropped,
}

impl SyncOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Enqueued => "enqueued",
            SyncOutcome::Synchronized => "synchronized",
            SyncOutcome::Dropped => "dropped",
        }
    }
}

/// 指标收集器
///
/// 用于收集同步引擎的运行时指标
#[derive(Clone, Debug, Default)]
pub struct SyncMetrics {
    /// 同步条目统计
    /// key: "entity:operation:outcome"
    pub entries_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 刷新耗时（累积秒数和次数）
    pub flush_duration: Arc<Mutex<(f64, u64)>>,
    /// 最近一次观察到的待同步队列长度
    pub pending_size: Arc<Mutex<usize>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyncMetrics {
    /// 记录同步条目
    ///
    /// # 参数
    ///
    /// * `entity` - 实体类型名
    /// * `operation` - 操作类型（upsert/delete/delete_all）
    /// * `outcome` - 结果
    pub fn record_entry(&self, entity: &str, operation: &str, outcome: SyncOutcome) {
        let span = span!(Level::TRACE, "sync_entry", entity, operation, outcome = outcome.as_str());
        let _enter = span.enter();
        let key = format!("{}:{}:{}", entity, operation, outcome.as_str());
        *locked(&self.entries_total).entry(key).or_insert(0) += 1;
    }

    /// 记录一次刷新耗时
    pub fn record_flush(&self, duration_secs: f64) {
        let mut flush = locked(&self.flush_duration);
        flush.0 += duration_secs;
        flush.1 += 1;
    }

    /// 设置待同步队列长度
    pub fn set_pending_size(&self, size: usize) {
        *locked(&self.pending_size) = size;
    }

    fn total(&self, outcome: SyncOutcome) -> u64 {
        let suffix = format!(":{}", outcome.as_str());
        locked(&self.entries_total)
            .iter()
            .filter(|(k, _)| k.ends_with(&suffix))
            .map(|(_, v)| *v)
            .sum()
    }

    /// 入队总数
    pub fn enqueued_total(&self) -> u64 {
        self.total(SyncOutcome::Enqueued)
    }

    /// 同步成功总数
    pub fn synchronized_total(&self) -> u64 {
        self.total(SyncOutcome::Synchronized)
    }

    /// 同步失败丢弃总数
    pub fn dropped_total(&self) -> u64 {
        self.total(SyncOutcome::Dropped)
    }

    /// 完成的刷新次数
    pub fn flush_count(&self) -> u64 {
        locked(&self.flush_duration).1
    }

    /// 获取指标字符串
    ///
    /// 将所有指标格式化为文本，用于监控系统采集
    pub fn render(&self) -> String {
        let entries: BTreeMap<String, u64> = locked(&self.entries_total)
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        let (total, count) = *locked(&self.flush_duration);
        let pending = *locked(&self.pending_size);

        let mut output = String::new();
        for (k, v) in entries.iter() {
            let parts: Vec<&str> = k.split(':').collect();
            if parts.len() == 3 {
                output.push_str(&format!(
                    "rowcache_sync_entries_total{{entity=\"{}\", operation=\"{}\", outcome=\"{}\"}} {}\n",
                    parts[0], parts[1], parts[2], v
                ));
            }
        }
        output.push_str(&format!("rowcache_flush_duration_seconds_sum {}\n", total));
        output.push_str(&format!("rowcache_flush_duration_seconds_count {}\n", count));
        output.push_str(&format!("rowcache_sync_pending_size {}\n", pending));
        output
    }
}
