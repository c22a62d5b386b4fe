//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步器：收集缓存修改、按行去重，并以有界并行度分批写入持久存储。

use crate::error::{CacheError, Result};
use crate::metrics::{SyncMetrics, SyncOutcome};
use crate::sync::entry::{ModifiedEntry, Operation};
use crate::sync::task::SyncTarget;
use futures::future::join_all;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{watch, RwLock, RwLockReadGuard};
use tracing::{debug, error, info, instrument};

/// 同步器阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// 空闲
    Idle,
    /// 正在刷新
    Flushing,
}

/// 一次刷新的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// 没有待同步条目
    Empty,
    /// 已有刷新在进行
    Busy,
    /// 所有条目已处理
    Drained {
        /// 成功写入的条目数
        synchronized: usize,
        /// 失败丢弃的条目数
        dropped: usize,
    },
}

#[derive(Default)]
struct SyncState {
    /// 新到达的条目，按行去重
    pending: Vec<ModifiedEntry>,
    /// 本次刷新正在处理的条目
    inflight: VecDeque<ModifiedEntry>,
    flushing: bool,
}

/// 同步器
///
/// 队列状态由互斥锁保护，锁从不跨越await持有；任务派发在锁外进行
pub struct Synchronizer {
    state: Mutex<SyncState>,
    shutting_down: AtomicBool,
    /// 写入方在修改缓存到入队之间持有读锁，关闭时取写锁等待它们完成
    admission: RwLock<()>,
    phase: watch::Sender<SyncPhase>,
    target: Arc<dyn SyncTarget>,
    parallelism: usize,
    metrics: SyncMetrics,
}

/// 写入许可
///
/// 由 [`Synchronizer::admit`] 获得，入队不会因关闭而失败
pub struct Admission<'a> {
    synchronizer: &'a Synchronizer,
    _guard: RwLockReadGuard<'a, ()>,
}

impl Admission<'_> {
    /// 加入待同步条目并释放许可
    pub fn enqueue(self, entry: ModifiedEntry) {
        let mut state = self.synchronizer.state();
        self.synchronizer.push_entry(&mut state, entry);
    }
}

/// 刷新结束（或被中途丢弃）时恢复空闲状态，未处理完的条目留给下一次刷新
struct FlushGuard<'a> {
    synchronizer: &'a Synchronizer,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.synchronizer.state();
        state.flushing = false;
        self.synchronizer.metrics.set_pending_size(state.pending.len());
        self.synchronizer.phase.send_replace(SyncPhase::Idle);
    }
}

impl Synchronizer {
    /// 创建同步器
    ///
    /// # 参数
    ///
    /// * `target` - 同步目标
    /// * `parallelism` - 同时执行的任务数上限
    /// * `metrics` - 指标收集器
    pub fn new(target: Arc<dyn SyncTarget>, parallelism: usize, metrics: SyncMetrics) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            state: Mutex::new(SyncState::default()),
            shutting_down: AtomicBool::new(false),
            admission: RwLock::new(()),
            phase,
            target,
            parallelism: parallelism.max(1),
            metrics,
        }
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 是否已开始关闭
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// 当前阶段
    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    /// 待同步条目数
    pub fn pending_len(&self) -> usize {
        self.state().pending.len()
    }

    /// 待同步条目快照
    pub fn pending_entries(&self) -> Vec<ModifiedEntry> {
        self.state().pending.clone()
    }

    /// 任务并行度
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// 指标收集器
    pub fn metrics(&self) -> &SyncMetrics {
        &self.metrics
    }

    /// 加入待同步条目
    ///
    /// 同一实体同一ID的旧条目被移除（不论操作类型），新条目追加到末尾；
    /// `DeleteAll` 会移除该实体的全部待同步条目。
    ///
    /// # 返回值
    ///
    /// 关闭开始后返回 `ShuttingDown`
    pub fn add_modified_key(&self, entry: ModifiedEntry) -> Result<()> {
        let mut state = self.state();
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(CacheError::ShuttingDown(format!("{} rejected", entry)));
        }
        self.push_entry(&mut state, entry);
        Ok(())
    }

    /// 申请写入许可
    ///
    /// 许可存活期间关闭会等待，许可内的条目一定进入最后一次刷新。
    ///
    /// # 返回值
    ///
    /// 关闭已开始时返回 `None`
    pub async fn admit(&self) -> Option<Admission<'_>> {
        let guard = self.admission.read().await;
        if self.shutting_down.load(Ordering::SeqCst) {
            return None;
        }
        Some(Admission {
            synchronizer: self,
            _guard: guard,
        })
    }

    fn push_entry(&self, state: &mut SyncState, entry: ModifiedEntry) {
        match entry.operation {
            Operation::DeleteAll => state.pending.retain(|e| e.entity() != entry.entity()),
            Operation::Upsert | Operation::Delete => state.pending.retain(|e| !e.same_row(&entry)),
        }

        self.metrics.record_entry(
            entry.entity(),
            entry.operation.as_str(),
            SyncOutcome::Enqueued,
        );
        state.pending.push(entry);
        self.metrics.set_pending_size(state.pending.len());
    }

    /// 从处理中队列取出下一批
    ///
    /// 一批最多 `parallelism` 个条目；`DeleteAll` 不与同一实体的其他条目同批
    fn next_batch(&self) -> Vec<ModifiedEntry> {
        let mut state = self.state();
        let mut batch: Vec<ModifiedEntry> = Vec::with_capacity(self.parallelism);
        while batch.len() < self.parallelism {
            let Some(next) = state.inflight.front() else {
                break;
            };
            let conflicts = batch.iter().any(|e| {
                e.entity() == next.entity()
                    && (e.operation == Operation::DeleteAll || next.operation == Operation::DeleteAll)
            });
            if conflicts {
                break;
            }
            if let Some(entry) = state.inflight.pop_front() {
                batch.push(entry);
            }
        }
        batch
    }

    /// 刷新
    ///
    /// 空闲且有待同步条目时，把全部条目移入处理中队列，逐批执行直到处理完毕
    #[instrument(skip(self), level = "debug")]
    pub async fn flush(&self) -> FlushOutcome {
        {
            let mut state = self.state();
            if state.flushing {
                return FlushOutcome::Busy;
            }
            if state.pending.is_empty() && state.inflight.is_empty() {
                return FlushOutcome::Empty;
            }
            let pending = std::mem::take(&mut state.pending);
            state.inflight.extend(pending);
            state.flushing = true;
            self.metrics.set_pending_size(0);
            self.phase.send_replace(SyncPhase::Flushing);
        }
        let _guard = FlushGuard { synchronizer: self };

        let started = Instant::now();
        let mut synchronized = 0;
        let mut dropped = 0;

        loop {
            let batch = self.next_batch();
            if batch.is_empty() {
                break;
            }
            debug!("Dispatching batch of {} entries", batch.len());

            let handles = batch.iter().cloned().map(|entry| {
                let target = self.target.clone();
                tokio::spawn(async move { target.apply(&entry).await })
            });
            let results = join_all(handles).await;

            for (entry, result) in batch.iter().zip(results) {
                let outcome = match result {
                    Ok(Ok(())) => {
                        synchronized += 1;
                        SyncOutcome::Synchronized
                    }
                    Ok(Err(e)) => {
                        error!("Synchronization of {} failed, entry dropped: {}", entry, e);
                        dropped += 1;
                        SyncOutcome::Dropped
                    }
                    Err(e) => {
                        error!("Synchronization task for {} aborted, entry dropped: {}", entry, e);
                        dropped += 1;
                        SyncOutcome::Dropped
                    }
                };
                self.metrics
                    .record_entry(entry.entity(), entry.operation.as_str(), outcome);
            }
        }

        self.metrics.record_flush(started.elapsed().as_secs_f64());
        debug!(
            "Flush finished: {} synchronized, {} dropped in {:?}",
            synchronized,
            dropped,
            started.elapsed()
        );
        FlushOutcome::Drained {
            synchronized,
            dropped,
        }
    }

    /// 关闭
    ///
    /// 设置关闭标志后拒绝新的同步条目，等待进行中的刷新结束，再执行最后一次刷新
    #[instrument(skip(self), level = "info")]
    pub async fn shutdown(&self) -> Result<FlushOutcome> {
        {
            let _state = self.state();
            self.shutting_down.store(true, Ordering::SeqCst);
        }
        info!("Synchronizer shutting down");
        // 等待已获得许可的写入完成入队
        drop(self.admission.write().await);

        let mut phase = self.phase.subscribe();
        loop {
            match self.flush().await {
                FlushOutcome::Busy => {
                    phase
                        .wait_for(|p| *p == SyncPhase::Idle)
                        .await
                        .map_err(|e| CacheError::ShutdownError(e.to_string()))?;
                }
                outcome => {
                    info!("Synchronizer final flush: {:?}", outcome);
                    return Ok(outcome);
                }
            }
        }
    }
}
