//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了周期性触发同步器刷新的后台定时任务。

use crate::error::{CacheError, Result};
use crate::sync::synchronizer::{FlushOutcome, Synchronizer};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 刷新定时器
///
/// 被丢弃时取消后台任务
pub struct FlushTimer {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl FlushTimer {
    /// 启动定时器
    ///
    /// # 参数
    ///
    /// * `synchronizer` - 同步器
    /// * `interval` - 刷新间隔
    pub fn start(synchronizer: Arc<Synchronizer>, interval: Duration) -> Self {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 第一次tick立即完成
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        if let FlushOutcome::Drained { synchronized, dropped } = synchronizer.flush().await {
                            debug!("Periodic flush: {} synchronized, {} dropped", synchronized, dropped);
                        }
                    }
                }
            }
            debug!("Flush timer stopped");
        });

        info!("Flush timer started with interval {:?}", interval);
        Self {
            token,
            handle: Some(handle),
        }
    }

    /// 是否仍在运行
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// 停止定时器并等待后台任务结束
    ///
    /// 正在执行的刷新会先完成；重复调用无效
    pub async fn stop(&mut self) -> Result<()> {
        self.token.cancel();
        match self.handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| CacheError::ShutdownError(format!("Flush timer task failed: {}", e))),
            None => Ok(()),
        }
    }
}

impl Drop for FlushTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
