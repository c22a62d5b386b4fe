//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了写回同步引擎，包括待同步条目、同步器、同步任务和刷新定时器。

pub mod entry;
pub mod synchronizer;
pub mod task;
pub mod timer;

pub use entry::{ModifiedEntry, Operation};
pub use synchronizer::{Admission, FlushOutcome, SyncPhase, Synchronizer};
pub use task::{DatabaseSyncTarget, SyncTarget};
pub use timer::FlushTimer;
