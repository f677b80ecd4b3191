//! synccore - 两棵存储树的同步核心
//!
//! 输入是上游比较器产出的两侧条目树（带类别），本库负责：
//! 按策略与基线为每个条目判定同步方向、经由指纹/基线检测重命名、
//! 应用层级过滤，并通过统一的存储抽象执行复制/删除/回收，
//! 所有多步写入都保证可恢复（事务性复制 + 临时名）。

pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod logging;
pub mod progress;
pub mod storage;

pub use config::{
    two_way_update_set, CompareVariant, DirectionSet, SyncDirection, SyncDirectionConfig,
    SyncVariant,
};
pub use crate::core::{
    apply_filters, determine_sync_directions, execute_copy, execute_delete, BaseFolderPair,
    Category, FilterConfig, FolderComparison, InSyncFolder, NameFilter, Side, SoftFilter, SyncDir,
    TempFileBuffer,
};
pub use db::{pair_key, BaselineStore};
pub use error::{EngineError, StorageError};
pub use progress::{ProgressReporter, ProgressUpdate};
pub use storage::{AbstractPath, AfsDevice, NativeDevice, RelPath, StorageDevice};
