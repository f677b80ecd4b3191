//! 进度上报与取消
//!
//! 引擎各阶段通过 `ProgressReporter` 上报状态文本与条目/字节计数，
//! 并在每个条目之后调用 `checkpoint` 检查取消标志。上报通道是可选的，
//! 未挂接通道时只保留计数与日志。

use crate::error::{EngineError, StorageError};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// 进度快照，发送给 UI 层
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub phase: String,
    pub current_item: String,
    pub items_done: u64,
    pub bytes_done: u64,
}

/// 进度上报器
pub struct ProgressReporter {
    tx: Option<mpsc::Sender<ProgressUpdate>>,
    cancelled: Arc<AtomicBool>,
    phase: Mutex<String>,
    items_done: AtomicU64,
    bytes_done: AtomicU64,
    warnings: Mutex<Vec<String>>,
}

impl ProgressReporter {
    /// 无通道的上报器（只计数、只写日志）
    pub fn new() -> Self {
        Self {
            tx: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            phase: Mutex::new(String::new()),
            items_done: AtomicU64::new(0),
            bytes_done: AtomicU64::new(0),
            warnings: Mutex::new(Vec::new()),
        }
    }

    pub fn with_channel(tx: mpsc::Sender<ProgressUpdate>) -> Self {
        Self {
            tx: Some(tx),
            ..Self::new()
        }
    }

    /// 取消标志的共享句柄，交给 UI 层持有
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// 请求取消
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// 取消检查点：引擎在每个条目之后调用
    pub fn checkpoint(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// 存储层 IO 回调使用的检查点
    pub fn checkpoint_io(&self) -> Result<(), StorageError> {
        if self.is_cancelled() {
            Err(StorageError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// 切换阶段并清零当前条目文本
    pub fn set_phase(&self, phase: impl Into<String>) {
        let phase = phase.into();
        tracing::debug!("进入阶段: {}", phase);
        *self.phase.lock().unwrap() = phase;
        self.push(String::new());
    }

    /// 上报当前正在处理的条目
    pub fn status(&self, current_item: impl Into<String>) {
        self.push(current_item.into());
    }

    /// 非致命的信息日志
    pub fn log_info(&self, msg: impl AsRef<str>) {
        tracing::info!("{}", msg.as_ref());
    }

    /// 非致命警告：写日志并收集，运行结束后随报告返回
    pub fn warn(&self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::warn!("{}", msg);
        self.warnings.lock().unwrap().push(msg);
    }

    pub fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut self.warnings.lock().unwrap())
    }

    /// 累加条目/字节计数
    pub fn report_delta(&self, items: u64, bytes: u64) {
        self.items_done.fetch_add(items, Ordering::Relaxed);
        self.bytes_done.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn items_done(&self) -> u64 {
        self.items_done.load(Ordering::Relaxed)
    }

    pub fn bytes_done(&self) -> u64 {
        self.bytes_done.load(Ordering::Relaxed)
    }

    fn push(&self, current_item: String) {
        if let Some(tx) = &self.tx {
            // 通道占满时丢弃快照，进度展示允许有损
            let _ = tx.try_send(ProgressUpdate {
                phase: self.phase.lock().unwrap().clone(),
                current_item,
                items_done: self.items_done(),
                bytes_done: self.bytes_done(),
            });
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_after_cancel() {
        let reporter = ProgressReporter::new();
        assert!(reporter.checkpoint().is_ok());

        reporter.cancel();
        assert!(matches!(reporter.checkpoint(), Err(EngineError::Cancelled)));
        assert!(matches!(
            reporter.checkpoint_io(),
            Err(StorageError::Cancelled)
        ));
    }

    #[test]
    fn test_counters_accumulate() {
        let reporter = ProgressReporter::new();
        reporter.report_delta(1, 100);
        reporter.report_delta(2, 50);
        assert_eq!(reporter.items_done(), 3);
        assert_eq!(reporter.bytes_done(), 150);
    }

    #[tokio::test]
    async fn test_channel_receives_updates() {
        let (tx, mut rx) = mpsc::channel(8);
        let reporter = ProgressReporter::with_channel(tx);
        reporter.set_phase("复制文件");
        reporter.report_delta(1, 10);
        reporter.status("a.txt");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.phase, "复制文件");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.current_item, "a.txt");
        assert_eq!(second.bytes_done, 10);
    }
}
