//! 错误类型定义
//!
//! 存储层与引擎层各自有独立的错误枚举，调用方可以按变体分支处理，
//! 不需要匹配错误文本。

use thiserror::Error;

/// 存储层错误
#[derive(Debug, Error)]
pub enum StorageError {
    /// 底层系统错误（带可读的上下文说明）
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// 目标条目已存在
    #[error("目标已存在: {0}")]
    AlreadyExists(String),

    /// 跨设备移动不支持（调用方需要回退为复制+删除）
    #[error("不支持跨设备移动: {from} -> {to}")]
    MoveUnsupported { from: String, to: String },

    /// 非法的条目名称（例如仅由 '.' 组成的目录名）
    #[error("非法的条目名称: {0}")]
    InvalidName(String),

    /// 数据流长度与声明不符（防止截断的传输被当作成功）
    #[error("数据流大小不符: 预期 {expected} 字节, 实际 {written} 字节")]
    SizeMismatch { expected: u64, written: u64 },

    /// 后端不支持该操作（例如回收站未启用）
    #[error("操作不受支持: {0}")]
    Unsupported(String),

    /// 操作在检查点处被取消
    #[error("操作已取消")]
    Cancelled,
}

impl StorageError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Io {
            context: context.into(),
            source,
        }
    }
}

/// 引擎层错误
#[derive(Debug, Error)]
pub enum EngineError {
    /// 操作在检查点处被取消
    #[error("操作已取消")]
    Cancelled,

    /// 调用方违反了接口约定（属于调用方 bug，中止本次运行）
    #[error("接口约定被违反: {0}")]
    ContractViolation(String),

    /// 存储层错误
    #[error(transparent)]
    Storage(StorageError),

    /// 基线数据库错误
    #[error("基线数据库错误: {0}")]
    Baseline(#[from] anyhow::Error),
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            // 取消在两层之间保持同一语义
            StorageError::Cancelled => EngineError::Cancelled,
            other => EngineError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_maps_across_layers() {
        let e: EngineError = StorageError::Cancelled.into();
        assert!(matches!(e, EngineError::Cancelled));

        let e: EngineError = StorageError::InvalidName("...".into()).into();
        assert!(matches!(e, EngineError::Storage(StorageError::InvalidName(_))));
    }
}
