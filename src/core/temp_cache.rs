//! 临时文件缓存
//!
//! 把远端/虚拟条目物化到进程级的私有临时目录，供需要真实本地路径的
//! 访问方式使用。同一 `(路径, 属性)` 键在一次运行内只物化一次，
//! 条目只增不改；缓存销毁时整个目录递归删除。

use crate::core::hierarchy::FileAttrs;
use crate::error::EngineError;
use crate::progress::ProgressReporter;
use crate::storage::{
    copy_file_transactional, AbstractPath, NativeDevice, RelPath, StreamAttrs,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// 缓存键：条目路径 + 物化时的属性（属性变了视为另一个条目）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileDescriptor {
    pub path: AbstractPath,
    pub attrs: FileAttrs,
    pub is_followed_symlink: bool,
}

/// 临时文件缓冲
pub struct TempFileBuffer {
    temp_folder: Option<PathBuf>,
    temp_device: Option<Arc<NativeDevice>>,
    temp_paths: HashMap<FileDescriptor, PathBuf>,
}

impl TempFileBuffer {
    pub fn new() -> Self {
        Self {
            temp_folder: None,
            temp_device: None,
            temp_paths: HashMap::new(),
        }
    }

    /// 已物化条目的本地路径；未物化（或物化失败）返回 None
    pub fn get_temp_path(&self, descr: &FileDescriptor) -> Option<&PathBuf> {
        self.temp_paths.get(descr)
    }

    /// 惰性创建随机命名的临时目录
    fn ensure_temp_folder(&mut self) -> Result<Arc<NativeDevice>, EngineError> {
        if let Some(device) = &self.temp_device {
            return Ok(device.clone());
        }
        let token = uuid::Uuid::new_v4().simple().to_string();
        let folder = std::env::temp_dir().join(format!("sc-{}", &token[..8]));
        let device = Arc::new(NativeDevice::new(&folder)?);
        self.temp_folder = Some(folder);
        self.temp_device = Some(device.clone());
        Ok(device)
    }

    /// 物化一批条目；单个条目失败只警告并跳过（该键保持缺席）
    pub async fn create_temp_files(
        &mut self,
        workload: &[FileDescriptor],
        progress: &ProgressReporter,
    ) -> Result<(), EngineError> {
        if workload.is_empty() {
            return Ok(());
        }
        let device = self.ensure_temp_folder()?;
        let folder = self
            .temp_folder
            .clone()
            .unwrap_or_else(|| std::env::temp_dir());

        progress.set_phase(format!("正在物化 {} 个条目...", workload.len()));

        for descr in workload {
            progress.checkpoint()?;
            if self.temp_paths.contains_key(descr) {
                // 只增不改：同一键绝不重复物化
                continue;
            }

            // 用属性与来源路径生成短哈希，区分同名条目的不同版本/位置
            let mut cookie = blake3::Hasher::new();
            cookie.update(&descr.attrs.mod_time.to_le_bytes());
            cookie.update(&descr.attrs.size.to_le_bytes());
            cookie.update(&descr.attrs.print.to_le_bytes());
            cookie.update(&[u8::from(descr.is_followed_symlink)]);
            cookie.update(descr.path.display().as_bytes());
            let digest = cookie.finalize().to_hex();

            let file_name = descr.path.item_name();
            let (stem, ext) = match file_name.rfind('.') {
                Some(pos) => (&file_name[..pos], &file_name[pos..]),
                None => (file_name, ""),
            };
            let temp_name = format!("{}~{}{}", stem, &digest[..4], ext);
            let temp_rel = match RelPath::new(&temp_name) {
                Ok(r) => r,
                Err(e) => {
                    progress.warn(format!("临时文件名非法, 跳过: {} - {}", temp_name, e));
                    continue;
                }
            };

            progress.status(descr.path.display());
            progress.log_info(format!("正在创建文件 {}", folder.join(&temp_name).display()));

            let target = AbstractPath::new(device.clone(), temp_rel);
            let assumed = StreamAttrs {
                mod_time: descr.attrs.mod_time,
                size: descr.attrs.size,
                print: descr.attrs.print,
            };
            match copy_file_transactional(&descr.path, &assumed, &target, true, None, &|_| Ok(()))
                .await
            {
                Ok(_) => {
                    progress.report_delta(1, descr.attrs.size);
                    self.temp_paths
                        .insert(descr.clone(), folder.join(&temp_name));
                }
                Err(e) => {
                    progress.warn(format!("物化失败, 跳过: {} - {}", descr.path.display(), e));
                }
            }
        }
        Ok(())
    }
}

impl Default for TempFileBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TempFileBuffer {
    fn drop(&mut self) {
        if let Some(folder) = &self.temp_folder {
            if let Err(e) = std::fs::remove_dir_all(folder) {
                tracing::debug!("清理临时目录失败: {} - {}", folder.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AfsDevice, OutputStream};

    async fn write_file(dev: &AfsDevice, path: &str, data: &[u8]) {
        let rel = RelPath::new(path).unwrap();
        let backend = dev
            .open_output(&rel, Some(data.len() as u64), Some(1_000_000))
            .await
            .unwrap();
        let mut out = OutputStream::new(
            backend,
            AbstractPath::new(dev.clone(), rel),
            Some(data.len() as u64),
        );
        out.write(data).await.unwrap();
        out.finalize().await.unwrap();
    }

    fn descriptor(dev: &AfsDevice, path: &str, size: u64) -> FileDescriptor {
        FileDescriptor {
            path: AbstractPath::new(dev.clone(), RelPath::new(path).unwrap()),
            attrs: FileAttrs {
                size,
                mod_time: 1_000_000,
                print: 0,
            },
            is_followed_symlink: false,
        }
    }

    #[tokio::test]
    async fn test_materialize_once_and_cleanup_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let dev: AfsDevice = Arc::new(NativeDevice::new(dir.path()).unwrap());
        write_file(&dev, "report.txt", b"12345").await;

        let descr = descriptor(&dev, "report.txt", 5);
        let progress = ProgressReporter::new();

        let mut buffer = TempFileBuffer::new();
        assert!(buffer.get_temp_path(&descr).is_none());

        buffer
            .create_temp_files(std::slice::from_ref(&descr), &progress)
            .await
            .unwrap();
        let temp_path = buffer.get_temp_path(&descr).unwrap().clone();
        assert!(temp_path.exists());
        assert_eq!(std::fs::read(&temp_path).unwrap(), b"12345");

        // 同一键再跑一遍不会重新物化
        buffer
            .create_temp_files(std::slice::from_ref(&descr), &progress)
            .await
            .unwrap();
        assert_eq!(buffer.get_temp_path(&descr).unwrap(), &temp_path);

        drop(buffer);
        assert!(!temp_path.exists());
    }

    #[tokio::test]
    async fn test_missing_source_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let dev: AfsDevice = Arc::new(NativeDevice::new(dir.path()).unwrap());

        let descr = descriptor(&dev, "not-there.txt", 5);
        let progress = ProgressReporter::new();

        let mut buffer = TempFileBuffer::new();
        buffer
            .create_temp_files(std::slice::from_ref(&descr), &progress)
            .await
            .unwrap();
        assert!(buffer.get_temp_path(&descr).is_none());
        assert!(!progress.take_warnings().is_empty());
    }
}
