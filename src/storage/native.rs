//! 本地磁盘后端（参考实现）
//!
//! 设备身份是解析符号链接/挂载之后的根路径；文件指纹使用 inode 编号
//! （非 Unix 平台为 0，表示不可用）。

use super::{
    DeviceKind, DirEntry, FileEntry, FinalizeResult, FolderEntry, HandleError, HandleLink,
    InputStream, ItemType, OutputStreamBackend, RecycleSession, RelPath, StorageDevice,
    StreamAttrs, SymlinkEntry, TraverseErrorInfo, TraverserCallback, TraverserWorkload,
};
use crate::error::StorageError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use walkdir::WalkDir;

/// 输入流的默认块大小
const BLOCK_SIZE: usize = 128 * 1024;

/// 回收站目录名（设备根目录下）
const TRASH_DIR: &str = ".sc_trash";

pub struct NativeDevice {
    root: PathBuf,
    ident: String,
}

impl NativeDevice {
    /// 打开一个以 `root` 为根的本地设备；目录不存在时创建
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref();
        if !root.exists() {
            std::fs::create_dir_all(root)
                .map_err(|e| StorageError::io(format!("无法创建目录 {}", root.display()), e))?;
        }
        // 设备身份 = 解析符号链接后的根路径
        let canonical = std::fs::canonicalize(root)
            .map_err(|e| StorageError::io(format!("无法解析路径 {}", root.display()), e))?;
        let ident = canonical.to_string_lossy().into_owned();
        Ok(Self {
            root: canonical,
            ident,
        })
    }

    fn resolve(&self, rel: &RelPath) -> PathBuf {
        if rel.is_root() {
            self.root.clone()
        } else {
            self.root.join(rel.as_str())
        }
    }

    fn io_err(path: &Path, action: &str, e: std::io::Error) -> StorageError {
        StorageError::io(format!("{} {}", action, path.display()), e)
    }

    /// 单个起始路径的递归遍历；目录内回调串行
    fn traverse_one<'a>(
        &'a self,
        rel: RelPath,
        callback: Arc<dyn TraverserCallback>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let dir_path = self.resolve(&rel);

            // 目录列表失败时按回调的决定重试或放弃本层
            let mut retry_number = 0usize;
            let entries = loop {
                match read_dir_entries(&dir_path).await {
                    Ok(entries) => break entries,
                    Err(e) => {
                        let info = TraverseErrorInfo {
                            msg: format!("无法列出目录 {}: {}", dir_path.display(), e),
                            retry_number,
                        };
                        match callback.report_dir_error(&info) {
                            HandleError::Retry => {
                                retry_number += 1;
                                continue;
                            }
                            HandleError::Ignore => return,
                        }
                    }
                }
            };

            for name in entries {
                let item_path = dir_path.join(&name);

                // 条目级元数据失败单独上报，忽略时该条目缺席
                let mut retry_number = 0usize;
                let meta = loop {
                    match tokio::fs::symlink_metadata(&item_path).await {
                        Ok(m) => break Some(m),
                        Err(e) => {
                            let info = TraverseErrorInfo {
                                msg: format!("无法读取 {}: {}", item_path.display(), e),
                                retry_number,
                            };
                            match callback.report_item_error(&info, &name) {
                                HandleError::Retry => {
                                    retry_number += 1;
                                    continue;
                                }
                                HandleError::Ignore => break None,
                            }
                        }
                    }
                };
                let Some(meta) = meta else { continue };

                if meta.file_type().is_symlink() {
                    let entry = SymlinkEntry {
                        name: name.clone(),
                        mod_time: mod_time_of(&meta),
                    };
                    match callback.on_symlink(&entry) {
                        HandleLink::Skip => {}
                        HandleLink::Follow => {
                            // 跟随链接后按目标类型重新上报
                            match tokio::fs::metadata(&item_path).await {
                                Ok(target_meta) if target_meta.is_dir() => {
                                    let entry = FolderEntry {
                                        name: name.clone(),
                                        is_followed_symlink: true,
                                    };
                                    if let Some(sub) = callback.on_folder(&entry) {
                                        let sub_rel = match rel.join(&name) {
                                            Ok(r) => r,
                                            Err(_) => continue,
                                        };
                                        self.traverse_one(sub_rel, sub).await;
                                    }
                                }
                                Ok(target_meta) => {
                                    callback.on_file(&FileEntry {
                                        name: name.clone(),
                                        size: target_meta.len(),
                                        mod_time: mod_time_of(&target_meta),
                                        print: file_print(&target_meta),
                                        is_followed_symlink: true,
                                    });
                                }
                                Err(e) => {
                                    let info = TraverseErrorInfo {
                                        msg: format!(
                                            "无法解析符号链接 {}: {}",
                                            item_path.display(),
                                            e
                                        ),
                                        retry_number: 0,
                                    };
                                    // 悬空链接：上报一次，忽略即可
                                    let _ = callback.report_item_error(&info, &name);
                                }
                            }
                        }
                    }
                } else if meta.is_dir() {
                    let entry = FolderEntry {
                        name: name.clone(),
                        is_followed_symlink: false,
                    };
                    if let Some(sub) = callback.on_folder(&entry) {
                        let sub_rel = match rel.join(&name) {
                            Ok(r) => r,
                            Err(_) => continue,
                        };
                        self.traverse_one(sub_rel, sub).await;
                    }
                } else {
                    callback.on_file(&FileEntry {
                        name: name.clone(),
                        size: meta.len(),
                        mod_time: mod_time_of(&meta),
                        print: file_print(&meta),
                        is_followed_symlink: false,
                    });
                }
            }
        })
    }
}

/// 列出目录下的条目名（大小写敏感的原始名字）
async fn read_dir_entries(path: &Path) -> Result<Vec<String>, std::io::Error> {
    let mut rd = tokio::fs::read_dir(path).await?;
    let mut names = Vec::new();
    while let Some(entry) = rd.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

fn mod_time_of(meta: &std::fs::Metadata) -> i64 {
    match meta.modified() {
        Ok(t) => match t.duration_since(std::time::UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        },
        Err(_) => 0,
    }
}

#[cfg(unix)]
fn file_print(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn file_print(_meta: &std::fs::Metadata) -> u64 {
    0
}

fn item_type_of(meta: &std::fs::Metadata) -> ItemType {
    if meta.file_type().is_symlink() {
        ItemType::Symlink
    } else if meta.is_dir() {
        ItemType::Folder
    } else {
        ItemType::File
    }
}

// ============ 流实现 ============

struct NativeInputStream {
    file: tokio::fs::File,
    attrs: StreamAttrs,
}

#[async_trait]
impl InputStream for NativeInputStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.file
            .read(buf)
            .await
            .map_err(|e| StorageError::io("读取文件失败", e))
    }

    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    fn attributes_buffered(&self) -> Option<StreamAttrs> {
        // 打开时顺便取到了元数据，省掉调用方的第二次往返
        Some(self.attrs)
    }
}

struct NativeOutputStream {
    file: Option<tokio::fs::File>,
    path: PathBuf,
    mod_time: Option<i64>,
    finalized: bool,
}

#[async_trait]
impl OutputStreamBackend for NativeOutputStream {
    async fn write(&mut self, buf: &[u8]) -> Result<(), StorageError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StorageError::io("写入文件失败", closed_stream_err()))?;
        file.write_all(buf)
            .await
            .map_err(|e| NativeDevice::io_err(&self.path, "无法写入文件", e))
    }

    async fn finalize(&mut self) -> Result<FinalizeResult, StorageError> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| StorageError::io("结束写入失败", closed_stream_err()))?;
        file.flush()
            .await
            .map_err(|e| NativeDevice::io_err(&self.path, "无法写入文件", e))?;
        drop(file);

        // 写入完成后恢复修改时间；失败不作为硬错误
        let error_mod_time = match self.mod_time {
            Some(mod_time) => filetime::set_file_mtime(
                &self.path,
                filetime::FileTime::from_unix_time(mod_time, 0),
            )
            .err()
            .map(|e| NativeDevice::io_err(&self.path, "无法设置修改时间", e)),
            None => None,
        };

        let print = std::fs::metadata(&self.path)
            .map(|m| file_print(&m))
            .unwrap_or(0);

        self.finalized = true;
        Ok(FinalizeResult {
            print,
            error_mod_time,
        })
    }
}

impl Drop for NativeOutputStream {
    fn drop(&mut self) {
        // 未显式 finalize 的输出流不能把半成品留在磁盘上
        if !self.finalized {
            self.file.take();
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn closed_stream_err() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, "输出流已关闭")
}

// ============ 设备实现 ============

#[async_trait]
impl StorageDevice for NativeDevice {
    fn device_kind(&self) -> DeviceKind {
        DeviceKind::Native
    }

    fn device_ident(&self) -> &str {
        &self.ident
    }

    fn display_path(&self, rel: &RelPath) -> String {
        self.resolve(rel).to_string_lossy().into_owned()
    }

    async fn item_type(&self, rel: &RelPath) -> Result<ItemType, StorageError> {
        let path = self.resolve(rel);
        let meta = tokio::fs::symlink_metadata(&path)
            .await
            .map_err(|e| Self::io_err(&path, "无法访问", e))?;
        Ok(item_type_of(&meta))
    }

    async fn read_folder_plain(&self, rel: &RelPath) -> Result<Vec<DirEntry>, StorageError> {
        let path = self.resolve(rel);
        let names = read_dir_entries(&path)
            .await
            .map_err(|e| Self::io_err(&path, "无法列出目录", e))?;

        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let item_path = path.join(&name);
            if let Ok(meta) = tokio::fs::symlink_metadata(&item_path).await {
                entries.push(DirEntry {
                    name,
                    item_type: item_type_of(&meta),
                });
            }
        }
        Ok(entries)
    }

    async fn open_input(&self, rel: &RelPath) -> Result<Box<dyn InputStream>, StorageError> {
        let path = self.resolve(rel);
        // File::open 跟随符号链接
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| Self::io_err(&path, "无法打开文件", e))?;
        let meta = file
            .metadata()
            .await
            .map_err(|e| Self::io_err(&path, "无法读取文件属性", e))?;
        Ok(Box::new(NativeInputStream {
            attrs: StreamAttrs {
                mod_time: mod_time_of(&meta),
                size: meta.len(),
                print: file_print(&meta),
            },
            file,
        }))
    }

    async fn open_output(
        &self,
        rel: &RelPath,
        _bytes_expected: Option<u64>,
        mod_time: Option<i64>,
    ) -> Result<Box<dyn OutputStreamBackend>, StorageError> {
        let path = self.resolve(rel);
        let file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(self.display_path(rel)))
            }
            Err(e) => return Err(Self::io_err(&path, "无法创建文件", e)),
        };
        Ok(Box::new(NativeOutputStream {
            file: Some(file),
            path,
            mod_time,
            finalized: false,
        }))
    }

    async fn create_folder_plain(&self, rel: &RelPath) -> Result<(), StorageError> {
        let name = rel.item_name();
        // 仅由 '.' 组成的目录名直接拒绝，不尝试创建
        if name.is_empty() || name.chars().all(|c| c == '.') {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        let path = self.resolve(rel);
        match tokio::fs::create_dir(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(self.display_path(rel)))
            }
            Err(e) => Err(Self::io_err(&path, "无法创建目录", e)),
        }
    }

    async fn remove_file_plain(&self, rel: &RelPath) -> Result<(), StorageError> {
        let path = self.resolve(rel);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| Self::io_err(&path, "无法删除文件", e))
    }

    async fn remove_symlink_plain(&self, rel: &RelPath) -> Result<(), StorageError> {
        let path = self.resolve(rel);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| Self::io_err(&path, "无法删除符号链接", e))
    }

    async fn remove_folder_plain(&self, rel: &RelPath) -> Result<(), StorageError> {
        let path = self.resolve(rel);
        tokio::fs::remove_dir(&path)
            .await
            .map_err(|e| Self::io_err(&path, "无法删除目录", e))
    }

    async fn remove_folder_if_exists_recursion(
        &self,
        rel: &RelPath,
        on_before_file_deletion: Option<&(dyn for<'s> Fn(&'s str) + Send + Sync)>,
        on_before_folder_deletion: Option<&(dyn for<'s> Fn(&'s str) + Send + Sync)>,
    ) -> Result<(), StorageError> {
        let path = self.resolve(rel);
        match self.item_type(rel).await {
            Ok(_) => {}
            Err(e) => {
                return match self.item_still_exists(rel).await {
                    Ok(None) => Ok(()),
                    _ => Err(e),
                };
            }
        }

        // 先收集完整的删除清单（文件在所属目录之前），再逐项删除并通知
        let walk_root = path.clone();
        let items = tokio::task::spawn_blocking(move || {
            let mut items = Vec::new();
            for entry in WalkDir::new(&walk_root).contents_first(true) {
                match entry {
                    Ok(entry) => {
                        let is_dir = entry.file_type().is_dir();
                        items.push((entry.into_path(), is_dir));
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(items)
        })
        .await
        .map_err(|e| {
            StorageError::io(
                format!("遍历任务失败 {}", path.display()),
                std::io::Error::new(std::io::ErrorKind::Other, e),
            )
        })?
        .map_err(|e| {
            StorageError::io(
                format!("无法遍历目录 {}", path.display()),
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "遍历失败")),
            )
        })?;

        for (item_path, is_dir) in items {
            let display = item_path.to_string_lossy();
            if is_dir {
                if let Some(notify) = on_before_folder_deletion {
                    notify(&display);
                }
                tokio::fs::remove_dir(&item_path)
                    .await
                    .map_err(|e| Self::io_err(&item_path, "无法删除目录", e))?;
            } else {
                if let Some(notify) = on_before_file_deletion {
                    notify(&display);
                }
                tokio::fs::remove_file(&item_path)
                    .await
                    .map_err(|e| Self::io_err(&item_path, "无法删除文件", e))?;
            }
        }
        Ok(())
    }

    async fn move_and_rename_same_device(
        &self,
        from: &RelPath,
        to: &RelPath,
    ) -> Result<(), StorageError> {
        let from_path = self.resolve(from);
        let to_path = self.resolve(to);
        tokio::fs::rename(&from_path, &to_path)
            .await
            .map_err(|e| Self::io_err(&from_path, "无法移动", e))
    }

    async fn read_symlink(&self, rel: &RelPath) -> Result<String, StorageError> {
        let path = self.resolve(rel);
        let target = tokio::fs::read_link(&path)
            .await
            .map_err(|e| Self::io_err(&path, "无法读取符号链接", e))?;
        Ok(target.to_string_lossy().into_owned())
    }

    #[cfg(unix)]
    async fn create_symlink(&self, rel: &RelPath, target: &str) -> Result<(), StorageError> {
        let path = self.resolve(rel);
        match tokio::fs::symlink(target, &path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(self.display_path(rel)))
            }
            Err(e) => Err(Self::io_err(&path, "无法创建符号链接", e)),
        }
    }

    #[cfg(not(unix))]
    async fn create_symlink(&self, rel: &RelPath, _target: &str) -> Result<(), StorageError> {
        Err(StorageError::Unsupported(format!(
            "此平台不支持创建符号链接: {}",
            self.display_path(rel)
        )))
    }

    async fn traverse_folder_recursive(
        &self,
        workload: TraverserWorkload,
        parallel_ops: usize,
    ) -> Result<(), StorageError> {
        // 独立的起始路径并发执行，单个目录内保持串行
        futures::stream::iter(workload)
            .for_each_concurrent(parallel_ops.max(1), |(rel, callback)| {
                self.traverse_one(rel, callback)
            })
            .await;
        Ok(())
    }

    fn supports_recycle_bin(&self) -> bool {
        true
    }

    async fn create_recycler_session(&self) -> Result<Box<dyn RecycleSession>, StorageError> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let session_dir = self.root.join(TRASH_DIR).join(&token[..8]);
        Ok(Box::new(NativeRecycleSession {
            root: self.root.clone(),
            session_dir,
        }))
    }

    async fn recycle_item_if_exists(&self, rel: &RelPath) -> Result<(), StorageError> {
        let session = self.create_recycler_session().await?;
        session.recycle_item_if_exists(rel, rel.item_name()).await?;
        session.try_cleanup(None).await
    }
}

/// 回收站会话：同一会话的条目集中到一个带随机标记的目录下。
/// `recycle_item_if_exists` 只做目录创建 + 重命名，天然支持并发调用。
struct NativeRecycleSession {
    root: PathBuf,
    session_dir: PathBuf,
}

#[async_trait]
impl RecycleSession for NativeRecycleSession {
    async fn recycle_item_if_exists(
        &self,
        path: &RelPath,
        logical_rel: &str,
    ) -> Result<(), StorageError> {
        let source = if path.is_root() {
            self.root.clone()
        } else {
            self.root.join(path.as_str())
        };
        if tokio::fs::symlink_metadata(&source).await.is_err() {
            // 条目已不存在，幂等成功
            return Ok(());
        }

        let logical = logical_rel.trim_start_matches('/');
        let dest = self.session_dir.join(logical);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| NativeDevice::io_err(parent, "无法创建回收目录", e))?;
        }
        tokio::fs::rename(&source, &dest)
            .await
            .map_err(|e| NativeDevice::io_err(&source, "无法移入回收站", e))
    }

    async fn try_cleanup(
        &self,
        notify_deletion: Option<&(dyn for<'s> Fn(&'s str) + Send + Sync)>,
    ) -> Result<(), StorageError> {
        // 会话目录为空时顺手移除，避免堆积空目录
        if let Ok(mut rd) = tokio::fs::read_dir(&self.session_dir).await {
            if rd
                .next_entry()
                .await
                .map_err(|e| NativeDevice::io_err(&self.session_dir, "无法列出目录", e))?
                .is_none()
            {
                if let Some(notify) = notify_deletion {
                    notify(&self.session_dir.to_string_lossy());
                }
                let _ = tokio::fs::remove_dir(&self.session_dir).await;
            }
        }
        Ok(())
    }
}
