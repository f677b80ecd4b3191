//! 存储抽象层
//!
//! 所有后端（本地磁盘、网络盘、云端设备）实现同一个 [`StorageDevice`]
//! 接口，引擎其余部分只通过 [`AbstractPath`] 与该接口交互。
//! 设备句柄是引用计数的，所有 `&self` 操作要求内部线程安全，
//! 因此 [`AbstractPath`] 可以像整数一样随意复制、跨线程传递。

pub mod native;

use crate::error::StorageError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub use native::NativeDevice;

/// 事务性复制使用的临时文件后缀，整个引擎统一识别。
/// 残留的 `*.sc_tmp` 条目会在下一次方向判定时被安排删除。
pub const TEMP_FILE_SUFFIX: &str = ".sc_tmp";

/// 条目名是否带有临时文件后缀
pub fn is_temp_file_name(name: &str) -> bool {
    name.ends_with(TEMP_FILE_SUFFIX)
}

// ============ 路径 ============

/// 相对路径：`/` 分隔，无首尾分隔符，构造时校验
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RelPath(String);

impl RelPath {
    /// 校验并规范化相对路径（`\` 统一为 `/`，空串表示设备根）
    pub fn new(path: impl AsRef<str>) -> Result<Self, StorageError> {
        let normalized = path.as_ref().replace('\\', "/");
        if normalized.is_empty() {
            return Ok(Self(String::new()));
        }
        if normalized.starts_with('/') || normalized.ends_with('/') {
            return Err(StorageError::InvalidName(normalized));
        }
        for segment in normalized.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(StorageError::InvalidName(normalized));
            }
        }
        Ok(Self(normalized))
    }

    /// 设备根目录
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// 追加一段相对路径
    pub fn join(&self, rel: &str) -> Result<Self, StorageError> {
        let suffix = RelPath::new(rel)?;
        if self.is_root() {
            return Ok(suffix);
        }
        if suffix.is_root() {
            return Ok(self.clone());
        }
        Ok(Self(format!("{}/{}", self.0, suffix.0)))
    }

    /// 父路径；根目录返回 None
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(pos) => Some(Self(self.0[..pos].to_string())),
            None => Some(Self::root()),
        }
    }

    /// 最后一段条目名；根目录为空串
    pub fn item_name(&self) -> &str {
        match self.0.rfind('/') {
            Some(pos) => &self.0[pos + 1..],
            None => &self.0,
        }
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============ 设备身份 ============

/// 后端类型标签：设备比较先比标签，再比后端自己的身份键
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceKind {
    /// 本地磁盘
    Native,
}

/// 共享设备句柄
pub type AfsDevice = Arc<dyn StorageDevice>;

/// 两个设备是否指向同一底层存储
pub fn same_device(a: &AfsDevice, b: &AfsDevice) -> bool {
    a.device_kind() == b.device_kind() && a.device_ident() == b.device_ident()
}

fn compare_device(a: &AfsDevice, b: &AfsDevice) -> Ordering {
    a.device_kind()
        .cmp(&b.device_kind())
        .then_with(|| a.device_ident().cmp(b.device_ident()))
}

// ============ AbstractPath ============

/// `(设备, 相对路径)`：廉价可复制的值类型
#[derive(Clone)]
pub struct AbstractPath {
    pub device: AfsDevice,
    pub rel: RelPath,
}

impl AbstractPath {
    pub fn new(device: AfsDevice, rel: RelPath) -> Self {
        Self { device, rel }
    }

    pub fn join(&self, rel: &str) -> Result<Self, StorageError> {
        Ok(Self {
            device: self.device.clone(),
            rel: self.rel.join(rel)?,
        })
    }

    pub fn parent(&self) -> Option<Self> {
        self.rel.parent().map(|rel| Self {
            device: self.device.clone(),
            rel,
        })
    }

    pub fn item_name(&self) -> &str {
        self.rel.item_name()
    }

    /// 用于日志/界面展示的完整路径
    pub fn display(&self) -> String {
        self.device.display_path(&self.rel)
    }
}

impl PartialEq for AbstractPath {
    fn eq(&self, other: &Self) -> bool {
        same_device(&self.device, &other.device) && self.rel == other.rel
    }
}

impl Eq for AbstractPath {}

impl PartialOrd for AbstractPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AbstractPath {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_device(&self.device, &other.device).then_with(|| self.rel.cmp(&other.rel))
    }
}

impl Hash for AbstractPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.device.device_kind().hash(state);
        self.device.device_ident().hash(state);
        self.rel.hash(state);
    }
}

impl fmt::Debug for AbstractPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AbstractPath({})", self.display())
    }
}

// ============ 条目类型与属性 ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    File,
    Folder,
    Symlink,
}

/// 设备相关的持久唯一指纹，0 表示不可用
pub type FingerPrint = u64;

/// 流句柄附带的文件属性
#[derive(Debug, Clone, Copy)]
pub struct StreamAttrs {
    /// Unix 秒
    pub mod_time: i64,
    pub size: u64,
    pub print: FingerPrint,
}

/// 平铺目录列表项（case 敏感的原始名字）
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub item_type: ItemType,
}

// ============ 流式 I/O ============

/// 输入流；`read` 返回 0 表示流结束
#[async_trait]
pub trait InputStream: Send {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// 后端偏好的块大小，契约上必须非零
    fn block_size(&self) -> usize;

    /// 仅当后端在打开/列目录时已经缓存了属性才返回（省一次往返）
    fn attributes_buffered(&self) -> Option<StreamAttrs>;
}

/// finalize 的结果
#[derive(Debug)]
pub struct FinalizeResult {
    pub print: FingerPrint,
    /// 写入成功但恢复修改时间失败时填充
    pub error_mod_time: Option<StorageError>,
}

/// 后端输出流实现
#[async_trait]
pub trait OutputStreamBackend: Send {
    async fn write(&mut self, buf: &[u8]) -> Result<(), StorageError>;
    async fn finalize(&mut self) -> Result<FinalizeResult, StorageError>;
}

/// 输出流包装：统计写入量并在 finalize 时核对声明的字节数，
/// 防止被截断的传输（典型如不可靠网络）被当作成功。
pub struct OutputStream {
    backend: Option<Box<dyn OutputStreamBackend>>,
    path: AbstractPath,
    bytes_expected: Option<u64>,
    bytes_written: u64,
}

impl OutputStream {
    pub fn new(
        backend: Box<dyn OutputStreamBackend>,
        path: AbstractPath,
        bytes_expected: Option<u64>,
    ) -> Self {
        Self {
            backend: Some(backend),
            path,
            bytes_expected,
            bytes_written: 0,
        }
    }

    pub async fn write(&mut self, buf: &[u8]) -> Result<(), StorageError> {
        match self.backend.as_mut() {
            Some(backend) => {
                backend.write(buf).await?;
                self.bytes_written += buf.len() as u64;
                Ok(())
            }
            None => Err(StorageError::Unsupported(format!(
                "输出流已关闭: {}",
                self.path.display()
            ))),
        }
    }

    /// 显式结束写入；字节数与声明不符时失败并清理目标
    pub async fn finalize(mut self) -> Result<FinalizeResult, StorageError> {
        if let Some(expected) = self.bytes_expected {
            if expected != self.bytes_written {
                let written = self.bytes_written;
                self.discard().await;
                return Err(StorageError::SizeMismatch { expected, written });
            }
        }
        let Some(backend) = self.backend.as_mut() else {
            return Err(StorageError::Unsupported(format!(
                "输出流已关闭: {}",
                self.path.display()
            )));
        };
        match backend.finalize().await {
            Ok(r) => {
                self.backend = None;
                Ok(r)
            }
            Err(e) => {
                self.discard().await;
                Err(e)
            }
        }
    }

    /// 放弃写入并尽力删除目标
    pub async fn discard(&mut self) {
        if self.backend.take().is_some() {
            let _ = self.path.device.remove_file_if_exists(&self.path.rel).await;
        }
    }
}

// ============ 遍历 ============

/// 遍历发现的文件
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub mod_time: i64,
    pub print: FingerPrint,
    pub is_followed_symlink: bool,
}

/// 遍历发现的符号链接
#[derive(Debug, Clone)]
pub struct SymlinkEntry {
    pub name: String,
    pub mod_time: i64,
}

/// 遍历发现的目录
#[derive(Debug, Clone)]
pub struct FolderEntry {
    pub name: String,
    pub is_followed_symlink: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleLink {
    /// 跟随链接，随后按文件/目录回调
    Follow,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    Retry,
    Ignore,
}

/// 遍历过程中的错误信息
#[derive(Debug, Clone)]
pub struct TraverseErrorInfo {
    pub msg: String,
    pub retry_number: usize,
}

/// 遍历回调。同一目录内的回调调用是串行的；
/// 失败重试可能导致同一条目被重复上报，调用方必须容忍。
pub trait TraverserCallback: Send + Sync {
    fn on_file(&self, info: &FileEntry);

    fn on_symlink(&self, info: &SymlinkEntry) -> HandleLink;

    /// 返回 None 跳过该目录，返回回调则用它继续向下遍历
    fn on_folder(&self, info: &FolderEntry) -> Option<Arc<dyn TraverserCallback>>;

    /// 目录级错误：当前层的数据视为不完整
    fn report_dir_error(&self, info: &TraverseErrorInfo) -> HandleError;

    /// 单个条目级错误
    fn report_item_error(&self, info: &TraverseErrorInfo, item_name: &str) -> HandleError;
}

/// 遍历工作集：起始路径 + 回调
pub type TraverserWorkload = Vec<(RelPath, Arc<dyn TraverserCallback>)>;

// ============ 回收站会话 ============

/// 回收站批量会话；`recycle_item_if_exists` 允许并发调用
#[async_trait]
pub trait RecycleSession: Send + Sync {
    async fn recycle_item_if_exists(
        &self,
        path: &RelPath,
        logical_rel: &str,
    ) -> Result<(), StorageError>;

    /// 提交/清理会话
    async fn try_cleanup(
        &self,
        notify_deletion: Option<&(dyn for<'s> Fn(&'s str) + Send + Sync)>,
    ) -> Result<(), StorageError>;
}

// ============ 设备接口 ============

/// 存储后端接口。所有 `&self` 方法必须可被多个遍历线程并发调用。
#[async_trait]
pub trait StorageDevice: Send + Sync {
    fn device_kind(&self) -> DeviceKind;

    /// 后端定义的"同一底层存储"身份键
    /// （本地磁盘：解析符号链接/挂载后的根路径）
    fn device_ident(&self) -> &str;

    fn display_path(&self, rel: &RelPath) -> String;

    /// 快速的存在/类型探测；无法区分"不存在"与部分访问错误
    async fn item_type(&self, rel: &RelPath) -> Result<ItemType, StorageError>;

    /// 平铺列出目录内容（大小写敏感的原始名字）
    async fn read_folder_plain(&self, rel: &RelPath) -> Result<Vec<DirEntry>, StorageError>;

    /// 慢但权威的存在判定：探测失败时向上递归，
    /// 用父目录的大小写敏感列表区分"确实消失"与暂时性访问错误。
    async fn item_still_exists(&self, rel: &RelPath) -> Result<Option<ItemType>, StorageError> {
        let probe_err = match self.item_type(rel).await {
            Ok(t) => return Ok(Some(t)),
            Err(e) => e,
        };
        let Some(parent) = rel.parent() else {
            // 设备根目录本身访问失败，没有更上层可以求证
            return Err(probe_err);
        };
        if !parent.is_root() {
            match self.item_still_exists(&parent).await? {
                Some(ItemType::Folder) => {}
                Some(_) | None => return Ok(None),
            }
        }
        match self.read_folder_plain(&parent).await {
            Ok(entries) => {
                let name = rel.item_name();
                match entries.into_iter().find(|e| e.name == name) {
                    // 条目仍在父目录里，说明刚才的探测失败是暂时性的
                    Some(_) => Err(probe_err),
                    None => Ok(None),
                }
            }
            Err(_) => Err(probe_err),
        }
    }

    async fn open_input(&self, rel: &RelPath) -> Result<Box<dyn InputStream>, StorageError>;

    /// 打开输出流；目标已存在时行为未定义，调用方负责先删除
    async fn open_output(
        &self,
        rel: &RelPath,
        bytes_expected: Option<u64>,
        mod_time: Option<i64>,
    ) -> Result<Box<dyn OutputStreamBackend>, StorageError>;

    /// 创建目录；已存在则失败；不会创建缺失的父目录。
    /// 仅由 '.' 组成的条目名必须直接拒绝，不得尝试。
    async fn create_folder_plain(&self, rel: &RelPath) -> Result<(), StorageError>;

    async fn remove_file_plain(&self, rel: &RelPath) -> Result<(), StorageError>;
    async fn remove_symlink_plain(&self, rel: &RelPath) -> Result<(), StorageError>;
    async fn remove_folder_plain(&self, rel: &RelPath) -> Result<(), StorageError>;

    /// 幂等删除：条目已不存在时静默成功，返回是否真的删了
    async fn remove_file_if_exists(&self, rel: &RelPath) -> Result<bool, StorageError> {
        match self.remove_file_plain(rel).await {
            Ok(()) => Ok(true),
            Err(e) => match self.item_still_exists(rel).await {
                Ok(None) => Ok(false),
                _ => Err(e),
            },
        }
    }

    async fn remove_symlink_if_exists(&self, rel: &RelPath) -> Result<bool, StorageError> {
        match self.remove_symlink_plain(rel).await {
            Ok(()) => Ok(true),
            Err(e) => match self.item_still_exists(rel).await {
                Ok(None) => Ok(false),
                _ => Err(e),
            },
        }
    }

    /// 递归删除目录；每个物理条目删除前恰好回调一次
    async fn remove_folder_if_exists_recursion(
        &self,
        rel: &RelPath,
        on_before_file_deletion: Option<&(dyn for<'s> Fn(&'s str) + Send + Sync)>,
        on_before_folder_deletion: Option<&(dyn for<'s> Fn(&'s str) + Send + Sync)>,
    ) -> Result<(), StorageError>;

    /// 同设备重命名/移动；跨设备的入口在 [`move_and_rename_item`]
    async fn move_and_rename_same_device(
        &self,
        from: &RelPath,
        to: &RelPath,
    ) -> Result<(), StorageError>;

    /// 读取符号链接目标
    async fn read_symlink(&self, rel: &RelPath) -> Result<String, StorageError>;

    /// 创建符号链接；已存在则失败
    async fn create_symlink(&self, rel: &RelPath, target: &str) -> Result<(), StorageError>;

    /// 递归遍历：独立的起始路径可分布到最多 `parallel_ops` 个并发任务，
    /// 单个目录内的回调调用保持串行。
    async fn traverse_folder_recursive(
        &self,
        workload: TraverserWorkload,
        parallel_ops: usize,
    ) -> Result<(), StorageError>;

    fn supports_recycle_bin(&self) -> bool;

    /// 仅在 `supports_recycle_bin` 为 true 时可调用
    async fn create_recycler_session(&self) -> Result<Box<dyn RecycleSession>, StorageError>;

    async fn recycle_item_if_exists(&self, rel: &RelPath) -> Result<(), StorageError>;

    /// 后端自身的写入是否已经是事务性的（例如先上传后提交的对象存储）
    fn has_native_transactional_copy(&self) -> bool {
        false
    }
}

// ============ 跨设备操作（自由函数，对应静态分发层） ============

/// 递归创建目录链；目录已存在返回 false
pub fn create_folder_if_missing_recursion<'a>(
    device: &'a AfsDevice,
    rel: &'a RelPath,
) -> BoxFuture<'a, Result<bool, StorageError>> {
    Box::pin(async move {
        if rel.is_root() {
            // 设备根目录必然存在
            return Ok(false);
        }
        match device.create_folder_plain(rel).await {
            Ok(()) => Ok(true),
            Err(StorageError::AlreadyExists(_)) => Ok(false),
            Err(e) => {
                let Some(parent) = rel.parent() else {
                    return Err(e);
                };
                create_folder_if_missing_recursion(device, &parent).await?;
                match device.create_folder_plain(rel).await {
                    Ok(()) => Ok(true),
                    Err(StorageError::AlreadyExists(_)) => Ok(false),
                    Err(e2) => Err(e2),
                }
            }
        }
    })
}

/// 移动/重命名。源和目标解析到不同后端实例时返回
/// [`StorageError::MoveUnsupported`]，绝不退化为复制。
pub async fn move_and_rename_item(
    from: &AbstractPath,
    to: &AbstractPath,
) -> Result<(), StorageError> {
    if !same_device(&from.device, &to.device) {
        return Err(StorageError::MoveUnsupported {
            from: from.display(),
            to: to.display(),
        });
    }
    from.device
        .move_and_rename_same_device(&from.rel, &to.rel)
        .await
}

/// 创建新目录（不复制内容）；目标已存在则失败
pub async fn copy_new_folder(target: &AbstractPath) -> Result<(), StorageError> {
    target.device.create_folder_plain(&target.rel).await
}

/// 复制符号链接本体；目标已存在则失败
pub async fn copy_symlink(
    source: &AbstractPath,
    target: &AbstractPath,
) -> Result<(), StorageError> {
    let link_target = source.device.read_symlink(&source.rel).await?;
    target
        .device
        .create_symlink(&target.rel, &link_target)
        .await
}

/// 复制结果：以实际观测到的属性为准，而不是调用方假定的属性
#[derive(Debug)]
pub struct FileCopyResult {
    pub file_size: u64,
    pub mod_time: i64,
    pub source_print: FingerPrint,
    pub target_print: FingerPrint,
    pub error_mod_time: Option<StorageError>,
}

/// 删除已存在目标的回调；目标可能存在时调用方必须提供，否则行为未定义
pub type OnDeleteTarget<'a> =
    &'a (dyn Fn() -> BoxFuture<'static, Result<(), StorageError>> + Send + Sync);

/// 每写入一块数据回调一次；返回 Err 可中止复制（取消检查点）
pub type IoNotify<'a> = &'a (dyn Fn(u64) -> Result<(), StorageError> + Send + Sync);

/// 事务性文件复制（符号链接被跟随）。
///
/// `transactional` 为 true 时保证：写入中途任何失败都不会把半成品
/// 留在目标的最终名字下。实现上先写 `*.sc_tmp` 临时名，完整校验后才
/// 重命名就位；非事务路径则在失败时尽力删除目标。
pub async fn copy_file_transactional(
    source: &AbstractPath,
    attrs_assumed: &StreamAttrs,
    target: &AbstractPath,
    transactional: bool,
    on_delete_target: Option<OnDeleteTarget<'_>>,
    notify: IoNotify<'_>,
) -> Result<FileCopyResult, StorageError> {
    let mut input = source.device.open_input(&source.rel).await?;

    // 打开时已缓存的属性优先于调用方假定的属性
    let attrs = input.attributes_buffered().unwrap_or(*attrs_assumed);

    let use_temp_name = transactional && !target.device.has_native_transactional_copy();
    let write_rel = if use_temp_name {
        let tmp = format!("{}{}", target.rel.as_str(), TEMP_FILE_SUFFIX);
        RelPath::new(tmp)?
    } else {
        target.rel.clone()
    };

    if use_temp_name {
        // 清掉上次中断留下的同名临时文件
        target.device.remove_file_if_exists(&write_rel).await?;
    } else if let Some(on_delete) = on_delete_target {
        on_delete().await?;
    }

    let backend = target
        .device
        .open_output(&write_rel, Some(attrs.size), Some(attrs.mod_time))
        .await?;
    let mut output = OutputStream::new(
        backend,
        AbstractPath::new(target.device.clone(), write_rel.clone()),
        Some(attrs.size),
    );

    let mut bytes_total: u64 = 0;
    let mut buf = vec![0u8; input.block_size().max(1)];
    let finalize = loop {
        let read = match input.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                output.discard().await;
                return Err(e);
            }
        };
        if read == 0 {
            break output.finalize().await?;
        }
        if let Err(e) = output.write(&buf[..read]).await {
            output.discard().await;
            return Err(e);
        }
        bytes_total += read as u64;
        if let Err(e) = notify(read as u64) {
            output.discard().await;
            return Err(e);
        }
    };

    if use_temp_name {
        // 临时文件已完整，删除旧目标并重命名就位
        let rename = async {
            if let Some(on_delete) = on_delete_target {
                on_delete().await?;
            }
            target
                .device
                .move_and_rename_same_device(&write_rel, &target.rel)
                .await
        }
        .await;
        if let Err(e) = rename {
            let _ = target.device.remove_file_if_exists(&write_rel).await;
            return Err(e);
        }
    }

    Ok(FileCopyResult {
        file_size: bytes_total,
        mod_time: attrs.mod_time,
        source_print: attrs.print,
        target_print: finalize.print,
        error_mod_time: finalize.error_mod_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rel_path_validation() {
        assert!(RelPath::new("a/b/c.txt").is_ok());
        assert!(RelPath::new("").is_ok());
        assert!(RelPath::new("a\\b").unwrap().as_str() == "a/b");

        assert!(RelPath::new("/a").is_err());
        assert!(RelPath::new("a/").is_err());
        assert!(RelPath::new("a//b").is_err());
        assert!(RelPath::new("a/./b").is_err());
        assert!(RelPath::new("a/../b").is_err());
    }

    #[test]
    fn test_rel_path_navigation() {
        let p = RelPath::new("a/b/c").unwrap();
        assert_eq!(p.item_name(), "c");
        assert_eq!(p.parent().unwrap().as_str(), "a/b");
        assert_eq!(
            RelPath::new("a").unwrap().parent().unwrap(),
            RelPath::root()
        );
        assert!(RelPath::root().parent().is_none());

        let joined = RelPath::new("a").unwrap().join("b/c").unwrap();
        assert_eq!(joined.as_str(), "a/b/c");
        assert_eq!(RelPath::root().join("x").unwrap().as_str(), "x");
    }

    #[test]
    fn test_temp_file_suffix() {
        assert!(is_temp_file_name("report.docx.sc_tmp"));
        assert!(!is_temp_file_name("report.docx"));
    }
}
