//! 计划执行：复制与删除/回收
//!
//! 消费已激活的条目与它们的同步方向。复制失败时先探测目标是否已经
//! 存在（区分良性的"已存在"竞态与真实错误），只差父目录时补建目录链
//! 并恰好重试一次。删除之后被删侧从内存树中清除，幸存的单侧条目按
//! 配置重新赋方向（不做完整重比较），最后清理空行。

use crate::config::{SyncDirectionConfig, SyncVariant};
use crate::core::direction::set_sync_direction_rec_children;
use crate::core::hierarchy::{
    child_rel_path, ChildSet, FileAttrs, FolderComparison, ItemId, Side, SidePair, SyncDir,
};
use crate::error::{EngineError, StorageError};
use crate::progress::ProgressReporter;
use crate::storage::{
    copy_file_transactional, copy_symlink, create_folder_if_missing_recursion, AbstractPath,
    RecycleSession, StreamAttrs,
};
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemKind {
    File,
    Symlink,
    Folder,
}

/// 收集阶段产出的待处理条目
struct WorkItem {
    pair_idx: usize,
    id: ItemId,
    side: Side,
    kind: ItemKind,
    /// 该侧的相对路径
    rel_path: String,
    file_attrs: Option<FileAttrs>,
}

fn collect_items(
    children: &ChildSet,
    pair_idx: usize,
    parent_rel: &SidePair<String>,
    selection: &SidePair<&HashSet<ItemId>>,
    out: &mut Vec<WorkItem>,
) {
    let push = |out: &mut Vec<WorkItem>,
                id: ItemId,
                side: Side,
                kind: ItemKind,
                rel: String,
                file_attrs: Option<FileAttrs>| {
        out.push(WorkItem {
            pair_idx,
            id,
            side,
            kind,
            rel_path: rel,
            file_attrs,
        });
    };

    for file in &children.files {
        for side in [Side::Left, Side::Right] {
            if file.active && selection.get(side).contains(&file.id) && !file.is_empty(side) {
                push(
                    out,
                    file.id,
                    side,
                    ItemKind::File,
                    child_rel_path(parent_rel.get(side), file.name(side)),
                    *file.attrs.get(side),
                );
            }
        }
    }
    for link in &children.symlinks {
        for side in [Side::Left, Side::Right] {
            if link.active && selection.get(side).contains(&link.id) && !link.is_empty(side) {
                push(
                    out,
                    link.id,
                    side,
                    ItemKind::Symlink,
                    child_rel_path(parent_rel.get(side), link.name(side)),
                    None,
                );
            }
        }
    }
    for folder in &children.folders {
        for side in [Side::Left, Side::Right] {
            if folder.active && selection.get(side).contains(&folder.id) && !folder.is_empty(side) {
                push(
                    out,
                    folder.id,
                    side,
                    ItemKind::Folder,
                    child_rel_path(parent_rel.get(side), folder.name(side)),
                    None,
                );
            }
        }
        let child_rel = SidePair::new(
            child_rel_path(parent_rel.get(Side::Left), folder.name(Side::Left)),
            child_rel_path(parent_rel.get(Side::Right), folder.name(Side::Right)),
        );
        collect_items(&folder.children, pair_idx, &child_rel, selection, out);
    }
}

// ============ 复制到目标目录 ============

/// 带"已存在探测 + 补建父目录重试一次"的单条目复制
async fn copy_item_guarded<F>(
    target: &AbstractPath,
    overwrite_if_exists: bool,
    copy_plain: F,
) -> Result<(), StorageError>
where
    F: Fn(bool) -> BoxFuture<'static, Result<(), StorageError>>,
{
    match copy_plain(overwrite_if_exists).await {
        Ok(()) => Ok(()),
        Err(e) => {
            // 良性竞态：目标在复制尝试期间已经出现
            if target.device.item_type(&target.rel).await.is_ok() {
                return Err(e);
            }
            // 只差父目录（或父目录刚被外部创建）：补建后恰好重试一次
            if let Some(parent) = target.parent() {
                create_folder_if_missing_recursion(&parent.device, &parent.rel).await?;
            }
            copy_plain(false).await
        }
    }
}

/// 把选中的条目复制到另一个目标目录
#[allow(clippy::too_many_arguments)]
pub async fn execute_copy(
    folder_cmp: &FolderComparison,
    selection_left: &HashSet<ItemId>,
    selection_right: &HashSet<ItemId>,
    target_base: &AbstractPath,
    keep_rel_paths: bool,
    overwrite_if_exists: bool,
    progress: &ProgressReporter,
) -> Result<(), EngineError> {
    let mut items = Vec::new();
    for (pair_idx, base) in folder_cmp.iter().enumerate() {
        collect_items(
            &base.children,
            pair_idx,
            &SidePair::new(String::new(), String::new()),
            &SidePair::new(selection_left, selection_right),
            &mut items,
        );
    }

    progress.set_phase(format!("正在复制 {} 个条目...", items.len()));

    for item in &items {
        progress.checkpoint()?;

        let base = &folder_cmp[item.pair_idx];
        let source = match base.base_paths.get(item.side).join(&item.rel_path) {
            Ok(p) => p,
            Err(e) => {
                progress.warn(format!("路径非法, 跳过: {} - {}", item.rel_path, e));
                continue;
            }
        };
        let target_rel = if keep_rel_paths {
            item.rel_path.clone()
        } else {
            source.item_name().to_string()
        };
        let target = match target_base.join(&target_rel) {
            Ok(p) => p,
            Err(e) => {
                progress.warn(format!("路径非法, 跳过: {} - {}", target_rel, e));
                continue;
            }
        };

        let result: Result<(), StorageError> = match item.kind {
            ItemKind::Folder => {
                progress.status(target.display());
                progress.log_info(format!("正在创建目录 {}", target.display()));
                // 目录可能因为中间目录的补建已经存在
                create_folder_if_missing_recursion(&target.device, &target.rel)
                    .await
                    .map(|_| ())
            }
            ItemKind::File => {
                progress.status(target.display());
                progress.log_info(format!("正在创建文件 {}", target.display()));
                let attrs = item.file_attrs.unwrap_or(FileAttrs {
                    size: 0,
                    mod_time: 0,
                    print: 0,
                });
                let source = source.clone();
                let target_cl = target.clone();
                let cancel_flag = progress.cancel_flag();
                copy_item_guarded(&target, overwrite_if_exists, move |allow_delete| {
                    let source = source.clone();
                    let target = target_cl.clone();
                    let cancel_flag = cancel_flag.clone();
                    Box::pin(async move {
                        let assumed = StreamAttrs {
                            mod_time: attrs.mod_time,
                            size: attrs.size,
                            print: attrs.print,
                        };
                        let delete_device = target.device.clone();
                        let delete_rel = target.rel.clone();
                        let on_delete = move || -> BoxFuture<'static, Result<(), StorageError>> {
                            let device = delete_device.clone();
                            let rel = delete_rel.clone();
                            Box::pin(async move {
                                device.remove_file_if_exists(&rel).await.map(|_| ())
                            })
                        };
                        // 每写一块检查一次取消信号
                        let notify = move |_bytes: u64| -> Result<(), StorageError> {
                            if cancel_flag.load(std::sync::atomic::Ordering::SeqCst) {
                                Err(StorageError::Cancelled)
                            } else {
                                Ok(())
                            }
                        };
                        let copied = copy_file_transactional(
                            &source,
                            &assumed,
                            &target,
                            true,
                            if allow_delete { Some(&on_delete) } else { None },
                            &notify,
                        )
                        .await?;
                        if let Some(e) = copied.error_mod_time {
                            tracing::debug!("恢复修改时间失败: {}", e);
                        }
                        Ok(())
                    })
                })
                .await
                .map(|()| progress.report_delta(0, attrs.size))
            }
            ItemKind::Symlink => {
                progress.status(target.display());
                progress.log_info(format!("正在创建符号链接 {}", target.display()));
                let source = source.clone();
                let target_cl = target.clone();
                copy_item_guarded(&target, overwrite_if_exists, move |allow_delete| {
                    let source = source.clone();
                    let target = target_cl.clone();
                    Box::pin(async move {
                        if allow_delete {
                            target.device.remove_symlink_if_exists(&target.rel).await?;
                        }
                        copy_symlink(&source, &target).await
                    })
                })
                .await
            }
        };

        match result {
            Ok(()) => progress.report_delta(1, 0),
            Err(StorageError::Cancelled) => return Err(EngineError::Cancelled),
            Err(e) => {
                // 单条目失败：上报后跳过，本次运行继续
                progress.warn(format!("复制失败, 跳过: {} - {}", source.display(), e));
            }
        }
    }

    Ok(())
}

// ============ 删除 / 回收 ============

/// 删除选中的条目；`use_recycle_bin` 为 true 且设备支持时走回收站。
/// 物理删除后被删侧从树中清除，幸存的单侧条目按配置重新赋方向，
/// 该模型清理即使中途取消也一定执行。
#[allow(clippy::too_many_arguments)]
pub async fn execute_delete(
    folder_cmp: &mut FolderComparison,
    cfgs: &[SyncDirectionConfig],
    selection_left: &HashSet<ItemId>,
    selection_right: &HashSet<ItemId>,
    use_recycle_bin: bool,
    progress: &ProgressReporter,
) -> Result<(), EngineError> {
    if folder_cmp.len() != cfgs.len() {
        return Err(EngineError::ContractViolation(format!(
            "基准目录对数量 ({}) 与方向配置数量 ({}) 不一致",
            folder_cmp.len(),
            cfgs.len()
        )));
    }

    let mut items = Vec::new();
    for (pair_idx, base) in folder_cmp.iter().enumerate() {
        collect_items(
            &base.children,
            pair_idx,
            &SidePair::new(String::new(), String::new()),
            &SidePair::new(selection_left, selection_right),
            &mut items,
        );
    }

    // 每个基准目录（按设备路径）只探测一次回收站支持
    let mut recycler_supported: BTreeMap<AbstractPath, bool> = BTreeMap::new();
    let mut unsupported: Vec<String> = Vec::new();
    if use_recycle_bin {
        for item in &items {
            let base_path = folder_cmp[item.pair_idx].base_paths.get(item.side).clone();
            recycler_supported.entry(base_path.clone()).or_insert_with(|| {
                let supported = base_path.device.supports_recycle_bin();
                if !supported {
                    unsupported.push(base_path.display());
                }
                supported
            });
        }
        if !unsupported.is_empty() {
            // 只发一次警告，列出所有不支持的目录
            progress.warn(format!(
                "以下目录不支持回收站, 删除的文件将无法恢复: {}",
                unsupported.join(", ")
            ));
        }
    }

    progress.set_phase(format!("正在删除 {} 个条目...", items.len()));

    // 回收会话按基准目录复用，结束时统一提交
    let mut sessions: BTreeMap<AbstractPath, Box<dyn RecycleSession>> = BTreeMap::new();
    let mut deleted: HashSet<(ItemId, Side)> = HashSet::new();
    let mut deferred: Option<EngineError> = None;

    for item in &items {
        if let Err(e) = progress.checkpoint() {
            deferred = Some(e);
            break;
        }

        let base_path = folder_cmp[item.pair_idx].base_paths.get(item.side).clone();
        let use_recycler =
            use_recycle_bin && recycler_supported.get(&base_path).copied().unwrap_or(false);

        let item_path = match base_path.join(&item.rel_path) {
            Ok(p) => p,
            Err(e) => {
                progress.warn(format!("路径非法, 跳过: {} - {}", item.rel_path, e));
                continue;
            }
        };
        progress.status(item_path.display());

        let result: Result<(), StorageError> = if use_recycler {
            progress.log_info(format!("正在移入回收站 {}", item_path.display()));
            let session = match sessions.entry(base_path.clone()) {
                std::collections::btree_map::Entry::Occupied(e) => e.into_mut(),
                std::collections::btree_map::Entry::Vacant(slot) => {
                    match base_path.device.create_recycler_session().await {
                        Ok(s) => slot.insert(s),
                        Err(e) => {
                            progress.warn(format!(
                                "无法创建回收会话: {} - {}",
                                base_path.display(),
                                e
                            ));
                            continue;
                        }
                    }
                }
            };
            session
                .recycle_item_if_exists(&item_path.rel, &item.rel_path)
                .await
                .map(|()| progress.report_delta(1, 0))
        } else {
            match item.kind {
                ItemKind::File => {
                    progress.log_info(format!("正在删除文件 {}", item_path.display()));
                    item_path
                        .device
                        .remove_file_if_exists(&item_path.rel)
                        .await
                        .map(|_| progress.report_delta(1, 0))
                }
                ItemKind::Symlink => {
                    progress.log_info(format!("正在删除符号链接 {}", item_path.display()));
                    item_path
                        .device
                        .remove_symlink_if_exists(&item_path.rel)
                        .await
                        .map(|_| progress.report_delta(1, 0))
                }
                ItemKind::Folder => {
                    progress.log_info(format!("正在删除目录 {}", item_path.display()));
                    item_path
                        .device
                        .remove_folder_if_exists_recursion(
                            &item_path.rel,
                            Some(&|_p: &str| progress.report_delta(1, 0)),
                            Some(&|_p: &str| progress.report_delta(1, 0)),
                        )
                        .await
                }
            }
        };

        match result {
            Ok(()) => {
                deleted.insert((item.id, item.side));
            }
            Err(StorageError::Cancelled) => {
                deferred = Some(EngineError::Cancelled);
                break;
            }
            Err(e) => {
                progress.warn(format!("删除失败, 跳过: {} - {}", item_path.display(), e));
            }
        }
    }

    for (path, session) in &sessions {
        if let Err(e) = session.try_cleanup(None).await {
            progress.warn(format!("回收会话清理失败: {} - {}", path.display(), e));
        }
    }

    // 即使中途取消也要把内存树收拾干净：清除被删侧、重新赋方向、清理空行
    let attempted: HashSet<ItemId> = items.iter().map(|i| i.id).collect();
    for (base, cfg) in folder_cmp.iter_mut().zip(cfgs) {
        finalize_after_delete(&mut base.children, &deleted, &attempted, cfg);
        base.remove_empty();
    }

    match deferred {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// 删除后的模型维护：清除被删侧并为只剩一侧的条目重新赋方向。
/// 不做完整重比较，用户可能已经做过手工调整。
fn finalize_after_delete(
    children: &mut ChildSet,
    deleted: &HashSet<(ItemId, Side)>,
    attempted: &HashSet<ItemId>,
    cfg: &SyncDirectionConfig,
) {
    let one_sided_direction = |empty_left: bool| -> SyncDir {
        if cfg.variant == SyncVariant::TwoWay {
            // 双向模式把手工删除传播到另一侧
            if empty_left {
                SyncDir::Right
            } else {
                SyncDir::Left
            }
        } else {
            let dirs = cfg.extract_directions();
            let d = if empty_left {
                dirs.ex_right_side_only
            } else {
                dirs.ex_left_side_only
            };
            match d {
                crate::config::SyncDirection::Left => SyncDir::Left,
                crate::config::SyncDirection::Right => SyncDir::Right,
                crate::config::SyncDirection::None => SyncDir::None,
            }
        }
    };

    for file in &mut children.files {
        for side in [Side::Left, Side::Right] {
            if deleted.contains(&(file.id, side)) {
                file.clear_side(side);
            }
        }
        if attempted.contains(&file.id) && file.is_empty(Side::Left) != file.is_empty(Side::Right) {
            file.direction = one_sided_direction(file.is_empty(Side::Left));
        }
    }
    for link in &mut children.symlinks {
        for side in [Side::Left, Side::Right] {
            if deleted.contains(&(link.id, side)) {
                link.clear_side(side);
            }
        }
        if attempted.contains(&link.id) && link.is_empty(Side::Left) != link.is_empty(Side::Right) {
            link.direction = one_sided_direction(link.is_empty(Side::Left));
        }
    }
    for folder in &mut children.folders {
        for side in [Side::Left, Side::Right] {
            if deleted.contains(&(folder.id, side)) {
                folder.clear_side_rec(side);
            }
        }
        if attempted.contains(&folder.id)
            && folder.is_empty(Side::Left) != folder.is_empty(Side::Right)
        {
            let direction = one_sided_direction(folder.is_empty(Side::Left));
            folder.direction = direction.clone();
            set_sync_direction_rec_children(&mut folder.children, &direction);
        }
        finalize_after_delete(&mut folder.children, deleted, attempted, cfg);
    }
}
