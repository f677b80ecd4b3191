//! 同步方向判定
//!
//! 固定方向模式按类别查映射表；双向模式独立查询两侧的基线条目，
//! 推断哪一侧发生了变化。两种模式都先处理文件与符号链接，
//! 再递归进入子目录，与基线子树的自顶向下解析顺序保持一致。

use crate::config::{
    two_way_update_set, CompareVariant, DirectionSet, SyncDirection, SyncDirectionConfig,
    SyncVariant,
};
use crate::core::baseline::{
    file_matches_baseline, file_still_in_sync, folder_matches_baseline, symlink_matches_baseline,
    symlink_still_in_sync, InSyncFolder,
};
use crate::core::hierarchy::{
    BaseFolderPair, Category, ChildSet, FilePair, FolderComparison, FolderPair, Side, SymlinkPair,
    SyncDir,
};
use crate::core::moves::detect_moved_files;
use crate::db::{pair_key, BaselineStore};
use crate::error::EngineError;
use crate::progress::ProgressReporter;
use crate::storage::is_temp_file_name;
use std::collections::HashMap;

const TXT_BOTH_SIDES_CHANGED: &str = "自上次同步后两侧都发生了变化。";
const TXT_NO_SIDE_CHANGED: &str = "无法确定同步方向: 自上次同步后没有检测到变化。";
const TXT_DB_NOT_IN_SYNC: &str = "无法确定同步方向: 在当前比较设置下基线条目已不可信。";

fn to_sync_dir(dir: SyncDirection) -> SyncDir {
    match dir {
        SyncDirection::Left => SyncDir::Left,
        SyncDirection::Right => SyncDir::Right,
        SyncDirection::None => SyncDir::None,
    }
}

/// 冲突/无法归类的条目：配置方向为 None 时原样保留条目自己的冲突描述
fn conflict_direction(category: &Category, configured: SyncDirection) -> SyncDir {
    if configured == SyncDirection::None {
        match category {
            Category::Conflict(desc) => SyncDir::Conflict(desc.clone()),
            _ => SyncDir::Conflict("两侧元数据不同。".to_string()),
        }
    } else {
        to_sync_dir(configured)
    }
}

// ============ 固定方向模式 ============

/// 按映射表为整棵子树设置方向
pub fn apply_fixed_directions(children: &mut ChildSet, dir_set: &DirectionSet) {
    for file in &mut children.files {
        fixed_direction_file(file, dir_set);
    }
    for link in &mut children.symlinks {
        fixed_direction_symlink(link, dir_set);
    }
    for folder in &mut children.folders {
        fixed_direction_folder(folder, dir_set);
    }
}

fn fixed_direction_file(file: &mut FilePair, dir_set: &DirectionSet) {
    // 残留的事务性复制临时文件安排在其所在侧删除
    if file.category == Category::LeftOnly && is_temp_file_name(file.name(Side::Left)) {
        file.direction = SyncDir::Left;
        return;
    }
    if file.category == Category::RightOnly && is_temp_file_name(file.name(Side::Right)) {
        file.direction = SyncDir::Right;
        return;
    }

    file.direction = match &file.category {
        Category::LeftOnly => to_sync_dir(dir_set.ex_left_side_only),
        Category::RightOnly => to_sync_dir(dir_set.ex_right_side_only),
        Category::LeftNewer => to_sync_dir(dir_set.left_newer),
        Category::RightNewer => to_sync_dir(dir_set.right_newer),
        Category::DifferentContent => to_sync_dir(dir_set.different),
        Category::Conflict(_) | Category::DifferentMetadata => {
            conflict_direction(&file.category, dir_set.conflict)
        }
        Category::Equal => SyncDir::None,
    };
}

fn fixed_direction_symlink(link: &mut SymlinkPair, dir_set: &DirectionSet) {
    link.direction = match &link.category {
        Category::LeftOnly => to_sync_dir(dir_set.ex_left_side_only),
        Category::RightOnly => to_sync_dir(dir_set.ex_right_side_only),
        Category::LeftNewer => to_sync_dir(dir_set.left_newer),
        Category::RightNewer => to_sync_dir(dir_set.right_newer),
        Category::DifferentContent => to_sync_dir(dir_set.different),
        Category::Conflict(_) | Category::DifferentMetadata => {
            conflict_direction(&link.category, dir_set.conflict)
        }
        Category::Equal => SyncDir::None,
    };
}

fn fixed_direction_folder(folder: &mut FolderPair, dir_set: &DirectionSet) {
    // 残留的临时目录整棵安排删除，不再深入
    if folder.category == Category::LeftOnly && is_temp_file_name(folder.name(Side::Left)) {
        set_sync_direction_rec_folder(folder, &SyncDir::Left);
        return;
    }
    if folder.category == Category::RightOnly && is_temp_file_name(folder.name(Side::Right)) {
        set_sync_direction_rec_folder(folder, &SyncDir::Right);
        return;
    }

    folder.direction = match &folder.category {
        Category::LeftOnly => to_sync_dir(dir_set.ex_left_side_only),
        Category::RightOnly => to_sync_dir(dir_set.ex_right_side_only),
        Category::Equal => SyncDir::None,
        Category::Conflict(_) | Category::DifferentMetadata => {
            conflict_direction(&folder.category, dir_set.conflict)
        }
        // 目录没有时间/内容类别；按冲突处理以防上游给出意外值
        _ => conflict_direction(&folder.category, dir_set.conflict),
    };

    apply_fixed_directions(&mut folder.children, dir_set);
}

/// 递归设置方向（类别为 Equal 的条目保持 None）
pub fn set_sync_direction_rec_folder(folder: &mut FolderPair, direction: &SyncDir) {
    if folder.category != Category::Equal {
        folder.direction = direction.clone();
    }
    set_sync_direction_rec_children(&mut folder.children, direction);
}

pub fn set_sync_direction_rec_children(children: &mut ChildSet, direction: &SyncDir) {
    for file in &mut children.files {
        if file.category != Category::Equal {
            file.direction = direction.clone();
        }
    }
    for link in &mut children.symlinks {
        if link.category != Category::Equal {
            link.direction = direction.clone();
        }
    }
    for folder in &mut children.folders {
        set_sync_direction_rec_folder(folder, direction);
    }
}

// ============ 双向模式 ============

struct TwoWayContext<'a> {
    cmp_variant: CompareVariant,
    file_time_tolerance: i64,
    ignore_time_shift_minutes: &'a [u32],
}

/// 基于基线为整棵子树设置方向
pub fn apply_two_way(base: &mut BaseFolderPair, db_root: &InSyncFolder) {
    let ctx = TwoWayContext {
        cmp_variant: base.cmp_variant,
        file_time_tolerance: base.file_time_tolerance,
        ignore_time_shift_minutes: &base.ignore_time_shift_minutes,
    };
    two_way_children(&mut base.children, Some(db_root), Some(db_root), &ctx);
}

fn two_way_children(
    children: &mut ChildSet,
    db_left: Option<&InSyncFolder>,
    db_right: Option<&InSyncFolder>,
    ctx: &TwoWayContext<'_>,
) {
    for file in &mut children.files {
        two_way_file(file, db_left, db_right, ctx);
    }
    for link in &mut children.symlinks {
        two_way_symlink(link, db_left, db_right, ctx);
    }
    for folder in &mut children.folders {
        two_way_folder(folder, db_left, db_right, ctx);
    }
}

/// 两侧名字一致时左右共享同一条基线记录；大小写/规范化不同时各按各的名字查
fn lookup_pair<'a, T>(
    db_left: Option<&'a InSyncFolder>,
    db_right: Option<&'a InSyncFolder>,
    name_left: &str,
    name_right: &str,
    get: impl Fn(&'a InSyncFolder, &str) -> Option<&'a T>,
) -> (Option<&'a T>, Option<&'a T>) {
    let entry_left = db_left.and_then(|db| get(db, name_left));
    let same_db = match (db_left, db_right) {
        (Some(l), Some(r)) => std::ptr::eq(l, r),
        (None, None) => true,
        _ => false,
    };
    let entry_right = if same_db && name_left == name_right {
        entry_left
    } else {
        db_right.and_then(|db| get(db, name_right))
    };
    (entry_left, entry_right)
}

fn two_way_file(
    file: &mut FilePair,
    db_left: Option<&InSyncFolder>,
    db_right: Option<&InSyncFolder>,
    ctx: &TwoWayContext<'_>,
) {
    if file.category == Category::Equal {
        return;
    }

    // 残留的事务性复制临时文件安排在其所在侧删除
    if file.category == Category::LeftOnly && is_temp_file_name(file.name(Side::Left)) {
        file.direction = SyncDir::Left;
        return;
    }
    if file.category == Category::RightOnly && is_temp_file_name(file.name(Side::Right)) {
        file.direction = SyncDir::Right;
        return;
    }

    let (entry_left, entry_right) = lookup_pair(
        db_left,
        db_right,
        file.name(Side::Left),
        file.name(Side::Right),
        |db, name| db.get_file(name),
    );

    let changed_left =
        !file_matches_baseline(file, Side::Left, entry_left, ctx.ignore_time_shift_minutes);
    let changed_right =
        !file_matches_baseline(file, Side::Right, entry_right, ctx.ignore_time_shift_minutes);

    if changed_left != changed_right {
        // 基线条目在当前设置下已不可信时不能据此覆盖任何一侧
        let stale = |entry: Option<&crate::core::baseline::InSyncFile>| {
            entry.is_some_and(|e| {
                !file_still_in_sync(
                    e,
                    ctx.cmp_variant,
                    ctx.file_time_tolerance,
                    ctx.ignore_time_shift_minutes,
                )
            })
        };
        if stale(entry_left) || stale(entry_right) {
            file.direction = SyncDir::Conflict(TXT_DB_NOT_IN_SYNC.to_string());
        } else {
            file.direction = if changed_left {
                SyncDir::Right
            } else {
                SyncDir::Left
            };
        }
    } else if changed_left {
        file.direction = SyncDir::Conflict(TXT_BOTH_SIDES_CHANGED.to_string());
    } else {
        file.direction = SyncDir::Conflict(TXT_NO_SIDE_CHANGED.to_string());
    }
}

fn two_way_symlink(
    link: &mut SymlinkPair,
    db_left: Option<&InSyncFolder>,
    db_right: Option<&InSyncFolder>,
    ctx: &TwoWayContext<'_>,
) {
    if link.category == Category::Equal {
        return;
    }

    let (entry_left, entry_right) = lookup_pair(
        db_left,
        db_right,
        link.name(Side::Left),
        link.name(Side::Right),
        |db, name| db.get_symlink(name),
    );

    let changed_left =
        !symlink_matches_baseline(link, Side::Left, entry_left, ctx.ignore_time_shift_minutes);
    let changed_right =
        !symlink_matches_baseline(link, Side::Right, entry_right, ctx.ignore_time_shift_minutes);

    if changed_left != changed_right {
        let stale = |entry: Option<&crate::core::baseline::InSyncSymlink>| {
            entry.is_some_and(|e| {
                !symlink_still_in_sync(
                    e,
                    ctx.cmp_variant,
                    ctx.file_time_tolerance,
                    ctx.ignore_time_shift_minutes,
                )
            })
        };
        if stale(entry_left) || stale(entry_right) {
            link.direction = SyncDir::Conflict(TXT_DB_NOT_IN_SYNC.to_string());
        } else {
            link.direction = if changed_left {
                SyncDir::Right
            } else {
                SyncDir::Left
            };
        }
    } else if changed_left {
        link.direction = SyncDir::Conflict(TXT_BOTH_SIDES_CHANGED.to_string());
    } else {
        link.direction = SyncDir::Conflict(TXT_NO_SIDE_CHANGED.to_string());
    }
}

fn two_way_folder(
    folder: &mut FolderPair,
    db_left: Option<&InSyncFolder>,
    db_right: Option<&InSyncFolder>,
    ctx: &TwoWayContext<'_>,
) {
    // 残留的临时目录整棵安排删除，不再深入
    if folder.category == Category::LeftOnly && is_temp_file_name(folder.name(Side::Left)) {
        set_sync_direction_rec_folder(folder, &SyncDir::Left);
        return;
    }
    if folder.category == Category::RightOnly && is_temp_file_name(folder.name(Side::Right)) {
        set_sync_direction_rec_folder(folder, &SyncDir::Right);
        return;
    }

    let (entry_left, entry_right) = lookup_pair(
        db_left,
        db_right,
        folder.name(Side::Left),
        folder.name(Side::Right),
        |db, name| db.get_folder(name),
    );

    if folder.category != Category::Equal {
        // 目录只看存在性与基线存在性，不比较时间
        let changed_left = !folder_matches_baseline(folder, Side::Left, entry_left);
        let changed_right = !folder_matches_baseline(folder, Side::Right, entry_right);

        if changed_left != changed_right {
            folder.direction = if changed_left {
                SyncDir::Right
            } else {
                SyncDir::Left
            };
        } else if changed_left {
            folder.direction = SyncDir::Conflict(TXT_BOTH_SIDES_CHANGED.to_string());
        } else {
            folder.direction = SyncDir::Conflict(TXT_NO_SIDE_CHANGED.to_string());
        }
    }

    two_way_children(&mut folder.children, entry_left, entry_right, ctx);
}

// ============ 工具 ============

/// 整棵子树是否全部为 Equal（短路）
pub fn all_items_category_equal(children: &ChildSet) -> bool {
    children.files.iter().all(|f| f.category == Category::Equal)
        && children
            .symlinks
            .iter()
            .all(|s| s.category == Category::Equal)
        && children.folders.iter().all(|d| {
            d.category == Category::Equal && all_items_category_equal(&d.children)
        })
}

/// 所有基准目录对是否全部一致
pub fn all_elements_equal(folder_cmp: &FolderComparison) -> bool {
    folder_cmp
        .iter()
        .all(|base| all_items_category_equal(&base.children))
}

// ============ 入口 ============

/// 为所有基准目录对判定同步方向（必要时读取基线并检测重命名）。
///
/// 基线读取是尽力而为：读取失败或中途取消时仍然为每个目录对设置方向
/// （双向模式退回首次同步映射表），之后才返回相应的错误。
pub async fn determine_sync_directions(
    folder_cmp: &mut FolderComparison,
    cfgs: &[SyncDirectionConfig],
    store: Option<&BaselineStore>,
    progress: &ProgressReporter,
) -> Result<(), EngineError> {
    if folder_cmp.len() != cfgs.len() {
        return Err(EngineError::ContractViolation(format!(
            "基准目录对数量 ({}) 与方向配置数量 ({}) 不一致",
            folder_cmp.len(),
            cfgs.len()
        )));
    }

    // 全部一致的目录对不需要碰基线
    let mut needs_baseline = vec![false; folder_cmp.len()];
    for (idx, (base, cfg)) in folder_cmp.iter().zip(cfgs).enumerate() {
        if cfg.detect_moved_files_enabled() && !all_items_category_equal(&base.children) {
            needs_baseline[idx] = true;
        }
    }

    // 读取基线（失败降级为警告；取消也先把方向设完再返回）
    let mut baselines: HashMap<usize, InSyncFolder> = HashMap::new();
    let mut deferred: Option<EngineError> = None;
    if let Some(store) = store {
        progress.set_phase("正在读取基线数据...");
        for (idx, base) in folder_cmp.iter().enumerate() {
            if !needs_baseline[idx] {
                continue;
            }
            if let Err(e) = progress.checkpoint() {
                deferred = Some(e);
                break;
            }
            match store.load(&pair_key(base)).await {
                Ok(Some(db)) => {
                    baselines.insert(idx, db);
                }
                Ok(None) => {}
                Err(e) => {
                    progress.warn(format!(
                        "无法读取基线数据 ({} <-> {}): {}",
                        base.base_paths.left.display(),
                        base.base_paths.right.display(),
                        e
                    ));
                }
            }
        }
    }

    progress.set_phase("正在计算同步方向...");
    for (idx, (base, cfg)) in folder_cmp.iter_mut().zip(cfgs).enumerate() {
        if needs_baseline[idx] || cfg.variant != SyncVariant::TwoWay {
            match (cfg.variant, baselines.get(&idx)) {
                (SyncVariant::TwoWay, Some(db)) => apply_two_way(base, db),
                (SyncVariant::TwoWay, None) => {
                    // 首次同步（或基线缺失）：退回"新覆盖旧"
                    progress.log_info(format!(
                        "首次同步，方向按\"新文件覆盖旧文件\"设置: {} <-> {}",
                        base.base_paths.left.display(),
                        base.base_paths.right.display()
                    ));
                    apply_fixed_directions(&mut base.children, &two_way_update_set());
                }
                (_, _) => {
                    apply_fixed_directions(&mut base.children, &cfg.extract_directions());
                }
            }

            // 重命名检测需要基线支持
            if let Some(db) = baselines.get(&idx) {
                detect_moved_files(base, db);
            }
        }
    }

    match deferred {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::baseline::{FolderStatus, InSyncDescrFile, InSyncFile};
    use crate::core::hierarchy::{FileAttrs, SidePair};
    use crate::storage::TEMP_FILE_SUFFIX;

    fn names(left: &str, right: &str) -> SidePair<String> {
        SidePair::new(left.to_string(), right.to_string())
    }

    fn attrs(size: u64, mod_time: i64) -> FileAttrs {
        FileAttrs {
            size,
            mod_time,
            print: 0,
        }
    }

    fn make_file(id: u64, name: &str, category: Category) -> FilePair {
        let (left, right) = match category {
            Category::LeftOnly => (Some(attrs(1, 10)), None),
            Category::RightOnly => (None, Some(attrs(1, 10))),
            _ => (Some(attrs(1, 10)), Some(attrs(1, 20))),
        };
        FilePair::new(id, names(name, name), SidePair::new(left, right), category)
    }

    fn db_with_file(name: &str, time_left: i64, time_right: i64, size: u64) -> InSyncFolder {
        let mut db = InSyncFolder::new(FolderStatus::InSync);
        db.files.insert(
            name.to_string(),
            InSyncFile {
                left: InSyncDescrFile {
                    mod_time: time_left,
                    print: 0,
                },
                right: InSyncDescrFile {
                    mod_time: time_right,
                    print: 0,
                },
                file_size: size,
                cmp_variant: CompareVariant::TimeSize,
            },
        );
        db
    }

    fn base_pair() -> BaseFolderPair {
        use crate::storage::{AbstractPath, NativeDevice, RelPath};
        use std::sync::Arc;
        let dir = std::env::temp_dir();
        let dev: crate::storage::AfsDevice = Arc::new(NativeDevice::new(&dir).unwrap());
        BaseFolderPair::new(
            SidePair::new(
                AbstractPath::new(dev.clone(), RelPath::root()),
                AbstractPath::new(dev, RelPath::root()),
            ),
            CompareVariant::TimeSize,
            2,
            Vec::new(),
        )
    }

    #[test]
    fn test_equal_items_get_direction_none() {
        let mut children = ChildSet::default();
        children
            .files
            .push(make_file(1, "same.txt", Category::Equal));
        apply_fixed_directions(
            &mut children,
            &SyncDirectionConfig::new(SyncVariant::Mirror).extract_directions(),
        );
        assert_eq!(children.files[0].direction, SyncDir::None);

        // 双向模式同样不碰 Equal 条目
        let mut base = base_pair();
        base.children
            .files
            .push(make_file(1, "same.txt", Category::Equal));
        let db = InSyncFolder::new(FolderStatus::InSync);
        apply_two_way(&mut base, &db);
        assert_eq!(base.children.files[0].direction, SyncDir::None);
    }

    #[test]
    fn test_all_elements_equal_short_circuits_on_difference() {
        let mut base = base_pair();
        base.children
            .files
            .push(make_file(1, "same.txt", Category::Equal));
        let mut folder_cmp = vec![base];
        assert!(all_elements_equal(&folder_cmp));

        folder_cmp[0]
            .children
            .files
            .push(make_file(2, "changed.txt", Category::LeftNewer));
        assert!(!all_elements_equal(&folder_cmp));
    }

    #[test]
    fn test_fixed_table_and_conflict_passthrough() {
        let mut children = ChildSet::default();
        children
            .files
            .push(make_file(1, "a", Category::RightNewer));
        children.files.push(make_file(
            2,
            "b",
            Category::Conflict("原始冲突描述".to_string()),
        ));

        let mut cfg = SyncDirectionConfig::new(SyncVariant::Custom);
        cfg.custom.right_newer = SyncDirection::Left;
        cfg.custom.conflict = SyncDirection::None;
        apply_fixed_directions(&mut children, &cfg.extract_directions());

        assert_eq!(children.files[0].direction, SyncDir::Left);
        // 冲突方向为 None 时保留条目自己的描述
        assert_eq!(
            children.files[1].direction,
            SyncDir::Conflict("原始冲突描述".to_string())
        );
    }

    #[test]
    fn test_temp_leftovers_scheduled_for_deletion() {
        let tmp_name = format!("report.docx{}", TEMP_FILE_SUFFIX);
        let mut children = ChildSet::default();
        children
            .files
            .push(make_file(1, &tmp_name, Category::LeftOnly));

        let mut folder = FolderPair::new(
            2,
            names(&tmp_name, ""),
            SidePair::new(true, false),
            Category::LeftOnly,
        );
        folder
            .children
            .files
            .push(make_file(3, "inner", Category::LeftOnly));
        children.folders.push(folder);

        // Mirror 会把 LeftOnly 映射为 Right，但临时残留必须在本侧删除
        apply_fixed_directions(
            &mut children,
            &SyncDirectionConfig::new(SyncVariant::Mirror).extract_directions(),
        );
        assert_eq!(children.files[0].direction, SyncDir::Left);
        assert_eq!(children.folders[0].direction, SyncDir::Left);
        assert_eq!(children.folders[0].children.files[0].direction, SyncDir::Left);
    }

    #[test]
    fn test_two_way_one_side_changed() {
        // 右侧与基线一致，左侧时间变了 -> 覆盖右侧
        let mut base = base_pair();
        let mut file = make_file(1, "f", Category::LeftNewer);
        file.attrs.left = Some(attrs(1, 500));
        file.attrs.right = Some(attrs(1, 10));
        base.children.files.push(file);

        let db = db_with_file("f", 10, 10, 1);
        apply_two_way(&mut base, &db);
        assert_eq!(base.children.files[0].direction, SyncDir::Right);
    }

    #[test]
    fn test_two_way_stale_baseline_is_conflict() {
        let mut base = base_pair();
        let mut file = make_file(1, "f", Category::LeftNewer);
        file.attrs.left = Some(attrs(1, 500));
        file.attrs.right = Some(attrs(1, 9000));
        base.children.files.push(file);

        // 只有左侧变化，但基线两侧时间差超出容差：
        // 按时间+大小捕获的条目不可信，不能据此覆盖
        let db = db_with_file("f", 10, 9000, 1);
        apply_two_way(&mut base, &db);
        match &base.children.files[0].direction {
            SyncDir::Conflict(desc) => assert!(desc.contains("基线条目已不可信")),
            other => panic!("预期冲突, 实际 {:?}", other),
        }
    }

    #[test]
    fn test_two_way_both_and_neither_changed() {
        let mut base = base_pair();
        let mut both = make_file(1, "both", Category::DifferentContent);
        both.attrs.left = Some(attrs(2, 700));
        both.attrs.right = Some(attrs(3, 800));
        base.children.files.push(both);

        // 上游认为不同，但两侧都与基线一致（容差内）-> "没有检测到变化"
        let mut none = make_file(2, "none", Category::LeftNewer);
        none.attrs.left = Some(attrs(1, 11));
        none.attrs.right = Some(attrs(1, 10));
        base.children.files.push(none);

        let mut db = db_with_file("both", 10, 10, 1);
        db.files
            .extend(db_with_file("none", 10, 10, 1).files.into_iter());
        apply_two_way(&mut base, &db);

        match &base.children.files[0].direction {
            SyncDir::Conflict(desc) => assert!(desc.contains("两侧都发生了变化")),
            other => panic!("预期冲突, 实际 {:?}", other),
        }
        match &base.children.files[1].direction {
            SyncDir::Conflict(desc) => assert!(desc.contains("没有检测到变化")),
            other => panic!("预期冲突, 实际 {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_first_sync_falls_back_to_update_preset() {
        let mut base = base_pair();
        base.children
            .files
            .push(make_file(1, "newer-left", Category::LeftNewer));
        let mut folder_cmp = vec![base];
        let cfgs = vec![SyncDirectionConfig::new(SyncVariant::TwoWay)];

        let progress = ProgressReporter::new();
        determine_sync_directions(&mut folder_cmp, &cfgs, None, &progress)
            .await
            .unwrap();
        // 没有基线：退回"新覆盖旧"，左侧更新 -> 推到右侧
        assert_eq!(folder_cmp[0].children.files[0].direction, SyncDir::Right);
    }

    #[tokio::test]
    async fn test_pair_count_contract() {
        let mut folder_cmp = vec![base_pair()];
        let progress = ProgressReporter::new();
        let result =
            determine_sync_directions(&mut folder_cmp, &[], None, &progress).await;
        assert!(matches!(result, Err(EngineError::ContractViolation(_))));
    }
}
