//! 重命名/移动检测
//!
//! 把左侧独有与右侧独有的文件经由基线条目配成一对：
//! 路径对应优先于指纹对应，指纹重复的文件（硬链接等）一律剔除，
//! 候选的大小+时间必须与基线记录的该侧取值完全一致才接受。
//! 配对结果写入 `move_ref`，对称且只设置一次。

use crate::core::baseline::{file_still_in_sync, InSyncFile, InSyncFolder};
use crate::core::hierarchy::{BaseFolderPair, Category, ChildSet, FileAttrs, ItemId, Side};
use crate::storage::FingerPrint;
use std::collections::{HashMap, HashSet};

/// 收集阶段得到的文件快照；后续配对是纯计算，最后按 id 回写
struct FileRecord {
    id: ItemId,
    category_one_side: Option<Side>,
    left_attrs: Option<FileAttrs>,
    right_attrs: Option<FileAttrs>,
    /// 该侧独有文件按路径身份对应到的基线条目（条目地址作键）
    db_assoc: Option<usize>,
}

/// 在一个基准目录对上检测移动/重命名
pub fn detect_moved_files(base: &mut BaseFolderPair, db_root: &InSyncFolder) {
    let mut records = Vec::new();
    collect_records(&base.children, Some(db_root), Some(db_root), &mut records);

    // 指纹唯一性检查覆盖*所有*携带指纹的文件；任何重复一律剔除，
    // 重复的指纹绝不能用于配对。
    let clear_left = duplicated_ids(&records, Side::Left);
    let clear_right = duplicated_ids(&records, Side::Right);

    // 单侧独有文件的候选表
    let mut by_path_left: HashMap<usize, usize> = HashMap::new();
    let mut by_path_right: HashMap<usize, usize> = HashMap::new();
    let mut by_print_left: HashMap<FingerPrint, usize> = HashMap::new();
    let mut by_print_right: HashMap<FingerPrint, usize> = HashMap::new();

    for (idx, record) in records.iter().enumerate() {
        match record.category_one_side {
            Some(Side::Left) => {
                if let Some(key) = record.db_assoc {
                    by_path_left.insert(key, idx);
                }
                if let Some(attrs) = &record.left_attrs {
                    if attrs.print != 0 && !clear_left.contains(&record.id) {
                        by_print_left.insert(attrs.print, idx);
                    }
                }
            }
            Some(Side::Right) => {
                if let Some(key) = record.db_assoc {
                    by_path_right.insert(key, idx);
                }
                if let Some(attrs) = &record.right_attrs {
                    if attrs.print != 0 && !clear_right.contains(&record.id) {
                        by_print_right.insert(attrs.print, idx);
                    }
                }
            }
            None => {}
        }
    }

    let mut pairs: HashMap<ItemId, ItemId> = HashMap::new();
    if (!by_path_left.is_empty() || !by_print_left.is_empty())
        && (!by_path_right.is_empty() || !by_print_right.is_empty())
    {
        let mut paired: HashSet<ItemId> = HashSet::new();
        detect_move_pairs(
            db_root,
            base,
            &records,
            &by_path_left,
            &by_path_right,
            &by_print_left,
            &by_print_right,
            &mut paired,
            &mut pairs,
        );
    }

    apply_results(&mut base.children, &clear_left, &clear_right, &pairs);
}

fn collect_records(
    children: &ChildSet,
    db_left: Option<&InSyncFolder>,
    db_right: Option<&InSyncFolder>,
    out: &mut Vec<FileRecord>,
) {
    for file in &children.files {
        let (category_one_side, db_assoc) = match file.category {
            Category::LeftOnly => {
                let assoc = db_left
                    .and_then(|db| db.get_file(file.name(Side::Left)))
                    .map(entry_key);
                (Some(Side::Left), assoc)
            }
            Category::RightOnly => {
                let assoc = db_right
                    .and_then(|db| db.get_file(file.name(Side::Right)))
                    .map(entry_key);
                (Some(Side::Right), assoc)
            }
            _ => (None, None),
        };
        out.push(FileRecord {
            id: file.id,
            category_one_side,
            left_attrs: file.attrs.left,
            right_attrs: file.attrs.right,
            db_assoc,
        });
    }

    for folder in &children.folders {
        let entry_left = db_left.and_then(|db| db.get_folder(folder.name(Side::Left)));
        let same_db = match (db_left, db_right) {
            (Some(l), Some(r)) => std::ptr::eq(l, r),
            (None, None) => true,
            _ => false,
        };
        let entry_right = if same_db && folder.name(Side::Left) == folder.name(Side::Right) {
            entry_left
        } else {
            db_right.and_then(|db| db.get_folder(folder.name(Side::Right)))
        };
        collect_records(&folder.children, entry_left, entry_right, out);
    }
}

/// 基线条目的身份键（树借用期间地址稳定）
fn entry_key(entry: &InSyncFile) -> usize {
    entry as *const InSyncFile as usize
}

/// 某一侧指纹出现重复的所有文件 id（全部剔除，包括合法硬链接）
fn duplicated_ids(records: &[FileRecord], side: Side) -> HashSet<ItemId> {
    let mut prints: Vec<(FingerPrint, ItemId)> = records
        .iter()
        .filter_map(|r| {
            let attrs = match side {
                Side::Left => r.left_attrs.as_ref(),
                Side::Right => r.right_attrs.as_ref(),
            }?;
            (attrs.print != 0).then_some((attrs.print, r.id))
        })
        .collect();
    prints.sort_unstable();

    let mut cleared = HashSet::new();
    let mut run_start = 0;
    for i in 1..=prints.len() {
        if i == prints.len() || prints[i].0 != prints[run_start].0 {
            if i - run_start > 1 {
                for (_, id) in &prints[run_start..i] {
                    cleared.insert(*id);
                }
            }
            run_start = i;
        }
    }
    cleared
}

fn same_size_and_date(attrs: &FileAttrs, db_file: &InSyncFile, side: Side) -> bool {
    // 不使用任何时间容差：指纹可能在删除/重建后被无关新文件复用，
    // 大小+时间的精确一致是对这种误配的防线。
    attrs.size == db_file.file_size && attrs.mod_time == db_file.descr(side).mod_time
}

#[allow(clippy::too_many_arguments)]
fn detect_move_pairs(
    db_folder: &InSyncFolder,
    base: &BaseFolderPair,
    records: &[FileRecord],
    by_path_left: &HashMap<usize, usize>,
    by_path_right: &HashMap<usize, usize>,
    by_print_left: &HashMap<FingerPrint, usize>,
    by_print_right: &HashMap<FingerPrint, usize>,
    paired: &mut HashSet<ItemId>,
    pairs: &mut HashMap<ItemId, ItemId>,
) {
    for db_file in db_folder.files.values() {
        find_and_set_move_pair(
            db_file,
            base,
            records,
            by_path_left,
            by_path_right,
            by_print_left,
            by_print_right,
            paired,
            pairs,
        );
    }
    for sub in db_folder.folders.values() {
        detect_move_pairs(
            sub,
            base,
            records,
            by_path_left,
            by_path_right,
            by_print_left,
            by_print_right,
            paired,
            pairs,
        );
    }
}

/// 按一侧解析候选：路径对应是更强的信号，存在时不再考虑指纹对应，
/// 即使路径候选的大小/时间不匹配而指纹候选匹配也一样。
fn assoc_candidate<'a>(
    db_file: &InSyncFile,
    side: Side,
    records: &'a [FileRecord],
    by_path: &HashMap<usize, usize>,
    by_print: &HashMap<FingerPrint, usize>,
) -> Option<&'a FileRecord> {
    if let Some(&idx) = by_path.get(&entry_key(db_file)) {
        return Some(&records[idx]);
    }
    let print = db_file.descr(side).print;
    if print != 0 {
        if let Some(&idx) = by_print.get(&print) {
            return Some(&records[idx]);
        }
    }
    None
}

#[allow(clippy::too_many_arguments)]
fn find_and_set_move_pair(
    db_file: &InSyncFile,
    base: &BaseFolderPair,
    records: &[FileRecord],
    by_path_left: &HashMap<usize, usize>,
    by_path_right: &HashMap<usize, usize>,
    by_print_left: &HashMap<FingerPrint, usize>,
    by_print_right: &HashMap<FingerPrint, usize>,
    paired: &mut HashSet<ItemId>,
    pairs: &mut HashMap<ItemId, ItemId>,
) {
    if !file_still_in_sync(
        db_file,
        base.cmp_variant,
        base.file_time_tolerance,
        &base.ignore_time_shift_minutes,
    ) {
        return;
    }

    let Some(left) = assoc_candidate(db_file, Side::Left, records, by_path_left, by_print_left)
    else {
        return;
    };
    let Some(left_attrs) = &left.left_attrs else {
        return;
    };
    if !same_size_and_date(left_attrs, db_file, Side::Left) {
        return;
    }

    let Some(right) = assoc_candidate(db_file, Side::Right, records, by_path_right, by_print_right)
    else {
        return;
    };
    let Some(right_attrs) = &right.right_attrs else {
        return;
    };
    if !same_size_and_date(right_attrs, db_file, Side::Right) {
        return;
    }

    // 对称、只设置一次：已有配对的条目不再改写
    if !paired.contains(&left.id) && !paired.contains(&right.id) {
        paired.insert(left.id);
        paired.insert(right.id);
        pairs.insert(left.id, right.id);
        pairs.insert(right.id, left.id);
    }
}

fn apply_results(
    children: &mut ChildSet,
    clear_left: &HashSet<ItemId>,
    clear_right: &HashSet<ItemId>,
    pairs: &HashMap<ItemId, ItemId>,
) {
    for file in &mut children.files {
        // 重复的指纹从模型中抹掉，避免被持久化进基线
        if clear_left.contains(&file.id) {
            if let Some(attrs) = file.attrs.left.as_mut() {
                attrs.print = 0;
            }
        }
        if clear_right.contains(&file.id) {
            if let Some(attrs) = file.attrs.right.as_mut() {
                attrs.print = 0;
            }
        }
        if file.move_ref.is_none() {
            file.move_ref = pairs.get(&file.id).copied();
        }
    }
    for folder in &mut children.folders {
        apply_results(&mut folder.children, clear_left, clear_right, pairs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompareVariant;
    use crate::core::baseline::{FolderStatus, InSyncDescrFile};
    use crate::core::hierarchy::{FilePair, SidePair};
    use crate::storage::{AbstractPath, NativeDevice, RelPath};
    use std::sync::Arc;

    fn base_pair() -> BaseFolderPair {
        let dev: crate::storage::AfsDevice =
            Arc::new(NativeDevice::new(std::env::temp_dir()).unwrap());
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

    fn left_only(id: u64, name: &str, size: u64, mod_time: i64, print: u64) -> FilePair {
        FilePair::new(
            id,
            SidePair::new(name.to_string(), String::new()),
            SidePair::new(
                Some(FileAttrs {
                    size,
                    mod_time,
                    print,
                }),
                None,
            ),
            Category::LeftOnly,
        )
    }

    fn right_only(id: u64, name: &str, size: u64, mod_time: i64, print: u64) -> FilePair {
        FilePair::new(
            id,
            SidePair::new(String::new(), name.to_string()),
            SidePair::new(
                None,
                Some(FileAttrs {
                    size,
                    mod_time,
                    print,
                }),
            ),
            Category::RightOnly,
        )
    }

    fn db_file(left_print: u64, right_print: u64, size: u64, mod_time: i64) -> InSyncFile {
        InSyncFile {
            left: InSyncDescrFile {
                mod_time,
                print: left_print,
            },
            right: InSyncDescrFile {
                mod_time,
                print: right_print,
            },
            file_size: size,
            cmp_variant: CompareVariant::TimeSize,
        }
    }

    #[test]
    fn test_rename_pair_via_fingerprint_and_path() {
        // 基线: foo.txt 两侧 10 字节 / t=1000，左侧指纹 77。
        // 当前: 左侧 foo.txt 消失，出现 bar.txt（指纹 77，10/1000）；
        //       右侧 foo.txt 原样 -> 应配对 bar.txt <-> foo.txt
        let mut base = base_pair();
        base.children
            .files
            .push(left_only(1, "bar.txt", 10, 1000, 77));
        base.children
            .files
            .push(right_only(2, "foo.txt", 10, 1000, 0));

        let mut db = InSyncFolder::new(FolderStatus::InSync);
        db.files.insert("foo.txt".to_string(), db_file(77, 0, 10, 1000));

        detect_moved_files(&mut base, &db);

        // 对称且互指
        assert_eq!(base.children.files[0].move_ref, Some(2));
        assert_eq!(base.children.files[1].move_ref, Some(1));
    }

    #[test]
    fn test_pair_rejected_when_size_or_time_differs() {
        // 指纹相同但时间与基线不一致：指纹可能被无关新文件复用，必须拒绝
        let mut base = base_pair();
        base.children
            .files
            .push(left_only(1, "bar.txt", 10, 2000, 77));
        base.children
            .files
            .push(right_only(2, "foo.txt", 10, 1000, 0));

        let mut db = InSyncFolder::new(FolderStatus::InSync);
        db.files.insert("foo.txt".to_string(), db_file(77, 0, 10, 1000));

        detect_moved_files(&mut base, &db);
        assert_eq!(base.children.files[0].move_ref, None);
        assert_eq!(base.children.files[1].move_ref, None);
    }

    #[test]
    fn test_duplicate_fingerprints_are_purged() {
        // 左侧两个文件共享指纹 77（硬链接）：全部剔除，不参与配对
        let mut base = base_pair();
        base.children
            .files
            .push(left_only(1, "hard1.txt", 10, 1000, 77));
        base.children
            .files
            .push(left_only(2, "hard2.txt", 10, 1000, 77));
        base.children
            .files
            .push(right_only(3, "foo.txt", 10, 1000, 0));

        let mut db = InSyncFolder::new(FolderStatus::InSync);
        db.files.insert("foo.txt".to_string(), db_file(77, 0, 10, 1000));

        detect_moved_files(&mut base, &db);

        assert_eq!(base.children.files[0].move_ref, None);
        assert_eq!(base.children.files[1].move_ref, None);
        // 重复指纹已从模型中清除
        assert_eq!(base.children.files[0].attrs.left.unwrap().print, 0);
        assert_eq!(base.children.files[1].attrs.left.unwrap().print, 0);
    }

    #[test]
    fn test_path_association_beats_fingerprint() {
        // 左侧有一个按路径对应到基线的候选（但大小不符），
        // 同时另一个文件按指纹能匹配：路径对应优先，配对失败。
        let mut base = base_pair();
        base.children
            .files
            .push(left_only(1, "foo.txt", 99, 1000, 0)); // 路径对应, 大小不符
        base.children
            .files
            .push(left_only(2, "bar.txt", 10, 1000, 77)); // 指纹对应
        base.children
            .files
            .push(right_only(3, "foo.txt", 10, 1000, 0)); // 右侧候选按路径对应且完全匹配

        let mut db = InSyncFolder::new(FolderStatus::InSync);
        db.files.insert("foo.txt".to_string(), db_file(77, 0, 10, 1000));

        detect_moved_files(&mut base, &db);
        // 若指纹对应被采纳，bar.txt 会与右侧 foo.txt 配对；路径对应优先故不配对
        assert_eq!(base.children.files[1].move_ref, None);
        assert_eq!(base.children.files[2].move_ref, None);
    }

    #[test]
    fn test_stale_baseline_entry_never_pairs() {
        // 基线条目两侧时间差超出容差 -> still_in_sync 失败，不参与配对
        let mut base = base_pair();
        base.children
            .files
            .push(left_only(1, "bar.txt", 10, 1000, 77));
        base.children
            .files
            .push(right_only(2, "foo.txt", 10, 9000, 0));

        let mut db = InSyncFolder::new(FolderStatus::InSync);
        let mut entry = db_file(77, 0, 10, 1000);
        entry.right.mod_time = 9000;
        db.files.insert("foo.txt".to_string(), entry);

        detect_moved_files(&mut base, &db);
        assert_eq!(base.children.files[0].move_ref, None);
    }
}
