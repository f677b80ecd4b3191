//! 上次成功同步的基线快照
//!
//! 以名字为键的镜像树：每个文件记录两侧的 `(修改时间, 指纹)` 与捕获时的
//! 比较方式。运行期间只读；同步成功后整体重建。某个基准目录对没有基线
//! 属于正常情况（首次同步），由方向引擎走回退策略。

use crate::config::CompareVariant;
use crate::core::hierarchy::{
    BaseFolderPair, ChildSet, FilePair, FolderPair, Side, SymlinkPair,
};
use crate::storage::FingerPrint;
use std::collections::HashMap;

/// FAT 时间戳精度（秒）：与基线比对时使用，与用户配置的容差无关
pub const FAT_FILE_TIME_PRECISION_SEC: i64 = 2;

/// 两个时间戳在容差内是否一致，可忽略配置的整时区偏移
pub fn same_file_time(lhs: i64, rhs: i64, tolerance: i64, ignore_time_shift_minutes: &[u32]) -> bool {
    let diff = lhs - rhs;
    if diff.abs() <= tolerance {
        return true;
    }
    ignore_time_shift_minutes.iter().any(|&minutes| {
        let shift = i64::from(minutes) * 60;
        (diff - shift).abs() <= tolerance || (diff + shift).abs() <= tolerance
    })
}

/// 基线中单侧的文件描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InSyncDescrFile {
    pub mod_time: i64,
    pub print: FingerPrint,
}

/// 基线文件条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InSyncFile {
    pub left: InSyncDescrFile,
    pub right: InSyncDescrFile,
    /// 同步完成时两侧大小一致，只存一份
    pub file_size: u64,
    /// 捕获该条目时的比较方式
    pub cmp_variant: CompareVariant,
}

impl InSyncFile {
    pub fn descr(&self, side: Side) -> &InSyncDescrFile {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

/// 基线符号链接条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InSyncSymlink {
    pub left_mod_time: i64,
    pub right_mod_time: i64,
    pub cmp_variant: CompareVariant,
}

impl InSyncSymlink {
    pub fn mod_time(&self, side: Side) -> i64 {
        match side {
            Side::Left => self.left_mod_time,
            Side::Right => self.right_mod_time,
        }
    }
}

/// 目录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderStatus {
    InSync,
    /// 占位目录：本身未完成同步，仅为承载子孙的基线条目而存在
    StrawMan,
}

/// 基线目录树（按名字索引）
#[derive(Debug, Clone, PartialEq)]
pub struct InSyncFolder {
    pub status: FolderStatus,
    pub files: HashMap<String, InSyncFile>,
    pub symlinks: HashMap<String, InSyncSymlink>,
    pub folders: HashMap<String, InSyncFolder>,
}

impl InSyncFolder {
    pub fn new(status: FolderStatus) -> Self {
        Self {
            status,
            files: HashMap::new(),
            symlinks: HashMap::new(),
            folders: HashMap::new(),
        }
    }

    pub fn get_file(&self, name: &str) -> Option<&InSyncFile> {
        self.files.get(name)
    }

    pub fn get_symlink(&self, name: &str) -> Option<&InSyncSymlink> {
        self.symlinks.get(name)
    }

    pub fn get_folder(&self, name: &str) -> Option<&InSyncFolder> {
        self.folders.get(name)
    }

    /// 从一棵同步完成的树整体重建基线
    pub fn from_base_folder(base: &BaseFolderPair) -> Self {
        let mut root = InSyncFolder::new(FolderStatus::InSync);
        capture_children(&mut root, &base.children, base.cmp_variant);
        root
    }
}

fn capture_children(db: &mut InSyncFolder, children: &ChildSet, cmp_variant: CompareVariant) {
    for file in &children.files {
        if let (Some(left), Some(right)) = (&file.attrs.left, &file.attrs.right) {
            if left.size == right.size {
                db.files.insert(
                    file.names.left.clone(),
                    InSyncFile {
                        left: InSyncDescrFile {
                            mod_time: left.mod_time,
                            print: left.print,
                        },
                        right: InSyncDescrFile {
                            mod_time: right.mod_time,
                            print: right.print,
                        },
                        file_size: left.size,
                        cmp_variant,
                    },
                );
            }
        }
    }
    for link in &children.symlinks {
        if let (Some(left), Some(right)) = (&link.attrs.left, &link.attrs.right) {
            db.symlinks.insert(
                link.names.left.clone(),
                InSyncSymlink {
                    left_mod_time: left.mod_time,
                    right_mod_time: right.mod_time,
                    cmp_variant,
                },
            );
        }
    }
    for folder in &children.folders {
        let status = if !folder.is_empty(Side::Left) && !folder.is_empty(Side::Right) {
            FolderStatus::InSync
        } else {
            FolderStatus::StrawMan
        };
        let mut sub = InSyncFolder::new(status);
        capture_children(&mut sub, &folder.children, cmp_variant);
        // 占位目录只有在确实承载了子孙条目时才值得保留
        if status == FolderStatus::InSync
            || !sub.files.is_empty()
            || !sub.symlinks.is_empty()
            || !sub.folders.is_empty()
        {
            db.folders.insert(folder.name_any().to_string(), sub);
        }
    }
}

// ============ 当前条目与基线的比对（与当前比较设置无关） ============

/// 文件的一侧是否与基线一致：存在性一致，且修改时间在 FAT 精度内、大小完全相等。
/// 指纹在这里刻意不参与：把数据整体挪到别的介质不算"变化"。
pub fn file_matches_baseline(
    file: &FilePair,
    side: Side,
    db_file: Option<&InSyncFile>,
    ignore_time_shift_minutes: &[u32],
) -> bool {
    let Some(attrs) = file.attrs.get(side) else {
        return db_file.is_none();
    };
    let Some(db_file) = db_file else {
        return false;
    };
    same_file_time(
        attrs.mod_time,
        db_file.descr(side).mod_time,
        FAT_FILE_TIME_PRECISION_SEC,
        ignore_time_shift_minutes,
    ) && attrs.size == db_file.file_size
}

pub fn symlink_matches_baseline(
    link: &SymlinkPair,
    side: Side,
    db_link: Option<&InSyncSymlink>,
    ignore_time_shift_minutes: &[u32],
) -> bool {
    let Some(attrs) = link.attrs.get(side) else {
        return db_link.is_none();
    };
    let Some(db_link) = db_link else {
        return false;
    };
    same_file_time(
        attrs.mod_time,
        db_link.mod_time(side),
        FAT_FILE_TIME_PRECISION_SEC,
        ignore_time_shift_minutes,
    )
}

pub fn folder_matches_baseline(
    folder: &FolderPair,
    side: Side,
    db_folder: Option<&InSyncFolder>,
) -> bool {
    let have_db_entry = db_folder.is_some_and(|f| f.status != FolderStatus::StrawMan);
    have_db_entry == !folder.is_empty(side)
}

// ============ 基线条目在当前比较设置下是否仍然可信 ============

/// 用较弱方式捕获的条目不能为较强的比较方式作保。
pub fn file_still_in_sync(
    db_file: &InSyncFile,
    cmp_variant: CompareVariant,
    file_time_tolerance: i64,
    ignore_time_shift_minutes: &[u32],
) -> bool {
    match cmp_variant {
        CompareVariant::TimeSize => {
            // 特例：按内容捕获的条目对时间+大小比较肯定足够
            if db_file.cmp_variant == CompareVariant::Content {
                return true;
            }
            same_file_time(
                db_file.left.mod_time,
                db_file.right.mod_time,
                file_time_tolerance,
                ignore_time_shift_minutes,
            )
        }
        CompareVariant::Content => db_file.cmp_variant == CompareVariant::Content,
        // 大小（与大小写敏感的名字）对任何基线条目都天然一致
        CompareVariant::Size => true,
    }
}

pub fn symlink_still_in_sync(
    db_link: &InSyncSymlink,
    cmp_variant: CompareVariant,
    file_time_tolerance: i64,
    ignore_time_shift_minutes: &[u32],
) -> bool {
    match cmp_variant {
        CompareVariant::TimeSize => {
            if db_link.cmp_variant == CompareVariant::Content
                || db_link.cmp_variant == CompareVariant::Size
            {
                return true;
            }
            same_file_time(
                db_link.left_mod_time,
                db_link.right_mod_time,
                file_time_tolerance,
                ignore_time_shift_minutes,
            )
        }
        // 链接的"按大小"与按内容归类等价
        CompareVariant::Content | CompareVariant::Size => {
            db_link.cmp_variant == CompareVariant::Content
                || db_link.cmp_variant == CompareVariant::Size
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hierarchy::{Category, FileAttrs, SidePair};

    fn db_file(
        left_time: i64,
        right_time: i64,
        size: u64,
        cmp_variant: CompareVariant,
    ) -> InSyncFile {
        InSyncFile {
            left: InSyncDescrFile {
                mod_time: left_time,
                print: 0,
            },
            right: InSyncDescrFile {
                mod_time: right_time,
                print: 0,
            },
            file_size: size,
            cmp_variant,
        }
    }

    fn file(left: Option<(u64, i64)>, right: Option<(u64, i64)>) -> FilePair {
        FilePair::new(
            1,
            SidePair::new("f".into(), "f".into()),
            SidePair::new(
                left.map(|(size, mod_time)| FileAttrs {
                    size,
                    mod_time,
                    print: 0,
                }),
                right.map(|(size, mod_time)| FileAttrs {
                    size,
                    mod_time,
                    print: 0,
                }),
            ),
            Category::Equal,
        )
    }

    #[test]
    fn test_same_file_time_with_shift() {
        assert!(same_file_time(1000, 1001, 2, &[]));
        assert!(!same_file_time(1000, 1010, 2, &[]));
        // 整时区偏移（60 分钟）在容差内可忽略，两个方向都算
        assert!(same_file_time(1000 + 3600, 1000, 2, &[60]));
        assert!(same_file_time(1000, 1000 + 3600, 2, &[60]));
        assert!(!same_file_time(1000 + 1800, 1000, 2, &[60]));
    }

    #[test]
    fn test_matches_baseline_presence() {
        let db = db_file(1000, 1000, 10, CompareVariant::TimeSize);

        // 两侧都在且时间/大小一致
        let f = file(Some((10, 1000)), Some((10, 1000)));
        assert!(file_matches_baseline(&f, Side::Left, Some(&db), &[]));

        // 基线有而当前缺失
        let f = file(None, Some((10, 1000)));
        assert!(!file_matches_baseline(&f, Side::Left, Some(&db), &[]));
        // 基线没有且当前也没有
        assert!(file_matches_baseline(&f, Side::Left, None, &[]));

        // 大小必须完全相等
        let f = file(Some((11, 1000)), Some((10, 1000)));
        assert!(!file_matches_baseline(&f, Side::Left, Some(&db), &[]));
    }

    #[test]
    fn test_still_in_sync_promotion_rules() {
        // 按内容捕获的条目可为时间+大小比较作保
        let db = db_file(1000, 9999, 10, CompareVariant::Content);
        assert!(file_still_in_sync(&db, CompareVariant::TimeSize, 2, &[]));
        assert!(file_still_in_sync(&db, CompareVariant::Content, 2, &[]));

        // 按时间捕获的条目不能为内容比较作保
        let db = db_file(1000, 1000, 10, CompareVariant::TimeSize);
        assert!(!file_still_in_sync(&db, CompareVariant::Content, 2, &[]));
        assert!(file_still_in_sync(&db, CompareVariant::TimeSize, 2, &[]));
        assert!(file_still_in_sync(&db, CompareVariant::Size, 2, &[]));

        // 两侧时间超出容差的时间型条目已不可信
        let db = db_file(1000, 2000, 10, CompareVariant::TimeSize);
        assert!(!file_still_in_sync(&db, CompareVariant::TimeSize, 2, &[]));
    }

    #[test]
    fn test_folder_straw_man_is_not_presence() {
        let folder = FolderPair::new(
            1,
            SidePair::new("d".into(), "d".into()),
            SidePair::new(true, true),
            Category::Equal,
        );
        let straw = InSyncFolder::new(FolderStatus::StrawMan);
        let real = InSyncFolder::new(FolderStatus::InSync);

        assert!(!folder_matches_baseline(&folder, Side::Left, Some(&straw)));
        assert!(folder_matches_baseline(&folder, Side::Left, Some(&real)));
        assert!(!folder_matches_baseline(&folder, Side::Left, None));
    }
}
