//! 两侧文件树模型
//!
//! 上游比较器产出的层级结构：每个条目带两侧的名字/属性、比较类别，
//! 以及由本引擎维护的过滤标志与同步方向。容器独占其子条目，
//! 跨树引用（重命名配对、基线查询）一律通过 [`ItemId`] 间接完成，
//! 不保存裸引用。

use crate::config::CompareVariant;
use crate::storage::{AbstractPath, FingerPrint};

/// 树内条目的稳定标识
pub type ItemId = u64;

/// 左右两侧
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// 按侧存放的一对值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SidePair<T> {
    pub left: T,
    pub right: T,
}

impl<T> SidePair<T> {
    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    pub fn get(&self, side: Side) -> &T {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

/// 文件属性（单侧）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileAttrs {
    pub size: u64,
    /// Unix 秒
    pub mod_time: i64,
    /// 设备相关的持久指纹，0 表示不可用
    pub print: FingerPrint,
}

/// 符号链接属性（单侧）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymlinkAttrs {
    pub mod_time: i64,
}

/// 上游比较器给出的类别；对本引擎是不可变输入
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    LeftOnly,
    RightOnly,
    LeftNewer,
    RightNewer,
    DifferentContent,
    /// 内容一致但元数据（大小写等）不同
    DifferentMetadata,
    Equal,
    /// 无法归类，携带原因
    Conflict(String),
}

/// 条目的同步方向
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncDir {
    Left,
    Right,
    #[default]
    None,
    /// 冲突，携带可读原因；绝不静默消解
    Conflict(String),
}

/// 文件对
#[derive(Debug)]
pub struct FilePair {
    pub id: ItemId,
    /// 每侧的条目名（大小写/规范化可能不同）；不存在的一侧为空串
    pub names: SidePair<String>,
    pub attrs: SidePair<Option<FileAttrs>>,
    pub category: Category,
    pub active: bool,
    pub direction: SyncDir,
    /// 对侧配对条目（重命名检测结果），对称且只设置一次
    pub move_ref: Option<ItemId>,
}

impl FilePair {
    pub fn new(
        id: ItemId,
        names: SidePair<String>,
        attrs: SidePair<Option<FileAttrs>>,
        category: Category,
    ) -> Self {
        Self {
            id,
            names,
            attrs,
            category,
            active: true,
            direction: SyncDir::None,
            move_ref: None,
        }
    }

    /// 某一侧是否不存在
    pub fn is_empty(&self, side: Side) -> bool {
        self.attrs.get(side).is_none()
    }

    pub fn name(&self, side: Side) -> &str {
        self.names.get(side)
    }

    /// 任一存在侧的名字
    pub fn name_any(&self) -> &str {
        if !self.is_empty(Side::Left) {
            &self.names.left
        } else {
            &self.names.right
        }
    }

    /// 清除一侧（物理删除之后调用）；类别随之退化
    pub fn clear_side(&mut self, side: Side) {
        *self.attrs.get_mut(side) = None;
        self.names.get_mut(side).clear();
        self.category = one_sided_category(
            !self.is_empty(Side::Left),
            !self.is_empty(Side::Right),
        );
        self.direction = SyncDir::None;
        self.move_ref = None;
    }
}

/// 符号链接对
#[derive(Debug)]
pub struct SymlinkPair {
    pub id: ItemId,
    pub names: SidePair<String>,
    pub attrs: SidePair<Option<SymlinkAttrs>>,
    pub category: Category,
    pub active: bool,
    pub direction: SyncDir,
}

impl SymlinkPair {
    pub fn new(
        id: ItemId,
        names: SidePair<String>,
        attrs: SidePair<Option<SymlinkAttrs>>,
        category: Category,
    ) -> Self {
        Self {
            id,
            names,
            attrs,
            category,
            active: true,
            direction: SyncDir::None,
        }
    }

    pub fn is_empty(&self, side: Side) -> bool {
        self.attrs.get(side).is_none()
    }

    pub fn name(&self, side: Side) -> &str {
        self.names.get(side)
    }

    pub fn name_any(&self) -> &str {
        if !self.is_empty(Side::Left) {
            &self.names.left
        } else {
            &self.names.right
        }
    }

    pub fn clear_side(&mut self, side: Side) {
        *self.attrs.get_mut(side) = None;
        self.names.get_mut(side).clear();
        self.category = one_sided_category(
            !self.is_empty(Side::Left),
            !self.is_empty(Side::Right),
        );
        self.direction = SyncDir::None;
    }
}

/// 目录对（递归容器）
#[derive(Debug)]
pub struct FolderPair {
    pub id: ItemId,
    pub names: SidePair<String>,
    pub present: SidePair<bool>,
    pub category: Category,
    pub active: bool,
    pub direction: SyncDir,
    pub children: ChildSet,
}

impl FolderPair {
    pub fn new(
        id: ItemId,
        names: SidePair<String>,
        present: SidePair<bool>,
        category: Category,
    ) -> Self {
        Self {
            id,
            names,
            present,
            category,
            active: true,
            direction: SyncDir::None,
            children: ChildSet::default(),
        }
    }

    pub fn is_empty(&self, side: Side) -> bool {
        !*self.present.get(side)
    }

    pub fn name(&self, side: Side) -> &str {
        self.names.get(side)
    }

    pub fn name_any(&self) -> &str {
        if !self.is_empty(Side::Left) {
            &self.names.left
        } else {
            &self.names.right
        }
    }

    /// 递归清除一侧（目录被物理删除意味着整个子树该侧消失）
    pub fn clear_side_rec(&mut self, side: Side) {
        *self.present.get_mut(side) = false;
        self.names.get_mut(side).clear();
        self.category = one_sided_category(
            !self.is_empty(Side::Left),
            !self.is_empty(Side::Right),
        );
        self.direction = SyncDir::None;
        for file in &mut self.children.files {
            file.clear_side(side);
        }
        for link in &mut self.children.symlinks {
            link.clear_side(side);
        }
        for folder in &mut self.children.folders {
            folder.clear_side_rec(side);
        }
    }
}

fn one_sided_category(left: bool, right: bool) -> Category {
    match (left, right) {
        (true, false) => Category::LeftOnly,
        (false, true) => Category::RightOnly,
        // 两侧都没了的行会被 remove_empty 清理
        _ => Category::Equal,
    }
}

/// 容器的子条目集合
#[derive(Debug, Default)]
pub struct ChildSet {
    pub files: Vec<FilePair>,
    pub symlinks: Vec<SymlinkPair>,
    pub folders: Vec<FolderPair>,
}

impl ChildSet {
    /// 清理两侧都不存在的行（递归）
    pub fn remove_empty(&mut self) {
        self.files
            .retain(|f| !(f.is_empty(Side::Left) && f.is_empty(Side::Right)));
        self.symlinks
            .retain(|s| !(s.is_empty(Side::Left) && s.is_empty(Side::Right)));
        self.folders
            .retain(|d| !(d.is_empty(Side::Left) && d.is_empty(Side::Right)));
        for folder in &mut self.folders {
            folder.children.remove_empty();
        }
    }
}

/// 基准目录对：一次比较的根
#[derive(Debug)]
pub struct BaseFolderPair {
    pub base_paths: SidePair<AbstractPath>,
    /// 产生本子树类别时使用的比较方式；方向/重命名逻辑依赖它保持一致
    pub cmp_variant: CompareVariant,
    /// 文件时间容差（秒）
    pub file_time_tolerance: i64,
    /// 允许忽略的整时区偏移（分钟）
    pub ignore_time_shift_minutes: Vec<u32>,
    pub children: ChildSet,
    next_id: ItemId,
}

impl BaseFolderPair {
    pub fn new(
        base_paths: SidePair<AbstractPath>,
        cmp_variant: CompareVariant,
        file_time_tolerance: i64,
        ignore_time_shift_minutes: Vec<u32>,
    ) -> Self {
        Self {
            base_paths,
            cmp_variant,
            file_time_tolerance,
            ignore_time_shift_minutes,
            children: ChildSet::default(),
            next_id: 1,
        }
    }

    /// 分配一个树内唯一的条目标识
    pub fn alloc_id(&mut self) -> ItemId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn remove_empty(&mut self) {
        self.children.remove_empty();
    }
}

/// 一次运行涉及的全部基准目录对
pub type FolderComparison = Vec<BaseFolderPair>;

/// 拼接相对路径（父为空表示容器是基准根）
pub fn child_rel_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn both_names(name: &str) -> SidePair<String> {
        SidePair::new(name.to_string(), name.to_string())
    }

    fn file_attrs(size: u64, mod_time: i64) -> FileAttrs {
        FileAttrs {
            size,
            mod_time,
            print: 0,
        }
    }

    #[test]
    fn test_clear_side_degrades_category() {
        let mut file = FilePair::new(
            1,
            both_names("a.txt"),
            SidePair::new(Some(file_attrs(1, 10)), Some(file_attrs(2, 20))),
            Category::DifferentContent,
        );
        file.clear_side(Side::Right);
        assert!(file.is_empty(Side::Right));
        assert_eq!(file.category, Category::LeftOnly);
        assert_eq!(file.name_any(), "a.txt");
    }

    #[test]
    fn test_folder_clear_side_is_recursive() {
        let mut folder = FolderPair::new(
            1,
            both_names("d"),
            SidePair::new(true, true),
            Category::Equal,
        );
        folder.children.files.push(FilePair::new(
            2,
            both_names("inner"),
            SidePair::new(Some(file_attrs(1, 1)), Some(file_attrs(1, 1))),
            Category::Equal,
        ));
        folder.clear_side_rec(Side::Left);
        assert_eq!(folder.category, Category::RightOnly);
        assert_eq!(folder.children.files[0].category, Category::RightOnly);
    }

    #[test]
    fn test_remove_empty_prunes_recursively() {
        let mut children = ChildSet::default();
        children.files.push(FilePair::new(
            1,
            both_names("gone"),
            SidePair::new(None, None),
            Category::Equal,
        ));
        let mut folder = FolderPair::new(
            2,
            both_names("d"),
            SidePair::new(true, true),
            Category::Equal,
        );
        folder.children.files.push(FilePair::new(
            3,
            both_names("gone2"),
            SidePair::new(None, None),
            Category::Equal,
        ));
        children.folders.push(folder);

        children.remove_empty();
        assert!(children.files.is_empty());
        assert!(children.folders[0].children.files.is_empty());
    }

    #[test]
    fn test_child_rel_path() {
        assert_eq!(child_rel_path("", "a"), "a");
        assert_eq!(child_rel_path("a/b", "c"), "a/b/c");
    }
}
