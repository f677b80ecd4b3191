//! 层级过滤
//!
//! 硬过滤按相对路径做通配符包含/排除（`*`/`?` 可跨越路径分隔符，
//! 大小写不敏感），目录额外回答"子孙还有没有可能命中"，没有就整棵
//! 子树直接置为不活动。软过滤是时间/大小范围，只做 AND 收窄，
//! 绝不把硬过滤排除掉的条目重新激活。

use crate::core::hierarchy::{
    child_rel_path, BaseFolderPair, ChildSet, FolderComparison, Side,
};
use crate::error::EngineError;
use regex::Regex;

// ============ 名称过滤 ============

struct Mask {
    /// 模式本体（小写、`/` 分隔）
    primary: Regex,
    /// 目录语义：`模式/*` 覆盖整棵子树
    subtree: Regex,
    /// 前缀可行性判定用的原始字符
    chars: Vec<char>,
}

impl Mask {
    fn compile(pattern: &str) -> Option<Self> {
        let mut normalized = pattern.trim().replace('\\', "/").to_lowercase();
        while normalized.starts_with('/') {
            normalized.remove(0);
        }
        // "dir/**" 与 "dir/" 都表示目录及其整棵子树
        if let Some(stripped) = normalized.strip_suffix("/**") {
            normalized = stripped.to_string();
        } else if let Some(stripped) = normalized.strip_suffix('/') {
            normalized = stripped.to_string();
        }
        if normalized.is_empty() {
            return None;
        }

        let primary = Regex::new(&format!("^{}$", to_regex(&normalized))).ok()?;
        let subtree = Regex::new(&format!("^{}/.*$", to_regex(&normalized))).ok()?;
        Some(Self {
            primary,
            subtree,
            chars: normalized.chars().collect(),
        })
    }

    /// 路径本身或其某个祖先命中该模式
    fn matches(&self, path: &str) -> bool {
        self.primary.is_match(path) || self.subtree.is_match(path)
    }

    /// 该模式是否还可能命中 `dir` 下的某个子孙
    fn could_match_below(&self, dir: &str) -> bool {
        if self.primary.is_match(dir) {
            // 目录本身命中 -> 子树模式覆盖所有子孙
            return true;
        }
        let prefix: Vec<char> = format!("{}/", dir).chars().collect();
        could_match_extension(&self.chars, &prefix)
    }
}

/// 把通配符模式转成正则片段（`*` 跨越分隔符，`?` 单个字符）
fn to_regex(pattern: &str) -> String {
    let mut out = String::new();
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out
}

/// 模式是否能匹配 `text` 加上任意后缀
fn could_match_extension(pattern: &[char], text: &[char]) -> bool {
    if text.is_empty() {
        // 剩余模式总能匹配某个后续字符序列
        return true;
    }
    match pattern.first() {
        None => false,
        Some('*') => {
            could_match_extension(&pattern[1..], text) || could_match_extension(pattern, &text[1..])
        }
        Some('?') => could_match_extension(&pattern[1..], &text[1..]),
        Some(c) => *c == text[0] && could_match_extension(&pattern[1..], &text[1..]),
    }
}

/// 包含/排除通配符过滤器（无状态，按相对路径求值）
pub struct NameFilter {
    include: Vec<Mask>,
    exclude: Vec<Mask>,
}

impl NameFilter {
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Self {
        let mut include: Vec<Mask> = include
            .iter()
            .filter_map(|p| Mask::compile(p.as_ref()))
            .collect();
        if include.is_empty() {
            // 空的包含列表等价于全部包含
            include.extend(Mask::compile("*"));
        }
        let exclude = exclude
            .iter()
            .filter_map(|p| Mask::compile(p.as_ref()))
            .collect();
        Self { include, exclude }
    }

    /// 不做任何限制的过滤器
    pub fn null() -> Self {
        Self::new::<&str>(&["*"], &[])
    }

    pub fn pass_file_filter(&self, rel_path: &str) -> bool {
        let path = rel_path.to_lowercase();
        self.include.iter().any(|m| m.matches(&path))
            && !self.exclude.iter().any(|m| m.matches(&path))
    }

    /// 目录过滤；`child_item_might_match` 置 false 时调用方可整棵剪枝，
    /// 该判定必须与目录扫描时的剪枝规则完全一致。
    pub fn pass_dir_filter(&self, rel_path: &str, child_item_might_match: &mut bool) -> bool {
        let path = rel_path.to_lowercase();

        if self.exclude.iter().any(|m| m.matches(&path)) {
            // 排除目录即排除整棵子树
            *child_item_might_match = false;
            return false;
        }
        *child_item_might_match = self.include.iter().any(|m| m.could_match_below(&path));
        self.include.iter().any(|m| m.matches(&path))
    }
}

// ============ 软过滤（时间/大小范围） ============

/// 时间/大小范围过滤；只以 AND 方式叠加在既有过滤结果之上
#[derive(Debug, Clone, Default)]
pub struct SoftFilter {
    pub time_from: Option<i64>,
    pub time_to: Option<i64>,
    pub size_min: Option<u64>,
    pub size_max: Option<u64>,
}

impl SoftFilter {
    pub fn is_null(&self) -> bool {
        self.time_from.is_none()
            && self.time_to.is_none()
            && self.size_min.is_none()
            && self.size_max.is_none()
    }

    fn match_time(&self, mod_time: i64) -> bool {
        self.time_from.is_none_or(|from| mod_time >= from)
            && self.time_to.is_none_or(|to| mod_time <= to)
    }

    fn match_size(&self, size: u64) -> bool {
        self.size_min.is_none_or(|min| size >= min)
            && self.size_max.is_none_or(|max| size <= max)
    }

    /// 时间/大小过滤概念上只作用于叶子；过滤启用时目录一律不活动,
    /// 否则会留下一堆因内容被过滤而变空的目录。
    fn match_folder(&self) -> bool {
        self.is_null()
    }
}

// ============ 应用 ============

/// 单个基准目录对的过滤配置
pub struct FilterConfig {
    pub name_filter: NameFilter,
    pub soft_filter: SoftFilter,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            name_filter: NameFilter::null(),
            soft_filter: SoftFilter::default(),
        }
    }
}

/// 整棵子树统一设置活动标志
pub fn set_active_status_rec(children: &mut ChildSet, active: bool) {
    for file in &mut children.files {
        file.active = active;
    }
    for link in &mut children.symlinks {
        link.active = active;
    }
    for folder in &mut children.folders {
        folder.active = active;
        set_active_status_rec(&mut folder.children, active);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FilterStrategy {
    /// 覆盖写入所有条目
    Set,
    /// 只进一步收窄已激活的条目
    And,
}

fn hard_filter_children(
    children: &mut ChildSet,
    parent_rel: &str,
    filter: &NameFilter,
    strategy: FilterStrategy,
) {
    for file in &mut children.files {
        if strategy == FilterStrategy::Set || file.active {
            file.active = filter.pass_file_filter(&child_rel_path(parent_rel, file.name_any()));
        }
    }
    for link in &mut children.symlinks {
        if strategy == FilterStrategy::Set || link.active {
            link.active = filter.pass_file_filter(&child_rel_path(parent_rel, link.name_any()));
        }
    }
    for folder in &mut children.folders {
        let rel = child_rel_path(parent_rel, folder.name_any());
        let mut child_item_might_match = true;
        let passed = filter.pass_dir_filter(&rel, &mut child_item_might_match);

        if strategy == FilterStrategy::Set || folder.active {
            folder.active = passed;
        }

        if !child_item_might_match {
            // 与目录扫描一致的剪枝：子孙不可能命中时不再逐项求值
            set_active_status_rec(&mut folder.children, false);
            continue;
        }
        hard_filter_children(&mut folder.children, &rel, filter, strategy);
    }
}

fn soft_filter_children(children: &mut ChildSet, soft: &SoftFilter) {
    let file_in_range = |attrs: &Option<crate::core::hierarchy::FileAttrs>| {
        attrs
            .as_ref()
            .is_some_and(|a| soft.match_size(a.size) && soft.match_time(a.mod_time))
    };
    for file in &mut children.files {
        if !file.active {
            continue;
        }
        let active = if file.is_empty(Side::Left) {
            file_in_range(&file.attrs.right)
        } else if file.is_empty(Side::Right) {
            file_in_range(&file.attrs.left)
        } else {
            // 两侧都在时 16 种组合里语义不清的按排除处理：
            // 任一侧自身的大小+时间落在范围内才保留
            file_in_range(&file.attrs.left) || file_in_range(&file.attrs.right)
        };
        file.active = active;
    }

    let link_in_range = |attrs: &Option<crate::core::hierarchy::SymlinkAttrs>| {
        attrs.as_ref().is_some_and(|a| soft.match_time(a.mod_time))
    };
    for link in &mut children.symlinks {
        if !link.active {
            continue;
        }
        let active = if link.is_empty(Side::Left) {
            link_in_range(&link.attrs.right)
        } else if link.is_empty(Side::Right) {
            link_in_range(&link.attrs.left)
        } else {
            link_in_range(&link.attrs.left) || link_in_range(&link.attrs.right)
        };
        link.active = active;
    }
    for folder in &mut children.folders {
        if folder.active {
            folder.active = soft.match_folder();
        }
        soft_filter_children(&mut folder.children, soft);
    }
}

/// 以 AND 方式叠加一层硬过滤
pub fn add_hard_filtering(base: &mut BaseFolderPair, filter: &NameFilter) {
    hard_filter_children(&mut base.children, "", filter, FilterStrategy::And);
}

/// 以 AND 方式叠加软过滤；空过滤器直接跳过
pub fn add_soft_filtering(base: &mut BaseFolderPair, soft: &SoftFilter) {
    if !soft.is_null() {
        soft_filter_children(&mut base.children, soft);
    }
}

/// 为所有基准目录对应用过滤：硬过滤覆盖写入，软过滤 AND 收窄
pub fn apply_filters(
    folder_cmp: &mut FolderComparison,
    cfgs: &[FilterConfig],
) -> Result<(), EngineError> {
    if folder_cmp.len() != cfgs.len() {
        return Err(EngineError::ContractViolation(format!(
            "基准目录对数量 ({}) 与过滤配置数量 ({}) 不一致",
            folder_cmp.len(),
            cfgs.len()
        )));
    }
    for (base, cfg) in folder_cmp.iter_mut().zip(cfgs) {
        hard_filter_children(&mut base.children, "", &cfg.name_filter, FilterStrategy::Set);
        add_soft_filtering(base, &cfg.soft_filter);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hierarchy::{Category, FileAttrs, FilePair, FolderPair, SidePair};

    fn names(name: &str) -> SidePair<String> {
        SidePair::new(name.to_string(), name.to_string())
    }

    fn file(id: u64, name: &str, size: u64, mod_time: i64) -> FilePair {
        FilePair::new(
            id,
            names(name),
            SidePair::new(
                Some(FileAttrs {
                    size,
                    mod_time,
                    print: 0,
                }),
                Some(FileAttrs {
                    size,
                    mod_time,
                    print: 0,
                }),
            ),
            Category::Equal,
        )
    }

    fn sample_tree() -> ChildSet {
        let mut children = ChildSet::default();
        children.files.push(file(1, "readme.txt", 10, 100));
        children.files.push(file(2, "image.png", 20, 200));
        let mut sub = FolderPair::new(3, names("build"), SidePair::new(true, true), Category::Equal);
        sub.children.files.push(file(4, "artifact.bin", 30, 300));
        children.folders.push(sub);
        let mut docs = FolderPair::new(5, names("docs"), SidePair::new(true, true), Category::Equal);
        docs.children.files.push(file(6, "notes.txt", 40, 400));
        children.folders.push(docs);
        children
    }

    #[test]
    fn test_wildcards_cross_separators() {
        let filter = NameFilter::new(&["*.txt"], &[]);
        assert!(filter.pass_file_filter("readme.txt"));
        assert!(filter.pass_file_filter("docs/notes.txt"));
        assert!(!filter.pass_file_filter("image.png"));
        // 大小写不敏感
        assert!(filter.pass_file_filter("DOCS/NOTES.TXT"));
    }

    #[test]
    fn test_excluded_dir_covers_subtree() {
        let filter = NameFilter::new::<&str>(&[], &["build"]);
        assert!(!filter.pass_file_filter("build/artifact.bin"));
        assert!(filter.pass_file_filter("builder/x")); // 非前缀，不受影响

        let mut child_might = true;
        assert!(!filter.pass_dir_filter("build", &mut child_might));
        assert!(!child_might);
    }

    #[test]
    fn test_dir_filter_child_feasibility() {
        let filter = NameFilter::new(&["*.txt"], &[]);
        let mut child_might = false;
        // 目录本身不命中 "*.txt"，但子孙可能命中
        assert!(!filter.pass_dir_filter("docs", &mut child_might));
        assert!(child_might);

        // 包含模式锚定在别的前缀下时，这个目录整棵都不可能命中
        let filter = NameFilter::new(&["src/*.rs"], &[]);
        let mut child_might = true;
        filter.pass_dir_filter("docs", &mut child_might);
        assert!(!child_might);
    }

    #[test]
    fn test_hard_filter_prunes_and_is_idempotent() {
        let mut children = sample_tree();
        let filter = NameFilter::new::<&str>(&[], &["build"]);
        hard_filter_children(&mut children, "", &filter, FilterStrategy::Set);

        assert!(children.files[0].active);
        assert!(!children.folders[0].active);
        assert!(!children.folders[0].children.files[0].active);
        assert!(children.folders[1].active);

        // 幂等：同一配置再跑一遍，标志不变
        let snapshot: Vec<bool> = collect_active(&children);
        hard_filter_children(&mut children, "", &filter, FilterStrategy::Set);
        assert_eq!(snapshot, collect_active(&children));
    }

    fn collect_active(children: &ChildSet) -> Vec<bool> {
        let mut out = Vec::new();
        fn walk(children: &ChildSet, out: &mut Vec<bool>) {
            for f in &children.files {
                out.push(f.active);
            }
            for l in &children.symlinks {
                out.push(l.active);
            }
            for d in &children.folders {
                out.push(d.active);
                walk(&d.children, out);
            }
        }
        walk(children, &mut out);
        out
    }

    #[test]
    fn test_soft_filter_never_reactivates() {
        let mut children = sample_tree();
        // 硬过滤排除 *.png
        let filter = NameFilter::new::<&str>(&[], &["*.png"]);
        hard_filter_children(&mut children, "", &filter, FilterStrategy::Set);
        assert!(!children.files[1].active);

        // 软过滤范围涵盖所有文件，也不得恢复被硬过滤排除的条目
        let soft = SoftFilter {
            size_min: Some(0),
            ..Default::default()
        };
        soft_filter_children(&mut children, &soft);
        assert!(!children.files[1].active);
        assert!(children.files[0].active);
    }

    #[test]
    fn test_soft_filter_range_and_folders() {
        let mut children = sample_tree();
        let soft = SoftFilter {
            size_min: Some(15),
            size_max: Some(25),
            ..Default::default()
        };
        soft_filter_children(&mut children, &soft);

        assert!(!children.files[0].active); // 10 字节，小于下限
        assert!(children.files[1].active); // 20 字节
        // 软过滤启用时目录一律不活动
        assert!(!children.folders[0].active);
        assert!(!children.folders[1].active);
    }

    #[test]
    fn test_soft_filter_one_sided_item_tests_its_side() {
        let mut children = ChildSet::default();
        let mut one_sided = file(1, "only-left", 10, 100);
        one_sided.attrs.right = None;
        one_sided.category = Category::LeftOnly;
        children.files.push(one_sided);

        let soft = SoftFilter {
            time_from: Some(50),
            time_to: Some(150),
            ..Default::default()
        };
        soft_filter_children(&mut children, &soft);
        assert!(children.files[0].active);

        let soft = SoftFilter {
            time_from: Some(500),
            ..Default::default()
        };
        soft_filter_children(&mut children, &soft);
        assert!(!children.files[0].active);
    }

    #[test]
    fn test_apply_filters_requires_matching_config_count() {
        let mut folder_cmp: FolderComparison = Vec::new();
        assert!(apply_filters(&mut folder_cmp, &[]).is_ok());

        let cfgs = vec![FilterConfig::default()];
        let result = apply_filters(&mut folder_cmp, &cfgs);
        assert!(matches!(
            result,
            Err(crate::error::EngineError::ContractViolation(_))
        ));
    }

    #[test]
    fn test_soft_filter_both_sides_either_in_range() {
        let mut children = ChildSet::default();
        let mut f = file(1, "f", 10, 100);
        // 左侧超出范围，右侧在范围内 -> 保留
        f.attrs.left = Some(FileAttrs {
            size: 10,
            mod_time: 9999,
            print: 0,
        });
        children.files.push(f);

        let soft = SoftFilter {
            time_from: Some(50),
            time_to: Some(150),
            ..Default::default()
        };
        soft_filter_children(&mut children, &soft);
        assert!(children.files[0].active);
    }
}
