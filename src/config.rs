//! 引擎配置模块
//!
//! 同步方向策略与比较方式的配置类型。比较本身由上游完成，
//! 这里只保存用于判定方向/基线有效性的设置。

use serde::{Deserialize, Serialize};

/// 比较方式（上游比较器产生类别时使用的方式）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompareVariant {
    /// 按修改时间 + 大小
    TimeSize,
    /// 按内容
    Content,
    /// 仅按大小
    Size,
}

/// 配置层面的同步方向（条目层面的冲突另行携带说明文本）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Left,
    Right,
    None,
}

/// 各比较类别到同步方向的映射表
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirectionSet {
    /// 仅左侧存在
    pub ex_left_side_only: SyncDirection,
    /// 仅右侧存在
    pub ex_right_side_only: SyncDirection,
    /// 左侧更新
    pub left_newer: SyncDirection,
    /// 右侧更新
    pub right_newer: SyncDirection,
    /// 内容不同
    pub different: SyncDirection,
    /// 冲突 / 无法归类
    pub conflict: SyncDirection,
}

/// 同步模式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncVariant {
    /// 双向同步（基于基线判定每一侧是否变化）
    TwoWay,
    /// 镜像：右侧始终被改写为左侧
    Mirror,
    /// 更新：仅把左侧的新内容推到右侧
    Update,
    /// 自定义映射表
    Custom,
}

/// 单个基准目录对的方向配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDirectionConfig {
    pub variant: SyncVariant,
    /// variant == Custom 时使用的映射表
    pub custom: DirectionSet,
    /// 固定方向模式下是否也启用重命名检测
    pub detect_moved_files: bool,
}

impl SyncDirectionConfig {
    pub fn new(variant: SyncVariant) -> Self {
        Self {
            variant,
            custom: two_way_update_set(),
            detect_moved_files: false,
        }
    }

    /// 固定方向模式使用的映射表（TwoWay 不经过此表，除非作为首次同步回退）
    pub fn extract_directions(&self) -> DirectionSet {
        match self.variant {
            SyncVariant::TwoWay => two_way_update_set(),
            SyncVariant::Mirror => DirectionSet {
                ex_left_side_only: SyncDirection::Right,
                ex_right_side_only: SyncDirection::Right,
                left_newer: SyncDirection::Right,
                right_newer: SyncDirection::Right,
                different: SyncDirection::Right,
                conflict: SyncDirection::Right,
            },
            SyncVariant::Update => DirectionSet {
                ex_left_side_only: SyncDirection::Right,
                ex_right_side_only: SyncDirection::None,
                left_newer: SyncDirection::Right,
                right_newer: SyncDirection::None,
                different: SyncDirection::Right,
                conflict: SyncDirection::None,
            },
            SyncVariant::Custom => self.custom,
        }
    }

    /// 是否需要重命名检测（双向模式总是需要）
    pub fn detect_moved_files_enabled(&self) -> bool {
        self.variant == SyncVariant::TwoWay || self.detect_moved_files
    }
}

/// 首次同步的回退映射表：旧文件被新文件覆盖
pub fn two_way_update_set() -> DirectionSet {
    DirectionSet {
        ex_left_side_only: SyncDirection::Right,
        ex_right_side_only: SyncDirection::Left,
        left_newer: SyncDirection::Right,
        right_newer: SyncDirection::Left,
        different: SyncDirection::None,
        conflict: SyncDirection::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_always_overwrites_right() {
        let cfg = SyncDirectionConfig::new(SyncVariant::Mirror);
        let set = cfg.extract_directions();
        assert_eq!(set.ex_right_side_only, SyncDirection::Right);
        assert_eq!(set.right_newer, SyncDirection::Right);
    }

    #[test]
    fn test_update_leaves_right_extras_alone() {
        let cfg = SyncDirectionConfig::new(SyncVariant::Update);
        let set = cfg.extract_directions();
        assert_eq!(set.ex_right_side_only, SyncDirection::None);
        assert_eq!(set.right_newer, SyncDirection::None);
    }

    #[test]
    fn test_two_way_always_detects_moves() {
        assert!(SyncDirectionConfig::new(SyncVariant::TwoWay).detect_moved_files_enabled());
        assert!(!SyncDirectionConfig::new(SyncVariant::Mirror).detect_moved_files_enabled());
    }
}
