//! 分组颜色分配
//! 优先级：规则显式颜色 > 该标题已持久化的颜色 > 调色板随机颜色（选中后立即持久化）

use rand::Rng;

use crate::rule::GroupColor;
use crate::storage::ColorMapping;

/// 颜色来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorChoice {
    Rule(GroupColor),
    Persisted(GroupColor),
    Fresh(GroupColor),
}

impl ColorChoice {
    pub fn color(&self) -> GroupColor {
        match self {
            ColorChoice::Rule(c) | ColorChoice::Persisted(c) | ColorChoice::Fresh(c) => *c,
        }
    }

    /// 新选中的颜色需要写回颜色映射
    pub fn needs_persist(&self) -> bool {
        matches!(self, ColorChoice::Fresh(_))
    }
}

pub struct ColorAssigner;

impl ColorAssigner {
    pub fn choose(rule_color: Option<GroupColor>, title: &str, mapping: &ColorMapping) -> ColorChoice {
        if let Some(color) = rule_color {
            return ColorChoice::Rule(color);
        }
        if let Some(color) = mapping.get(title) {
            return ColorChoice::Persisted(*color);
        }
        ColorChoice::Fresh(Self::random())
    }

    pub fn random() -> GroupColor {
        let mut rng = rand::rng();
        GroupColor::PALETTE[rng.random_range(0..GroupColor::PALETTE.len())]
    }

    /// 随机挑选与 `current` 不同的颜色
    pub fn random_except(current: GroupColor) -> GroupColor {
        let candidates: Vec<GroupColor> = GroupColor::PALETTE
            .iter()
            .copied()
            .filter(|c| *c != current)
            .collect();
        let mut rng = rand::rng();
        candidates[rng.random_range(0..candidates.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_priority() {
        let mut mapping = ColorMapping::new();
        mapping.insert("GitHub".to_string(), GroupColor::Purple);

        assert_eq!(
            ColorAssigner::choose(Some(GroupColor::Red), "GitHub", &mapping),
            ColorChoice::Rule(GroupColor::Red)
        );
        assert_eq!(
            ColorAssigner::choose(None, "GitHub", &mapping),
            ColorChoice::Persisted(GroupColor::Purple)
        );
        // 标题区分大小写
        let fresh = ColorAssigner::choose(None, "github", &mapping);
        assert!(fresh.needs_persist());
        assert!(GroupColor::PALETTE.contains(&fresh.color()));
    }

    #[test]
    fn test_random_except_never_repeats() {
        for color in GroupColor::PALETTE {
            for _ in 0..20 {
                assert_ne!(ColorAssigner::random_except(color), color);
            }
        }
    }
}
