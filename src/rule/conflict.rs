//! 模式冲突检测
//! 找出新模式与已有规则模式之间的语义重叠（两者会命中同一批具体 URL）

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use super::model::Rule;
use crate::pattern::PatternKind;
use crate::pattern::kind::split_pattern;
use crate::pattern::matcher::is_same_or_subdomain;
use crate::utils::DomainNamer;

/// 冲突类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    ExactDuplicate,
    /// 新模式是 `*.base`，覆盖已有模式
    WildcardSubsumes,
    /// 已有模式是 `*.base`，覆盖新模式
    SubsumedByWildcard,
    TldWildcardOverlap,
    SegmentOverlap,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::ExactDuplicate => "exact_duplicate",
            ConflictType::WildcardSubsumes => "wildcard_subsumes",
            ConflictType::SubsumedByWildcard => "subsumed_by_wildcard",
            ConflictType::TldWildcardOverlap => "tld_wildcard_overlap",
            ConflictType::SegmentOverlap => "segment_overlap",
        }
    }

    /// 交换比较双方后的类别
    pub fn mirrored(&self) -> Self {
        match self {
            ConflictType::WildcardSubsumes => ConflictType::SubsumedByWildcard,
            ConflictType::SubsumedByWildcard => ConflictType::WildcardSubsumes,
            other => *other,
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单条冲突
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub source_pattern: String,
    pub target_pattern: String,
    pub target_rule_id: String,
    pub target_rule_name: String,
    pub conflict_type: ConflictType,
    pub description: String,
}

/// 规范化后的模式视图（仅用于重叠判断）
struct Shape<'a> {
    kind: PatternKind,
    domain: &'a str,
    path: Option<&'a str>,
}

impl<'a> Shape<'a> {
    fn of(p: &'a str) -> Self {
        let kind = PatternKind::classify(p);
        let (domain, path) = if kind == PatternKind::Regex {
            (p, None)
        } else {
            let (domain, path) = split_pattern(p);
            (domain, path.map(|s| s.trim_end_matches('/')).filter(|s| !s.is_empty()))
        };
        Self { kind, domain, path }
    }

    /// `*.base`（无路径）时返回 base
    fn subdomain_base(&self) -> Option<&'a str> {
        if self.kind != PatternKind::Wildcard || self.path.is_some() {
            return None;
        }
        self.domain.strip_prefix("*.")
    }

    /// `{var}.base` 时返回 base
    fn segment_base(&self) -> Option<&'a str> {
        if self.kind != PatternKind::SegmentExtraction {
            return None;
        }
        let (first, rest) = self.domain.split_once('.')?;
        let pure_var = first.starts_with('{') && first.ends_with('}') && first.matches('{').count() == 1;
        (pure_var && !rest.contains('{') && !rest.contains('*')).then_some(rest)
    }

    fn is_concrete(&self) -> bool {
        self.kind == PatternKind::Wildcard && !self.domain.contains('*')
    }
}

/// 判断两个模式的重叠关系，`a` 为新提议的模式
///
/// 交换参数时，包含关系的方向随之翻转（见 [`ConflictType::mirrored`]）。
pub fn check_pattern_overlap(a: &str, b: &str) -> Option<ConflictType> {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return None;
    }
    if a == b {
        return Some(ConflictType::ExactDuplicate);
    }

    let sa = Shape::of(&a);
    let sb = Shape::of(&b);
    if sa.kind == PatternKind::Regex || sb.kind == PatternKind::Regex {
        return None;
    }

    if segment_overlaps(&sa, &sb) || segment_overlaps(&sb, &sa) {
        return Some(ConflictType::SegmentOverlap);
    }

    if wildcard_covers(&sa, &sb) {
        return Some(ConflictType::WildcardSubsumes);
    }
    if wildcard_covers(&sb, &sa) {
        return Some(ConflictType::SubsumedByWildcard);
    }

    if tld_overlaps(&sa, &sb) || tld_overlaps(&sb, &sa) {
        return Some(ConflictType::TldWildcardOverlap);
    }

    None
}

/// `*.base` 覆盖 `base`、`x.base`、`*.x.base`、`{v}.x.base` 等同根模式
fn wildcard_covers(wild: &Shape<'_>, other: &Shape<'_>) -> bool {
    let Some(base) = wild.subdomain_base() else {
        return false;
    };
    if other.kind == PatternKind::TldWildcard {
        return false;
    }
    is_same_or_subdomain(other.domain, base)
}

/// `{var}.base` 与 `*.base`、具体的 `x.base` 或另一个 `{w}.base` 命中相同 URL
fn segment_overlaps(seg: &Shape<'_>, other: &Shape<'_>) -> bool {
    let Some(base) = seg.segment_base() else {
        return false;
    };
    if seg.path != other.path && seg.path.is_some() {
        return false;
    }

    if let Some(other_base) = other.segment_base() {
        return other_base == base;
    }
    if let Some(other_base) = other.subdomain_base() {
        return other_base == base;
    }
    other.is_concrete()
        && other
            .domain
            .strip_suffix(base)
            .and_then(|head| head.strip_suffix('.'))
            .is_some_and(|label| !label.is_empty() && !label.contains('.'))
}

/// `prefix.**` 与 `prefix.<tld>` 重叠
fn tld_overlaps(tld: &Shape<'_>, other: &Shape<'_>) -> bool {
    if tld.kind != PatternKind::TldWildcard || tld.path.is_some() || !other.is_concrete() {
        return false;
    }
    let prefix = tld.domain.trim_end_matches(".**");
    other
        .domain
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(DomainNamer::is_public_suffix)
}

fn describe(conflict_type: ConflictType, source: &str, target: &str, rule_name: &str) -> String {
    match conflict_type {
        ConflictType::ExactDuplicate => {
            format!("Pattern '{}' is already used by rule '{}'", source, rule_name)
        }
        ConflictType::WildcardSubsumes => format!(
            "Pattern '{}' also matches '{}' from rule '{}'",
            source, target, rule_name
        ),
        ConflictType::SubsumedByWildcard => format!(
            "Pattern '{}' is already covered by '{}' from rule '{}'",
            source, target, rule_name
        ),
        ConflictType::TldWildcardOverlap => format!(
            "Pattern '{}' and '{}' from rule '{}' match the same domain under a different TLD wildcard",
            source, target, rule_name
        ),
        ConflictType::SegmentOverlap => format!(
            "Pattern '{}' and '{}' from rule '{}' match the same subdomains",
            source, target, rule_name
        ),
    }
}

/// 冲突检测器
pub struct ConflictDetector;

impl ConflictDetector {
    /// 对每个 (新模式, 已有规则, 已有模式) 组合计算重叠
    ///
    /// 禁用规则同样参与检测；同一模式对在同一规则内只报告一次。
    pub fn detect(new_patterns: &[String], existing_rules: &[Rule], exclude_rule_id: Option<&str>) -> Vec<Conflict> {
        let mut seen = HashSet::new();
        let mut conflicts = Vec::new();

        for source in new_patterns.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            for rule in existing_rules {
                if exclude_rule_id.is_some_and(|id| id == rule.id) {
                    continue;
                }
                for target in rule.patterns.iter().map(|p| p.trim()) {
                    let Some(conflict_type) = check_pattern_overlap(source, target) else {
                        continue;
                    };
                    let key = (source.to_lowercase(), target.to_lowercase(), rule.id.clone());
                    if !seen.insert(key) {
                        continue;
                    }
                    conflicts.push(Conflict {
                        source_pattern: source.to_string(),
                        target_pattern: target.to_string(),
                        target_rule_id: rule.id.clone(),
                        target_rule_name: rule.name.clone(),
                        conflict_type,
                        description: describe(conflict_type, source, target, &rule.name),
                    });
                }
            }
        }

        conflicts
    }
}

/// 便捷入口
pub fn detect_conflicts(new_patterns: &[String], existing_rules: &[Rule], exclude_rule_id: Option<&str>) -> Vec<Conflict> {
    ConflictDetector::detect(new_patterns, existing_rules, exclude_rule_id)
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::check_pattern_overlap;

    fn pattern() -> impl Strategy<Value = String> {
        let label = prop::sample::select(vec!["a", "www", "docs"]);
        let base = prop::sample::select(vec!["example.com", "example.co.uk", "a.example.com", "other.org"]);
        (0..6usize, label, base).prop_map(|(shape, label, base)| match shape {
            0 => format!("*.{}", base),
            1 => format!("{}.{}", label, base),
            2 => base.to_string(),
            3 => format!("{{team}}.{}", base),
            4 => format!("{}.**", base.split('.').next().unwrap_or(label)),
            _ => format!("{}.{}/path", label, base),
        })
    }

    proptest! {
        /// 交换参数时关系一致：同时存在或同时不存在，包含方向互为镜像
        #[test]
        fn overlap_is_symmetric(a in pattern(), b in pattern()) {
            let forward = check_pattern_overlap(&a, &b);
            let backward = check_pattern_overlap(&b, &a);
            prop_assert_eq!(forward.map(|t| t.mirrored()), backward, "{} vs {}", a, b);
        }
    }
}
