//! 规则编译器
//! 将规则中的模式字符串预先分类/解析，并按匹配顺序排列

use std::time::Instant;

use tracing::{debug, warn};

use super::model::Rule;
use crate::pattern::{Pattern, PatternKind};

/// 编译后的单条规则
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: Rule,
    /// 与 rule.patterns 同序，非法模式已剔除
    pub patterns: Vec<Pattern>,
}

/// 编译后的规则集（已按匹配顺序排序，仅含启用规则）
#[derive(Debug, Clone, Default)]
pub struct CompiledRuleSet {
    pub rules: Vec<CompiledRule>,
}

impl CompiledRuleSet {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 按规则名查找（用于按分组标题反查阈值）
    pub fn find_by_name(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().map(|c| &c.rule).find(|r| r.name == name)
    }
}

/// 规则编译器
pub struct RuleCompiler;

impl RuleCompiler {
    /// 编译规则集
    ///
    /// 匹配顺序：priority 降序，相同 priority 保持插入顺序（稳定排序）。
    /// 禁用规则不进入规则集。
    pub fn compile(rules: &[Rule]) -> CompiledRuleSet {
        let start = Instant::now();
        let mut stats = CompileStats::default();

        let mut compiled: Vec<CompiledRule> = Vec::with_capacity(rules.len());
        for rule in rules {
            if !rule.enabled {
                stats.disabled_rules += 1;
                continue;
            }
            compiled.push(Self::compile_rule(rule, &mut stats));
        }

        compiled.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));

        debug!(
            "Compiled {} rules in {:?}: wildcard={}, tld={}, segment={}, regex={}, invalid={}, disabled={}",
            compiled.len(),
            start.elapsed(),
            stats.wildcard_count,
            stats.tld_count,
            stats.segment_count,
            stats.regex_count,
            stats.invalid_count,
            stats.disabled_rules
        );

        CompiledRuleSet { rules: compiled }
    }

    fn compile_rule(rule: &Rule, stats: &mut CompileStats) -> CompiledRule {
        let mut patterns = Vec::with_capacity(rule.patterns.len());
        for raw in &rule.patterns {
            match Pattern::parse(raw) {
                Ok(pattern) => {
                    stats.record(pattern.kind());
                    patterns.push(pattern);
                }
                Err(e) => {
                    stats.invalid_count += 1;
                    warn!("Skipping pattern of rule '{}' ({}): {}", rule.name, rule.id, e);
                }
            }
        }

        CompiledRule {
            rule: rule.clone(),
            patterns,
        }
    }
}

/// 编译统计信息
#[derive(Debug, Clone, Default)]
struct CompileStats {
    wildcard_count: usize,
    tld_count: usize,
    segment_count: usize,
    regex_count: usize,
    invalid_count: usize,
    disabled_rules: usize,
}

impl CompileStats {
    fn record(&mut self, kind: PatternKind) {
        match kind {
            PatternKind::Wildcard => self.wildcard_count += 1,
            PatternKind::TldWildcard => self.tld_count += 1,
            PatternKind::SegmentExtraction => self.segment_count += 1,
            PatternKind::Regex => self.regex_count += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_orders_by_priority_then_insertion() {
        let rules = vec![
            Rule::new("a", "A", vec!["a.com".into()]),
            Rule::new("b", "B", vec!["b.com".into()]).with_priority(5),
            Rule::new("c", "C", vec!["c.com".into()]),
            Rule::new("d", "D", vec!["d.com".into()]).with_priority(5),
        ];
        let set = RuleCompiler::compile(&rules);
        let ids: Vec<&str> = set.rules.iter().map(|c| c.rule.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_compile_skips_disabled_and_invalid() {
        let rules = vec![
            Rule::new("a", "A", vec!["*.a.*".into(), "a.com".into()]),
            Rule::new("b", "B", vec!["b.com".into()]).disabled(),
        ];
        let set = RuleCompiler::compile(&rules);
        assert_eq!(set.len(), 1);
        assert_eq!(set.rules[0].patterns.len(), 1);
        assert_eq!(set.rules[0].patterns[0].raw(), "a.com");
        assert!(set.find_by_name("B").is_none());
    }
}
