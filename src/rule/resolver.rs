//! 规则解析器：为 URL 选出唯一命中的规则
use serde::Serialize;
use tracing::trace;

use super::compiler::{CompiledRuleSet, RuleCompiler};
use super::model::Rule;
use crate::pattern::{MatchOptions, MatchResult, PatternMatcher};
use crate::utils::UrlParts;

/// 命中结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRule {
    pub rule: Rule,
    /// 命中的模式原文
    pub pattern: String,
    pub match_info: MatchResult,
    /// `match_info.group_name`，缺省时为规则名
    pub effective_group_name: String,
}

/// 规则解析器
pub struct RuleResolver;

impl RuleResolver {
    /// 按规则集顺序逐条尝试，规则内按模式声明顺序，第一个命中即返回
    pub fn resolve(url: &str, rules: &CompiledRuleSet, allow_auto_subdomain: bool) -> Option<ResolvedRule> {
        let parts = UrlParts::parse(url)?;

        for compiled in &rules.rules {
            let rule = &compiled.rule;
            // 规则名不参与模式内的分组名解析，使片段提取值能作为默认分组名
            let mut options = MatchOptions::new().allow_auto_subdomain(allow_auto_subdomain);
            if let Some(template) = rule.group_name_template.as_deref() {
                options = options.group_name_template(template);
            }

            for pattern in &compiled.patterns {
                let info = PatternMatcher::match_parts(&parts, pattern, &options);
                if !info.matched {
                    continue;
                }

                trace!("URL {} matched rule '{}' via {}", url, rule.name, pattern);
                let effective_group_name = info
                    .group_name
                    .clone()
                    .unwrap_or_else(|| rule.name.clone());
                return Some(ResolvedRule {
                    rule: rule.clone(),
                    pattern: pattern.raw().to_string(),
                    match_info: info,
                    effective_group_name,
                });
            }
        }

        None
    }
}

/// 便捷入口：对未编译的规则列表解析（每次调用都会编译）
pub fn resolve_rule(url: &str, rules: &[Rule]) -> Option<ResolvedRule> {
    RuleResolver::resolve(url, &RuleCompiler::compile(rules), false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn github() -> Rule {
        Rule::new("gh", "GitHub", vec!["github.com".into(), "*.github.io".into()])
    }

    #[test]
    fn test_resolve_first_match_and_rule_name() {
        let rules = vec![github(), Rule::new("ex", "Example", vec!["*.example.com".into()])];
        let resolved = resolve_rule("https://github.com/rust-lang/rust", &rules).unwrap();
        assert_eq!(resolved.rule.id, "gh");
        assert_eq!(resolved.pattern, "github.com");
        assert_eq!(resolved.effective_group_name, "GitHub");

        let resolved = resolve_rule("https://blog.example.com", &rules).unwrap();
        assert_eq!(resolved.effective_group_name, "Example");
        assert!(resolve_rule("https://unknown.org", &rules).is_none());
    }

    #[test]
    fn test_disabled_rules_are_never_candidates() {
        let rules = vec![
            github().disabled(),
            Rule::new("gh2", "Code", vec!["github.com".into()]),
        ];
        let resolved = resolve_rule("https://github.com", &rules).unwrap();
        assert_eq!(resolved.rule.id, "gh2");
    }

    #[test]
    fn test_priority_beats_insertion_order() {
        let rules = vec![
            Rule::new("a", "Broad", vec!["*.example.com".into()]),
            Rule::new("b", "Docs", vec!["docs.example.com".into()]).with_priority(10),
        ];
        let resolved = resolve_rule("https://docs.example.com", &rules).unwrap();
        assert_eq!(resolved.rule.id, "b");

        let resolved = resolve_rule("https://www.example.com", &rules).unwrap();
        assert_eq!(resolved.rule.id, "a");
    }

    #[test]
    fn test_segment_values_and_templates() {
        // 未配置模板时，提取值优先于规则名成为分组名；规则名只在没有提取值时兜底
        let rules = vec![Rule::new("s", "Slack", vec!["{team}.slack.com".into()])];
        let resolved = resolve_rule("https://acme.slack.com", &rules).unwrap();
        assert_eq!(resolved.effective_group_name, "acme");

        let rules = vec![Rule::new("s", "Slack", vec!["{team}.slack.com".into()]).with_template("Slack: {team}")];
        let resolved = resolve_rule("https://acme.slack.com", &rules).unwrap();
        assert_eq!(resolved.effective_group_name, "Slack: acme");
    }

    #[test]
    fn test_auto_subdomain_option() {
        let set = RuleCompiler::compile(&[github()]);
        assert!(RuleResolver::resolve("https://gist.github.com", &set, false).is_none());
        assert!(RuleResolver::resolve("https://gist.github.com", &set, true).is_some());
        assert!(RuleResolver::resolve("not a url", &set, true).is_none());
    }
}
