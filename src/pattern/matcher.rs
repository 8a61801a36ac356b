//! 模式匹配核心
//! 按模式类别分派到各自的纯函数匹配器，所有匹配大小写不敏感且不会失败（异常输入 => 不匹配）

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use super::kind::{Pattern, PatternKind};
use super::validator::ValidationResult;
use super::validator::PatternValidator;
use crate::utils::{DomainNamer, UrlParts};

static TEMPLATE_VAR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// 匹配选项
#[derive(Debug, Clone, Default)]
pub struct MatchOptions {
    /// 为 true 时，纯域名模式同时匹配其任意子域名
    pub allow_auto_subdomain: bool,
    /// 分组名模板，支持 `{var}` 替换
    pub group_name_template: Option<String>,
    /// 规则名称（模板缺省时作为分组名）
    pub rule_name: Option<String>,
}

impl MatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_auto_subdomain(mut self, allow: bool) -> Self {
        self.allow_auto_subdomain = allow;
        self
    }

    pub fn group_name_template(mut self, template: impl Into<String>) -> Self {
        self.group_name_template = Some(template.into());
        self
    }

    pub fn rule_name(mut self, name: impl Into<String>) -> Self {
        self.rule_name = Some(name.into());
        self
    }
}

/// 单次匹配结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub matched: bool,
    pub extracted_values: HashMap<String, String>,
    pub group_name: Option<String>,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self::default()
    }
}

/// 模式匹配器
pub struct PatternMatcher;

impl PatternMatcher {
    pub fn classify(pattern: &str) -> PatternKind {
        PatternKind::classify(pattern)
    }

    pub fn validate(pattern: &str) -> ValidationResult {
        PatternValidator::validate(pattern)
    }

    /// 字符串模式匹配入口（每次调用都会解析模式）
    pub fn match_url(url: &str, pattern: &str, options: &MatchOptions) -> MatchResult {
        match Pattern::parse(pattern) {
            Ok(parsed) => Self::match_parsed(url, &parsed, options),
            Err(e) => {
                debug!("Pattern rejected during match: {}", e);
                MatchResult::no_match()
            }
        }
    }

    /// 已解析模式匹配入口
    pub fn match_parsed(url: &str, pattern: &Pattern, options: &MatchOptions) -> MatchResult {
        let Some(parts) = UrlParts::parse(url) else {
            return MatchResult::no_match();
        };
        Self::match_parts(&parts, pattern, options)
    }

    pub fn match_parts(parts: &UrlParts, pattern: &Pattern, options: &MatchOptions) -> MatchResult {
        let path = normalize_path(&parts.path);

        let values = match pattern.kind() {
            PatternKind::Wildcard => {
                let domain_ok = match_wildcard_domain(
                    &parts.domain,
                    pattern.domain_part(),
                    options.allow_auto_subdomain,
                );
                (domain_ok && match_optional_path(&path, pattern.path_part())).then(Vec::new)
            }
            PatternKind::TldWildcard => {
                let prefix = pattern.domain_part().trim_end_matches(".**");
                let domain_ok = match_tld_wildcard(&parts.domain, prefix);
                (domain_ok && match_optional_path(&path, pattern.path_part())).then(Vec::new)
            }
            PatternKind::SegmentExtraction => pattern
                .segment()
                .and_then(|template| template.extract(&parts.domain, &path)),
            PatternKind::Regex => pattern
                .regex()
                .and_then(|regex| match_regex(regex, parts, pattern.regex_includes_path())),
        };

        let Some(values) = values else {
            return MatchResult::no_match();
        };

        let group_name = resolve_group_name(options, &values);
        MatchResult {
            matched: true,
            extracted_values: values.into_iter().collect(),
            group_name,
        }
    }
}

/// 通配符域名匹配：精确 / `*.base` / 单标签内通配
fn match_wildcard_domain(domain: &str, part: &str, allow_auto_subdomain: bool) -> bool {
    if let Some(base) = part.strip_prefix("*.") {
        return is_same_or_subdomain(domain, base);
    }
    if part.contains('*') {
        return match_mid_label(domain, part);
    }
    domain == part || (allow_auto_subdomain && is_subdomain_of(domain, part))
}

pub(crate) fn is_same_or_subdomain(domain: &str, base: &str) -> bool {
    domain == base || is_subdomain_of(domain, base)
}

pub(crate) fn is_subdomain_of(domain: &str, base: &str) -> bool {
    domain.len() > base.len() + 1
        && domain.ends_with(base)
        && domain.as_bytes()[domain.len() - base.len() - 1] == b'.'
}

/// 单标签通配：标签数一致，通配标签满足前后缀且至少保留一个字符
fn match_mid_label(domain: &str, part: &str) -> bool {
    let domain_labels: Vec<&str> = domain.split('.').collect();
    let pattern_labels: Vec<&str> = part.split('.').collect();
    if domain_labels.len() != pattern_labels.len() {
        return false;
    }

    domain_labels
        .iter()
        .zip(pattern_labels.iter())
        .all(|(label, pat)| match pat.split_once('*') {
            Some((prefix, suffix)) => {
                label.len() > prefix.len() + suffix.len()
                    && label.starts_with(prefix)
                    && label.ends_with(suffix)
            }
            None => label == pat,
        })
}

/// `prefix.**`：前缀之后只能剩下一个顶级后缀（单标签或 ccSLD）
fn match_tld_wildcard(domain: &str, prefix: &str) -> bool {
    domain
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(DomainNamer::is_public_suffix)
}

fn match_optional_path(path: &str, pattern_path: Option<&str>) -> bool {
    match pattern_path {
        Some(p) => match_path(path, p),
        None => true,
    }
}

/// 路径匹配（入参 path 已规范化）
pub(crate) fn match_path(path: &str, pattern_path: &str) -> bool {
    let pattern = normalize_path(pattern_path);
    if pattern == "/" {
        return true;
    }

    if let Some((first_raw, second)) = pattern.split_once("**") {
        // 深度通配：前缀 + 任意层级 + 包含后段
        let first = first_raw.trim_end_matches('/');
        let second = second.trim_start_matches('/');
        let Some(rest) = path.strip_prefix(first) else {
            return false;
        };
        // `/docs/**` 要求在路径段边界处切分
        if first_raw.ends_with('/') && !rest.is_empty() && !rest.starts_with('/') {
            return false;
        }
        return second.is_empty() || rest.contains(second);
    }

    if let Some((first, second)) = pattern.split_once('*') {
        // 单层通配：通配部分不得跨越 `/`，其后仍按路径段前缀匹配
        let Some(rest) = path.strip_prefix(first) else {
            return false;
        };
        let segment_end = rest.find('/').unwrap_or(rest.len());
        return rest
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .take_while(|end| *end <= segment_end)
            .any(|end| {
                rest[end..]
                    .strip_prefix(second)
                    .is_some_and(|tail| tail.is_empty() || tail.starts_with('/'))
            });
    }

    path == pattern || path.strip_prefix(pattern.as_str()).is_some_and(|rest| rest.starts_with('/'))
}

/// 路径规范化：小写、保证前导 `/`、去掉尾部 `/`（根路径保留为 `/`）
pub(crate) fn normalize_path(path: &str) -> String {
    let lower = path.to_lowercase();
    let trimmed = lower.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn match_regex(regex: &Regex, parts: &UrlParts, include_path: bool) -> Option<Vec<(String, String)>> {
    let target = if include_path {
        format!("{}{}", parts.domain, parts.path)
    } else {
        parts.domain.clone()
    };

    let caps = regex.captures(&target)?;
    let mut values = Vec::new();
    if let Some(first) = caps.get(1) {
        values.push(("group1".to_string(), first.as_str().to_string()));
    }
    for name in regex.capture_names().flatten() {
        if let Some(m) = caps.name(name) {
            values.push((name.to_string(), m.as_str().to_string()));
        }
    }
    Some(values)
}

/// 分组名解析优先级：模板 > 规则名 > 第一个提取值
fn resolve_group_name(options: &MatchOptions, values: &[(String, String)]) -> Option<String> {
    if let Some(template) = options.group_name_template.as_deref() {
        let rendered = render_template(template, values);
        let rendered = rendered.trim();
        if !rendered.is_empty() {
            return Some(rendered.to_string());
        }
    }

    if let Some(name) = options.rule_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        return Some(name.to_string());
    }

    values.first().map(|(_, value)| value.clone())
}

/// `{var}` 替换，未知变量保持原样
pub fn render_template(template: &str, values: &[(String, String)]) -> String {
    TEMPLATE_VAR_REGEX
        .replace_all(template, |caps: &regex::Captures| {
            let name = &caps[1];
            values
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
