//! 模式分类与解析后的模式结构
//! 同一字符串格式下的四种子语法：通配符 / TLD通配符 / 片段提取 / 正则

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::segment::SegmentTemplate;
use super::validator::PatternValidator;
use crate::error::{TabGroupError, TgResult};

/// 正则编译尺寸上限（防止病态正则占用过多内存）
pub const REGEX_SIZE_LIMIT: usize = 1 << 20;
pub const REGEX_DFA_SIZE_LIMIT: usize = 1 << 20;

/// 模式类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// 普通域名、`*.domain`、单标签内通配 `pre-*.domain`
    Wildcard,
    /// `prefix.**`
    TldWildcard,
    /// `{name}` / `{name:index:delimiter}`
    SegmentExtraction,
    /// `/.../`
    Regex,
}

impl PatternKind {
    /// 对模式字符串分类（在任何匹配之前执行）
    pub fn classify(pattern: &str) -> Self {
        let p = pattern.trim();
        if is_regex_literal(p) {
            PatternKind::Regex
        } else if p.contains('{') {
            PatternKind::SegmentExtraction
        } else if split_pattern(p).0.ends_with(".**") {
            PatternKind::TldWildcard
        } else {
            PatternKind::Wildcard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Wildcard => "wildcard",
            PatternKind::TldWildcard => "tld_wildcard",
            PatternKind::SegmentExtraction => "segment_extraction",
            PatternKind::Regex => "regex",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn is_regex_literal(p: &str) -> bool {
    p.len() > 2 && p.starts_with('/') && p.ends_with('/')
}

/// 按第一个 `/` 拆分为 (域名部分, 路径部分)
pub(crate) fn split_pattern(p: &str) -> (&str, Option<&str>) {
    match p.find('/') {
        Some(idx) => (&p[..idx], Some(&p[idx..])),
        None => (p, None),
    }
}

/// 带限制地编译大小写不敏感正则
pub(crate) fn compile_regex_safe(body: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(body)
        .case_insensitive(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .dfa_size_limit(REGEX_DFA_SIZE_LIMIT)
        .build()
}

/// 解析后的模式（分类一次，之后不可变）
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    kind: PatternKind,
    /// 小写域名部分；正则模式下为空
    domain: String,
    /// 小写路径部分（含前导 `/`）
    path: Option<String>,
    /// 正则模式的编译结果
    regex: Option<Regex>,
    /// 正则体是否包含路径（决定匹配目标为 domain 还是 domain+path）
    regex_includes_path: bool,
    /// 片段提取模板
    segment: Option<SegmentTemplate>,
}

impl Pattern {
    /// 校验并解析模式
    pub fn parse(raw: &str) -> TgResult<Self> {
        let validation = PatternValidator::validate(raw);
        if let Some(error) = validation.error {
            return Err(TabGroupError::InvalidPattern(format!("{}: {}", raw.trim(), error)));
        }

        let trimmed = raw.trim();
        let kind = PatternKind::classify(trimmed);

        let mut pattern = Self {
            raw: trimmed.to_string(),
            kind,
            domain: String::new(),
            path: None,
            regex: None,
            regex_includes_path: false,
            segment: None,
        };

        match kind {
            PatternKind::Regex => {
                let body = &trimmed[1..trimmed.len() - 1];
                pattern.regex = Some(compile_regex_safe(body)?);
                pattern.regex_includes_path = body.contains('/');
            }
            PatternKind::SegmentExtraction => {
                let (domain, path) = split_pattern(trimmed);
                pattern.domain = domain.to_lowercase();
                pattern.path = path.map(str::to_lowercase);
                pattern.segment = Some(
                    SegmentTemplate::build(&pattern.domain, pattern.path.as_deref())
                        .map_err(TabGroupError::InvalidPattern)?,
                );
            }
            PatternKind::Wildcard | PatternKind::TldWildcard => {
                let (domain, path) = split_pattern(trimmed);
                pattern.domain = domain.to_lowercase();
                pattern.path = path.map(str::to_lowercase);
            }
        }

        Ok(pattern)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn domain_part(&self) -> &str {
        &self.domain
    }

    pub fn path_part(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub(crate) fn regex(&self) -> Option<&Regex> {
        self.regex.as_ref()
    }

    pub(crate) fn regex_includes_path(&self) -> bool {
        self.regex_includes_path
    }

    pub(crate) fn segment(&self) -> Option<&SegmentTemplate> {
        self.segment.as_ref()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_each_grammar() {
        assert_eq!(PatternKind::classify("github.com"), PatternKind::Wildcard);
        assert_eq!(PatternKind::classify("*.example.com"), PatternKind::Wildcard);
        assert_eq!(PatternKind::classify("pre-*.example.com"), PatternKind::Wildcard);
        assert_eq!(PatternKind::classify("google.**"), PatternKind::TldWildcard);
        assert_eq!(PatternKind::classify("google.**/maps"), PatternKind::TldWildcard);
        assert_eq!(PatternKind::classify("{team}.slack.com"), PatternKind::SegmentExtraction);
        assert_eq!(PatternKind::classify(r"/^(\w+)\.atlassian\.net$/"), PatternKind::Regex);
        // 路径中出现 `.**` 不影响域名分类
        assert_eq!(PatternKind::classify("example.com/a.**"), PatternKind::Wildcard);
    }

    #[test]
    fn test_parse_splits_and_lowercases() {
        let pattern = Pattern::parse("  GitHub.com/Org/Repo ").unwrap();
        assert_eq!(pattern.raw(), "GitHub.com/Org/Repo");
        assert_eq!(pattern.domain_part(), "github.com");
        assert_eq!(pattern.path_part(), Some("/org/repo"));
    }

    #[test]
    fn test_parse_rejects_invalid() {
        let err = Pattern::parse("*.a.*").unwrap_err();
        assert!(matches!(err, TabGroupError::InvalidPattern(_)));
    }
}
