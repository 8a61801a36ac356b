//! 模式语法校验
//! 校验失败不产生任何副作用，结果同步返回给调用方

use serde::Serialize;

use super::kind::{PatternKind, compile_regex_safe, split_pattern};
use super::segment::{collect_vars, tokenize};
use crate::error::{TabGroupError, TgResult};

/// 模式最大长度
pub const MAX_PATTERN_LENGTH: usize = 500;
/// 路径部分最大长度
pub const MAX_PATH_LENGTH: usize = 100;

/// 校验结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(error.into()),
        }
    }

    /// 转换为 Result，便于在规则导入等流程中使用 `?`
    pub fn into_result(self, pattern: &str) -> TgResult<()> {
        match self.error {
            None => Ok(()),
            Some(error) => Err(TabGroupError::InvalidPattern(format!("{}: {}", pattern, error))),
        }
    }
}

/// 模式校验器
pub struct PatternValidator;

impl PatternValidator {
    pub fn validate(pattern: &str) -> ValidationResult {
        match Self::check(pattern) {
            Ok(()) => ValidationResult::valid(),
            Err(error) => ValidationResult::invalid(error),
        }
    }

    fn check(pattern: &str) -> Result<(), String> {
        let p = pattern.trim();

        // 1. 空串 / 长度
        if p.is_empty() {
            return Err("Pattern cannot be empty".to_string());
        }
        if p.chars().count() > MAX_PATTERN_LENGTH {
            return Err(format!(
                "Pattern exceeds maximum length of {} characters",
                MAX_PATTERN_LENGTH
            ));
        }

        // 2. 正则模式只校验能否编译
        let kind = PatternKind::classify(p);
        if kind == PatternKind::Regex {
            let body = &p[1..p.len() - 1];
            return compile_regex_safe(body)
                .map(|_| ())
                .map_err(|e| format!("Invalid regular expression: {}", e));
        }

        // 3. 字符集
        if let Some(c) = p.chars().find(|c| !is_allowed_char(*c)) {
            return Err(format!("Invalid character '{}' in pattern", c));
        }

        let (domain, path) = split_pattern(p);

        // 4. 域名部分
        if domain.is_empty() {
            return Err("Domain part cannot be empty".to_string());
        }
        if domain.split('.').any(str::is_empty) {
            return Err("Domain part contains an empty label".to_string());
        }
        if domain.starts_with("*.") && domain.ends_with(".**") {
            return Err("Combining a subdomain wildcard with a TLD wildcard is not supported".to_string());
        }
        if count_wildcards(domain) > 1 {
            return Err("Only one wildcard is allowed in the domain part".to_string());
        }
        if domain.contains("**") && (!domain.ends_with(".**") || domain.len() <= 3) {
            return Err("'**' is only allowed as the trailing TLD label (e.g. google.**)".to_string());
        }

        // 5. 路径部分
        if let Some(path) = path {
            if path.chars().count() > MAX_PATH_LENGTH {
                return Err(format!(
                    "Path exceeds maximum length of {} characters",
                    MAX_PATH_LENGTH
                ));
            }
            if path.contains("//") {
                return Err("Path cannot contain consecutive slashes".to_string());
            }
            if count_wildcards(path) > 1 {
                return Err("Only one wildcard is allowed in the path part".to_string());
            }
        }

        // 6. 变量语法（非片段模式下同样会拒绝孤立的 `}` 与 `:`）
        let tokens = tokenize(p)?;
        collect_vars(&tokens)?;

        Ok(())
    }
}

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '/' | '*' | '{' | '}' | ':' | '_')
}

/// 统计通配符个数，`**` 计为一个
pub(crate) fn count_wildcards(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut count = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'*' {
            count += 1;
            i += if bytes.get(i + 1) == Some(&b'*') { 2 } else { 1 };
        } else {
            i += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_of(p: &str) -> String {
        PatternValidator::validate(p).error.unwrap_or_default()
    }

    #[test]
    fn test_valid_patterns() {
        for p in [
            "github.com",
            "*.example.com",
            "google.**",
            "pre-*.example.com",
            "example.com/docs/**",
            "github.com/*/settings",
            "{team}.slack.com",
            "{env:0:dash}.example.com",
            r"/^(\w+)\.atlassian\.net$/",
        ] {
            assert!(PatternValidator::validate(p).is_valid, "{} should be valid: {}", p, error_of(p));
        }
    }

    #[test]
    fn test_empty_and_length() {
        assert!(!PatternValidator::validate("   ").is_valid);
        let long = format!("{}.com", "a".repeat(MAX_PATTERN_LENGTH));
        assert!(error_of(&long).contains("maximum length"));
    }

    #[test]
    fn test_multiple_wildcards_rejected() {
        assert!(error_of("*.foo.*").contains("one wildcard"));
        assert!(error_of("a*b*.com").contains("one wildcard"));
        assert!(error_of("example.com/*/x/*").contains("one wildcard"));
        assert!(error_of("example.com/**/x/**").contains("one wildcard"));
        assert!(!PatternValidator::validate("***.com").is_valid);
    }

    #[test]
    fn test_combined_wildcards_rejected() {
        assert!(error_of("*.google.**").contains("not supported"));
    }

    #[test]
    fn test_invalid_characters_and_regex() {
        assert!(error_of("exa mple.com").contains("Invalid character"));
        assert!(error_of("example.com?q=1").contains("Invalid character"));
        assert!(error_of("/([a-z/").contains("Invalid regular expression"));
    }

    #[test]
    fn test_path_rules() {
        let long_path = format!("example.com/{}", "p".repeat(MAX_PATH_LENGTH));
        assert!(error_of(&long_path).contains("Path exceeds"));
        assert!(error_of("example.com/a//b").contains("consecutive slashes"));
        assert!(error_of("/docs").contains("Domain part cannot be empty"));
    }

    #[test]
    fn test_variable_rules() {
        assert!(error_of("{a}.{a}.com").contains("Duplicate"));
        assert!(error_of("{9a}.com").contains("Invalid variable name"));
        assert!(error_of("{a.com").contains("Unclosed"));
        assert!(error_of("localhost:3000").contains("':'"));
    }

    #[test]
    fn test_count_wildcards() {
        assert_eq!(count_wildcards("*.example.com"), 1);
        assert_eq!(count_wildcards("google.**"), 1);
        assert_eq!(count_wildcards("***"), 2);
        assert_eq!(count_wildcards("plain"), 0);
    }

    #[test]
    fn test_into_result() {
        assert!(PatternValidator::validate("github.com").into_result("github.com").is_ok());
        let err = PatternValidator::validate("").into_result("").unwrap_err();
        assert!(matches!(err, TabGroupError::InvalidPattern(_)));
    }
}
