//! 片段提取模板
//! `{name}` 捕获一个完整标签；`{name:index:delimiter}` 捕获按分隔符切分后的第 index 段

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::kind::compile_regex_safe;
use crate::utils::DomainNamer;

static VARIABLE_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// 片段分隔符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentDelimiter {
    Dot,
    Dash,
    Underscore,
}

impl SegmentDelimiter {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dot" => Some(SegmentDelimiter::Dot),
            "dash" => Some(SegmentDelimiter::Dash),
            "underscore" => Some(SegmentDelimiter::Underscore),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            SegmentDelimiter::Dot => '.',
            SegmentDelimiter::Dash => '-',
            SegmentDelimiter::Underscore => '_',
        }
    }
}

/// 模板变量
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentVar {
    pub name: String,
    /// (段下标, 分隔符)；None 表示取整个捕获
    pub pick: Option<(usize, SegmentDelimiter)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SegmentToken {
    Literal(String),
    Var(SegmentVar),
}

/// 将模式文本切分为字面量与变量，同时完成语法校验
pub(crate) fn tokenize(input: &str) -> Result<Vec<SegmentToken>, String> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if !literal.is_empty() {
                    tokens.push(SegmentToken::Literal(std::mem::take(&mut literal)));
                }
                let mut spec = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    match inner {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => return Err("Nested '{' in variable spec".to_string()),
                        other => spec.push(other),
                    }
                }
                if !closed {
                    return Err("Unclosed '{' in pattern".to_string());
                }
                tokens.push(SegmentToken::Var(parse_var_spec(&spec)?));
            }
            '}' => return Err("Unmatched '}' in pattern".to_string()),
            ':' => return Err("':' is only allowed inside variable specs".to_string()),
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        tokens.push(SegmentToken::Literal(literal));
    }
    Ok(tokens)
}

fn parse_var_spec(spec: &str) -> Result<SegmentVar, String> {
    let parts: Vec<&str> = spec.split(':').collect();
    let name = parts[0];
    if !VARIABLE_NAME_REGEX.is_match(name) {
        return Err(format!("Invalid variable name '{}'", name));
    }

    let pick = match parts.len() {
        1 => None,
        3 => {
            let index: usize = parts[1]
                .parse()
                .map_err(|_| format!("Invalid segment index '{}' for variable '{}'", parts[1], name))?;
            let delimiter = SegmentDelimiter::parse(parts[2])
                .ok_or_else(|| format!("Unknown delimiter '{}' for variable '{}'", parts[2], name))?;
            Some((index, delimiter))
        }
        _ => return Err(format!("Malformed variable spec '{{{}}}'", spec)),
    };

    Ok(SegmentVar {
        name: name.to_string(),
        pick,
    })
}

/// 校验变量名不重复，返回变量列表
pub(crate) fn collect_vars(tokens: &[SegmentToken]) -> Result<Vec<SegmentVar>, String> {
    let mut seen = HashSet::new();
    let mut vars = Vec::new();
    for token in tokens {
        if let SegmentToken::Var(var) = token {
            if !seen.insert(var.name.clone()) {
                return Err(format!("Duplicate variable name '{}'", var.name));
            }
            vars.push(var.clone());
        }
    }
    Ok(vars)
}

/// 编译好的片段提取模板
#[derive(Debug, Clone)]
pub struct SegmentTemplate {
    domain_regex: Regex,
    path_regex: Option<Regex>,
    vars: Vec<SegmentVar>,
    /// 域名以 `.**` 结尾：末尾捕获必须是单个 TLD 或 ccSLD
    tld_suffix: bool,
}

impl SegmentTemplate {
    /// 由已小写的域名/路径部分构建模板
    pub fn build(domain: &str, path: Option<&str>) -> Result<Self, String> {
        let (domain_body, tld_suffix) = match domain.strip_suffix(".**") {
            Some(body) => (body, true),
            None => (domain, false),
        };
        let domain_tokens = tokenize(domain_body)?;
        let path_tokens = match path {
            Some(p) if !p.trim_matches('/').is_empty() => tokenize(&normalize_template_path(p))?,
            _ => Vec::new(),
        };

        let mut all_tokens = domain_tokens.clone();
        all_tokens.extend(path_tokens.iter().cloned());
        let vars = collect_vars(&all_tokens)?;

        let domain_src = format!(
            "^{}{}$",
            render_tokens(&domain_tokens, Scope::Domain),
            if tld_suffix { r"\.([^/]+)" } else { "" }
        );
        let domain_regex = compile_regex_safe(&domain_src).map_err(|e| e.to_string())?;

        let path_regex = if path_tokens.is_empty() {
            None
        } else {
            let path_src = format!("^{}(?:/.*)?$", render_tokens(&path_tokens, Scope::Path));
            Some(compile_regex_safe(&path_src).map_err(|e| e.to_string())?)
        };

        Ok(Self {
            domain_regex,
            path_regex,
            vars,
            tld_suffix,
        })
    }

    pub fn vars(&self) -> &[SegmentVar] {
        &self.vars
    }

    /// 执行匹配，成功时按声明顺序返回 (变量名, 值)
    pub fn extract(&self, domain: &str, normalized_path: &str) -> Option<Vec<(String, String)>> {
        let mut raw_values: Vec<String> = Vec::with_capacity(self.vars.len());

        let caps = self.domain_regex.captures(domain)?;
        let mut groups: Vec<String> = caps
            .iter()
            .skip(1)
            .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect();
        if self.tld_suffix {
            let suffix = groups.pop()?;
            if !DomainNamer::is_public_suffix(&suffix) {
                return None;
            }
        }
        raw_values.extend(groups);

        if let Some(path_regex) = &self.path_regex {
            let caps = path_regex.captures(normalized_path)?;
            raw_values.extend(caps.iter().skip(1).map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default()));
        }

        if raw_values.len() != self.vars.len() {
            return None;
        }

        let mut values = Vec::with_capacity(self.vars.len());
        for (var, raw) in self.vars.iter().zip(raw_values) {
            let value = match var.pick {
                Some((index, delimiter)) => raw.split(delimiter.as_char()).nth(index)?.to_string(),
                None => raw,
            };
            if value.is_empty() {
                return None;
            }
            values.push((var.name.clone(), value));
        }
        Some(values)
    }
}

#[derive(Clone, Copy)]
enum Scope {
    Domain,
    Path,
}

fn render_tokens(tokens: &[SegmentToken], scope: Scope) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            SegmentToken::Literal(text) => out.push_str(&render_literal(text, scope)),
            SegmentToken::Var(var) => {
                let group = match (scope, var.pick) {
                    (Scope::Domain, Some((_, SegmentDelimiter::Dot))) => "([^/]+)",
                    (Scope::Domain, _) => "([^./]+)",
                    (Scope::Path, _) => "([^/]+)",
                };
                out.push_str(group);
            }
        }
    }
    out
}

/// 字面量转义，`*` / `**` 转为非捕获通配
fn render_literal(text: &str, scope: Scope) -> String {
    let mut out = String::new();
    let mut rest = text;
    while let Some(idx) = rest.find('*') {
        out.push_str(&regex::escape(&rest[..idx]));
        let after = &rest[idx..];
        if after.starts_with("**") {
            out.push_str(".*");
            rest = &after[2..];
        } else {
            out.push_str(match scope {
                Scope::Domain => "[^./]+",
                Scope::Path => "[^/]+",
            });
            rest = &after[1..];
        }
    }
    out.push_str(&regex::escape(rest));
    out
}

fn normalize_template_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
