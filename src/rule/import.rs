//! 外部规则 JSON 导入
//! 导入数据视为不可信输入：逐字段校验，得到强类型规则或字段级错误列表

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use super::model::{GroupColor, Rule};
use crate::error::TabGroupError;
use crate::pattern::PatternValidator;

/// 单个字段的错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// 字段路径，例如 `rules[2].patterns[0]`
    pub path: String,
    pub message: String,
}

impl FieldError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// 导入失败（含全部字段错误）
#[derive(Debug, Clone, Error)]
#[error("rule import failed with {} error(s): {}", .errors.len(), join_errors(.errors))]
pub struct ImportError {
    pub errors: Vec<FieldError>,
}

fn join_errors(errors: &[FieldError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl From<ImportError> for TabGroupError {
    fn from(e: ImportError) -> Self {
        TabGroupError::InvalidRule(e.to_string())
    }
}

/// 解析规则 JSON：接受规则数组，或 `{"rules": [...]}` 导出格式
pub fn parse_rules_json(input: &str) -> Result<Vec<Rule>, ImportError> {
    let value: Value = serde_json::from_str(input).map_err(|e| ImportError {
        errors: vec![FieldError::new("$", format!("invalid JSON: {}", e))],
    })?;
    parse_rules_value(&value)
}

pub fn parse_rules_value(value: &Value) -> Result<Vec<Rule>, ImportError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("rules") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ImportError {
                    errors: vec![FieldError::new("rules", "expected an array of rules")],
                });
            }
        },
        _ => {
            return Err(ImportError {
                errors: vec![FieldError::new("$", "expected an array of rules")],
            });
        }
    };

    let mut errors = Vec::new();
    let mut rules = Vec::with_capacity(items.len());
    let mut seen_ids = HashSet::new();

    for (index, item) in items.iter().enumerate() {
        let path = format!("rules[{}]", index);
        let Some(obj) = item.as_object() else {
            errors.push(FieldError::new(path, "expected an object"));
            continue;
        };
        if let Some(rule) = parse_rule(obj, &path, &mut errors) {
            if !seen_ids.insert(rule.id.clone()) {
                errors.push(FieldError::new(format!("{}.id", path), format!("duplicate rule id '{}'", rule.id)));
                continue;
            }
            rules.push(rule);
        }
    }

    if errors.is_empty() {
        debug!("Imported {} rules", rules.len());
        Ok(rules)
    } else {
        Err(ImportError { errors })
    }
}

fn parse_rule(obj: &Map<String, Value>, path: &str, errors: &mut Vec<FieldError>) -> Option<Rule> {
    let before = errors.len();

    let id = required_string(obj, "id", path, errors);
    let name = required_string(obj, "name", path, errors);
    let patterns = parse_patterns(obj, path, errors);

    let color = match obj.get("color") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.parse::<GroupColor>().unwrap_or_else(|e| {
            warn!("{}.color: {}, using {}", path, e, GroupColor::FALLBACK);
            GroupColor::FALLBACK
        })),
        Some(_) => {
            errors.push(FieldError::new(format!("{}.color", path), "expected a string"));
            None
        }
    };

    let enabled = match obj.get("enabled") {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            errors.push(FieldError::new(format!("{}.enabled", path), "expected a boolean"));
            true
        }
    };

    let priority = match obj.get("priority") {
        None | Some(Value::Null) => 0,
        Some(v) => match v.as_i64().and_then(|n| i32::try_from(n).ok()) {
            Some(n) => n,
            None => {
                errors.push(FieldError::new(format!("{}.priority", path), "expected an integer"));
                0
            }
        },
    };

    let minimum_tabs = match obj.get("minimumTabs") {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_u64().and_then(|n| u32::try_from(n).ok()).filter(|n| *n >= 1) {
            Some(n) => Some(n),
            None => {
                errors.push(FieldError::new(format!("{}.minimumTabs", path), "expected a positive integer"));
                None
            }
        },
    };

    let group_name_template = match obj.get("groupNameTemplate") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errors.push(FieldError::new(format!("{}.groupNameTemplate", path), "expected a string"));
            None
        }
    };

    if errors.len() > before {
        return None;
    }

    Some(Rule {
        id: id?,
        name: name?,
        patterns: patterns?,
        color,
        enabled,
        priority,
        minimum_tabs,
        group_name_template,
    })
}

fn required_string(obj: &Map<String, Value>, field: &str, path: &str, errors: &mut Vec<FieldError>) -> Option<String> {
    match obj.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::String(_)) => {
            errors.push(FieldError::new(format!("{}.{}", path, field), "must not be empty"));
            None
        }
        Some(_) => {
            errors.push(FieldError::new(format!("{}.{}", path, field), "expected a string"));
            None
        }
        None => {
            errors.push(FieldError::new(format!("{}.{}", path, field), "is required"));
            None
        }
    }
}

fn parse_patterns(obj: &Map<String, Value>, path: &str, errors: &mut Vec<FieldError>) -> Option<Vec<String>> {
    let (field, value) = match (obj.get("patterns"), obj.get("domains")) {
        (Some(v), _) => ("patterns", v),
        (None, Some(v)) => ("domains", v),
        (None, None) => {
            errors.push(FieldError::new(format!("{}.patterns", path), "is required"));
            return None;
        }
    };

    let Some(items) = value.as_array() else {
        errors.push(FieldError::new(format!("{}.{}", path, field), "expected an array of strings"));
        return None;
    };
    if items.is_empty() {
        errors.push(FieldError::new(format!("{}.{}", path, field), "must contain at least one pattern"));
        return None;
    }

    let before = errors.len();
    let mut patterns = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let item_path = format!("{}.{}[{}]", path, field, index);
        match item.as_str() {
            Some(p) => {
                let validation = PatternValidator::validate(p);
                match validation.error {
                    None => patterns.push(p.trim().to_string()),
                    Some(error) => errors.push(FieldError::new(item_path, error)),
                }
            }
            None => errors.push(FieldError::new(item_path, "expected a string")),
        }
    }

    (errors.len() == before).then_some(patterns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_accepts_array_and_export_wrapper() {
        let rules = parse_rules_json(
            r#"[{"id":"gh","name":"GitHub","domains":["github.com"],"color":"purple","minimumTabs":2}]"#,
        )
        .unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].patterns, vec!["github.com".to_string()]);
        assert_eq!(rules[0].color, Some(GroupColor::Purple));
        assert_eq!(rules[0].minimum_tabs, Some(2));
        assert!(rules[0].enabled);

        let rules = parse_rules_json(r#"{"version":1,"rules":[{"id":"a","name":"A","patterns":["a.com"]}]}"#).unwrap();
        assert_eq!(rules[0].id, "a");
    }

    #[test]
    fn test_import_reports_field_errors() {
        let err = parse_rules_json(
            r#"[
                {"id":"a","name":"","patterns":["a.com"]},
                {"id":"b","name":"B","patterns":["*.b.*", 3]},
                {"id":"c","name":"C","patterns":["c.com"],"priority":"high","minimumTabs":0},
                "nope"
            ]"#,
        )
        .unwrap_err();
        let paths: Vec<&str> = err.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "rules[0].name",
                "rules[1].patterns[0]",
                "rules[1].patterns[1]",
                "rules[2].priority",
                "rules[2].minimumTabs",
                "rules[3]",
            ]
        );
    }

    #[test]
    fn test_import_rejects_duplicates_and_bad_shape() {
        let err = parse_rules_json(
            r#"[{"id":"a","name":"A","patterns":["a.com"]},{"id":"a","name":"A2","patterns":["b.com"]}]"#,
        )
        .unwrap_err();
        assert_eq!(err.errors[0].path, "rules[1].id");

        assert!(parse_rules_json(r#"{"foo":1}"#).is_err());
        assert!(parse_rules_json("not json").is_err());
    }

    #[test]
    fn test_unknown_color_is_normalized() {
        let rules = parse_rules_json(r#"[{"id":"a","name":"A","patterns":["a.com"],"color":"teal"}]"#).unwrap();
        assert_eq!(rules[0].color, Some(GroupColor::FALLBACK));
    }
}
