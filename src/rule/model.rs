//! 规则数据模型定义
//! 仅存储规则数据，无任何业务逻辑，支持序列化/反序列化

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::error::{TabGroupError, TgResult};
use crate::pattern::PatternValidator;

/// 分组颜色（宿主固定的 9 色调色板）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupColor {
    #[serde(alias = "gray")]
    Grey,
    Blue,
    Red,
    Yellow,
    Green,
    Pink,
    Purple,
    Cyan,
    Orange,
}

impl GroupColor {
    pub const PALETTE: [GroupColor; 9] = [
        GroupColor::Grey,
        GroupColor::Blue,
        GroupColor::Red,
        GroupColor::Yellow,
        GroupColor::Green,
        GroupColor::Pink,
        GroupColor::Purple,
        GroupColor::Cyan,
        GroupColor::Orange,
    ];

    /// 未知颜色时使用的安全默认值
    pub const FALLBACK: GroupColor = GroupColor::Grey;

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupColor::Grey => "grey",
            GroupColor::Blue => "blue",
            GroupColor::Red => "red",
            GroupColor::Yellow => "yellow",
            GroupColor::Green => "green",
            GroupColor::Pink => "pink",
            GroupColor::Purple => "purple",
            GroupColor::Cyan => "cyan",
            GroupColor::Orange => "orange",
        }
    }

    /// 宽松解析：未知颜色降级为 FALLBACK 并记录警告
    pub fn parse_or_fallback(s: &str) -> Self {
        s.parse().unwrap_or_else(|e| {
            warn!("{}, falling back to {}", e, Self::FALLBACK);
            Self::FALLBACK
        })
    }
}

impl FromStr for GroupColor {
    type Err = TabGroupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grey" | "gray" => Ok(GroupColor::Grey),
            "blue" => Ok(GroupColor::Blue),
            "red" => Ok(GroupColor::Red),
            "yellow" => Ok(GroupColor::Yellow),
            "green" => Ok(GroupColor::Green),
            "pink" => Ok(GroupColor::Pink),
            "purple" => Ok(GroupColor::Purple),
            "cyan" => Ok(GroupColor::Cyan),
            "orange" => Ok(GroupColor::Orange),
            other => Err(TabGroupError::Logic(format!("unknown group color '{}'", other))),
        }
    }
}

impl fmt::Display for GroupColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 持久化数据中的颜色字段：未知值降级而不是整体反序列化失败
fn lenient_color<'de, D>(deserializer: D) -> Result<Option<GroupColor>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .filter(|s| !s.trim().is_empty())
        .map(|s| GroupColor::parse_or_fallback(&s)))
}

fn default_enabled() -> bool {
    true
}

/// 分组规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub name: String,
    /// 按声明顺序匹配
    #[serde(default, alias = "domains")]
    pub patterns: Vec<String>,
    #[serde(default, deserialize_with = "lenient_color", skip_serializing_if = "Option::is_none")]
    pub color: Option<GroupColor>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 数值越大越优先，相同优先级按插入顺序
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_tabs: Option<u32>,
    /// 分组名模板，例如 `Slack: {team}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name_template: Option<String>,
}

impl Rule {
    pub fn new(id: impl Into<String>, name: impl Into<String>, patterns: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            patterns,
            color: None,
            enabled: true,
            priority: 0,
            minimum_tabs: None,
            group_name_template: None,
        }
    }

    pub fn with_color(mut self, color: GroupColor) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_minimum_tabs(mut self, minimum: u32) -> Self {
        self.minimum_tabs = Some(minimum);
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.group_name_template = Some(template.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// 规则自身的一致性校验：名称非空，至少一个模式且每个模式合法
    pub fn validate(&self) -> TgResult<()> {
        if self.id.trim().is_empty() {
            return Err(TabGroupError::InvalidRule("rule id cannot be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(TabGroupError::InvalidRule(format!("rule '{}' has an empty name", self.id)));
        }
        if self.patterns.is_empty() {
            return Err(TabGroupError::InvalidRule(format!("rule '{}' has no patterns", self.id)));
        }
        for pattern in &self.patterns {
            PatternValidator::validate(pattern).into_result(pattern)?;
        }
        Ok(())
    }
}
