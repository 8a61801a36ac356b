//! 外部宿主实体（标签页 / 分组）
use serde::{Deserialize, Serialize};

use crate::rule::GroupColor;

pub type TabId = i64;
pub type GroupId = i64;
pub type WindowId = i64;

/// 标签页（只读快照，每次决策前重新获取）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    pub url: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub active: bool,
    pub window_id: WindowId,
    #[serde(default)]
    pub group_id: Option<GroupId>,
}

/// 分组（宿主保证不存在空分组）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    #[serde(default)]
    pub title: String,
    pub color: GroupColor,
    #[serde(default)]
    pub collapsed: bool,
    pub window_id: WindowId,
}

/// 分组更新请求，仅包含需要修改的字段
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<GroupColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collapsed: Option<bool>,
}

impl GroupUpdate {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn color(color: GroupColor) -> Self {
        Self {
            color: Some(color),
            ..Self::default()
        }
    }

    pub fn collapsed(collapsed: bool) -> Self {
        Self {
            collapsed: Some(collapsed),
            ..Self::default()
        }
    }

    pub fn with_color(mut self, color: GroupColor) -> Self {
        self.color = Some(color);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.color.is_none() && self.collapsed.is_none()
    }
}
