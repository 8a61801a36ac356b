//! 持久化状态读写：设置、规则、分组颜色映射
//! 读到无法解析的值时降级为默认值并记录警告，不让单个坏值阻断整个流程

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::config::GroupingSettings;
use crate::error::TgResult;
use crate::host::KvStore;
use crate::rule::{GroupColor, Rule};

pub const SETTINGS_KEY: &str = "settings";
pub const RULES_KEY: &str = "rules";
pub const COLOR_MAPPING_KEY: &str = "groupColorMapping";

/// 分组标题 => 颜色
pub type ColorMapping = HashMap<String, GroupColor>;

#[derive(Clone)]
pub struct SettingsStore {
    kv: Arc<dyn KvStore>,
}

impl SettingsStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn load_settings(&self) -> TgResult<GroupingSettings> {
        let Some(value) = self.kv.get(SETTINGS_KEY).await? else {
            return Ok(GroupingSettings::default());
        };
        Ok(serde_json::from_value(value).unwrap_or_else(|e| {
            warn!("Stored settings are unreadable, using defaults: {}", e);
            GroupingSettings::default()
        }))
    }

    pub async fn save_settings(&self, settings: &GroupingSettings) -> TgResult<()> {
        self.kv.set(SETTINGS_KEY, serde_json::to_value(settings)?).await
    }

    /// 读取规则列表，逐条解析，坏条目跳过
    pub async fn load_rules(&self) -> TgResult<Vec<Rule>> {
        let Some(value) = self.kv.get(RULES_KEY).await? else {
            return Ok(Vec::new());
        };
        let Value::Array(items) = value else {
            warn!("Stored rules are not an array, ignoring");
            return Ok(Vec::new());
        };

        Ok(items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match serde_json::from_value::<Rule>(item) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!("Skipping stored rule #{}: {}", index, e);
                    None
                }
            })
            .collect())
    }

    pub async fn save_rules(&self, rules: &[Rule]) -> TgResult<()> {
        self.kv.set(RULES_KEY, serde_json::to_value(rules)?).await
    }

    pub async fn load_color_mapping(&self) -> TgResult<ColorMapping> {
        let Some(value) = self.kv.get(COLOR_MAPPING_KEY).await? else {
            return Ok(ColorMapping::new());
        };
        let Value::Object(map) = value else {
            warn!("Stored color mapping is not an object, ignoring");
            return Ok(ColorMapping::new());
        };

        Ok(map
            .into_iter()
            .filter_map(|(title, color)| {
                color
                    .as_str()
                    .map(|c| (title, GroupColor::parse_or_fallback(c)))
            })
            .collect())
    }

    pub async fn save_color_mapping(&self, mapping: &ColorMapping) -> TgResult<()> {
        self.kv.set(COLOR_MAPPING_KEY, serde_json::to_value(mapping)?).await
    }
}
