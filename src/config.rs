//! 配置管理：分组行为设置与调和器选项

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::DomainNameMode;

/// 专注模式延迟上限（毫秒）
pub const MAX_FOCUS_DELAY_MS: u64 = 5000;

/// 分组行为设置（持久化在键值存储的 `settings` 键下）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GroupingSettings {
    // 是否自动分组
    pub auto_group_enabled: bool,
    // 新标签页/内部页面是否归入保留分组 "System"
    pub group_new_tabs: bool,
    // 全局最小标签数（规则未指定时生效）
    pub global_minimum_tabs: Option<u32>,
    // 无规则命中时是否按域名分组
    pub fallback_to_domain: bool,
    pub domain_name_mode: DomainNameMode,
    // 纯域名模式是否同时匹配子域名
    pub allow_auto_subdomain: bool,
    pub focus_mode: bool,
    // 专注模式折叠延迟（毫秒，0-5000）
    pub focus_delay_ms: u64,
}

impl Default for GroupingSettings {
    fn default() -> Self {
        Self {
            auto_group_enabled: true,
            group_new_tabs: false,
            global_minimum_tabs: None,
            fallback_to_domain: true,
            domain_name_mode: DomainNameMode::default(),
            allow_auto_subdomain: false,
            focus_mode: false,
            focus_delay_ms: 0,
        }
    }
}

impl GroupingSettings {
    /// 生效的最小标签数：规则 > 全局 > 1
    pub fn effective_minimum(&self, rule_minimum: Option<u32>) -> u32 {
        rule_minimum.or(self.global_minimum_tabs).unwrap_or(1).max(1)
    }

    pub fn focus_delay(&self) -> Duration {
        Duration::from_millis(self.focus_delay_ms.min(MAX_FOCUS_DELAY_MS))
    }
}

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 获取默认配置
    pub fn get_default() -> GroupingSettings {
        GroupingSettings::default()
    }

    /// 自定义配置
    pub fn custom() -> CustomConfigBuilder {
        CustomConfigBuilder::new()
    }
}

/// 配置构建器
#[derive(Debug, Clone, Default)]
pub struct CustomConfigBuilder {
    config: GroupingSettings,
}

impl CustomConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_group_enabled(mut self, enabled: bool) -> Self {
        self.config.auto_group_enabled = enabled;
        self
    }

    pub fn group_new_tabs(mut self, enabled: bool) -> Self {
        self.config.group_new_tabs = enabled;
        self
    }

    pub fn global_minimum_tabs(mut self, minimum: Option<u32>) -> Self {
        self.config.global_minimum_tabs = minimum;
        self
    }

    pub fn fallback_to_domain(mut self, enabled: bool) -> Self {
        self.config.fallback_to_domain = enabled;
        self
    }

    pub fn domain_name_mode(mut self, mode: DomainNameMode) -> Self {
        self.config.domain_name_mode = mode;
        self
    }

    pub fn allow_auto_subdomain(mut self, allow: bool) -> Self {
        self.config.allow_auto_subdomain = allow;
        self
    }

    pub fn focus_mode(mut self, enabled: bool) -> Self {
        self.config.focus_mode = enabled;
        self
    }

    pub fn focus_delay_ms(mut self, delay: u64) -> Self {
        self.config.focus_delay_ms = delay.min(MAX_FOCUS_DELAY_MS);
        self
    }

    pub fn build(self) -> GroupingSettings {
        self.config
    }
}

/// 重试策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryPolicy {
    Never, // 不重试
    // 指数退避：第 n 次重试前等待 initial_delay * 2^(n-1)
    Exponential {
        max_retries: u32,
        initial_delay: Duration,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Exponential {
            max_retries: 5,
            initial_delay: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    pub fn max_retries(&self) -> u32 {
        match self {
            RetryPolicy::Never => 0,
            RetryPolicy::Exponential { max_retries, .. } => *max_retries,
        }
    }

    /// 第 `retry` 次重试（从 1 开始）前的等待时长
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self {
            RetryPolicy::Never => Duration::ZERO,
            RetryPolicy::Exponential { initial_delay, .. } => {
                initial_delay.saturating_mul(1u32 << retry.saturating_sub(1).min(16))
            }
        }
    }
}

/// 调和器选项
#[derive(Debug, Clone, Default)]
pub struct ReconcilerOptions {
    pub retry: RetryPolicy,
}

impl ReconcilerOptions {
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
