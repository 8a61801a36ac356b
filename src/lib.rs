//! rstabgroup - 浏览器标签页自动分组引擎

// 导出全局错误类型
pub use self::error::{TabGroupError, TgResult};

// 导出配置模块
pub use self::config::{ConfigManager, CustomConfigBuilder, GroupingSettings, ReconcilerOptions, RetryPolicy};

// 导出模式模块核心接口
pub use self::pattern::{
    MatchOptions, MatchResult, Pattern, PatternKind, PatternMatcher, PatternValidator, ValidationResult,
};

// 导出规则模块核心接口
pub use self::rule::{
    CompiledRuleSet, Conflict, ConflictDetector, ConflictType, GroupColor, ResolvedRule, Rule, RuleCompiler,
    RuleResolver, check_pattern_overlap, detect_conflicts, parse_rules_json, resolve_rule,
};

// 导出宿主与存储接口
pub use self::host::{Group, GroupUpdate, KvStore, MemoryHost, Tab, TabHost};
pub use self::storage::{FileKvStore, MemoryKvStore, SettingsStore};

// 导出调和模块核心接口
pub use self::reconciler::{BulkOutcome, GroupReconciler, ReconcilerState, TabEvent};

// 导出工具模块核心接口
pub use self::utils::{DomainNameMode, DomainNamer};

// 声明所有子模块
pub mod config;
pub mod error;
pub mod host;
pub mod pattern;
pub mod reconciler;
pub mod rule;
pub mod storage;
pub mod utils;

/// 单次匹配 URL 与模式
pub fn match_pattern(url: &str, pattern: &str, options: &MatchOptions) -> MatchResult {
    PatternMatcher::match_url(url, pattern, options)
}

/// 校验模式语法
pub fn validate_pattern(pattern: &str) -> ValidationResult {
    PatternValidator::validate(pattern)
}
