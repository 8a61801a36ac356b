//! 规则模块：规则模型、编译、解析、冲突检测与导入
pub mod compiler;
pub mod conflict;
pub mod import;
pub mod model;
pub mod resolver;

// 导出核心接口
pub use self::compiler::{CompiledRule, CompiledRuleSet, RuleCompiler};
pub use self::conflict::{Conflict, ConflictDetector, ConflictType, check_pattern_overlap, detect_conflicts};
pub use self::import::{FieldError, ImportError, parse_rules_json, parse_rules_value};
pub use self::model::{GroupColor, Rule};
pub use self::resolver::{ResolvedRule, RuleResolver, resolve_rule};
