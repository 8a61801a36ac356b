//! 模式模块：分类、校验、匹配
pub mod kind;
pub mod matcher;
pub mod segment;
pub mod validator;

pub use self::kind::{Pattern, PatternKind};
pub use self::matcher::{MatchOptions, MatchResult, PatternMatcher, render_template};
pub use self::segment::{SegmentDelimiter, SegmentTemplate, SegmentVar};
pub use self::validator::{MAX_PATH_LENGTH, MAX_PATTERN_LENGTH, PatternValidator, ValidationResult};
