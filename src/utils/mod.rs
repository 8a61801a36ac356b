//! 通用工具：URL 拆分与域名显示名
pub mod domain_name;
pub mod url_parts;

pub use self::domain_name::{DomainNameMode, DomainNamer, DomainSplit};
pub use self::url_parts::{TabUrlKind, UrlParts};
