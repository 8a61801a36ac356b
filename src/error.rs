//! 全局错误类型定义

use regex::Error as RegexError;
use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;
use thiserror::Error;
use url::ParseError as UrlParseError;

#[derive(Error, Debug)]
pub enum TabGroupError {
    // 校验相关错误（同步返回调用方，不产生任何副作用）
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    // 外部宿主相关错误
    #[error("Host temporarily locked: {0}")]
    TransientExternal(String),
    #[error("Host target no longer exists: {0}")]
    PermanentExternal(String),
    #[error("Host call failed: {0}")]
    Host(String),

    // 逻辑错误（调用方应降级为安全默认值）
    #[error("Logic error: {0}")]
    Logic(String),

    // 存储相关错误
    #[error("Storage failure: {0}")]
    Storage(String),

    // 编译相关错误
    #[error("Regex compile failed: {0}")]
    RegexCompileError(#[from] RegexError),

    // 序列化/反序列化错误
    #[error("JSON error: {0}")]
    JsonError(#[from] SerdeJsonError),
    #[error("MessagePack error: {0}")]
    MsgPackError(String),

    // 基础错误
    #[error("IO error: {0}")]
    IoError(#[from] IoError),
    #[error("URL parse failed: {0}")]
    UrlError(#[from] UrlParseError),
}

impl TabGroupError {
    /// 是否为可重试的瞬时错误（宿主在标签拖拽等过渡期间短暂锁定）
    pub fn is_transient(&self) -> bool {
        matches!(self, TabGroupError::TransientExternal(_))
    }

    /// 目标标签/分组已消失（良性竞态）
    pub fn is_gone(&self) -> bool {
        matches!(self, TabGroupError::PermanentExternal(_))
    }

    /// 将宿主返回的原始错误文本归类为对应的错误类型
    ///
    /// - "cannot be edited right now" / "dragging" / "temporarily" => 瞬时错误
    /// - "No tab with id" / "No group with id" / "not found" => 永久错误
    /// - 其他 => 通用宿主错误
    pub fn from_host_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("cannot be edited right now")
            || lower.contains("dragging")
            || lower.contains("temporarily")
        {
            TabGroupError::TransientExternal(message)
        } else if lower.contains("no tab with id")
            || lower.contains("no group with id")
            || lower.contains("not found")
        {
            TabGroupError::PermanentExternal(message)
        } else {
            TabGroupError::Host(message)
        }
    }
}

// 全局Result类型
pub type TgResult<T> = Result<T, TabGroupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_host_messages() {
        let locked = TabGroupError::from_host_message(
            "Tabs cannot be edited right now (user may be dragging a tab).",
        );
        assert!(locked.is_transient());

        let gone = TabGroupError::from_host_message("No group with id: 42.");
        assert!(gone.is_gone());
        assert!(!gone.is_transient());

        let other = TabGroupError::from_host_message("Permission denied");
        assert!(matches!(other, TabGroupError::Host(_)));
    }
}
