//! URL 拆分工具
//! 将标签页 URL 解析为小写的 {domain, path}，并识别新标签页/浏览器内部页面

use url::Url;

/// 解析后的 URL 组成部分（均已转小写）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    pub domain: String,
    /// 以 `/` 开头，不含查询串与片段
    pub path: String,
}

impl UrlParts {
    /// 解析 URL，非法 URL 或无主机名时返回 None（匹配侧视为不匹配）
    pub fn parse(raw_url: &str) -> Option<Self> {
        let trimmed = raw_url.trim();
        if trimmed.is_empty() {
            return None;
        }

        let url = Url::parse(trimmed).ok()?;
        let host = url.host_str()?;
        let domain = host.trim_end_matches('.').to_lowercase();
        if domain.is_empty() {
            return None;
        }

        let path = url.path().to_lowercase();
        let path = if path.is_empty() { "/".to_string() } else { path };

        Some(Self { domain, path })
    }
}

/// 标签页 URL 类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabUrlKind {
    /// 空 URL 或新标签页
    NewTab,
    /// 浏览器内部页面（chrome://、about: 等）
    Internal,
    /// 普通网页
    Web,
}

const NEW_TAB_URLS: &[&str] = &[
    "about:blank",
    "about:newtab",
    "about:home",
    "chrome://newtab",
    "chrome://newtab/",
    "chrome-search://local-ntp/local-ntp.html",
    "edge://newtab",
    "edge://newtab/",
    "brave://newtab",
    "brave://newtab/",
];

const INTERNAL_SCHEMES: &[&str] = &[
    "about:",
    "chrome:",
    "chrome-extension:",
    "chrome-search:",
    "chrome-untrusted:",
    "devtools:",
    "edge:",
    "brave:",
    "opera:",
    "vivaldi:",
    "moz-extension:",
    "view-source:",
];

impl TabUrlKind {
    pub fn classify(raw_url: &str) -> Self {
        let url = raw_url.trim().to_lowercase();
        if url.is_empty() || NEW_TAB_URLS.contains(&url.as_str()) {
            return TabUrlKind::NewTab;
        }
        if INTERNAL_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
            return TabUrlKind::Internal;
        }
        TabUrlKind::Web
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lowercases_and_drops_query() {
        let parts = UrlParts::parse("https://Docs.GitHub.com/En/Actions?x=1#top").unwrap();
        assert_eq!(parts.domain, "docs.github.com");
        assert_eq!(parts.path, "/en/actions");
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(UrlParts::parse("").is_none());
        assert!(UrlParts::parse("not a url").is_none());
        assert!(UrlParts::parse("github.com").is_none());
        assert!(UrlParts::parse("about:blank").is_none());
    }

    #[test]
    fn test_classify_tab_urls() {
        assert_eq!(TabUrlKind::classify(""), TabUrlKind::NewTab);
        assert_eq!(TabUrlKind::classify("chrome://newtab/"), TabUrlKind::NewTab);
        assert_eq!(TabUrlKind::classify("chrome://settings"), TabUrlKind::Internal);
        assert_eq!(TabUrlKind::classify("https://github.com"), TabUrlKind::Web);
    }
}
