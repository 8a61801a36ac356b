//! 域名展示名提取
//! 无规则命中时，根据二级域名（含国家代码二级域 ccSLD 表）生成分组名称

use std::collections::HashSet;
use std::net::IpAddr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::url_parts::UrlParts;

/// 常见国家代码二级域（co.uk、com.au 等）
static CC_SLDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "co.uk", "org.uk", "me.uk", "ltd.uk", "plc.uk", "net.uk", "ac.uk", "gov.uk", "sch.uk",
        "com.au", "net.au", "org.au", "edu.au", "gov.au", "asn.au", "id.au",
        "co.nz", "net.nz", "org.nz", "ac.nz", "govt.nz",
        "co.jp", "ne.jp", "or.jp", "ac.jp", "go.jp",
        "co.kr", "or.kr", "ne.kr", "ac.kr", "go.kr",
        "com.cn", "net.cn", "org.cn", "gov.cn", "edu.cn",
        "com.tw", "org.tw", "net.tw", "idv.tw",
        "com.hk", "org.hk", "net.hk",
        "com.sg", "org.sg", "com.my",
        "co.in", "net.in", "org.in", "firm.in", "gen.in",
        "com.br", "net.br", "org.br", "gov.br",
        "com.mx", "com.ar", "com.co", "com.pe", "com.uy",
        "co.za", "org.za", "co.il", "org.il",
        "com.tr", "co.id", "or.id", "com.ph", "com.vn",
        "co.th", "in.th", "com.ua", "com.pl", "com.es", "co.at", "or.at",
    ]
    .into_iter()
    .collect()
});

/// 域名展示名模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainNameMode {
    /// 仅二级域名：docs.github.com => "Github"
    #[default]
    SecondLevel,
    /// 二级域名 + 子域名：docs.github.com => "Docs.github"
    WithSubdomain,
    /// 完整主机名（去掉 www.）：docs.github.com => "docs.github.com"
    FullHost,
}

/// 注册域拆分结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainSplit<'a> {
    pub subdomain: Option<&'a str>,
    pub second_level: &'a str,
    pub suffix: &'a str,
}

/// 域名展示名工具
pub struct DomainNamer;

impl DomainNamer {
    /// 是否为已知 ccSLD
    pub fn is_cc_sld(suffix: &str) -> bool {
        CC_SLDS.contains(suffix)
    }

    /// 剩余部分是否构成合法的顶级后缀：单个标签或已知 ccSLD
    pub fn is_public_suffix(rest: &str) -> bool {
        if rest.is_empty() {
            return false;
        }
        if !rest.contains('.') {
            return rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        }
        Self::is_cc_sld(rest)
    }

    /// 拆分域名为 子域名 / 二级域名 / 后缀
    pub fn split(domain: &str) -> DomainSplit<'_> {
        let labels: Vec<&str> = domain.split('.').collect();
        if labels.len() < 2 {
            return DomainSplit {
                subdomain: None,
                second_level: domain,
                suffix: "",
            };
        }

        let last_two = &domain[domain.len() - labels[labels.len() - 2].len() - labels[labels.len() - 1].len() - 1..];
        let suffix_labels = if labels.len() >= 3 && Self::is_cc_sld(last_two) { 2 } else { 1 };
        let sld_index = labels.len() - suffix_labels - 1;

        // 基于字节偏移切片，保持借用原始字符串
        let sld_start: usize = labels[..sld_index].iter().map(|l| l.len() + 1).sum();
        let second_level = labels[sld_index];
        let suffix = &domain[sld_start + second_level.len() + 1..];
        let subdomain = if sld_start > 0 {
            Some(&domain[..sld_start - 1])
        } else {
            None
        };

        DomainSplit {
            subdomain,
            second_level,
            suffix,
        }
    }

    /// 从 URL 生成分组展示名，无法解析主机名时返回 None
    pub fn display_name(url: &str, mode: DomainNameMode) -> Option<String> {
        let parts = UrlParts::parse(url)?;
        Self::display_name_for_domain(&parts.domain, mode)
    }

    pub fn display_name_for_domain(domain: &str, mode: DomainNameMode) -> Option<String> {
        let domain = domain.strip_prefix("www.").unwrap_or(domain);
        if domain.is_empty() {
            return None;
        }
        if domain.parse::<IpAddr>().is_ok() || domain.starts_with('[') {
            return Some(domain.to_string());
        }

        let split = Self::split(domain);
        let name = match mode {
            DomainNameMode::SecondLevel => capitalize(split.second_level),
            DomainNameMode::WithSubdomain => match split.subdomain {
                Some(sub) => capitalize(&format!("{}.{}", sub, split.second_level)),
                None => capitalize(split.second_level),
            },
            DomainNameMode::FullHost => domain.to_string(),
        };

        if name.is_empty() { None } else { Some(name) }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_handles_cc_sld() {
        let split = DomainNamer::split("news.bbc.co.uk");
        assert_eq!(split.subdomain, Some("news"));
        assert_eq!(split.second_level, "bbc");
        assert_eq!(split.suffix, "co.uk");

        let split = DomainNamer::split("a.b.example.com");
        assert_eq!(split.subdomain, Some("a.b"));
        assert_eq!(split.second_level, "example");
        assert_eq!(split.suffix, "com");

        // co.uk 本身只有两段时不按 ccSLD 处理
        let split = DomainNamer::split("co.uk");
        assert_eq!(split.second_level, "co");
        assert_eq!(split.suffix, "uk");
    }

    #[test]
    fn test_display_name_modes() {
        let url = "https://docs.github.com/en";
        assert_eq!(DomainNamer::display_name(url, DomainNameMode::SecondLevel).as_deref(), Some("Github"));
        assert_eq!(DomainNamer::display_name(url, DomainNameMode::WithSubdomain).as_deref(), Some("Docs.github"));
        assert_eq!(DomainNamer::display_name(url, DomainNameMode::FullHost).as_deref(), Some("docs.github.com"));
        assert_eq!(
            DomainNamer::display_name("https://www.amazon.com.au/", DomainNameMode::SecondLevel).as_deref(),
            Some("Amazon")
        );
        assert_eq!(
            DomainNamer::display_name("https://www.github.com/", DomainNameMode::WithSubdomain).as_deref(),
            Some("Github")
        );
    }

    #[test]
    fn test_display_name_ip_and_invalid() {
        assert_eq!(
            DomainNamer::display_name("http://192.168.1.10:8080/", DomainNameMode::SecondLevel).as_deref(),
            Some("192.168.1.10")
        );
        assert_eq!(DomainNamer::display_name("garbage", DomainNameMode::SecondLevel), None);
    }

    #[test]
    fn test_public_suffix() {
        assert!(DomainNamer::is_public_suffix("com"));
        assert!(DomainNamer::is_public_suffix("co.uk"));
        assert!(!DomainNamer::is_public_suffix("mail.com"));
        assert!(!DomainNamer::is_public_suffix(""));
    }
}
