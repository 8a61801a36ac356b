//! rstabgroup CLI - 模式校验、匹配、规则解析与分组模拟

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rstabgroup::{
    ConfigManager, DomainNameMode, DomainNamer, FileKvStore, GroupReconciler, KvStore, MatchOptions,
    MemoryHost, MemoryKvStore, PatternMatcher, ReconcilerOptions, Rule, SettingsStore, detect_conflicts,
    match_pattern, parse_rules_json, resolve_rule, validate_pattern,
};

#[derive(Parser, Debug)]
#[command(name = "rstabgroup")]
#[command(about = "Rule-driven browser tab grouping engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate one or more patterns
    Validate {
        #[arg(required = true)]
        patterns: Vec<String>,
    },
    /// Match a URL against a single pattern
    Match {
        url: String,
        pattern: String,
        /// Group name template, e.g. "{team}-{env}"
        #[arg(long)]
        template: Option<String>,
        /// Rule name used as fallback group name
        #[arg(long)]
        rule_name: Option<String>,
        /// Group `a.b.example.com` under `*.example.com` rules
        #[arg(long)]
        auto_subdomain: bool,
    },
    /// Resolve the first matching rule for a URL
    Resolve {
        url: String,
        /// Rules JSON file (array or {"rules": [...]})
        #[arg(long)]
        rules: PathBuf,
    },
    /// Detect conflicts between new patterns and an existing rule set
    Conflicts {
        #[arg(long)]
        rules: PathBuf,
        /// Rule id excluded from the comparison (the rule being edited)
        #[arg(long)]
        exclude: Option<String>,
        #[arg(required = true)]
        patterns: Vec<String>,
    },
    /// Derive the fallback group name for a URL
    DisplayName {
        url: String,
        #[arg(long, value_enum, default_value = "second-level")]
        mode: NameMode,
    },
    /// Open URLs in an in-memory browser and print the resulting groups
    Simulate {
        #[arg(long)]
        rules: PathBuf,
        /// Persist settings, rules and colors to a MessagePack store
        #[arg(long)]
        store: Option<PathBuf>,
        /// Global minimum tabs per group
        #[arg(long)]
        minimum_tabs: Option<u32>,
        /// Disable domain-name fallback grouping
        #[arg(long)]
        no_fallback: bool,
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum NameMode {
    SecondLevel,
    WithSubdomain,
    FullHost,
}

impl From<NameMode> for DomainNameMode {
    fn from(mode: NameMode) -> Self {
        match mode {
            NameMode::SecondLevel => DomainNameMode::SecondLevel,
            NameMode::WithSubdomain => DomainNameMode::WithSubdomain,
            NameMode::FullHost => DomainNameMode::FullHost,
        }
    }
}

#[derive(Serialize)]
struct PatternReport<'a> {
    pattern: &'a str,
    kind: &'static str,
    #[serde(flatten)]
    validation: rstabgroup::ValidationResult,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_rules(path: &Path) -> Result<Vec<Rule>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let rules = parse_rules_json(&raw).with_context(|| format!("invalid rules file {}", path.display()))?;
    info!("Loaded {} rules from {}", rules.len(), path.display());
    Ok(rules)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}

async fn simulate(
    rules: Vec<Rule>,
    store: Option<PathBuf>,
    minimum_tabs: Option<u32>,
    no_fallback: bool,
    urls: &[String],
) -> Result<serde_json::Value> {
    let kv: Arc<dyn KvStore> = match store {
        Some(path) => Arc::new(FileKvStore::new(path)),
        None => Arc::new(MemoryKvStore::new()),
    };
    let settings = ConfigManager::custom()
        .global_minimum_tabs(minimum_tabs)
        .fallback_to_domain(!no_fallback)
        .build();
    let settings_store = SettingsStore::new(Arc::clone(&kv));
    settings_store.save_settings(&settings).await?;
    settings_store.save_rules(&rules).await?;

    let host = Arc::new(MemoryHost::new());
    let reconciler = GroupReconciler::new(host.clone(), kv, ReconcilerOptions::default()).await?;
    for url in urls {
        host.open_tab(1, url);
    }
    let outcome = reconciler.group_all_tabs().await?;

    let groups: Vec<serde_json::Value> = host
        .groups()
        .into_iter()
        .map(|group| {
            let members: Vec<String> = host
                .tabs_in_group(group.id)
                .into_iter()
                .filter_map(|id| host.tab(id).map(|t| t.url))
                .collect();
            serde_json::json!({ "group": group, "urls": members })
        })
        .collect();
    let ungrouped: Vec<String> = host
        .tabs()
        .into_iter()
        .filter(|t| t.group_id.is_none())
        .map(|t| t.url)
        .collect();

    Ok(serde_json::json!({ "outcome": outcome, "groups": groups, "ungrouped": ungrouped }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Validate { patterns } => {
            let reports: Vec<PatternReport> = patterns
                .iter()
                .map(|p| PatternReport {
                    pattern: p,
                    kind: PatternMatcher::classify(p).as_str(),
                    validation: validate_pattern(p),
                })
                .collect();
            print_json(&reports, cli.pretty)?;
        }
        Command::Match { url, pattern, template, rule_name, auto_subdomain } => {
            let mut options = MatchOptions::new().allow_auto_subdomain(auto_subdomain);
            if let Some(template) = template {
                options = options.group_name_template(template);
            }
            if let Some(name) = rule_name {
                options = options.rule_name(name);
            }
            print_json(&match_pattern(&url, &pattern, &options), cli.pretty)?;
        }
        Command::Resolve { url, rules } => {
            let rules = load_rules(&rules)?;
            print_json(&resolve_rule(&url, &rules), cli.pretty)?;
        }
        Command::Conflicts { rules, exclude, patterns } => {
            let rules = load_rules(&rules)?;
            print_json(&detect_conflicts(&patterns, &rules, exclude.as_deref()), cli.pretty)?;
        }
        Command::DisplayName { url, mode } => {
            print_json(&DomainNamer::display_name(&url, mode.into()), cli.pretty)?;
        }
        Command::Simulate { rules, store, minimum_tabs, no_fallback, urls } => {
            let rules = load_rules(&rules)?;
            let report = simulate(rules, store, minimum_tabs, no_fallback, &urls).await?;
            print_json(&report, cli.pretty)?;
        }
    }
    Ok(())
}
