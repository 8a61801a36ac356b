//! 批量操作
//! 对当前全部标签页/分组快照逐项执行，单项失败不会中断整批，结果汇总为 BulkOutcome

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::color::ColorAssigner;
use super::reconciler::GroupReconciler;
use crate::error::TgResult;
use crate::host::{GroupId, GroupUpdate, TabId, WindowId};

/// 批量操作汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub processed: usize,
    pub changed: usize,
    pub failed: usize,
}

impl BulkOutcome {
    fn record(&mut self, item: &str, result: TgResult<bool>) {
        self.processed += 1;
        match result {
            Ok(true) => self.changed += 1,
            Ok(false) => {}
            Err(e) if e.is_gone() => debug!("{} vanished mid-batch: {}", item, e),
            Err(e) => {
                self.failed += 1;
                warn!("{} failed: {}", item, e);
            }
        }
    }
}

impl GroupReconciler {
    /// 对所有标签页强制执行分组
    pub async fn group_all_tabs(&self) -> TgResult<BulkOutcome> {
        let state = self.rehydrate().await;
        let mut outcome = BulkOutcome::default();

        for tab in self.host.query_tabs(None).await? {
            let result = self.reconcile_with(&state, tab.id, true).await;
            outcome.record(&format!("tab {}", tab.id), result);
        }
        info!("group_all_tabs: {:?}", outcome);
        Ok(outcome)
    }

    /// 解散所有分组
    pub async fn ungroup_all_tabs(&self) -> TgResult<BulkOutcome> {
        let mut by_group: BTreeMap<GroupId, Vec<TabId>> = BTreeMap::new();
        for tab in self.host.query_tabs(None).await? {
            if let Some(group_id) = tab.group_id {
                by_group.entry(group_id).or_default().push(tab.id);
            }
        }

        let mut outcome = BulkOutcome::default();
        for (group_id, tab_ids) in by_group {
            let result = self.host.ungroup_tabs(&tab_ids).await.map(|_| true);
            outcome.record(&format!("group {}", group_id), result);
        }
        info!("ungroup_all_tabs: {:?}", outcome);
        Ok(outcome)
    }

    /// 为每个分组换一个不同的随机颜色并持久化
    pub async fn generate_new_colors(&self) -> TgResult<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        let mut persisted = Vec::new();

        for group in self.host.query_groups(None).await? {
            let color = ColorAssigner::random_except(group.color);
            let result = self.update_group_retried(group.id, &GroupUpdate::color(color)).await;
            if result.is_ok() && !group.title.is_empty() {
                persisted.push((group.title.clone(), color));
            }
            outcome.record(&format!("group {}", group.id), result.map(|_| true));
        }

        self.persist_colors(persisted).await;
        info!("generate_new_colors: {:?}", outcome);
        Ok(outcome)
    }

    pub async fn collapse_all_groups(&self) -> TgResult<BulkOutcome> {
        self.set_all_collapsed(true).await
    }

    pub async fn expand_all_groups(&self) -> TgResult<BulkOutcome> {
        self.set_all_collapsed(false).await
    }

    async fn set_all_collapsed(&self, collapsed: bool) -> TgResult<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        for group in self.host.query_groups(None).await? {
            let result = if group.collapsed == collapsed {
                Ok(false)
            } else {
                self.update_group_retried(group.id, &GroupUpdate::collapsed(collapsed))
                    .await
                    .map(|_| true)
            };
            outcome.record(&format!("group {}", group.id), result);
        }
        Ok(outcome)
    }

    /// 所有窗口的分组阈值检查
    pub async fn check_all_groups_threshold(&self) -> TgResult<BulkOutcome> {
        self.check_window_threshold(None).await
    }

    pub async fn check_window_threshold(&self, window: Option<WindowId>) -> TgResult<BulkOutcome> {
        let state = self.rehydrate().await;
        let mut outcome = BulkOutcome::default();

        for group in self.host.query_groups(window).await? {
            let result = self.check_group_threshold(&state, group.id).await;
            outcome.record(&format!("group '{}'", group.title), result);
        }
        Ok(outcome)
    }

    /// 把分组颜色恢复为规则颜色或已持久化的颜色
    pub async fn restore_saved_colors(&self) -> TgResult<BulkOutcome> {
        let state = self.rehydrate().await;
        let mut outcome = BulkOutcome::default();

        for group in self.host.query_groups(None).await? {
            let saved = state
                .compiled
                .find_by_name(&group.title)
                .and_then(|rule| rule.color)
                .or_else(|| state.color_map.get(&group.title).copied());

            let result = match saved {
                Some(color) if color != group.color => self
                    .update_group_retried(group.id, &GroupUpdate::color(color))
                    .await
                    .map(|_| true),
                _ => Ok(false),
            };
            outcome.record(&format!("group '{}'", group.title), result);
        }
        info!("restore_saved_colors: {:?}", outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigManager, GroupingSettings};
    use crate::host::{HostOp, TabHost};
    use crate::reconciler::test_support::{setup, stored_colors};
    use crate::rule::{GroupColor, Rule};

    fn rules() -> Vec<Rule> {
        vec![
            Rule::new("gh", "GitHub", vec!["github.com".into()]),
            Rule::new("docs", "Docs", vec!["docs.rs".into()]).with_color(GroupColor::Green),
        ]
    }

    #[tokio::test]
    async fn test_group_all_respects_thresholds() {
        let settings = ConfigManager::custom().global_minimum_tabs(Some(2)).build();
        let (host, reconciler, _, _) = setup(settings, rules()).await;
        let a = host.open_tab(1, "https://github.com/a");
        let b = host.open_tab(1, "https://github.com/b");
        host.open_tab(1, "https://docs.rs/serde");
        host.open_pinned_tab(1, "https://github.com/pinned");

        let outcome = reconciler.group_all_tabs().await.unwrap();
        assert_eq!(outcome.processed, 4);
        assert_eq!(outcome.failed, 0);
        assert_eq!(host.groups().len(), 1);
        let group = host.group_by_title("GitHub").unwrap();
        assert_eq!(host.tabs_in_group(group.id), vec![a, b]);

        let outcome = reconciler.ungroup_all_tabs().await.unwrap();
        assert_eq!(outcome.changed, 1);
        assert!(host.groups().is_empty());
    }

    #[tokio::test]
    async fn test_group_all_is_forced_when_auto_grouping_is_off() {
        let settings = ConfigManager::custom().auto_group_enabled(false).build();
        let (host, reconciler, _, _) = setup(settings, rules()).await;
        host.open_tab(1, "https://github.com/a");
        let outcome = reconciler.group_all_tabs().await.unwrap();
        assert_eq!(outcome.changed, 1);
    }

    #[tokio::test]
    async fn test_collapse_and_expand_all() {
        let (host, reconciler, _, _) = setup(GroupingSettings::default(), rules()).await;
        host.open_tab(1, "https://github.com");
        host.open_tab(2, "https://docs.rs");
        reconciler.group_all_tabs().await.unwrap();

        let outcome = reconciler.collapse_all_groups().await.unwrap();
        assert_eq!(outcome, BulkOutcome { processed: 2, changed: 2, failed: 0 });
        assert!(host.groups().iter().all(|g| g.collapsed));

        let outcome = reconciler.collapse_all_groups().await.unwrap();
        assert_eq!(outcome.changed, 0);

        reconciler.expand_all_groups().await.unwrap();
        assert!(host.groups().iter().all(|g| !g.collapsed));
    }

    #[tokio::test]
    async fn test_generate_and_restore_colors() {
        let (host, reconciler, _, kv) = setup(GroupingSettings::default(), rules()).await;
        host.open_tab(1, "https://github.com");
        host.open_tab(1, "https://docs.rs");
        reconciler.group_all_tabs().await.unwrap();
        let before = host.group_by_title("GitHub").unwrap().color;

        let outcome = reconciler.generate_new_colors().await.unwrap();
        assert_eq!(outcome.changed, 2);
        let after = host.group_by_title("GitHub").unwrap().color;
        assert_ne!(before, after);
        assert_eq!(stored_colors(&kv).await.get("GitHub"), Some(&after));

        let github = host.group_by_title("GitHub").unwrap();
        host.update_group(github.id, &GroupUpdate::color(ColorAssigner::random_except(after)))
            .await
            .unwrap();
        let outcome = reconciler.restore_saved_colors().await.unwrap();
        assert_eq!(host.group_by_title("GitHub").unwrap().color, after);
        // 规则颜色优先于持久化颜色
        assert_eq!(host.group_by_title("Docs").unwrap().color, GroupColor::Green);
        assert_eq!(outcome.changed, 2);
    }

    #[tokio::test]
    async fn test_threshold_sweep_skips_unmanaged_groups() {
        let settings = ConfigManager::custom().global_minimum_tabs(Some(2)).build();
        let (host, reconciler, _, _) = setup(settings, rules()).await;
        let a = host.open_tab(1, "https://github.com/a");
        let b = host.open_tab(1, "https://github.com/b");
        reconciler.group_all_tabs().await.unwrap();

        let mine = host.open_tab(1, "https://example.org");
        let manual = host.group_tabs(&[mine], None).await.unwrap();
        host.update_group(manual, &GroupUpdate::title("Reading")).await.unwrap();

        host.close_tab(b);
        let outcome = reconciler.check_all_groups_threshold().await.unwrap();
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.changed, 1);
        assert_eq!(host.tab(a).unwrap().group_id, None);
        assert!(host.group_by_title("Reading").is_some());
    }

    #[tokio::test]
    async fn test_batch_continues_past_failures() {
        let (host, reconciler, _, _) = setup(GroupingSettings::default(), rules()).await;
        host.open_tab(1, "https://github.com");
        host.open_tab(1, "https://docs.rs");
        host.open_tab(1, "https://crates.io");
        reconciler.group_all_tabs().await.unwrap();
        assert_eq!(host.groups().len(), 3);

        host.fail_next(HostOp::UngroupTabs, 1, "Permission denied");
        host.fail_next(HostOp::UngroupTabs, 1, "No group with id: 1.");
        let outcome = reconciler.ungroup_all_tabs().await.unwrap();
        assert_eq!(outcome.processed, 3);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.changed, 1);
    }
}
