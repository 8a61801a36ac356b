//! 专注模式：激活标签页时折叠其他分组、展开当前分组
//! 折叠带防抖，延迟内的新激活会取消尚未执行的折叠

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::reconciler::GroupReconciler;
use crate::error::TgResult;
use crate::host::{GroupUpdate, WindowId};

/// 待执行的折叠任务
#[derive(Debug, Default)]
pub struct FocusDebouncer {
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl FocusDebouncer {
    /// 登记新任务并取消旧任务
    fn replace(&self, handle: JoinHandle<()>) {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = pending.replace(handle) {
            previous.abort();
        }
    }

    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = pending.take() {
            previous.abort();
        }
    }
}

impl GroupReconciler {
    /// 标签页激活：按设置立即或延迟执行专注模式
    pub async fn on_tab_activated(self: &Arc<Self>, window_id: WindowId) -> TgResult<()> {
        let state = self.rehydrate().await;
        if !state.settings.focus_mode {
            return Ok(());
        }

        let delay = state.settings.focus_delay();
        if delay.is_zero() {
            self.focus.cancel();
            self.apply_focus(Some(window_id)).await?;
            return Ok(());
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = this.apply_focus(Some(window_id)).await {
                warn!("Focus mode failed for window {}: {}", window_id, e);
            }
        });
        self.focus.replace(handle);
        debug!("Focus mode scheduled in {:?} for window {}", delay, window_id);
        Ok(())
    }

    /// 重新查询活动标签页后折叠/展开分组，返回是否有变更
    pub async fn apply_focus(&self, window: Option<WindowId>) -> TgResult<bool> {
        let Some(active) = self.host.active_tab(window).await? else {
            return Ok(false);
        };

        let mut changed = false;
        for group in self.host.query_groups(Some(active.window_id)).await? {
            let collapse = active.group_id != Some(group.id);
            if group.collapsed == collapse {
                continue;
            }
            match self.update_group_retried(group.id, &GroupUpdate::collapsed(collapse)).await {
                Ok(_) => changed = true,
                Err(e) if e.is_gone() => debug!("Group {} vanished during focus: {}", group.id, e),
                Err(e) => warn!("Failed to {} group {}: {}", if collapse { "collapse" } else { "expand" }, group.id, e),
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::ConfigManager;
    use crate::host::{GroupUpdate, HostCall, TabHost};
    use crate::reconciler::test_support::setup;
    use crate::rule::Rule;

    fn rules() -> Vec<Rule> {
        vec![
            Rule::new("gh", "GitHub", vec!["github.com".into()]),
            Rule::new("docs", "Docs", vec!["docs.rs".into()]),
        ]
    }

    #[tokio::test]
    async fn test_immediate_focus_collapses_others() {
        let settings = ConfigManager::custom().focus_mode(true).build();
        let (host, reconciler, _, _) = setup(settings, rules()).await;
        let gh = host.open_tab(1, "https://github.com");
        let docs = host.open_tab(1, "https://docs.rs");
        let loose = host.open_tab(1, "about:blank");
        reconciler.reconcile_tab(gh, false).await.unwrap();
        reconciler.reconcile_tab(docs, false).await.unwrap();
        let docs_group = host.group_by_title("Docs").unwrap().id;
        host.update_group(docs_group, &GroupUpdate::collapsed(true)).await.unwrap();

        host.activate(docs);
        reconciler.on_tab_activated(1).await.unwrap();
        assert!(host.group_by_title("GitHub").unwrap().collapsed);
        assert!(!host.group_by_title("Docs").unwrap().collapsed);

        // 未分组的活动标签页：全部折叠
        host.activate(loose);
        reconciler.on_tab_activated(1).await.unwrap();
        assert!(host.groups().iter().all(|g| g.collapsed));

        host.clear_calls();
        assert!(!reconciler.apply_focus(Some(1)).await.unwrap());
        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn test_focus_mode_off_does_nothing() {
        let (host, reconciler, _, _) = setup(Default::default(), rules()).await;
        let gh = host.open_tab(1, "https://github.com");
        let docs = host.open_tab(1, "https://docs.rs");
        reconciler.reconcile_tab(gh, false).await.unwrap();
        reconciler.reconcile_tab(docs, false).await.unwrap();

        host.clear_calls();
        host.activate(docs);
        reconciler.on_tab_activated(1).await.unwrap();
        assert!(host.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_activation_cancels_pending_collapse() {
        let settings = ConfigManager::custom().focus_mode(true).focus_delay_ms(200).build();
        let (host, reconciler, _, _) = setup(settings, rules()).await;
        let gh = host.open_tab(1, "https://github.com");
        let docs = host.open_tab(1, "https://docs.rs");
        reconciler.reconcile_tab(gh, false).await.unwrap();
        reconciler.reconcile_tab(docs, false).await.unwrap();
        let gh_group = host.group_by_title("GitHub").unwrap().id;
        host.clear_calls();

        host.activate(gh);
        reconciler.on_tab_activated(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(host.calls().is_empty());

        host.activate(docs);
        reconciler.on_tab_activated(1).await.unwrap();
        // 第一次激活的截止时间已过，但任务已被取消
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(host.calls().is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            host.calls(),
            vec![HostCall::UpdateGroup {
                group_id: gh_group,
                update: GroupUpdate::collapsed(true)
            }]
        );
    }
}
