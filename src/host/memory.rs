//! 内存宿主实现
//! 模拟外部宿主的全部约束（无空分组、隐式建组），并记录每次变更调用，可注入失败

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::trace;

use super::model::{Group, GroupId, GroupUpdate, Tab, TabId, WindowId};
use super::traits::TabHost;
use crate::error::{TabGroupError, TgResult};
use crate::rule::GroupColor;

/// 变更类操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOp {
    GroupTabs,
    UpdateGroup,
    UngroupTabs,
}

/// 变更调用记录（包含失败的尝试）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    GroupTabs {
        tab_ids: Vec<TabId>,
        group_id: Option<GroupId>,
    },
    UpdateGroup {
        group_id: GroupId,
        update: GroupUpdate,
    },
    UngroupTabs {
        tab_ids: Vec<TabId>,
    },
}

impl HostCall {
    pub fn op(&self) -> HostOp {
        match self {
            HostCall::GroupTabs { .. } => HostOp::GroupTabs,
            HostCall::UpdateGroup { .. } => HostOp::UpdateGroup,
            HostCall::UngroupTabs { .. } => HostOp::UngroupTabs,
        }
    }
}

#[derive(Debug)]
struct InjectedFailure {
    op: HostOp,
    remaining: u32,
    message: String,
}

#[derive(Debug, Default)]
struct HostState {
    tabs: BTreeMap<TabId, Tab>,
    groups: BTreeMap<GroupId, Group>,
    next_tab_id: TabId,
    next_group_id: GroupId,
    calls: Vec<HostCall>,
    failures: Vec<InjectedFailure>,
}

impl HostState {
    /// 删除没有任何标签页的分组
    fn prune_empty_groups(&mut self) {
        let tabs = &self.tabs;
        self.groups
            .retain(|id, _| tabs.values().any(|t| t.group_id == Some(*id)));
    }

    fn take_failure(&mut self, op: HostOp) -> Option<TabGroupError> {
        let failure = self.failures.iter_mut().find(|f| f.op == op && f.remaining > 0)?;
        failure.remaining -= 1;
        let message = failure.message.clone();
        self.failures.retain(|f| f.remaining > 0);
        Some(TabGroupError::from_host_message(message))
    }

    fn check_tabs(&self, tab_ids: &[TabId]) -> TgResult<()> {
        if tab_ids.is_empty() {
            return Err(TabGroupError::Host("at least one tab id is required".to_string()));
        }
        match tab_ids.iter().find(|id| !self.tabs.contains_key(id)) {
            Some(missing) => Err(TabGroupError::PermanentExternal(format!("No tab with id: {}", missing))),
            None => Ok(()),
        }
    }
}

/// 内存宿主
#[derive(Debug, Default)]
pub struct MemoryHost {
    state: Mutex<HostState>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState {
                next_tab_id: 1,
                next_group_id: 100,
                ..HostState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 新建未分组标签页
    pub fn open_tab(&self, window_id: WindowId, url: &str) -> TabId {
        self.insert_tab(window_id, url, false)
    }

    pub fn open_pinned_tab(&self, window_id: WindowId, url: &str) -> TabId {
        self.insert_tab(window_id, url, true)
    }

    fn insert_tab(&self, window_id: WindowId, url: &str, pinned: bool) -> TabId {
        let mut state = self.state();
        let id = state.next_tab_id;
        state.next_tab_id += 1;
        state.tabs.insert(
            id,
            Tab {
                id,
                url: url.to_string(),
                pinned,
                active: false,
                window_id,
                group_id: None,
            },
        );
        id
    }

    /// 导航：修改标签页 URL
    pub fn navigate(&self, tab_id: TabId, url: &str) {
        if let Some(tab) = self.state().tabs.get_mut(&tab_id) {
            tab.url = url.to_string();
        }
    }

    pub fn set_pinned(&self, tab_id: TabId, pinned: bool) {
        if let Some(tab) = self.state().tabs.get_mut(&tab_id) {
            tab.pinned = pinned;
        }
    }

    /// 激活标签页（同窗口其他标签页失去激活状态）
    pub fn activate(&self, tab_id: TabId) {
        let mut state = self.state();
        let Some(window_id) = state.tabs.get(&tab_id).map(|t| t.window_id) else {
            return;
        };
        for tab in state.tabs.values_mut().filter(|t| t.window_id == window_id) {
            tab.active = tab.id == tab_id;
        }
    }

    pub fn close_tab(&self, tab_id: TabId) {
        let mut state = self.state();
        state.tabs.remove(&tab_id);
        state.prune_empty_groups();
    }

    /// 令接下来 `times` 次 `op` 调用以 `message` 失败
    pub fn fail_next(&self, op: HostOp, times: u32, message: impl Into<String>) {
        if times == 0 {
            return;
        }
        self.state().failures.push(InjectedFailure {
            op,
            remaining: times,
            message: message.into(),
        });
    }

    pub fn tab(&self, tab_id: TabId) -> Option<Tab> {
        self.state().tabs.get(&tab_id).cloned()
    }

    pub fn tabs(&self) -> Vec<Tab> {
        self.state().tabs.values().cloned().collect()
    }

    pub fn groups(&self) -> Vec<Group> {
        self.state().groups.values().cloned().collect()
    }

    pub fn group_by_title(&self, title: &str) -> Option<Group> {
        self.state().groups.values().find(|g| g.title == title).cloned()
    }

    pub fn tabs_in_group(&self, group_id: GroupId) -> Vec<TabId> {
        self.state()
            .tabs
            .values()
            .filter(|t| t.group_id == Some(group_id))
            .map(|t| t.id)
            .collect()
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

#[async_trait]
impl TabHost for MemoryHost {
    async fn get_tab(&self, tab_id: TabId) -> TgResult<Option<Tab>> {
        Ok(self.tab(tab_id))
    }

    async fn query_tabs(&self, window: Option<WindowId>) -> TgResult<Vec<Tab>> {
        Ok(self
            .state()
            .tabs
            .values()
            .filter(|t| window.is_none_or(|w| t.window_id == w))
            .cloned()
            .collect())
    }

    async fn active_tab(&self, window: Option<WindowId>) -> TgResult<Option<Tab>> {
        Ok(self
            .state()
            .tabs
            .values()
            .find(|t| t.active && window.is_none_or(|w| t.window_id == w))
            .cloned())
    }

    async fn query_groups(&self, window: Option<WindowId>) -> TgResult<Vec<Group>> {
        Ok(self
            .state()
            .groups
            .values()
            .filter(|g| window.is_none_or(|w| g.window_id == w))
            .cloned()
            .collect())
    }

    async fn get_group(&self, group_id: GroupId) -> TgResult<Option<Group>> {
        Ok(self.state().groups.get(&group_id).cloned())
    }

    async fn group_tabs(&self, tab_ids: &[TabId], group_id: Option<GroupId>) -> TgResult<GroupId> {
        let mut state = self.state();
        state.calls.push(HostCall::GroupTabs {
            tab_ids: tab_ids.to_vec(),
            group_id,
        });
        if let Some(err) = state.take_failure(HostOp::GroupTabs) {
            return Err(err);
        }
        state.check_tabs(tab_ids)?;
        if tab_ids.iter().any(|id| state.tabs.get(id).is_some_and(|t| t.pinned)) {
            return Err(TabGroupError::Host("Cannot group pinned tabs".to_string()));
        }

        let (target, window_id) = match group_id {
            Some(id) => {
                let group = state
                    .groups
                    .get(&id)
                    .ok_or_else(|| TabGroupError::PermanentExternal(format!("No group with id: {}", id)))?;
                (id, group.window_id)
            }
            None => {
                let window_id = state.tabs.get(&tab_ids[0]).map(|t| t.window_id).unwrap_or_default();
                let id = state.next_group_id;
                state.next_group_id += 1;
                state.groups.insert(
                    id,
                    Group {
                        id,
                        title: String::new(),
                        color: GroupColor::Grey,
                        collapsed: false,
                        window_id,
                    },
                );
                (id, window_id)
            }
        };

        for id in tab_ids {
            if let Some(tab) = state.tabs.get_mut(id) {
                tab.group_id = Some(target);
                tab.window_id = window_id;
            }
        }
        state.prune_empty_groups();
        trace!("MemoryHost grouped {:?} into {}", tab_ids, target);
        Ok(target)
    }

    async fn update_group(&self, group_id: GroupId, update: &GroupUpdate) -> TgResult<Group> {
        let mut state = self.state();
        state.calls.push(HostCall::UpdateGroup {
            group_id,
            update: update.clone(),
        });
        if let Some(err) = state.take_failure(HostOp::UpdateGroup) {
            return Err(err);
        }

        let group = state
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| TabGroupError::PermanentExternal(format!("No group with id: {}", group_id)))?;
        if let Some(title) = &update.title {
            group.title = title.clone();
        }
        if let Some(color) = update.color {
            group.color = color;
        }
        if let Some(collapsed) = update.collapsed {
            group.collapsed = collapsed;
        }
        Ok(group.clone())
    }

    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> TgResult<()> {
        let mut state = self.state();
        state.calls.push(HostCall::UngroupTabs {
            tab_ids: tab_ids.to_vec(),
        });
        if let Some(err) = state.take_failure(HostOp::UngroupTabs) {
            return Err(err);
        }
        state.check_tabs(tab_ids)?;

        for id in tab_ids {
            if let Some(tab) = state.tabs.get_mut(id) {
                tab.group_id = None;
            }
        }
        state.prune_empty_groups();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_implicit_group_creation_and_auto_delete() {
        let host = MemoryHost::new();
        let a = host.open_tab(1, "https://a.com");
        let b = host.open_tab(1, "https://b.com");

        let group = host.group_tabs(&[a, b], None).await.unwrap();
        assert_eq!(host.tabs_in_group(group), vec![a, b]);

        host.ungroup_tabs(&[a]).await.unwrap();
        assert_eq!(host.groups().len(), 1);
        host.close_tab(b);
        assert!(host.groups().is_empty());
    }

    #[tokio::test]
    async fn test_errors_for_missing_and_pinned() {
        let host = MemoryHost::new();
        let pinned = host.open_pinned_tab(1, "https://a.com");

        let err = host.group_tabs(&[pinned], None).await.unwrap_err();
        assert!(matches!(err, TabGroupError::Host(_)));
        let err = host.group_tabs(&[999], None).await.unwrap_err();
        assert!(err.is_gone());
        let err = host.update_group(42, &GroupUpdate::title("x")).await.unwrap_err();
        assert!(err.is_gone());
        assert!(host.groups().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let host = MemoryHost::new();
        let a = host.open_tab(1, "https://a.com");
        let group = host.group_tabs(&[a], None).await.unwrap();

        host.fail_next(HostOp::UpdateGroup, 2, "Tabs cannot be edited right now (user may be dragging a tab).");
        assert!(host.update_group(group, &GroupUpdate::title("A")).await.unwrap_err().is_transient());
        assert!(host.update_group(group, &GroupUpdate::title("A")).await.unwrap_err().is_transient());
        assert_eq!(host.update_group(group, &GroupUpdate::title("A")).await.unwrap().title, "A");
        assert_eq!(host.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_activate_and_query() {
        let host = MemoryHost::new();
        let a = host.open_tab(1, "https://a.com");
        let b = host.open_tab(1, "https://b.com");
        let c = host.open_tab(2, "https://c.com");
        host.activate(a);
        host.activate(b);
        host.activate(c);

        assert_eq!(host.active_tab(Some(1)).await.unwrap().map(|t| t.id), Some(b));
        assert_eq!(host.query_tabs(Some(2)).await.unwrap().len(), 1);
        assert_eq!(host.query_tabs(None).await.unwrap().len(), 3);
    }
}
