//! 分组调和器
//! 每次触发都从宿主重新读取标签页/分组状态，推导目标分组并只发出收敛所需的最少操作

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, trace, warn};

use super::color::ColorAssigner;
use super::focus::FocusDebouncer;
use super::retry::{Sleeper, TokioSleeper, retry_with_backoff};
use crate::config::{GroupingSettings, MAX_FOCUS_DELAY_MS, ReconcilerOptions};
use crate::error::{TabGroupError, TgResult};
use crate::host::{Group, GroupId, GroupUpdate, KvStore, Tab, TabHost, TabId, WindowId};
use crate::rule::{CompiledRuleSet, GroupColor, Rule, RuleCompiler, RuleResolver};
use crate::storage::{ColorMapping, SettingsStore};
use crate::utils::{DomainNamer, TabUrlKind};

/// 新标签页/内部页面使用的保留分组名
pub const SYSTEM_GROUP_NAME: &str = "System";

/// 标签页的目标分组
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredGroup {
    pub name: String,
    /// 规则显式指定的颜色
    pub color: Option<GroupColor>,
    pub minimum: u32,
    pub rule_id: Option<String>,
}

/// 调和器状态（从持久化存储重建，不假设跨进程存活）
#[derive(Debug, Clone, Default)]
pub struct ReconcilerState {
    pub settings: GroupingSettings,
    pub rules: Vec<Rule>,
    pub compiled: CompiledRuleSet,
    pub color_map: ColorMapping,
}

impl ReconcilerState {
    pub fn new(settings: GroupingSettings, rules: Vec<Rule>, color_map: ColorMapping) -> Self {
        let compiled = RuleCompiler::compile(&rules);
        Self {
            settings,
            rules,
            compiled,
            color_map,
        }
    }

    /// 计算标签页应归属的分组；None 表示不做任何处理
    pub fn desired_for(&self, tab: &Tab) -> Option<DesiredGroup> {
        let settings = &self.settings;

        match TabUrlKind::classify(&tab.url) {
            TabUrlKind::NewTab | TabUrlKind::Internal => {
                return settings.group_new_tabs.then(|| DesiredGroup {
                    name: SYSTEM_GROUP_NAME.to_string(),
                    color: None,
                    minimum: settings.effective_minimum(None),
                    rule_id: None,
                });
            }
            TabUrlKind::Web => {}
        }

        if let Some(resolved) = RuleResolver::resolve(&tab.url, &self.compiled, settings.allow_auto_subdomain) {
            return Some(DesiredGroup {
                name: resolved.effective_group_name,
                color: resolved.rule.color,
                minimum: settings.effective_minimum(resolved.rule.minimum_tabs),
                rule_id: Some(resolved.rule.id),
            });
        }

        if !settings.fallback_to_domain {
            return None;
        }
        DomainNamer::display_name(&tab.url, settings.domain_name_mode).map(|name| DesiredGroup {
            name,
            color: None,
            minimum: settings.effective_minimum(None),
            rule_id: None,
        })
    }

    /// 已有分组的最小标签数；None 表示该分组不受本引擎管理（例如用户手动建立的分组）
    pub fn minimum_for_group(&self, title: &str, members: &[Tab]) -> Option<u32> {
        members
            .iter()
            .filter(|t| !t.pinned)
            .find_map(|t| self.desired_for(t).filter(|d| d.name == title))
            .map(|d| d.minimum)
            .or_else(|| {
                self.compiled
                    .find_by_name(title)
                    .map(|rule| self.settings.effective_minimum(rule.minimum_tabs))
            })
            .or_else(|| (title == SYSTEM_GROUP_NAME).then(|| self.settings.effective_minimum(None)))
    }
}

/// 宿主事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabEvent {
    Created { tab_id: TabId },
    Updated { tab_id: TabId },
    Activated { tab_id: TabId, window_id: WindowId },
    Removed { tab_id: TabId, window_id: WindowId },
}

/// 分组调和器
pub struct GroupReconciler {
    pub(crate) host: Arc<dyn TabHost>,
    pub(crate) store: SettingsStore,
    pub(crate) options: ReconcilerOptions,
    pub(crate) sleeper: Arc<dyn Sleeper>,
    pub(crate) focus: FocusDebouncer,
    state: RwLock<Arc<ReconcilerState>>,
}

impl GroupReconciler {
    /// 创建调和器并从存储重建状态
    pub async fn new(host: Arc<dyn TabHost>, kv: Arc<dyn KvStore>, options: ReconcilerOptions) -> TgResult<Self> {
        let store = SettingsStore::new(kv);
        let state = Self::load_state(&store).await?;
        debug!(
            "Reconciler initialized with {} rules, {} stored colors",
            state.rules.len(),
            state.color_map.len()
        );

        Ok(Self {
            host,
            store,
            options,
            sleeper: Arc::new(TokioSleeper),
            focus: FocusDebouncer::default(),
            state: RwLock::new(Arc::new(state)),
        })
    }

    /// 替换等待实现（测试中用于观察退避时长）
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    async fn load_state(store: &SettingsStore) -> TgResult<ReconcilerState> {
        let settings = store.load_settings().await?;
        let rules = store.load_rules().await?;
        let color_map = store.load_color_mapping().await?;
        Ok(ReconcilerState::new(settings, rules, color_map))
    }

    /// 当前状态快照
    pub fn snapshot(&self) -> Arc<ReconcilerState> {
        self.state.read().map(|s| Arc::clone(&s)).unwrap_or_else(|p| Arc::clone(&p.into_inner()))
    }

    fn replace_state(&self, state: Arc<ReconcilerState>) {
        match self.state.write() {
            Ok(mut guard) => *guard = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    /// 从存储重建状态；读取失败时保留上一次的状态
    pub async fn rehydrate(&self) -> Arc<ReconcilerState> {
        match Self::load_state(&self.store).await {
            Ok(state) => {
                let state = Arc::new(state);
                self.replace_state(Arc::clone(&state));
                state
            }
            Err(e) => {
                warn!("Failed to rehydrate state, keeping previous snapshot: {}", e);
                self.snapshot()
            }
        }
    }

    /// 调和单个标签页，返回是否向宿主发出了变更
    pub async fn reconcile_tab(&self, tab_id: TabId, force_grouping: bool) -> TgResult<bool> {
        let state = self.rehydrate().await;
        self.reconcile_with(&state, tab_id, force_grouping).await
    }

    pub(crate) async fn reconcile_with(&self, state: &ReconcilerState, tab_id: TabId, force_grouping: bool) -> TgResult<bool> {
        match self.try_reconcile(state, tab_id, force_grouping).await {
            Err(e) if e.is_gone() => {
                debug!("Tab {} changed underneath reconcile, skipping: {}", tab_id, e);
                Ok(false)
            }
            other => other,
        }
    }

    async fn try_reconcile(&self, state: &ReconcilerState, tab_id: TabId, force_grouping: bool) -> TgResult<bool> {
        let Some(tab) = self.host.get_tab(tab_id).await? else {
            debug!("Tab {} no longer exists, skipping", tab_id);
            return Ok(false);
        };

        if tab.pinned {
            return self.release_pinned(state, &tab).await;
        }
        if !state.settings.auto_group_enabled && !force_grouping {
            return Ok(false);
        }

        let Some(desired) = state.desired_for(&tab) else {
            trace!("Tab {} ({}) has no target group", tab.id, tab.url);
            return Ok(false);
        };

        let groups = self.host.query_groups(Some(tab.window_id)).await?;
        match groups.iter().find(|g| g.title == desired.name) {
            Some(group) if tab.group_id == Some(group.id) => {
                let recolored = self.enforce_rule_color(group, &desired).await;
                Ok(self.enforce_threshold(group.id, desired.minimum).await? || recolored)
            }
            Some(group) => {
                self.host.group_tabs(&[tab.id], Some(group.id)).await?;
                info!("Moved tab {} into group '{}'", tab.id, desired.name);
                self.enforce_rule_color(group, &desired).await;
                self.enforce_threshold(group.id, desired.minimum).await?;
                if let Some(previous) = tab.group_id {
                    self.check_group_threshold(state, previous).await?;
                }
                Ok(true)
            }
            None => self.create_group(state, &tab, &desired).await,
        }
    }

    /// 规则显式颜色与现有分组不一致时改色
    async fn enforce_rule_color(&self, group: &Group, desired: &DesiredGroup) -> bool {
        match desired.color {
            Some(color) if color != group.color => {
                debug!("Recoloring group '{}' from {} to {}", group.title, group.color, color);
                self.update_group_logged(group.id, GroupUpdate::color(color)).await
            }
            _ => false,
        }
    }

    /// 固定标签页永不分组
    async fn release_pinned(&self, state: &ReconcilerState, tab: &Tab) -> TgResult<bool> {
        let Some(group_id) = tab.group_id else {
            return Ok(false);
        };
        self.host.ungroup_tabs(&[tab.id]).await?;
        debug!("Ungrouped pinned tab {}", tab.id);
        self.check_group_threshold(state, group_id).await?;
        Ok(true)
    }

    /// 目标分组不存在：凑齐同名标签页后由宿主隐式建组，再设置标题与颜色
    async fn create_group(&self, state: &ReconcilerState, tab: &Tab, desired: &DesiredGroup) -> TgResult<bool> {
        let window_tabs = self.host.query_tabs(Some(tab.window_id)).await?;
        // 同名兄弟标签页只从未分组状态或本引擎管理的分组中收拢，用户手动建立的分组保持不动
        let movable: BTreeSet<GroupId> = self
            .host
            .query_groups(Some(tab.window_id))
            .await?
            .into_iter()
            .filter(|group| {
                let members: Vec<Tab> = window_tabs
                    .iter()
                    .filter(|t| t.group_id == Some(group.id))
                    .cloned()
                    .collect();
                state.minimum_for_group(&group.title, &members).is_some()
            })
            .map(|group| group.id)
            .collect();
        let mut members: Vec<TabId> = window_tabs
            .iter()
            .filter(|t| !t.pinned)
            .filter(|t| {
                t.id == tab.id
                    || (t.group_id.is_none_or(|g| movable.contains(&g))
                        && state.desired_for(t).is_some_and(|d| d.name == desired.name))
            })
            .map(|t| t.id)
            .collect();
        if !members.contains(&tab.id) {
            members.push(tab.id);
        }

        if (members.len() as u32) < desired.minimum {
            debug!(
                "Group '{}' would hold {} of {} required tabs, not creating",
                desired.name,
                members.len(),
                desired.minimum
            );
            if let Some(stale) = tab.group_id {
                self.host.ungroup_tabs(&[tab.id]).await?;
                self.check_group_threshold(state, stale).await?;
                return Ok(true);
            }
            return Ok(false);
        }

        let previous: BTreeSet<GroupId> = window_tabs
            .iter()
            .filter(|t| members.contains(&t.id))
            .filter_map(|t| t.group_id)
            .chain(tab.group_id)
            .collect();

        let group_id = self.host.group_tabs(&members, None).await?;
        let color = self.assign_color(state, desired).await;
        self.update_group_logged(group_id, GroupUpdate::title(desired.name.as_str()).with_color(color))
            .await;
        info!(
            "Created group '{}' ({}) with {} tabs",
            desired.name,
            color,
            members.len()
        );

        for stale in previous {
            self.check_group_threshold(state, stale).await?;
        }
        Ok(true)
    }

    async fn assign_color(&self, state: &ReconcilerState, desired: &DesiredGroup) -> GroupColor {
        let choice = ColorAssigner::choose(desired.color, &desired.name, &state.color_map);
        if choice.needs_persist() {
            self.persist_colors(vec![(desired.name.clone(), choice.color())]).await;
        }
        choice.color()
    }

    /// 写回颜色映射（先重新读取存储，避免覆盖其他写入）
    pub(crate) async fn persist_colors(&self, entries: Vec<(String, GroupColor)>) {
        if entries.is_empty() {
            return;
        }
        let mut mapping = match self.store.load_color_mapping().await {
            Ok(mapping) => mapping,
            Err(e) => {
                warn!("Failed to load color mapping, colors not persisted: {}", e);
                return;
            }
        };
        mapping.extend(entries);
        if let Err(e) = self.store.save_color_mapping(&mapping).await {
            warn!("Failed to persist color mapping: {}", e);
            return;
        }

        let mut next = (*self.snapshot()).clone();
        next.color_map = mapping;
        self.replace_state(Arc::new(next));
    }

    /// 更新分组属性（瞬时错误按策略重试）
    pub(crate) async fn update_group_retried(&self, group_id: GroupId, update: &GroupUpdate) -> TgResult<Group> {
        retry_with_backoff(
            || self.host.update_group(group_id, update),
            &self.options.retry,
            TabGroupError::is_transient,
            self.sleeper.as_ref(),
        )
        .await
    }

    /// 更新失败只记录日志，等待下一次自然触发重新收敛
    async fn update_group_logged(&self, group_id: GroupId, update: GroupUpdate) -> bool {
        match self.update_group_retried(group_id, &update).await {
            Ok(_) => true,
            Err(e) if e.is_gone() => {
                debug!("Group {} vanished before update: {}", group_id, e);
                false
            }
            Err(e) => {
                warn!("Failed to update group {}: {}", group_id, e);
                false
            }
        }
    }

    /// 目的分组阈值检查：未固定标签数低于最小值时解散
    async fn enforce_threshold(&self, group_id: GroupId, minimum: u32) -> TgResult<bool> {
        if minimum <= 1 {
            return Ok(false);
        }
        let Some(group) = self.host.get_group(group_id).await? else {
            return Ok(false);
        };
        let members = self.group_members(&group).await?;
        self.disband_if_below(&group, &members, minimum).await
    }

    /// 按分组标题反查最小值后做阈值检查；不受管理的分组跳过
    pub(crate) async fn check_group_threshold(&self, state: &ReconcilerState, group_id: GroupId) -> TgResult<bool> {
        let Some(group) = self.host.get_group(group_id).await? else {
            return Ok(false);
        };
        let members = self.group_members(&group).await?;
        let Some(minimum) = state.minimum_for_group(&group.title, &members) else {
            return Ok(false);
        };
        self.disband_if_below(&group, &members, minimum).await
    }

    pub(crate) async fn group_members(&self, group: &Group) -> TgResult<Vec<Tab>> {
        Ok(self
            .host
            .query_tabs(Some(group.window_id))
            .await?
            .into_iter()
            .filter(|t| t.group_id == Some(group.id))
            .collect())
    }

    async fn disband_if_below(&self, group: &Group, members: &[Tab], minimum: u32) -> TgResult<bool> {
        let unpinned = members.iter().filter(|t| !t.pinned).count();
        if minimum <= 1 || members.is_empty() || unpinned >= minimum as usize {
            return Ok(false);
        }

        let ids: Vec<TabId> = members.iter().map(|t| t.id).collect();
        self.host.ungroup_tabs(&ids).await?;
        info!(
            "Disbanded group '{}': {} tabs below minimum of {}",
            group.title, unpinned, minimum
        );
        Ok(true)
    }

    /// 宿主事件入口
    pub async fn handle_event(self: &Arc<Self>, event: TabEvent) -> TgResult<bool> {
        match event {
            TabEvent::Created { tab_id } | TabEvent::Updated { tab_id } => self.reconcile_tab(tab_id, false).await,
            TabEvent::Activated { tab_id, window_id } => {
                trace!("Tab {} activated in window {}", tab_id, window_id);
                self.on_tab_activated(window_id).await?;
                Ok(false)
            }
            TabEvent::Removed { tab_id, window_id } => {
                trace!("Tab {} removed from window {}", tab_id, window_id);
                let outcome = self.check_window_threshold(Some(window_id)).await?;
                Ok(outcome.changed > 0)
            }
        }
    }

    /// 新增规则（整体重新保存规则集）
    pub async fn add_rule(&self, rule: Rule) -> TgResult<()> {
        rule.validate()?;
        let mut rules = self.store.load_rules().await?;
        if rules.iter().any(|r| r.id == rule.id) {
            return Err(TabGroupError::InvalidRule(format!("rule id '{}' already exists", rule.id)));
        }
        rules.push(rule);
        self.store.save_rules(&rules).await?;
        self.rehydrate().await;
        Ok(())
    }

    pub async fn update_rule(&self, rule: Rule) -> TgResult<()> {
        rule.validate()?;
        let mut rules = self.store.load_rules().await?;
        let Some(slot) = rules.iter_mut().find(|r| r.id == rule.id) else {
            return Err(TabGroupError::InvalidRule(format!("no rule with id '{}'", rule.id)));
        };
        *slot = rule;
        self.store.save_rules(&rules).await?;
        self.rehydrate().await;
        Ok(())
    }

    /// 删除规则，返回是否存在该规则
    pub async fn delete_rule(&self, rule_id: &str) -> TgResult<bool> {
        let mut rules = self.store.load_rules().await?;
        let before = rules.len();
        rules.retain(|r| r.id != rule_id);
        if rules.len() == before {
            return Ok(false);
        }
        self.store.save_rules(&rules).await?;
        self.rehydrate().await;
        Ok(true)
    }

    pub async fn update_settings(&self, mut settings: GroupingSettings) -> TgResult<()> {
        settings.focus_delay_ms = settings.focus_delay_ms.min(MAX_FOCUS_DELAY_MS);
        self.store.save_settings(&settings).await?;
        self.rehydrate().await;
        Ok(())
    }
}
