//! 外部协作方接口：标签页宿主与键值存储
use async_trait::async_trait;
use serde_json::Value;

use super::model::{Group, GroupId, GroupUpdate, Tab, TabId, WindowId};
use crate::error::TgResult;

/// 标签页/分组宿主（唯一权威状态来源）
///
/// 约定：宿主不允许空分组存在，最后一个标签页离开时分组自动删除；
/// 新分组只能通过把至少一个标签页移入（不带 group_id）来创建。
#[async_trait]
pub trait TabHost: Send + Sync {
    /// 标签页已不存在时返回 `Ok(None)`
    async fn get_tab(&self, tab_id: TabId) -> TgResult<Option<Tab>>;

    /// `window` 为 None 时返回所有窗口
    async fn query_tabs(&self, window: Option<WindowId>) -> TgResult<Vec<Tab>>;

    /// 当前活动标签页；`window` 为 None 时取任意窗口中的活动标签页
    async fn active_tab(&self, window: Option<WindowId>) -> TgResult<Option<Tab>>;

    async fn query_groups(&self, window: Option<WindowId>) -> TgResult<Vec<Group>>;

    async fn get_group(&self, group_id: GroupId) -> TgResult<Option<Group>>;

    /// 移动标签页到分组；`group_id` 为 None 时宿主隐式创建新分组，返回目标分组 id
    async fn group_tabs(&self, tab_ids: &[TabId], group_id: Option<GroupId>) -> TgResult<GroupId>;

    async fn update_group(&self, group_id: GroupId, update: &GroupUpdate) -> TgResult<Group>;

    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> TgResult<()>;
}

/// 持久化键值存储（设置、规则、颜色映射）
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> TgResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> TgResult<()>;
}
