//! 本地缓存（Local Cache）
//!
//! 每个作用域（制作 × 设备类型）一份有序记录集合，是渲染的唯一数据源：
//! - `Snapshot`：不可变的缓存值，所有变更都以纯函数返回新快照；
//! - `LocalCache`：持有当前快照并经 `tokio::sync::watch` 整体发布，
//!   订阅者（渲染方）任何时刻看到的都是完整一致的快照。
//!
//! 缓存只维护插入顺序，不做排序；页面需要的派生排序见 `sorted_by_display_number`。
//!
use crate::display_id::display_order;
use crate::entity::{Entity, Record};
use crate::identity::{DisplayId, Scope, StableId};
use crate::payload::Payload;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// 缓存值：按插入顺序排列、以 `StableId` 唯一的记录序列
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<P> {
    records: Vec<Record<P>>,
}

/// `upsert` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// 新记录，追加在末尾
    Inserted,
    /// 原位整体替换
    Replaced,
    /// 内容完全相同，未产生新快照
    Unchanged,
}

/// 同一标签被多条记录使用（暂态警告，不自动处理）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub display_id: DisplayId,
    pub stable_ids: Vec<StableId>,
}

impl<P> Default for Snapshot<P> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<P: Payload> Snapshot<P> {
    /// 由批量拉取结果构造；重复的 `StableId` 只保留第一次出现
    pub fn from_records(records: impl IntoIterator<Item = Record<P>>) -> Self {
        let mut seen = HashSet::new();
        let records = records
            .into_iter()
            .filter(|r| seen.insert(r.stable_id().clone()))
            .collect();
        Self { records }
    }

    pub fn records(&self) -> &[Record<P>] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record<P>> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, stable_id: &StableId) -> Option<&Record<P>> {
        self.records.iter().find(|r| r.stable_id() == stable_id)
    }

    pub fn contains(&self, stable_id: &StableId) -> bool {
        self.position(stable_id).is_some()
    }

    pub fn position(&self, stable_id: &StableId) -> Option<usize> {
        self.records.iter().position(|r| r.stable_id() == stable_id)
    }

    /// 标签查找可能命中多条（标签不保证唯一）
    pub fn find_by_display_id(&self, display_id: &DisplayId) -> Vec<&Record<P>> {
        self.records
            .iter()
            .filter(|r| r.display_id() == display_id)
            .collect()
    }

    pub fn display_ids(&self) -> impl Iterator<Item = &DisplayId> {
        self.records.iter().map(Entity::display_id)
    }

    /// 页面派生排序（缓存本身不排序）
    pub fn sorted_by_display_number(&self) -> Vec<&Record<P>> {
        let mut sorted: Vec<&Record<P>> = self.records.iter().collect();
        sorted.sort_by(|a, b| display_order(a.display_id(), b.display_id()));
        sorted
    }

    /// 标签冲突分组，按首次出现顺序返回
    pub fn display_collisions(&self) -> Vec<Collision> {
        let mut groups: HashMap<&DisplayId, Vec<StableId>> = HashMap::new();
        let mut order: Vec<&DisplayId> = Vec::new();
        for record in &self.records {
            let group = groups.entry(record.display_id()).or_default();
            if group.is_empty() {
                order.push(record.display_id());
            }
            group.push(record.stable_id().clone());
        }
        order
            .into_iter()
            .filter_map(|display_id| {
                let stable_ids = groups.remove(display_id)?;
                (stable_ids.len() > 1).then(|| Collision {
                    display_id: display_id.clone(),
                    stable_ids,
                })
            })
            .collect()
    }

    /// 同 `StableId` 原位替换，否则追加
    pub fn upserted(&self, record: Record<P>) -> (Self, Upsert) {
        match self.position(record.stable_id()) {
            Some(idx) if self.records[idx] == record => (self.clone(), Upsert::Unchanged),
            Some(idx) => {
                let mut records = self.records.clone();
                records[idx] = record;
                (Self { records }, Upsert::Replaced)
            }
            None => {
                let mut records = self.records.clone();
                records.push(record);
                (Self { records }, Upsert::Inserted)
            }
        }
    }

    /// 以服务端记录刷新已有条目；条目已不在缓存（已被删除）或缓存版本更新时不写入
    pub fn refreshed(&self, record: Record<P>) -> Option<Self> {
        match self.get(record.stable_id()) {
            Some(existing) if existing.version() <= record.version() => match self.upserted(record) {
                (_, Upsert::Unchanged) => None,
                (next, _) => Some(next),
            },
            _ => None,
        }
    }

    /// 按 `StableId` 删除，返回新快照与被删记录
    pub fn removed(&self, stable_id: &StableId) -> Option<(Self, Record<P>)> {
        let idx = self.position(stable_id)?;
        let mut records = self.records.clone();
        let removed = records.remove(idx);
        Some((Self { records }, removed))
    }

    /// 以服务端确认的记录替换临时记录：
    /// - 若确认记录已在缓存中（回声先到），丢弃临时记录并原位刷新确认记录；
    /// - 否则若临时记录仍在，原位替换；
    /// - 两者都不在时追加确认记录。
    pub fn promoted(&self, provisional: &StableId, confirmed: Record<P>) -> Self {
        let mut records = self.records.clone();
        let confirmed_at = records
            .iter()
            .position(|r| r.stable_id() == confirmed.stable_id());
        let provisional_at = records.iter().position(|r| r.stable_id() == provisional);

        match (confirmed_at, provisional_at) {
            (Some(at), Some(tmp)) => {
                records[at] = confirmed;
                records.remove(tmp);
            }
            (Some(at), None) => records[at] = confirmed,
            (None, Some(tmp)) => records[tmp] = confirmed,
            (None, None) => records.push(confirmed),
        }
        Self { records }
    }

    /// 条件回滚：仅当缓存仍持有 `expected`（本地乐观值）时才恢复为 `previous`，
    /// `previous` 为 `None` 表示移除。期间若已被对端事件覆盖，保留较新的对端值。
    pub fn restored(&self, expected: &Record<P>, previous: Option<Record<P>>) -> Option<Self> {
        let idx = self.position(expected.stable_id())?;
        if &self.records[idx] != expected {
            return None;
        }
        let mut records = self.records.clone();
        match previous {
            Some(previous) => records[idx] = previous,
            None => {
                records.remove(idx);
            }
        }
        Some(Self { records })
    }
}

/// 某一作用域的本地缓存
pub struct LocalCache<P> {
    scope: Scope,
    tx: watch::Sender<Arc<Snapshot<P>>>,
    writer: Mutex<()>,
}

impl<P: Payload> LocalCache<P> {
    pub fn new(scope: Scope) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Snapshot::default()));
        Self {
            scope,
            tx,
            writer: Mutex::new(()),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// 当前快照
    pub fn get(&self) -> Arc<Snapshot<P>> {
        self.tx.borrow().clone()
    }

    /// 订阅快照变化（渲染方）
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot<P>>> {
        self.tx.subscribe()
    }

    /// 对当前快照执行一次纯变换；返回 `Some(next)` 时整体发布并通知订阅者
    ///
    /// 写入方经 `writer` 串行化，读取方不受影响。
    pub fn transition<R>(&self, f: impl FnOnce(&Snapshot<P>) -> (Option<Snapshot<P>>, R)) -> R {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.get();
        let (next, result) = f(&current);
        if let Some(next) = next {
            self.tx.send_replace(Arc::new(next));
        }
        result
    }

    pub fn upsert(&self, record: Record<P>) -> Upsert {
        self.transition(|snap| match snap.upserted(record) {
            (_, Upsert::Unchanged) => (None, Upsert::Unchanged),
            (next, kind) => (Some(next), kind),
        })
    }

    pub fn remove(&self, stable_id: &StableId) -> Option<Record<P>> {
        self.transition(|snap| match snap.removed(stable_id) {
            Some((next, removed)) => (Some(next), Some(removed)),
            None => (None, None),
        })
    }

    /// 整体替换（批量拉取/重排后的重新同步）
    pub fn replace_all(&self, records: impl IntoIterator<Item = Record<P>>) {
        let next = Snapshot::from_records(records);
        self.transition(|snap| {
            if *snap == next {
                (None, ())
            } else {
                (Some(next), ())
            }
        })
    }
}
