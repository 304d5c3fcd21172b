//! 批量重排规划（Batch Reorder）
//!
//! 拖拽改变可见顺序后，按 `前缀 + 序号` 为每个位置生成规范标签，
//! 只对标签实际变化的记录生成改名，每条改名携带其重排前的版本。
//! 这里只做规划；挂起对账、并发提交与重新拉取由应用层的事务负责。
//!
use crate::cache::Snapshot;
use crate::display_id::DisplayTemplate;
use crate::entity::{Entity, Record, Submission};
use crate::error::{DomainError, DomainResult};
use crate::identity::{DisplayId, StableId};
use crate::payload::Payload;
use crate::value_object::Version;

/// 一次改名：作为一条普通的带版本更新提交
#[derive(Debug, Clone, PartialEq)]
pub struct Rename<P> {
    pub stable_id: StableId,
    pub from: DisplayId,
    pub to: DisplayId,
    pub known_version: Version,
    pub submission: Submission<P>,
}

/// 重排计划
#[derive(Debug, Clone, PartialEq)]
pub struct ReorderPlan<P> {
    order: Vec<Record<P>>,
    renames: Vec<Rename<P>>,
}

impl<P: Payload> ReorderPlan<P> {
    /// 新的可见顺序（标签已按位置改写）
    pub fn order(&self) -> &[Record<P>] {
        &self.order
    }

    pub fn renames(&self) -> &[Rename<P>] {
        &self.renames
    }

    pub fn into_renames(self) -> Vec<Rename<P>> {
        self.renames
    }

    pub fn is_noop(&self) -> bool {
        self.renames.is_empty()
    }

    /// 拖拽期间的本地视图：被改名的记录换上新标签，其余保持不变
    pub fn optimistic(&self, snapshot: &Snapshot<P>) -> Snapshot<P> {
        Snapshot::from_records(snapshot.iter().map(|record| {
            self.renames
                .iter()
                .find(|r| &r.stable_id == record.stable_id())
                .map(|r| record.with_display_id(r.to.clone()))
                .unwrap_or_else(|| record.clone())
        }))
    }
}

/// 把 `from` 位置的元素移到 `to`（其余元素依次顺移）
pub fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) -> DomainResult<()> {
    let len = items.len();
    if from >= len || to >= len {
        return Err(DomainError::InvalidValue {
            reason: format!("move {from} -> {to} out of range for {len} items"),
        });
    }
    let item = items.remove(from);
    items.insert(to, item);
    Ok(())
}

/// 在可见顺序上执行一次拖拽并规划改名
pub fn plan_move<P: Payload>(
    visible: Vec<Record<P>>,
    from: usize,
    to: usize,
    template: &DisplayTemplate,
) -> DomainResult<ReorderPlan<P>> {
    let mut order = visible;
    move_item(&mut order, from, to)?;
    plan_renumber(order, template)
}

/// 按给定顺序重新连续编号
pub fn plan_renumber<P: Payload>(
    order: Vec<Record<P>>,
    template: &DisplayTemplate,
) -> DomainResult<ReorderPlan<P>> {
    if let Some(tmp) = order.iter().find(|r| r.is_provisional()) {
        return Err(DomainError::invalid_state(format!(
            "cannot renumber while {} is awaiting server confirmation",
            tmp.display_id()
        )));
    }

    let mut renames = Vec::new();
    let order = order
        .into_iter()
        .enumerate()
        .map(|(position, record)| {
            let to = template.render(position);
            if record.display_id() == &to {
                return record;
            }
            let renamed = record.with_display_id(to.clone());
            renames.push(Rename {
                stable_id: record.stable_id().clone(),
                from: record.display_id().clone(),
                to,
                known_version: record.version(),
                submission: renamed.to_submission(),
            });
            renamed
        })
        .collect();

    Ok(ReorderPlan { order, renames })
}
