//! 批量重排事务（ReorderTransaction）
//!
//! 一次拖拽是一个用户意图，但逐条提交：
//! - 挂起该类型的对账，避免对端更新或本事务自身的回声在拖拽中途打乱列表；
//! - 先应用本地改名视图，再并发发出每条改名的 PUT（各自携带重排前版本）；
//! - 无论成败都重新拉取并整体替换缓存，不信任本地累积的部分状态；
//!   拉取也失败时按每条改名的结果在本地收尾，缓存不保留未被接受的标签；
//! - 任一改名失败（含版本冲突）即整体失败，报告 `Transaction` 错误。
//!
use crate::store::EntityStore;
use futures_util::{StreamExt, stream};
use stagehand_domain::cache::Snapshot;
use stagehand_domain::conflict::UpdateReply;
use stagehand_domain::entity::{Entity, Record};
use stagehand_domain::error::{DomainError, DomainResult};
use stagehand_domain::payload::Payload;
use stagehand_domain::reorder::{ReorderPlan, Rename};

/// 成功提交后的统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReorderReport {
    /// 实际发出的改名数
    pub renamed: usize,
    /// 重新拉取后的记录数
    pub total: usize,
}

pub struct ReorderTransaction<'a, P: Payload> {
    store: &'a EntityStore<P>,
    plan: ReorderPlan<P>,
}

impl<'a, P: Payload> ReorderTransaction<'a, P> {
    pub fn new(store: &'a EntityStore<P>, plan: ReorderPlan<P>) -> Self {
        Self { store, plan }
    }

    pub fn plan(&self) -> &ReorderPlan<P> {
        &self.plan
    }

    pub async fn commit(self) -> DomainResult<ReorderReport> {
        let Self { store, plan } = self;
        if plan.is_noop() {
            return Ok(ReorderReport {
                renamed: 0,
                total: store.snapshot().len(),
            });
        }

        let renamed = plan.renames().len();
        let results = {
            let _suspended = store.reconciler().suspend();
            store
                .cache()
                .transition(|snap| (Some(plan.optimistic(snap)), ()));

            stream::iter(plan.into_renames())
                .map(|rename| submit(store, rename))
                .buffer_unordered(store.reorder_concurrency())
                .collect::<Vec<_>>()
                .await
        };

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        let first_failure = results
            .iter()
            .find_map(|(_, r)| r.as_ref().err())
            .map(ToString::to_string);

        let resync = store.load().await;
        if resync.is_err() {
            settle_locally(store, &results);
        }

        match (first_failure, resync) {
            (None, Ok(total)) => {
                tracing::debug!(scope = %store.scope(), renamed, total, "reorder committed");
                Ok(ReorderReport { renamed, total })
            }
            (first, resync) => {
                let mut reason = first.unwrap_or_default();
                if let Err(err) = resync {
                    if !reason.is_empty() {
                        reason.push_str("; ");
                    }
                    reason.push_str(&format!("resync after reorder failed: {err}"));
                }
                tracing::warn!(scope = %store.scope(), failed, total = renamed, %reason, "reorder abandoned");
                Err(DomainError::Transaction {
                    total: renamed,
                    failed,
                    reason,
                })
            }
        }
    }
}

/// 无法重新拉取时，按各条改名的结果逐条收尾：
/// 被接受的写入服务端返回的记录，未被接受的在缓存仍持有乐观标签时恢复原记录
fn settle_locally<P: Payload>(store: &EntityStore<P>, results: &[(Rename<P>, DomainResult<Record<P>>)]) {
    store.cache().transition(|snap| {
        let mut next: Option<Snapshot<P>> = None;
        for (rename, result) in results {
            let current = next.as_ref().unwrap_or(snap);
            let step = match result {
                Ok(record) => current.refreshed(record.clone()),
                Err(_) => current
                    .get(&rename.stable_id)
                    .filter(|cached| {
                        cached.display_id() == &rename.to && cached.version() == rename.known_version
                    })
                    .and_then(|cached| {
                        current.restored(cached, Some(cached.with_display_id(rename.from.clone())))
                    }),
            };
            if let Some(step) = step {
                next = Some(step);
            }
        }
        (next, ())
    });
}

/// 单条改名；重排内的冲突视为失败
async fn submit<P: Payload>(
    store: &EntityStore<P>,
    rename: Rename<P>,
) -> (Rename<P>, DomainResult<Record<P>>) {
    let reply = store
        .gateway()
        .update(
            store.scope().production_id(),
            &rename.stable_id,
            &rename.submission,
            rename.known_version,
        )
        .await;
    let result = match reply {
        Ok(UpdateReply::Updated(record)) => Ok(record),
        Ok(UpdateReply::Conflict(conflict)) => Err(conflict.to_error()),
        Err(err) => Err(err),
    };
    (rename, result)
}
