//! 事件对账（Event Reconciler）
//!
//! 把推送通道上的创建/更新/删除通知幂等地应用到本地缓存：
//! - 一律以 `StableId` 为键、整体替换，从不按字段合并，因此重复投递与乱序到达都会收敛；
//! - 本人创建的回声若先于 REST 应答到达，直接提升同标签的临时记录，避免出现两份；
//! - 按标签删除仅作为缺少 `StableId` 时的兼容回退，且最多删除一条；
//! - 批量重排期间可挂起（`suspend`），挂起时到达的事件被忽略而不是排队。
//!
use crate::cache::{LocalCache, Snapshot, Upsert};
use crate::entity::{Entity, Record};
use crate::event::{ChangeEvent, ChangeKind, Target};
use crate::identity::{DisplayId, StableId, UserId};
use crate::payload::Payload;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 一次事件应用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Appended(StableId),
    Replaced(StableId),
    /// 本人创建的回声提升了临时记录
    Promoted {
        provisional: StableId,
        confirmed: StableId,
    },
    Removed(StableId),
    Ignored(IgnoreReason),
}

/// 事件被忽略的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// 对账器被挂起（批量重排中）
    Suspended,
    /// 创建通知，但该 `StableId` 已存在
    AlreadyPresent,
    /// 内容与缓存完全一致
    Unchanged,
    /// 删除目标不在缓存中
    UnknownEntity,
    /// 按标签回退删除时命中多条
    AmbiguousDisplayId,
    /// 删除通知既无 `StableId` 也无标签
    MissingIdentity,
}

impl ReconcileOutcome {
    pub fn is_applied(&self) -> bool {
        !matches!(self, Self::Ignored(_))
    }
}

/// 纯函数：在快照上应用一条事件，返回新快照（无变化时为 `None`）与结果
pub fn reconcile<P: Payload>(
    snapshot: &Snapshot<P>,
    event: ChangeEvent<P>,
    local_user: Option<&UserId>,
) -> (Option<Snapshot<P>>, ReconcileOutcome) {
    let own_echo = local_user.is_some() && event.origin.user_id.as_ref() == local_user;

    match (event.kind, event.target) {
        (ChangeKind::Created, Target::Entity(record)) => {
            if snapshot.contains(record.stable_id()) {
                return (None, ReconcileOutcome::Ignored(IgnoreReason::AlreadyPresent));
            }
            insert(snapshot, record, own_echo)
        }
        (ChangeKind::Updated, Target::Entity(record)) => {
            if !snapshot.contains(record.stable_id()) {
                return insert(snapshot, record, own_echo);
            }
            let stable_id = record.stable_id().clone();
            match snapshot.upserted(record) {
                (_, Upsert::Unchanged) => (None, ReconcileOutcome::Ignored(IgnoreReason::Unchanged)),
                (next, _) => (Some(next), ReconcileOutcome::Replaced(stable_id)),
            }
        }
        (ChangeKind::Deleted, Target::Entity(record)) => remove(snapshot, record.stable_id()),
        (ChangeKind::Deleted, Target::Reference { stable_id: Some(stable_id), .. }) => {
            remove(snapshot, &stable_id)
        }
        (ChangeKind::Deleted, Target::Reference { stable_id: None, display_id: Some(display_id) }) => {
            remove_by_display_id(snapshot, &display_id)
        }
        (_, Target::Reference { .. }) => {
            (None, ReconcileOutcome::Ignored(IgnoreReason::MissingIdentity))
        }
    }
}

fn insert<P: Payload>(
    snapshot: &Snapshot<P>,
    record: Record<P>,
    own_echo: bool,
) -> (Option<Snapshot<P>>, ReconcileOutcome) {
    let confirmed = record.stable_id().clone();

    // 本人的回声：与同标签的临时记录是同一实体
    if own_echo {
        let provisional = snapshot
            .iter()
            .find(|r| r.is_provisional() && r.display_id() == record.display_id())
            .map(|r| r.stable_id().clone());
        if let Some(provisional) = provisional {
            let next = snapshot.promoted(&provisional, record);
            return (
                Some(next),
                ReconcileOutcome::Promoted {
                    provisional,
                    confirmed,
                },
            );
        }
    }

    let (next, _) = snapshot.upserted(record);
    (Some(next), ReconcileOutcome::Appended(confirmed))
}

fn remove<P: Payload>(
    snapshot: &Snapshot<P>,
    stable_id: &StableId,
) -> (Option<Snapshot<P>>, ReconcileOutcome) {
    match snapshot.removed(stable_id) {
        Some((next, _)) => (Some(next), ReconcileOutcome::Removed(stable_id.clone())),
        None => (None, ReconcileOutcome::Ignored(IgnoreReason::UnknownEntity)),
    }
}

fn remove_by_display_id<P: Payload>(
    snapshot: &Snapshot<P>,
    display_id: &DisplayId,
) -> (Option<Snapshot<P>>, ReconcileOutcome) {
    let matches: Vec<&Record<P>> = snapshot
        .find_by_display_id(display_id)
        .into_iter()
        .filter(|r| !r.is_provisional())
        .collect();

    match matches.as_slice() {
        [] => (None, ReconcileOutcome::Ignored(IgnoreReason::UnknownEntity)),
        [only] => {
            let stable_id = only.stable_id().clone();
            remove(snapshot, &stable_id)
        }
        _ => {
            tracing::warn!(
                display_id = %display_id,
                candidates = matches.len(),
                "legacy deletion by display id is ambiguous; ignoring"
            );
            (None, ReconcileOutcome::Ignored(IgnoreReason::AmbiguousDisplayId))
        }
    }
}

/// 有状态的对账器：持有本地用户（识别回声）与挂起计数
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    local_user: Option<UserId>,
    suspended: Arc<AtomicUsize>,
}

impl Reconciler {
    pub fn new(local_user: Option<UserId>) -> Self {
        Self {
            local_user,
            suspended: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn local_user(&self) -> Option<&UserId> {
        self.local_user.as_ref()
    }

    /// 挂起对账，直到返回的守卫被释放；可重入
    pub fn suspend(&self) -> SuspendGuard {
        self.suspended.fetch_add(1, Ordering::SeqCst);
        SuspendGuard {
            gate: Arc::clone(&self.suspended),
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst) > 0
    }

    /// 在缓存的当前快照上应用事件（而非任何闭包捕获的旧快照）
    pub fn apply<P: Payload>(&self, cache: &LocalCache<P>, event: ChangeEvent<P>) -> ReconcileOutcome {
        cache.transition(|snap| {
            if self.is_suspended() {
                return (None, ReconcileOutcome::Ignored(IgnoreReason::Suspended));
            }
            reconcile(snap, event, self.local_user.as_ref())
        })
    }
}

/// 挂起守卫，释放时恢复对账
#[derive(Debug)]
pub struct SuspendGuard {
    gate: Arc<AtomicUsize>,
}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        self.gate.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Submission;
    use crate::equipment::Monitor;
    use crate::event::Origin;
    use crate::identity::{ProductionId, Scope};
    use crate::value_object::Version;
    use chrono::Utc;

    fn rec(id: &str, label: &str, version: u64) -> Record<Monitor> {
        Record::new(
            StableId::from(id),
            DisplayId::from(label),
            Version::from_value(version),
            Monitor {
                model: format!("model-v{version}"),
                ..Default::default()
            },
        )
    }

    fn event(kind: ChangeKind, target: Target<Monitor>, user: Option<&str>) -> ChangeEvent<Monitor> {
        ChangeEvent {
            kind,
            target,
            origin: Origin {
                user_id: user.map(UserId::from),
                user_name: None,
            },
            received_at: Utc::now(),
        }
    }

    fn created(r: Record<Monitor>) -> ChangeEvent<Monitor> {
        event(ChangeKind::Created, Target::Entity(r), Some("bob"))
    }

    fn updated(r: Record<Monitor>) -> ChangeEvent<Monitor> {
        event(ChangeKind::Updated, Target::Entity(r), Some("bob"))
    }

    fn deleted(stable_id: Option<&str>, display_id: Option<&str>) -> ChangeEvent<Monitor> {
        event(
            ChangeKind::Deleted,
            Target::Reference {
                stable_id: stable_id.map(StableId::from),
                display_id: display_id.map(DisplayId::from),
            },
            Some("bob"),
        )
    }

    fn cache() -> LocalCache<Monitor> {
        LocalCache::new(Scope::of::<Monitor>(ProductionId::from("p1")))
    }

    #[test]
    fn created_is_ignored_when_present() {
        let cache = cache();
        let reconciler = Reconciler::new(Some(UserId::from("alice")));
        assert_eq!(
            reconciler.apply(&cache, created(rec("u1", "MON 1", 1))),
            ReconcileOutcome::Appended(StableId::from("u1"))
        );
        assert_eq!(
            reconciler.apply(&cache, created(rec("u1", "MON 1", 1))),
            ReconcileOutcome::Ignored(IgnoreReason::AlreadyPresent)
        );
        assert_eq!(cache.get().len(), 1);
    }

    #[test]
    fn applying_the_same_update_twice_is_idempotent() {
        let cache = cache();
        let reconciler = Reconciler::default();
        cache.upsert(rec("u1", "MON 1", 1));
        cache.upsert(rec("u2", "MON 2", 1));

        reconciler.apply(&cache, updated(rec("u1", "MON 1", 2)));
        let once = cache.get();
        let second = reconciler.apply(&cache, updated(rec("u1", "MON 1", 2)));
        assert_eq!(second, ReconcileOutcome::Ignored(IgnoreReason::Unchanged));
        assert_eq!(*cache.get(), *once);
        // 原位替换，顺序不变
        assert_eq!(cache.get().position(&StableId::from("u1")), Some(0));
    }

    #[test]
    fn update_before_create_converges() {
        let in_order = cache();
        let out_of_order = cache();
        let reconciler = Reconciler::default();

        reconciler.apply(&in_order, created(rec("u1", "MON 1", 1)));
        reconciler.apply(&in_order, updated(rec("u1", "MON 1", 2)));

        assert_eq!(
            reconciler.apply(&out_of_order, updated(rec("u1", "MON 1", 2))),
            ReconcileOutcome::Appended(StableId::from("u1"))
        );
        reconciler.apply(&out_of_order, created(rec("u1", "MON 1", 1)));

        assert_eq!(*in_order.get(), *out_of_order.get());
    }

    #[test]
    fn own_echo_promotes_provisional_record() {
        let cache = cache();
        let reconciler = Reconciler::new(Some(UserId::from("alice")));
        let tmp = Record::provisional(Submission {
            display_id: DisplayId::from("MON 3"),
            payload: Monitor::default(),
        });
        cache.upsert(rec("u1", "MON 1", 1));
        cache.upsert(tmp.clone());

        let echo = event(
            ChangeKind::Created,
            Target::Entity(rec("u3", "MON 3", 1)),
            Some("alice"),
        );
        assert_eq!(
            reconciler.apply(&cache, echo),
            ReconcileOutcome::Promoted {
                provisional: tmp.stable_id().clone(),
                confirmed: StableId::from("u3"),
            }
        );
        let snap = cache.get();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.position(&StableId::from("u3")), Some(1));
    }

    #[test]
    fn peer_create_with_same_label_is_a_collision_not_a_promotion() {
        let cache = cache();
        let reconciler = Reconciler::new(Some(UserId::from("alice")));
        cache.upsert(Record::provisional(Submission {
            display_id: DisplayId::from("MON 3"),
            payload: Monitor::default(),
        }));

        let outcome = reconciler.apply(&cache, created(rec("u9", "MON 3", 1)));
        assert_eq!(outcome, ReconcileOutcome::Appended(StableId::from("u9")));
        assert_eq!(cache.get().display_collisions().len(), 1);
    }

    #[test]
    fn deletion_by_stable_id_and_legacy_display_id() {
        let cache = cache();
        let reconciler = Reconciler::default();
        cache.replace_all(vec![
            rec("u1", "MON 1", 1),
            rec("u2", "MON 2", 1),
            rec("u3", "MON 2", 1),
        ]);

        assert_eq!(
            reconciler.apply(&cache, deleted(Some("u1"), Some("MON 2"))),
            ReconcileOutcome::Removed(StableId::from("u1"))
        );
        // 标签命中两条：拒绝删除
        assert_eq!(
            reconciler.apply(&cache, deleted(None, Some("MON 2"))),
            ReconcileOutcome::Ignored(IgnoreReason::AmbiguousDisplayId)
        );
        assert_eq!(cache.get().len(), 2);

        reconciler.apply(&cache, deleted(Some("u3"), None));
        assert_eq!(
            reconciler.apply(&cache, deleted(None, Some("MON 2"))),
            ReconcileOutcome::Removed(StableId::from("u2"))
        );
        assert_eq!(
            reconciler.apply(&cache, deleted(None, None)),
            ReconcileOutcome::Ignored(IgnoreReason::MissingIdentity)
        );
        assert_eq!(
            reconciler.apply(&cache, deleted(Some("u2"), None)),
            ReconcileOutcome::Ignored(IgnoreReason::UnknownEntity)
        );
    }

    #[test]
    fn suspension_drops_events_until_released() {
        let cache = cache();
        let reconciler = Reconciler::default();
        {
            let _outer = reconciler.suspend();
            let inner = reconciler.suspend();
            drop(inner);
            assert!(reconciler.is_suspended());
            assert_eq!(
                reconciler.apply(&cache, created(rec("u1", "MON 1", 1))),
                ReconcileOutcome::Ignored(IgnoreReason::Suspended)
            );
        }
        assert!(!reconciler.is_suspended());
        assert!(reconciler.apply(&cache, created(rec("u1", "MON 1", 1))).is_applied());
    }
}
