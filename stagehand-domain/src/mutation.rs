//! 乐观变更管线（Optimistic Mutation Pipeline）
//!
//! 纯函数式的两段状态机：
//! 1. `Planner::plan(&Snapshot, Command)`：校验命令、生成待发请求，并按写入策略给出乐观快照；
//! 2. `Pending::settle(&Snapshot, Result<Response>)`：以服务端结果推进，确认、提升或回滚。
//!
//! 两步之间的网络请求由调用方（应用层）发出。两步都作用于调用时缓存的**当前**快照，
//! 期间到达的对端事件不会被旧快照覆盖。
//!
use crate::cache::{Snapshot, Upsert};
use crate::conflict::{Conflict, UpdateReply, UpdateState};
use crate::display_id::DisplayTemplate;
use crate::entity::{Draft, Entity, Record, Submission};
use crate::error::{DomainError, DomainResult};
use crate::identity::{DisplayId, StableId};
use crate::payload::Payload;
use crate::value_object::{ValueObject, Version};
use serde::{Deserialize, Serialize};

/// 写入策略：等待服务端确认后再写缓存，或先写缓存再对账
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    #[default]
    AwaitServer,
    Optimistic,
}

/// 用户发起的变更命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command<P> {
    Create {
        draft: Draft<P>,
        policy: WritePolicy,
    },
    Update {
        stable_id: StableId,
        edit: Draft<P>,
        known_version: Version,
        policy: WritePolicy,
    },
    /// 删除始终等待服务端确认
    Delete { stable_id: StableId },
    /// 纯客户端操作：复制载荷、分配新标签后走创建流程
    Duplicate {
        stable_id: StableId,
        policy: WritePolicy,
    },
}

/// 待发往服务端的请求
#[derive(Debug, Clone, PartialEq)]
pub enum Request<P> {
    Create(Submission<P>),
    Update {
        stable_id: StableId,
        submission: Submission<P>,
        known_version: Version,
    },
    Delete { stable_id: StableId },
}

/// 服务端应答
#[derive(Debug, Clone, PartialEq)]
pub enum Response<P> {
    Created(Record<P>),
    Updated(UpdateReply<P>),
    Deleted,
}

/// 更新的最终结果；冲突不是错误，而是交给调用方决策的结构化结果
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome<P> {
    Accepted(Record<P>),
    Conflicted(Conflict<P>),
}

impl<P: Payload> UpdateOutcome<P> {
    /// 需要把冲突当作失败处理时（如批量重排）
    pub fn into_result(self) -> DomainResult<Record<P>> {
        match self {
            Self::Accepted(record) => Ok(record),
            Self::Conflicted(conflict) => Err(conflict.to_error()),
        }
    }
}

/// 已结算的变更
#[derive(Debug, Clone, PartialEq)]
pub enum Settled<P> {
    Created(Record<P>),
    Updated(UpdateOutcome<P>),
    Deleted(StableId),
}

#[derive(Debug)]
enum Stage<P> {
    Create {
        provisional: Option<Record<P>>,
    },
    Update {
        state: UpdateState<P>,
        optimistic: Option<Record<P>>,
        previous: Record<P>,
    },
    Delete,
}

/// 一个已计划、等待服务端结果的变更
#[derive(Debug)]
pub struct Pending<P> {
    request: Request<P>,
    stage: Stage<P>,
}

/// 计划结果：`snapshot` 为乐观写入后的快照（等待确认时为 `None`）
#[derive(Debug)]
pub struct Transition<P> {
    pub snapshot: Option<Snapshot<P>>,
    pub pending: Pending<P>,
}

/// 某一设备类型的变更计划器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Planner {
    template: DisplayTemplate,
}

impl Planner {
    pub fn new(template: DisplayTemplate) -> Self {
        Self { template }
    }

    pub fn for_payload<P: Payload>() -> Self {
        Self::new(DisplayTemplate::for_payload::<P>())
    }

    pub fn template(&self) -> &DisplayTemplate {
        &self.template
    }

    pub fn plan<P: Payload>(
        &self,
        snapshot: &Snapshot<P>,
        command: Command<P>,
    ) -> DomainResult<Transition<P>> {
        match command {
            Command::Create { draft, policy } => self.plan_create(snapshot, draft, policy),
            Command::Duplicate { stable_id, policy } => {
                let source = snapshot
                    .get(&stable_id)
                    .ok_or_else(|| DomainError::not_found(&stable_id))?;
                self.plan_create(snapshot, Draft::duplicate_of(source), policy)
            }
            Command::Update {
                stable_id,
                edit,
                known_version,
                policy,
            } => {
                let current = confirmed(snapshot, &stable_id)?;
                let display_id = edit
                    .display_id
                    .unwrap_or_else(|| current.display_id().clone());
                let submission = submission(display_id, edit.payload)?;

                let (next, optimistic) = match policy {
                    WritePolicy::AwaitServer => (None, None),
                    WritePolicy::Optimistic => {
                        let optimistic = current.with_submission(submission.clone());
                        match snapshot.upserted(optimistic.clone()) {
                            (_, Upsert::Unchanged) => (None, None),
                            (next, _) => (Some(next), Some(optimistic)),
                        }
                    }
                };

                Ok(Transition {
                    snapshot: next,
                    pending: Pending {
                        stage: Stage::Update {
                            state: UpdateState::pending(stable_id.clone(), known_version),
                            optimistic,
                            previous: current.clone(),
                        },
                        request: Request::Update {
                            stable_id,
                            submission,
                            known_version,
                        },
                    },
                })
            }
            Command::Delete { stable_id } => {
                confirmed(snapshot, &stable_id)?;
                Ok(Transition {
                    snapshot: None,
                    pending: Pending {
                        request: Request::Delete { stable_id },
                        stage: Stage::Delete,
                    },
                })
            }
        }
    }

    fn plan_create<P: Payload>(
        &self,
        snapshot: &Snapshot<P>,
        draft: Draft<P>,
        policy: WritePolicy,
    ) -> DomainResult<Transition<P>> {
        let display_id = draft
            .display_id
            .unwrap_or_else(|| self.template.next_available(snapshot.display_ids()));
        let submission = submission(display_id, draft.payload)?;

        let (next, provisional) = match policy {
            WritePolicy::AwaitServer => (None, None),
            WritePolicy::Optimistic => {
                let provisional = Record::provisional(submission.clone());
                let (next, _) = snapshot.upserted(provisional.clone());
                (Some(next), Some(provisional))
            }
        };

        Ok(Transition {
            snapshot: next,
            pending: Pending {
                request: Request::Create(submission),
                stage: Stage::Create { provisional },
            },
        })
    }
}

fn submission<P: Payload>(
    display_id: DisplayId,
    payload: P,
) -> DomainResult<Submission<P>> {
    payload.validate()?;
    display_id.validate()?;
    Ok(Submission {
        display_id,
        payload,
    })
}

/// 目标必须在缓存中且已被服务端确认
fn confirmed<'a, P: Payload>(
    snapshot: &'a Snapshot<P>,
    stable_id: &StableId,
) -> DomainResult<&'a Record<P>> {
    let record = snapshot
        .get(stable_id)
        .ok_or_else(|| DomainError::not_found(stable_id))?;
    if record.is_provisional() {
        return Err(DomainError::invalid_state(format!(
            "{stable_id} is awaiting server confirmation"
        )));
    }
    Ok(record)
}

impl<P: Payload> Pending<P> {
    pub fn request(&self) -> &Request<P> {
        &self.request
    }

    /// 已写入缓存的乐观值（若有）
    pub fn optimistic(&self) -> Option<&Record<P>> {
        match &self.stage {
            Stage::Create { provisional } => provisional.as_ref(),
            Stage::Update { optimistic, .. } => optimistic.as_ref(),
            Stage::Delete => None,
        }
    }

    /// 以服务端结果结算，返回新快照（无变化时为 `None`）与调用方结果
    pub fn settle(
        self,
        snapshot: &Snapshot<P>,
        result: DomainResult<Response<P>>,
    ) -> (Option<Snapshot<P>>, DomainResult<Settled<P>>) {
        match (self.stage, result) {
            (Stage::Create { provisional }, Ok(Response::Created(record))) => {
                let next = match provisional {
                    Some(tmp) => {
                        let newer = snapshot
                            .get(record.stable_id())
                            .is_some_and(|existing| existing.version() > record.version());
                        if newer {
                            // 回声及后续更新已先到：只丢弃临时记录
                            snapshot.removed(tmp.stable_id()).map(|(next, _)| next)
                        } else {
                            Some(snapshot.promoted(tmp.stable_id(), record.clone()))
                        }
                    }
                    None if snapshot.contains(record.stable_id()) => {
                        snapshot.refreshed(record.clone())
                    }
                    None => Some(snapshot.upserted(record.clone()).0),
                };
                (next, Ok(Settled::Created(record)))
            }
            (Stage::Create { provisional }, outcome) => {
                let next = provisional.and_then(|tmp| snapshot.restored(&tmp, None));
                (next, Err(failure(outcome, "create")))
            }

            (
                Stage::Update {
                    state,
                    optimistic,
                    previous,
                },
                result,
            ) => {
                let reply = match result {
                    Ok(Response::Updated(reply)) => Ok(reply),
                    other => Err(failure(other, "update")),
                };
                match state.complete(reply) {
                    Ok(UpdateState::Accepted(record)) => (
                        snapshot.refreshed(record.clone()),
                        Ok(Settled::Updated(UpdateOutcome::Accepted(record))),
                    ),
                    Ok(UpdateState::Conflicted(conflict)) => (
                        // 缓存保留服务端的权威版本，直到用户决策
                        snapshot.refreshed(conflict.server_data.clone()),
                        Ok(Settled::Updated(UpdateOutcome::Conflicted(conflict))),
                    ),
                    Ok(UpdateState::Failed(err)) | Err(err) => {
                        let next = optimistic
                            .and_then(|optimistic| snapshot.restored(&optimistic, Some(previous)));
                        (next, Err(err))
                    }
                    Ok(UpdateState::Pending { .. }) => (
                        None,
                        Err(DomainError::invalid_state("update left pending")),
                    ),
                }
            }

            (Stage::Delete, Ok(Response::Deleted)) => {
                let Request::Delete { stable_id } = self.request else {
                    return (None, Err(DomainError::invalid_state("delete without target")));
                };
                // 删除的回声可能已先到
                let next = snapshot.removed(&stable_id).map(|(next, _)| next);
                (next, Ok(Settled::Deleted(stable_id)))
            }
            (Stage::Delete, outcome) => (None, Err(failure(outcome, "delete"))),
        }
    }
}

fn failure<P>(outcome: DomainResult<Response<P>>, operation: &str) -> DomainError {
    match outcome {
        Err(err) => err,
        Ok(_) => DomainError::invalid_state(format!("unexpected response to {operation}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equipment::Monitor;

    fn monitor(model: &str) -> Monitor {
        Monitor {
            model: model.into(),
            ..Default::default()
        }
    }

    fn rec(id: &str, label: &str, version: u64, model: &str) -> Record<Monitor> {
        Record::new(
            StableId::from(id),
            DisplayId::from(label),
            Version::from_value(version),
            monitor(model),
        )
    }

    fn seeded() -> Snapshot<Monitor> {
        Snapshot::from_records(vec![
            rec("u1", "MON 1", 1, "a"),
            rec("u2", "MON 2", 1, "b"),
        ])
    }

    fn planner() -> Planner {
        Planner::for_payload::<Monitor>()
    }

    #[test]
    fn create_assigns_next_label_and_waits_by_default() {
        let t = planner()
            .plan(
                &seeded(),
                Command::Create {
                    draft: Draft::new(monitor("c")),
                    policy: WritePolicy::AwaitServer,
                },
            )
            .unwrap();
        assert!(t.snapshot.is_none());
        match t.pending.request() {
            Request::Create(sub) => assert_eq!(sub.display_id.as_str(), "MON 3"),
            other => panic!("unexpected {other:?}"),
        }

        let (next, settled) = t
            .pending
            .settle(&seeded(), Ok(Response::Created(rec("u3", "MON 3", 1, "c"))));
        assert!(matches!(settled.unwrap(), Settled::Created(_)));
        assert_eq!(next.unwrap().len(), 3);
    }

    #[test]
    fn create_rejects_missing_required_fields_before_any_request() {
        let err = planner()
            .plan(
                &seeded(),
                Command::Create {
                    draft: Draft::new(monitor("  ")),
                    policy: WritePolicy::Optimistic,
                },
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { ref missing } if missing == &vec!["model"]));
    }

    #[test]
    fn optimistic_create_is_promoted_in_place() {
        let base = seeded();
        let t = planner()
            .plan(
                &base,
                Command::Create {
                    draft: Draft::new(monitor("c")),
                    policy: WritePolicy::Optimistic,
                },
            )
            .unwrap();
        let optimistic = t.snapshot.unwrap();
        assert_eq!(optimistic.len(), 3);
        assert!(optimistic.records()[2].is_provisional());

        let (next, _) = t
            .pending
            .settle(&optimistic, Ok(Response::Created(rec("u3", "MON 3", 1, "c"))));
        let next = next.unwrap();
        assert_eq!(next.len(), 3);
        assert_eq!(next.position(&StableId::from("u3")), Some(2));
        assert!(next.iter().all(|r| !r.is_provisional()));
    }

    #[test]
    fn echo_before_response_leaves_one_record() {
        let base = seeded();
        let t = planner()
            .plan(
                &base,
                Command::Create {
                    draft: Draft::new(monitor("c")),
                    policy: WritePolicy::Optimistic,
                },
            )
            .unwrap();
        // 回声与临时记录同时存在（如来自他人身份的同名事件无法识别为回声时）
        let (with_echo, _) = t.snapshot.unwrap().upserted(rec("u3", "MON 3", 1, "c"));

        let (next, _) = t
            .pending
            .settle(&with_echo, Ok(Response::Created(rec("u3", "MON 3", 1, "c"))));
        let next = next.unwrap();
        assert_eq!(next.len(), 3);
        assert_eq!(next.find_by_display_id(&DisplayId::from("MON 3")).len(), 1);
    }

    #[test]
    fn failed_optimistic_create_is_rolled_back() {
        let t = planner()
            .plan(
                &seeded(),
                Command::Create {
                    draft: Draft::new(monitor("c")).with_display_id("MON 2"),
                    policy: WritePolicy::Optimistic,
                },
            )
            .unwrap();
        let optimistic = t.snapshot.unwrap();
        let (next, settled) = t.pending.settle(
            &optimistic,
            Err(DomainError::DuplicateId {
                display_id: "MON 2".into(),
            }),
        );
        assert_eq!(next.unwrap(), seeded());
        let err = settled.unwrap_err();
        assert!(err.blocks_dismissal());
    }

    #[test]
    fn update_of_unknown_or_provisional_record_is_refused() {
        let err = planner()
            .plan(
                &seeded(),
                Command::Update {
                    stable_id: StableId::from("nope"),
                    edit: Draft::new(monitor("x")),
                    known_version: Version::initial(),
                    policy: WritePolicy::AwaitServer,
                },
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));

        let tmp = Record::provisional(Submission {
            display_id: DisplayId::from("MON 9"),
            payload: monitor("t"),
        });
        let (snap, _) = seeded().upserted(tmp.clone());
        let err = planner()
            .plan(
                &snap,
                Command::Delete {
                    stable_id: tmp.stable_id().clone(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState { .. }));
    }

    #[test]
    fn conflict_keeps_server_payload_in_cache() {
        let base = seeded();
        let t = planner()
            .plan(
                &base,
                Command::Update {
                    stable_id: StableId::from("u1"),
                    edit: Draft::new(monitor("mine")),
                    known_version: Version::from_value(1),
                    policy: WritePolicy::Optimistic,
                },
            )
            .unwrap();
        let optimistic = t.snapshot.unwrap();
        assert_eq!(optimistic.get(&StableId::from("u1")).unwrap().payload().model, "mine");

        let conflict = Conflict {
            current_version: Version::from_value(2),
            client_version: Version::from_value(1),
            server_data: rec("u1", "MON 1", 2, "theirs"),
        };
        let (next, settled) = t.pending.settle(
            &optimistic,
            Ok(Response::Updated(UpdateReply::Conflict(conflict.clone()))),
        );
        let next = next.unwrap();
        let held = next.get(&StableId::from("u1")).unwrap();
        assert_eq!(held.payload().model, "theirs");
        assert_eq!(held.version(), Version::from_value(2));
        assert_eq!(
            settled.unwrap(),
            Settled::Updated(UpdateOutcome::Conflicted(conflict))
        );
    }

    #[test]
    fn failed_update_keeps_newer_peer_value() {
        let base = seeded();
        let t = planner()
            .plan(
                &base,
                Command::Update {
                    stable_id: StableId::from("u2"),
                    edit: Draft::new(monitor("mine")).with_display_id("MON 7"),
                    known_version: Version::from_value(1),
                    policy: WritePolicy::Optimistic,
                },
            )
            .unwrap();
        let optimistic = t.snapshot.unwrap();
        assert_eq!(
            optimistic.get(&StableId::from("u2")).unwrap().display_id().as_str(),
            "MON 7"
        );

        // 请求在途时对端更新已到达
        let (peer, _) = optimistic.upserted(rec("u2", "MON 2", 2, "peer"));
        let (next, settled) = t.pending.settle(&peer, Err(DomainError::network("timeout")));
        assert!(next.is_none());
        assert!(matches!(settled.unwrap_err(), DomainError::Network { .. }));
    }

    #[test]
    fn failed_update_restores_previous_value() {
        let base = seeded();
        let t = planner()
            .plan(
                &base,
                Command::Update {
                    stable_id: StableId::from("u2"),
                    edit: Draft::new(monitor("mine")),
                    known_version: Version::from_value(1),
                    policy: WritePolicy::Optimistic,
                },
            )
            .unwrap();
        let optimistic = t.snapshot.unwrap();
        let (next, _) = t
            .pending
            .settle(&optimistic, Err(DomainError::not_found("u2")));
        assert_eq!(next.unwrap(), base);
    }

    #[test]
    fn duplicate_strips_identity_and_relabels() {
        let t = planner()
            .plan(
                &seeded(),
                Command::Duplicate {
                    stable_id: StableId::from("u1"),
                    policy: WritePolicy::Optimistic,
                },
            )
            .unwrap();
        let snap = t.snapshot.unwrap();
        let copy = &snap.records()[2];
        assert!(copy.is_provisional());
        assert_ne!(copy.stable_id().as_str(), "u1");
        assert_eq!(copy.display_id().as_str(), "MON 3");
        assert_eq!(copy.payload().model, "a");
    }

    #[test]
    fn delete_waits_for_server() {
        let base = seeded();
        let t = planner()
            .plan(
                &base,
                Command::Delete {
                    stable_id: StableId::from("u1"),
                },
            )
            .unwrap();
        assert!(t.snapshot.is_none());
        let (next, settled) = t.pending.settle(&base, Ok(Response::Deleted));
        assert_eq!(next.unwrap().len(), 1);
        assert_eq!(settled.unwrap(), Settled::Deleted(StableId::from("u1")));
    }
}
