//! 冲突解决（Conflict Resolver）
//!
//! 每个进行中的更新是一台小状态机：`Pending -> {Accepted, Conflicted, Failed}`。
//! 冲突时只给出结构化结果，不自动合并、不静默覆盖；调用方必须二选一：
//! 采用服务端数据（`AdoptServer`），或以服务端当前版本重试本地编辑（`Retry`）。
//!
use crate::entity::{Entity, Record, Submission};
use crate::error::{DomainError, DomainResult};
use crate::identity::StableId;
use crate::payload::Payload;
use crate::value_object::Version;
use serde::{Deserialize, Serialize};

const CONFLICT_TAG: &str = "Conflict";

/// 版本冲突：`{currentVersion, clientVersion, serverData}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict<P> {
    pub current_version: Version,
    pub client_version: Version,
    pub server_data: Record<P>,
}

/// 用户对冲突的选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// 放弃本地编辑，采用服务端数据
    AdoptServer,
    /// 以服务端当前版本作为已知版本重新提交本地编辑（用户主导的后写胜出）
    Retry,
}

/// 冲突解决后的下一步
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionStep<P> {
    /// 以服务端数据替换缓存中的记录
    Replace(Record<P>),
    /// 重新提交更新
    Resubmit {
        stable_id: StableId,
        submission: Submission<P>,
        known_version: Version,
    },
}

impl<P: Payload> Conflict<P> {
    pub fn stable_id(&self) -> &StableId {
        self.server_data.stable_id()
    }

    /// 需要以错误形式上报时（如批量重排内的冲突）
    pub fn to_error(&self) -> DomainError {
        DomainError::Conflict {
            stable_id: self.stable_id().to_string(),
            current_version: self.current_version.value(),
            client_version: self.client_version.value(),
        }
    }

    pub fn resolve(self, resolution: Resolution, edit: Submission<P>) -> ResolutionStep<P> {
        match resolution {
            Resolution::AdoptServer => ResolutionStep::Replace(self.server_data),
            Resolution::Retry => ResolutionStep::Resubmit {
                stable_id: self.server_data.stable_id().clone(),
                submission: edit,
                known_version: self.current_version,
            },
        }
    }
}

/// PUT 应答：更新后的实体，或冲突对象 `{error: "Conflict", ...}`
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateReply<P> {
    Updated(Record<P>),
    Conflict(Conflict<P>),
}

impl<P: Payload> UpdateReply<P> {
    /// 解析线上应答：带 `error: "Conflict"` 的为冲突，其余按实体解析
    pub fn from_json(value: serde_json::Value) -> DomainResult<Self> {
        match value.get("error").and_then(|e| e.as_str()) {
            Some(CONFLICT_TAG) => Ok(Self::Conflict(serde_json::from_value(value)?)),
            Some(other) => Err(DomainError::InvalidValue {
                reason: format!("unexpected error reply: {other}"),
            }),
            None => Ok(Self::Updated(serde_json::from_value(value)?)),
        }
    }

    pub fn to_json(&self) -> DomainResult<serde_json::Value> {
        match self {
            Self::Updated(record) => Ok(serde_json::to_value(record)?),
            Self::Conflict(conflict) => {
                let mut value = serde_json::to_value(conflict)?;
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("error".into(), CONFLICT_TAG.into());
                }
                Ok(value)
            }
        }
    }
}

/// 单个进行中更新的状态
#[derive(Debug)]
pub enum UpdateState<P> {
    Pending {
        stable_id: StableId,
        known_version: Version,
    },
    /// 服务端版本已推进，缓存以服务端返回的实体为准
    Accepted(Record<P>),
    /// 版本不一致，等待用户决策
    Conflicted(Conflict<P>),
    /// 传输/校验失败，已应用的乐观变更需回滚
    Failed(DomainError),
}

impl<P: Payload> UpdateState<P> {
    pub fn pending(stable_id: StableId, known_version: Version) -> Self {
        Self::Pending {
            stable_id,
            known_version,
        }
    }

    /// 以请求结果推进状态；只有 `Pending` 可以被推进
    pub fn complete(self, result: DomainResult<UpdateReply<P>>) -> DomainResult<Self> {
        let Self::Pending {
            stable_id,
            known_version,
        } = self
        else {
            return Err(DomainError::invalid_state("update already settled"));
        };

        Ok(match result {
            Ok(UpdateReply::Updated(record)) if record.stable_id() != &stable_id => {
                Self::Failed(DomainError::TypeMismatch {
                    expected: stable_id.to_string(),
                    found: record.stable_id().to_string(),
                })
            }
            Ok(UpdateReply::Updated(record)) if record.version() <= known_version => {
                Self::Failed(DomainError::invalid_state(format!(
                    "server accepted {stable_id} without advancing {known_version}"
                )))
            }
            Ok(UpdateReply::Updated(record)) => Self::Accepted(record),
            Ok(UpdateReply::Conflict(conflict)) => Self::Conflicted(conflict),
            Err(err) => Self::Failed(err),
        })
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equipment::Ccu;
    use crate::identity::DisplayId;

    fn ccu(version: u64, model: &str) -> Record<Ccu> {
        Record::new(
            StableId::from("u1"),
            DisplayId::from("CCU 1"),
            Version::from_value(version),
            Ccu {
                model: model.into(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn conflict_reply_is_recognised_by_error_tag() {
        let json = serde_json::json!({
            "error": "Conflict",
            "currentVersion": 3,
            "clientVersion": 2,
            "serverData": { "stableId": "u1", "displayId": "CCU 1", "version": 3, "model": "HDCU" }
        });
        match UpdateReply::<Ccu>::from_json(json).unwrap() {
            UpdateReply::Conflict(c) => {
                assert_eq!(c.current_version, Version::from_value(3));
                assert_eq!(c.client_version, Version::from_value(2));
                assert_eq!(c.server_data.payload().model, "HDCU");
            }
            other => panic!("unexpected {other:?}"),
        }

        let updated = serde_json::json!({ "stableId": "u1", "displayId": "CCU 1", "version": 4, "model": "HDCU" });
        assert!(matches!(
            UpdateReply::<Ccu>::from_json(updated).unwrap(),
            UpdateReply::Updated(_)
        ));
    }

    #[test]
    fn conflict_reply_wire_shape() {
        let reply = UpdateReply::Conflict(Conflict {
            current_version: Version::from_value(3),
            client_version: Version::from_value(2),
            server_data: ccu(3, "HDCU"),
        });
        let json = reply.to_json().unwrap();
        assert_eq!(json["error"], "Conflict");
        assert_eq!(json["currentVersion"], 3);
        assert_eq!(json["serverData"]["stableId"], "u1");
        assert_eq!(UpdateReply::<Ccu>::from_json(json).unwrap(), reply);
    }

    #[test]
    fn state_machine_transitions_once() {
        let state = UpdateState::<Ccu>::pending(StableId::from("u1"), Version::from_value(2));
        assert!(state.is_pending());
        let accepted = state
            .complete(Ok(UpdateReply::Updated(ccu(3, "HDCU"))))
            .unwrap();
        assert!(matches!(accepted, UpdateState::Accepted(ref r) if r.version() == Version::from_value(3)));

        let err = accepted
            .complete(Ok(UpdateReply::Updated(ccu(4, "HDCU"))))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState { .. }));
    }

    #[test]
    fn accepted_reply_must_advance_version() {
        let state = UpdateState::<Ccu>::pending(StableId::from("u1"), Version::from_value(2));
        let failed = state.complete(Ok(UpdateReply::Updated(ccu(2, "HDCU")))).unwrap();
        assert!(matches!(failed, UpdateState::Failed(DomainError::InvalidState { .. })));
    }

    #[test]
    fn resolution_choices() {
        let conflict = Conflict {
            current_version: Version::from_value(3),
            client_version: Version::from_value(2),
            server_data: ccu(3, "server"),
        };
        let edit = ccu(2, "mine").to_submission();

        match conflict.clone().resolve(Resolution::AdoptServer, edit.clone()) {
            ResolutionStep::Replace(r) => assert_eq!(r.payload().model, "server"),
            other => panic!("unexpected {other:?}"),
        }
        match conflict.resolve(Resolution::Retry, edit) {
            ResolutionStep::Resubmit {
                known_version,
                submission,
                ..
            } => {
                assert_eq!(known_version, Version::from_value(3));
                assert_eq!(submission.payload.model, "mine");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
