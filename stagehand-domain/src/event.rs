//! 推送通道上的变更通知
//!
//! 线上消息 `ChangeMessage` 与设备类型无关（实体为原始 JSON），按 `entityType` 路由后
//! 再解码为类型化的 `ChangeEvent<P>` 交给对账器。
//!
use crate::entity::Record;
use crate::error::{DomainError, DomainResult};
use crate::identity::{DisplayId, ProductionId, StableId, UserId};
use crate::payload::Payload;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 变更种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// 线上变更消息：`{entityType, kind, entity|entityId, originUserId, originUserName}`
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeMessage {
    production_id: ProductionId,
    #[builder(into)]
    entity_type: String,
    kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    entity: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    entity_id: Option<StableId>,
    /// 旧页面的删除通知只携带标签
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display_id: Option<DisplayId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin_user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin_user_name: Option<String>,
}

/// 事件发起者
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin {
    pub user_id: Option<UserId>,
    pub user_name: Option<String>,
}

/// 事件指向的实体
#[derive(Debug, Clone, PartialEq)]
pub enum Target<P> {
    /// 携带完整实体（创建/更新，或带实体的删除）
    Entity(Record<P>),
    /// 仅有引用（删除）；`stable_id` 缺失时才允许按标签回退
    Reference {
        stable_id: Option<StableId>,
        display_id: Option<DisplayId>,
    },
}

/// 类型化后的变更事件
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent<P> {
    pub kind: ChangeKind,
    pub target: Target<P>,
    pub origin: Origin,
    pub received_at: DateTime<Utc>,
}

impl<P> ChangeEvent<P> {
    /// 自收到起经过的时长
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.received_at)
    }
}

impl ChangeMessage {
    pub fn production_id(&self) -> &ProductionId {
        &self.production_id
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn origin_user_id(&self) -> Option<&UserId> {
        self.origin_user_id.as_ref()
    }

    pub fn origin_user_name(&self) -> Option<&str> {
        self.origin_user_name.as_deref()
    }

    /// 由一条实体记录构造创建/更新消息
    pub fn for_record<P: Payload>(
        production_id: ProductionId,
        kind: ChangeKind,
        record: &Record<P>,
        origin: Origin,
    ) -> DomainResult<Self> {
        Ok(Self::builder()
            .production_id(production_id)
            .entity_type(P::TYPE)
            .kind(kind)
            .entity(serde_json::to_value(record)?)
            .maybe_origin_user_id(origin.user_id)
            .maybe_origin_user_name(origin.user_name)
            .build())
    }

    /// 解码为某一设备类型的事件；类型不符时报 `TypeMismatch`
    pub fn decode<P: Payload>(&self) -> DomainResult<ChangeEvent<P>> {
        if self.entity_type != P::TYPE {
            return Err(DomainError::TypeMismatch {
                expected: P::TYPE.to_string(),
                found: self.entity_type.clone(),
            });
        }

        let target = match (self.kind, &self.entity) {
            (ChangeKind::Created | ChangeKind::Updated, Some(entity)) => {
                Target::Entity(serde_json::from_value(entity.clone())?)
            }
            (ChangeKind::Created | ChangeKind::Updated, None) => {
                return Err(DomainError::InvalidValue {
                    reason: format!("{:?} message without entity", self.kind),
                });
            }
            // 删除只需要标识；实体内容可能不完整，直接读取标识字段
            (ChangeKind::Deleted, entity) => Target::Reference {
                stable_id: self.entity_id.clone().or_else(|| {
                    entity
                        .as_ref()
                        .and_then(|e| e.get("stableId"))
                        .and_then(|v| v.as_str())
                        .map(StableId::from)
                }),
                display_id: self.display_id.clone().or_else(|| {
                    entity
                        .as_ref()
                        .and_then(|e| e.get("displayId"))
                        .and_then(|v| v.as_str())
                        .map(DisplayId::from)
                }),
            },
        };

        Ok(ChangeEvent {
            kind: self.kind,
            target,
            origin: Origin {
                user_id: self.origin_user_id.clone(),
                user_name: self.origin_user_name.clone(),
            },
            received_at: Utc::now(),
        })
    }
}
