//! 设备 REST 网关协议
//!
use crate::conflict::UpdateReply;
use crate::entity::{Record, Submission};
use crate::error::DomainResult;
use crate::identity::{ProductionId, StableId};
use crate::payload::Payload;
use crate::value_object::Version;
use async_trait::async_trait;
use std::sync::Arc;

/// 某一设备类型的远端网关
#[async_trait]
pub trait EquipmentGateway<P: Payload>: Send + Sync {
    /// `GET`：该制作下的全部记录（服务端顺序）
    async fn fetch_all(&self, production_id: &ProductionId) -> DomainResult<Vec<Record<P>>>;

    /// `POST`：标签冲突时返回 `DuplicateId`
    async fn create(
        &self,
        production_id: &ProductionId,
        submission: &Submission<P>,
    ) -> DomainResult<Record<P>>;

    /// `PUT`：`known_version` 与服务端不一致时返回冲突对象而不是错误
    async fn update(
        &self,
        production_id: &ProductionId,
        stable_id: &StableId,
        submission: &Submission<P>,
        known_version: Version,
    ) -> DomainResult<UpdateReply<P>>;

    /// `DELETE`
    async fn delete(&self, production_id: &ProductionId, stable_id: &StableId) -> DomainResult<()>;
}

#[async_trait]
impl<P, T> EquipmentGateway<P> for Arc<T>
where
    P: Payload,
    T: EquipmentGateway<P> + ?Sized,
{
    async fn fetch_all(&self, production_id: &ProductionId) -> DomainResult<Vec<Record<P>>> {
        (**self).fetch_all(production_id).await
    }

    async fn create(
        &self,
        production_id: &ProductionId,
        submission: &Submission<P>,
    ) -> DomainResult<Record<P>> {
        (**self).create(production_id, submission).await
    }

    async fn update(
        &self,
        production_id: &ProductionId,
        stable_id: &StableId,
        submission: &Submission<P>,
        known_version: Version,
    ) -> DomainResult<UpdateReply<P>> {
        (**self)
            .update(production_id, stable_id, submission, known_version)
            .await
    }

    async fn delete(&self, production_id: &ProductionId, stable_id: &StableId) -> DomainResult<()> {
        (**self).delete(production_id, stable_id).await
    }
}
