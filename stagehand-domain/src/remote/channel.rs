//! 推送通道协议
//!
use crate::error::DomainResult;
use crate::event::ChangeMessage;
use crate::identity::ProductionId;
use async_trait::async_trait;
use futures_core::stream::BoxStream;

/// 按制作作用域的变更推送通道
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// 广播给该制作的全部订阅者（包括发起者本人）
    async fn publish(&self, message: &ChangeMessage) -> DomainResult<()>;

    /// 返回 'static 生命周期的消息流；丢失消息时产出 `DomainError::Lagged`
    async fn subscribe(
        &self,
        production_id: &ProductionId,
    ) -> BoxStream<'static, DomainResult<ChangeMessage>>;
}
