//! 内存版推送通道（InMemoryEventChannel）
//!
//! 单一 `broadcast` 缓冲承载所有制作的消息，订阅时按 `productionId` 过滤。
//! 无订阅者时发送被忽略；订阅者落后超过缓冲容量时产出 `Lagged`。
//!
use crate::error::{DomainError, DomainResult};
use crate::event::ChangeMessage;
use crate::identity::ProductionId;
use crate::remote::EventChannel;
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use futures_util::{StreamExt, future};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

#[derive(Clone)]
pub struct InMemoryEventChannel {
    tx: broadcast::Sender<ChangeMessage>,
}

impl InMemoryEventChannel {
    /// `capacity` 为广播缓冲区容量
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl EventChannel for InMemoryEventChannel {
    async fn publish(&self, message: &ChangeMessage) -> DomainResult<()> {
        // 无订阅者不是错误
        let _ = self.tx.send(message.clone());
        Ok(())
    }

    async fn subscribe(
        &self,
        production_id: &ProductionId,
    ) -> BoxStream<'static, DomainResult<ChangeMessage>> {
        let production_id = production_id.clone();
        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(move |item| {
            future::ready(match item {
                Ok(message) if message.production_id() == &production_id => Some(Ok(message)),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    Some(Err(DomainError::Lagged { skipped }))
                }
            })
        });
        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangeKind;
    use crate::identity::StableId;

    fn deleted(production: &str, id: &str) -> ChangeMessage {
        ChangeMessage::builder()
            .production_id(ProductionId::from(production))
            .entity_type("camera")
            .kind(ChangeKind::Deleted)
            .entity_id(StableId::from(id))
            .build()
    }

    #[tokio::test]
    async fn subscribers_only_see_their_production() {
        let channel = InMemoryEventChannel::new(16);
        let mut p1 = channel.subscribe(&ProductionId::from("p1")).await;
        let mut p2 = channel.subscribe(&ProductionId::from("p2")).await;
        assert_eq!(channel.subscriber_count(), 2);

        channel.publish(&deleted("p2", "x")).await.unwrap();
        channel.publish(&deleted("p1", "a")).await.unwrap();

        let got = p1.next().await.unwrap().unwrap();
        assert_eq!(got.production_id().as_str(), "p1");
        let got = p2.next().await.unwrap().unwrap();
        assert_eq!(got.production_id().as_str(), "p2");
    }

    #[tokio::test]
    async fn slow_subscriber_observes_lag() {
        let channel = InMemoryEventChannel::new(2);
        let mut sub = channel.subscribe(&ProductionId::from("p1")).await;
        for i in 0..5 {
            channel.publish(&deleted("p1", &format!("c{i}"))).await.unwrap();
        }
        match sub.next().await.unwrap() {
            Err(DomainError::Lagged { skipped }) => assert_eq!(skipped, 3),
            other => panic!("unexpected {other:?}"),
        }
        assert!(sub.next().await.unwrap().is_ok());
    }
}
