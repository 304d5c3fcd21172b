//! 同步引擎（SyncEngine）
//!
//! 订阅一个制作的推送通道，并把每条消息交给其 `entityType` 对应的 store：
//! - 每种设备类型至多注册一个 store，重复注册报错；
//! - 未注册的类型直接忽略；
//! - 通道报告丢失消息（`Lagged`）时，所有 store 重新拉取；
//! - 以 `EngineHandle` 关闭与等待后台任务。
//!
use crate::error::AppError;
use crate::store::EntityStore;
use async_trait::async_trait;
use bon::Builder;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_core::stream::BoxStream;
use futures_util::{StreamExt, future};
use stagehand_domain::error::{DomainError, DomainResult};
use stagehand_domain::event::ChangeMessage;
use stagehand_domain::identity::ProductionId;
use stagehand_domain::payload::Payload;
use stagehand_domain::reconcile::ReconcileOutcome;
use stagehand_domain::remote::EventChannel;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 可接收推送消息的目标（类型擦除后的 store）
#[async_trait]
pub trait ChangeSink: Send + Sync {
    /// 路由键
    fn entity_type(&self) -> &'static str;

    /// 解码并应用一条消息
    fn accept(&self, message: &ChangeMessage) -> DomainResult<ReconcileOutcome>;

    /// 重新拉取整份列表
    async fn resync(&self) -> DomainResult<usize>;
}

#[async_trait]
impl<P: Payload> ChangeSink for EntityStore<P> {
    fn entity_type(&self) -> &'static str {
        P::TYPE
    }

    fn accept(&self, message: &ChangeMessage) -> DomainResult<ReconcileOutcome> {
        let event = message.decode::<P>()?;
        Ok(self.apply(event))
    }

    async fn resync(&self) -> DomainResult<usize> {
        self.load().await
    }
}

#[derive(Builder)]
pub struct SyncEngine {
    channel: Arc<dyn EventChannel>,
    #[builder(into)]
    production_id: ProductionId,
    #[builder(skip)]
    sinks: DashMap<&'static str, Arc<dyn ChangeSink>>,
}

impl SyncEngine {
    pub fn production_id(&self) -> &ProductionId {
        &self.production_id
    }

    /// 注册一个 store；同一 `entityType` 只能注册一次
    pub fn register(&self, sink: Arc<dyn ChangeSink>) -> Result<(), AppError> {
        let entity_type = sink.entity_type();
        match self.sinks.entry(entity_type) {
            Entry::Occupied(_) => Err(AppError::AlreadyRegistered { entity_type }),
            Entry::Vacant(slot) => {
                slot.insert(sink);
                Ok(())
            }
        }
    }

    /// 路由一条消息；未注册的类型返回 `None`
    pub fn deliver(&self, message: &ChangeMessage) -> Option<DomainResult<ReconcileOutcome>> {
        if message.production_id() != &self.production_id {
            return None;
        }
        let sink = self.sinks.get(message.entity_type()).map(|s| s.clone())?;
        Some(sink.accept(message))
    }

    /// 所有 store 重新拉取，返回失败数
    pub async fn resync_all(&self) -> usize {
        let sinks: Vec<Arc<dyn ChangeSink>> = self.sinks.iter().map(|s| s.value().clone()).collect();
        let results = future::join_all(sinks.iter().map(|s| s.resync())).await;
        results.iter().filter(|r| r.is_err()).count()
    }

    /// 建立订阅后在后台运行；返回时订阅已生效
    pub async fn start(self: Arc<Self>) -> EngineHandle {
        let token = CancellationToken::new();
        let stream = self.channel.subscribe(&self.production_id).await;
        let task = tokio::spawn(Self::run(self.clone(), stream, token.clone()));

        EngineHandle {
            token,
            tasks: vec![task],
        }
    }

    async fn run(
        self: Arc<Self>,
        mut stream: BoxStream<'static, DomainResult<ChangeMessage>>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                next = stream.next() => match next {
                    Some(Ok(message)) => self.route(&message),
                    Some(Err(DomainError::Lagged { skipped })) => {
                        tracing::warn!(production = %self.production_id, skipped, "event channel lagged; resyncing");
                        let failed = self.resync_all().await;
                        if failed > 0 {
                            tracing::warn!(production = %self.production_id, failed, "resync incomplete");
                        }
                    }
                    Some(Err(err)) => {
                        tracing::warn!(production = %self.production_id, error = %err, "event channel error");
                    }
                    None => break,
                },
            }
        }
        tracing::debug!(production = %self.production_id, "sync engine stopped");
    }

    fn route(&self, message: &ChangeMessage) {
        match self.deliver(message) {
            Some(Ok(_)) => {}
            Some(Err(err)) => tracing::warn!(
                entity_type = message.entity_type(),
                kind = ?message.kind(),
                error = %err,
                "undecodable change message"
            ),
            None => tracing::debug!(
                entity_type = message.entity_type(),
                "no store registered; message ignored"
            ),
        }
    }
}

/// 引擎运行句柄：用于关闭与等待后台任务
pub struct EngineHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub async fn join(mut self) {
        let tasks = std::mem::take(&mut self.tasks);

        for t in tasks {
            let _ = t.await;
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
