//! 内存参考服务端（InMemoryBackend）
//!
//! 按 `(productionId, entityType)` 分表保存记录，行为与真实服务端约定一致：
//! - 创建时分配 `StableId`、版本从 1 开始，标签重复返回 `DuplicateId`；
//! - 更新要求 `known_version` 等于当前版本，否则返回冲突对象，接受后版本 + 1；
//! - 每次被接受的写入都广播给该制作的全部订阅者（包括发起者本人）；
//! - 记录每个请求，并可注入一次性故障（网络失败或强制冲突）。
//!
//! 每个会话通过 `client()` 取得带身份的网关，身份写入广播的 `originUserId`。
//!
use crate::config::SyncConfig;
use crate::context::SessionContext;
use async_trait::async_trait;
use dashmap::DashMap;
use stagehand_domain::conflict::{Conflict, UpdateReply};
use stagehand_domain::entity::{Entity, Record, Submission};
use stagehand_domain::error::{DomainError, DomainResult};
use stagehand_domain::event::{ChangeKind, ChangeMessage, Origin};
use stagehand_domain::identity::{DisplayId, ProductionId, StableId, UserId};
use stagehand_domain::payload::Payload;
use stagehand_domain::remote::{EquipmentGateway, EventChannel, InMemoryEventChannel};
use stagehand_domain::value_object::Version;
use std::sync::Arc;
use tokio::sync::Mutex;

/// 请求方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// 一条请求记录
#[derive(Debug, Clone, PartialEq)]
pub struct RequestLog {
    pub method: Method,
    pub entity_type: &'static str,
    pub user_id: Option<UserId>,
    pub stable_id: Option<StableId>,
    pub display_id: Option<DisplayId>,
    pub known_version: Option<Version>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// 请求失败，服务端状态不变
    Network,
    /// 处理前服务端版本被静默推进，更新因此冲突
    Conflict,
}

/// 一次性故障：命中第一个匹配的请求后失效
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    method: Method,
    stable_id: Option<StableId>,
    kind: FaultKind,
}

impl Fault {
    pub fn network(method: Method) -> Self {
        Self {
            method,
            stable_id: None,
            kind: FaultKind::Network,
        }
    }

    pub fn conflict() -> Self {
        Self {
            method: Method::Put,
            stable_id: None,
            kind: FaultKind::Conflict,
        }
    }

    /// 只对某条记录生效
    pub fn on(mut self, stable_id: impl Into<StableId>) -> Self {
        self.stable_id = Some(stable_id.into());
        self
    }

    fn matches(&self, method: Method, stable_id: Option<&StableId>) -> bool {
        self.method == method
            && match &self.stable_id {
                Some(target) => stable_id == Some(target),
                None => true,
            }
    }
}

type TableKey = (ProductionId, &'static str);

#[derive(Debug, Clone)]
struct Row {
    stable_id: StableId,
    display_id: DisplayId,
    body: serde_json::Value,
}

impl Row {
    fn of<P: Payload>(record: &Record<P>) -> DomainResult<Self> {
        Ok(Self {
            stable_id: record.stable_id().clone(),
            display_id: record.display_id().clone(),
            body: serde_json::to_value(record)?,
        })
    }

    fn record<P: Payload>(&self) -> DomainResult<Record<P>> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

struct Inner {
    tables: DashMap<TableKey, Vec<Row>>,
    channel: InMemoryEventChannel,
    log: Mutex<Vec<RequestLog>>,
    faults: Mutex<Vec<Fault>>,
}

#[derive(Clone)]
pub struct InMemoryBackend {
    inner: Arc<Inner>,
}

impl InMemoryBackend {
    /// `capacity` 为推送通道的广播缓冲容量
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: DashMap::new(),
                channel: InMemoryEventChannel::new(capacity),
                log: Mutex::new(Vec::new()),
                faults: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.channel_capacity)
    }

    /// 推送通道（所有会话共享）
    pub fn channel(&self) -> InMemoryEventChannel {
        self.inner.channel.clone()
    }

    /// 以某个会话身份访问的网关
    pub fn client(&self, session: &SessionContext) -> BackendClient {
        BackendClient {
            backend: self.clone(),
            origin: session.origin(),
        }
    }

    /// 直接写入初始数据（不广播、不记录请求），按顺序编号 `前缀 + n`
    pub fn seed<P: Payload>(
        &self,
        production_id: &ProductionId,
        payloads: impl IntoIterator<Item = P>,
    ) -> DomainResult<Vec<Record<P>>> {
        let mut table = self
            .inner
            .tables
            .entry((production_id.clone(), P::TYPE))
            .or_default();
        let start = table.len();
        payloads
            .into_iter()
            .enumerate()
            .map(|(i, payload)| {
                let record = Record::new(
                    new_stable_id(),
                    DisplayId::new(format!("{}{}", P::DISPLAY_PREFIX, start + i + 1)),
                    Version::initial(),
                    payload,
                );
                table.push(Row::of(&record)?);
                Ok(record)
            })
            .collect()
    }

    /// 服务端当前数据（不记录请求）
    pub fn records<P: Payload>(&self, production_id: &ProductionId) -> DomainResult<Vec<Record<P>>> {
        match self.inner.tables.get(&(production_id.clone(), P::TYPE)) {
            Some(table) => table.iter().map(Row::record).collect(),
            None => Ok(Vec::new()),
        }
    }

    pub async fn inject(&self, fault: Fault) {
        self.inner.faults.lock().await.push(fault);
    }

    pub async fn requests(&self) -> Vec<RequestLog> {
        self.inner.log.lock().await.clone()
    }

    pub async fn clear_requests(&self) {
        self.inner.log.lock().await.clear();
    }

    async fn begin(&self, entry: RequestLog) -> Option<FaultKind> {
        let (method, stable_id) = (entry.method, entry.stable_id.clone());
        self.inner.log.lock().await.push(entry);

        let mut faults = self.inner.faults.lock().await;
        let hit = faults
            .iter()
            .position(|f| f.matches(method, stable_id.as_ref()))?;
        Some(faults.remove(hit).kind)
    }

    async fn broadcast(&self, message: DomainResult<ChangeMessage>) -> DomainResult<()> {
        self.inner.channel.publish(&message?).await
    }
}

/// 带会话身份的网关
#[derive(Clone)]
pub struct BackendClient {
    backend: InMemoryBackend,
    origin: Origin,
}

impl BackendClient {
    fn log(
        &self,
        method: Method,
        entity_type: &'static str,
        stable_id: Option<&StableId>,
        display_id: Option<&DisplayId>,
        known_version: Option<Version>,
    ) -> RequestLog {
        RequestLog {
            method,
            entity_type,
            user_id: self.origin.user_id.clone(),
            stable_id: stable_id.cloned(),
            display_id: display_id.cloned(),
            known_version,
        }
    }
}

fn new_stable_id() -> StableId {
    StableId::new(uuid::Uuid::new_v4().to_string())
}

fn injected(method: Method) -> DomainError {
    DomainError::network(format!("injected failure on {method:?}"))
}

#[async_trait]
impl<P: Payload> EquipmentGateway<P> for BackendClient {
    async fn fetch_all(&self, production_id: &ProductionId) -> DomainResult<Vec<Record<P>>> {
        let entry = self.log(Method::Get, P::TYPE, None, None, None);
        if self.backend.begin(entry).await.is_some() {
            return Err(injected(Method::Get));
        }
        self.backend.records(production_id)
    }

    async fn create(
        &self,
        production_id: &ProductionId,
        submission: &Submission<P>,
    ) -> DomainResult<Record<P>> {
        let entry = self.log(Method::Post, P::TYPE, None, Some(&submission.display_id), None);
        if self.backend.begin(entry).await.is_some() {
            return Err(injected(Method::Post));
        }

        let record = {
            let mut table = self
                .backend
                .inner
                .tables
                .entry((production_id.clone(), P::TYPE))
                .or_default();
            if table.iter().any(|row| row.display_id == submission.display_id) {
                return Err(DomainError::DuplicateId {
                    display_id: submission.display_id.to_string(),
                });
            }
            let record = Record::new(
                new_stable_id(),
                submission.display_id.clone(),
                Version::initial(),
                submission.payload.clone(),
            );
            table.push(Row::of(&record)?);
            record
        };

        self.backend
            .broadcast(ChangeMessage::for_record(
                production_id.clone(),
                ChangeKind::Created,
                &record,
                self.origin.clone(),
            ))
            .await?;
        Ok(record)
    }

    async fn update(
        &self,
        production_id: &ProductionId,
        stable_id: &StableId,
        submission: &Submission<P>,
        known_version: Version,
    ) -> DomainResult<UpdateReply<P>> {
        let entry = self.log(
            Method::Put,
            P::TYPE,
            Some(stable_id),
            Some(&submission.display_id),
            Some(known_version),
        );
        let fault = self.backend.begin(entry).await;
        if fault == Some(FaultKind::Network) {
            return Err(injected(Method::Put));
        }

        let reply = {
            let mut table = self
                .backend
                .inner
                .tables
                .get_mut(&(production_id.clone(), P::TYPE))
                .ok_or_else(|| DomainError::not_found(stable_id))?;
            let row = table
                .iter_mut()
                .find(|row| &row.stable_id == stable_id)
                .ok_or_else(|| DomainError::not_found(stable_id))?;

            let mut current: Record<P> = row.record()?;
            if fault == Some(FaultKind::Conflict) {
                current = Record::new(
                    current.stable_id().clone(),
                    current.display_id().clone(),
                    current.version().next(),
                    current.payload().clone(),
                );
                *row = Row::of(&current)?;
            }

            if current.version() != known_version {
                UpdateReply::Conflict(Conflict {
                    current_version: current.version(),
                    client_version: known_version,
                    server_data: current,
                })
            } else {
                let next = Record::new(
                    stable_id.clone(),
                    submission.display_id.clone(),
                    current.version().next(),
                    submission.payload.clone(),
                );
                *row = Row::of(&next)?;
                UpdateReply::Updated(next)
            }
        };

        if let UpdateReply::Updated(record) = &reply {
            self.backend
                .broadcast(ChangeMessage::for_record(
                    production_id.clone(),
                    ChangeKind::Updated,
                    record,
                    self.origin.clone(),
                ))
                .await?;
        }
        Ok(reply)
    }

    async fn delete(&self, production_id: &ProductionId, stable_id: &StableId) -> DomainResult<()> {
        let entry = self.log(Method::Delete, P::TYPE, Some(stable_id), None, None);
        if self.backend.begin(entry).await.is_some() {
            return Err(injected(Method::Delete));
        }

        let removed = {
            let mut table = self
                .backend
                .inner
                .tables
                .get_mut(&(production_id.clone(), P::TYPE))
                .ok_or_else(|| DomainError::not_found(stable_id))?;
            let at = table
                .iter()
                .position(|row| &row.stable_id == stable_id)
                .ok_or_else(|| DomainError::not_found(stable_id))?;
            table.remove(at)
        };

        let message = ChangeMessage::builder()
            .production_id(production_id.clone())
            .entity_type(P::TYPE)
            .kind(ChangeKind::Deleted)
            .entity_id(removed.stable_id)
            .display_id(removed.display_id)
            .maybe_origin_user_id(self.origin.user_id.clone())
            .maybe_origin_user_name(self.origin.user_name.clone())
            .build();
        self.backend.broadcast(Ok(message)).await
    }
}
