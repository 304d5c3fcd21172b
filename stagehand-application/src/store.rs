//! 单个设备类型的实体存储（EntityStore）
//!
//! 每个用户操作都是同一个三步流程：
//! 1. 在缓存当前快照上 `plan`（校验、乐观写入）；
//! 2. 通过网关发出请求并等待；
//! 3. 在缓存**此刻**的快照上 `settle`（确认、提升或条件回滚）。
//!
//! 推送事件经 `apply` 走同一个缓存的 `transition`，两条路径共享一份权威状态。
//!
use crate::config::SyncConfig;
use crate::context::SessionContext;
use crate::reorder::{ReorderReport, ReorderTransaction};
use stagehand_domain::cache::{Collision, LocalCache, Snapshot};
use stagehand_domain::conflict::{Conflict, Resolution, ResolutionStep};
use stagehand_domain::entity::{Draft, Entity, Record, Submission};
use stagehand_domain::error::{DomainError, DomainResult};
use stagehand_domain::event::ChangeEvent;
use stagehand_domain::identity::{Scope, StableId};
use stagehand_domain::mutation::{
    Command, Planner, Request, Response, Settled, UpdateOutcome, WritePolicy,
};
use stagehand_domain::payload::Payload;
use stagehand_domain::reconcile::{ReconcileOutcome, Reconciler};
use stagehand_domain::remote::EquipmentGateway;
use stagehand_domain::reorder::{ReorderPlan, plan_move, plan_renumber};
use stagehand_domain::value_object::Version;
use std::sync::Arc;
use tokio::sync::watch;

pub struct EntityStore<P: Payload> {
    cache: LocalCache<P>,
    gateway: Arc<dyn EquipmentGateway<P>>,
    planner: Planner,
    reconciler: Reconciler,
    create_policy: WritePolicy,
    update_policy: WritePolicy,
    reorder_concurrency: usize,
}

impl<P: Payload> EntityStore<P> {
    pub fn new(
        session: &SessionContext,
        gateway: Arc<dyn EquipmentGateway<P>>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            cache: LocalCache::new(Scope::of::<P>(session.production_id().clone())),
            gateway,
            planner: Planner::new(config.template_for::<P>()),
            reconciler: Reconciler::new(Some(session.user_id().clone())),
            create_policy: config.create_policy,
            update_policy: config.update_policy,
            reorder_concurrency: config.reorder_concurrency.max(1),
        }
    }

    pub fn scope(&self) -> &Scope {
        self.cache.scope()
    }

    /// 当前快照（插入顺序）
    pub fn snapshot(&self) -> Arc<Snapshot<P>> {
        self.cache.get()
    }

    /// 渲染方订阅整份快照
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot<P>>> {
        self.cache.subscribe()
    }

    /// 标签重复的警告状态
    pub fn collisions(&self) -> Vec<Collision> {
        self.cache.get().display_collisions()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub(crate) fn cache(&self) -> &LocalCache<P> {
        &self.cache
    }

    pub(crate) fn gateway(&self) -> &Arc<dyn EquipmentGateway<P>> {
        &self.gateway
    }

    pub(crate) fn reorder_concurrency(&self) -> usize {
        self.reorder_concurrency
    }

    /// 批量拉取并整体替换缓存；失败只记日志并返回错误，缓存保持原样
    #[tracing::instrument(level = "debug", skip_all, fields(scope = %self.scope()))]
    pub async fn load(&self) -> DomainResult<usize> {
        match self.gateway.fetch_all(self.scope().production_id()).await {
            Ok(records) => {
                let count = records.len();
                self.cache.replace_all(records);
                tracing::debug!(count, "cache replaced from server");
                Ok(count)
            }
            Err(err) => {
                tracing::warn!(error = %err, "bulk fetch failed");
                Err(err)
            }
        }
    }

    pub async fn create(&self, draft: Draft<P>) -> DomainResult<Record<P>> {
        self.create_with(draft, self.create_policy).await
    }

    #[tracing::instrument(skip_all, fields(scope = %self.scope(), policy = ?policy))]
    pub async fn create_with(&self, draft: Draft<P>, policy: WritePolicy) -> DomainResult<Record<P>> {
        match self.execute(Command::Create { draft, policy }).await? {
            Settled::Created(record) => Ok(record),
            other => Err(unexpected(other)),
        }
    }

    pub async fn update(
        &self,
        stable_id: &StableId,
        edit: Draft<P>,
        known_version: Version,
    ) -> DomainResult<UpdateOutcome<P>> {
        self.update_with(stable_id, edit, known_version, self.update_policy)
            .await
    }

    #[tracing::instrument(
        skip_all,
        fields(scope = %self.scope(), stable_id = %stable_id, known_version = %known_version, policy = ?policy)
    )]
    pub async fn update_with(
        &self,
        stable_id: &StableId,
        edit: Draft<P>,
        known_version: Version,
        policy: WritePolicy,
    ) -> DomainResult<UpdateOutcome<P>> {
        let command = Command::Update {
            stable_id: stable_id.clone(),
            edit,
            known_version,
            policy,
        };
        match self.execute(command).await? {
            Settled::Updated(outcome) => Ok(outcome),
            other => Err(unexpected(other)),
        }
    }

    /// 用户对冲突做出选择：采用服务端数据，或以服务端版本重试本地编辑
    #[tracing::instrument(skip_all, fields(scope = %self.scope(), stable_id = %conflict.stable_id(), resolution = ?resolution))]
    pub async fn resolve_conflict(
        &self,
        conflict: Conflict<P>,
        resolution: Resolution,
        edit: Submission<P>,
    ) -> DomainResult<UpdateOutcome<P>> {
        match conflict.resolve(resolution, edit) {
            ResolutionStep::Replace(server_data) => {
                // 期间已被删除或被更新的版本覆盖时保持缓存不变
                let adopted = server_data.clone();
                let applied = self
                    .cache
                    .transition(|snap| match snap.refreshed(server_data) {
                        Some(next) => (Some(next), true),
                        None => (None, false),
                    });
                tracing::debug!(applied, "server copy adopted");
                Ok(UpdateOutcome::Accepted(adopted))
            }
            ResolutionStep::Resubmit {
                stable_id,
                submission,
                known_version,
            } => {
                let edit = Draft::new(submission.payload).with_display_id(submission.display_id);
                self.update(&stable_id, edit, known_version).await
            }
        }
    }

    /// 删除：调用方负责确认意图；始终等待服务端
    #[tracing::instrument(skip_all, fields(scope = %self.scope(), stable_id = %stable_id))]
    pub async fn delete(&self, stable_id: &StableId) -> DomainResult<()> {
        let command = Command::Delete {
            stable_id: stable_id.clone(),
        };
        match self.execute(command).await? {
            Settled::Deleted(_) => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// 复制：剥离标识与版本、分配新标签后按创建策略提交
    #[tracing::instrument(skip_all, fields(scope = %self.scope(), stable_id = %stable_id))]
    pub async fn duplicate(&self, stable_id: &StableId) -> DomainResult<Record<P>> {
        let command = Command::Duplicate {
            stable_id: stable_id.clone(),
            policy: self.create_policy,
        };
        match self.execute(command).await? {
            Settled::Created(record) => Ok(record),
            other => Err(unexpected(other)),
        }
    }

    /// 应用一条推送事件
    pub fn apply(&self, event: ChangeEvent<P>) -> ReconcileOutcome {
        let kind = event.kind;
        let (received_at, queued_ms) = (event.received_at, event.age().num_milliseconds());
        let outcome = self.reconciler.apply(&self.cache, event);
        tracing::debug!(
            scope = %self.scope(),
            ?kind,
            %received_at,
            queued_ms,
            ?outcome,
            "change event reconciled"
        );
        outcome
    }

    /// 把可见顺序（按标签数字排序）中 `from` 位置的记录拖到 `to`
    #[tracing::instrument(skip_all, fields(scope = %self.scope(), from = from, to = to))]
    pub async fn reorder(&self, from: usize, to: usize) -> DomainResult<ReorderReport> {
        let plan = plan_move(self.visible_order(), from, to, self.planner.template())?;
        self.commit_plan(plan).await
    }

    /// 不移动任何记录，仅按当前可见顺序重新连续编号
    #[tracing::instrument(skip_all, fields(scope = %self.scope()))]
    pub async fn renumber(&self) -> DomainResult<ReorderReport> {
        let plan = plan_renumber(self.visible_order(), self.planner.template())?;
        self.commit_plan(plan).await
    }

    async fn commit_plan(&self, plan: ReorderPlan<P>) -> DomainResult<ReorderReport> {
        ReorderTransaction::new(self, plan).commit().await
    }

    fn visible_order(&self) -> Vec<Record<P>> {
        self.cache
            .get()
            .sorted_by_display_number()
            .into_iter()
            .cloned()
            .collect()
    }

    async fn execute(&self, command: Command<P>) -> DomainResult<Settled<P>> {
        let pending = self.cache.transition(|snap| match self.planner.plan(snap, command) {
            Ok(transition) => (transition.snapshot, Ok(transition.pending)),
            Err(err) => (None, Err(err)),
        });
        let pending = match pending {
            Ok(pending) => pending,
            Err(err) => {
                tracing::warn!(error = %err, "mutation rejected before sending");
                return Err(err);
            }
        };

        let response = self.send(pending.request()).await;
        let settled = self.cache.transition(|snap| pending.settle(snap, response));
        match &settled {
            Ok(outcome) => tracing::debug!(?outcome, "mutation settled"),
            Err(err) => tracing::warn!(error = %err, "mutation failed"),
        }
        settled
    }

    async fn send(&self, request: &Request<P>) -> DomainResult<Response<P>> {
        let production_id = self.scope().production_id();
        match request {
            Request::Create(submission) => self
                .gateway
                .create(production_id, submission)
                .await
                .map(Response::Created),
            Request::Update {
                stable_id,
                submission,
                known_version,
            } => self
                .gateway
                .update(production_id, stable_id, submission, *known_version)
                .await
                .map(Response::Updated),
            Request::Delete { stable_id } => self
                .gateway
                .delete(production_id, stable_id)
                .await
                .map(|()| Response::Deleted),
        }
    }
}

fn unexpected<P: Payload>(settled: Settled<P>) -> DomainError {
    DomainError::invalid_state(format!("unexpected settlement: {settled:?}"))
}
