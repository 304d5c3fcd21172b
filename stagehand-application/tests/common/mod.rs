#![allow(dead_code)]

use stagehand_application::{EntityStore, InMemoryBackend, SessionContext, SyncConfig, SyncEngine};
use stagehand_domain::entity::Entity;
use stagehand_domain::equipment::Monitor;
use stagehand_domain::identity::ProductionId;
use std::sync::Arc;
use std::time::Duration;

pub const PRODUCTION: &str = "prod-1";

pub fn session(user: &str) -> SessionContext {
    SessionContext::builder()
        .production_id(PRODUCTION)
        .user_id(user)
        .user_name(user.to_uppercase())
        .build()
}

pub fn production() -> ProductionId {
    ProductionId::from(PRODUCTION)
}

pub fn monitor(model: &str) -> Monitor {
    Monitor {
        model: model.into(),
        ..Default::default()
    }
}

/// 一个完整客户端：会话 + monitor store + 已启动的同步引擎
pub struct Client {
    pub session: SessionContext,
    pub store: Arc<EntityStore<Monitor>>,
    pub engine: Arc<SyncEngine>,
}

pub async fn client(backend: &InMemoryBackend, user: &str, config: &SyncConfig) -> anyhow::Result<Client> {
    let session = session(user);
    let store = Arc::new(EntityStore::<Monitor>::new(
        &session,
        Arc::new(backend.client(&session)),
        config,
    ));
    store.load().await?;

    let engine = Arc::new(
        SyncEngine::builder()
            .channel(Arc::new(backend.channel()))
            .production_id(production())
            .build(),
    );
    engine.register(store.clone())?;

    Ok(Client {
        session,
        store,
        engine,
    })
}

/// 轮询直到条件成立或超时
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if cond() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

pub fn labels(store: &EntityStore<Monitor>) -> Vec<String> {
    store
        .snapshot()
        .sorted_by_display_number()
        .iter()
        .map(|r| r.display_id().to_string())
        .collect()
}
