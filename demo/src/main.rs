use stagehand_application::{EngineHandle, EntityStore, InMemoryBackend, SessionContext, SyncConfig, SyncEngine};
use stagehand_domain::conflict::Resolution;
use stagehand_domain::entity::{Draft, Entity};
use stagehand_domain::equipment::Monitor;
use stagehand_domain::identity::ProductionId;
use stagehand_domain::mutation::UpdateOutcome;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"{
    "create_policy": "optimistic",
    "update_policy": "await_server",
    "reorder_concurrency": 4
}"#;

struct Client {
    name: &'static str,
    store: Arc<EntityStore<Monitor>>,
    handle: EngineHandle,
}

async fn connect(
    backend: &InMemoryBackend,
    config: &SyncConfig,
    production: &ProductionId,
    user: &'static str,
) -> anyhow::Result<Client> {
    let session = SessionContext::builder()
        .production_id(production.clone())
        .user_id(user)
        .user_name(user)
        .build();
    let store = Arc::new(EntityStore::new(&session, Arc::new(backend.client(&session)), config));
    store.load().await?;

    let engine = Arc::new(
        SyncEngine::builder()
            .channel(Arc::new(backend.channel()))
            .production_id(production.clone())
            .build(),
    );
    engine.register(store.clone())?;
    let handle = engine.start().await;

    Ok(Client {
        name: user,
        store,
        handle,
    })
}

fn show(client: &Client) {
    let snapshot = client.store.snapshot();
    let rows: Vec<String> = snapshot
        .sorted_by_display_number()
        .iter()
        .map(|r| format!("{} [{} {}]", r.display_id(), r.payload().model, r.version()))
        .collect();
    tracing::info!(client = client.name, "{}", rows.join(", "));
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,stagehand_application=debug")),
        )
        .init();

    let config = SyncConfig::from_json(CONFIG)?;
    let backend = InMemoryBackend::from_config(&config);
    let production = ProductionId::from("festival-main-stage");
    backend.seed(
        &production,
        ["Sony PVM-X2400", "Flanders DM241", "Blackmagic SmartView"].map(|model| Monitor {
            model: model.into(),
            ..Default::default()
        }),
    )?;

    let alice = connect(&backend, &config, &production, "alice").await?;
    let bob = connect(&backend, &config, &production, "bob").await?;
    show(&alice);

    // alice 乐观创建，bob 经推送通道看到
    alice
        .store
        .create(Draft::new(Monitor {
            model: "TVLogic LVM-170A".into(),
            ..Default::default()
        }))
        .await?;
    settle().await;
    show(&bob);

    // 两人基于同一版本编辑 MON 1：后到者得到冲突
    let target = alice
        .store
        .snapshot()
        .sorted_by_display_number()
        .first()
        .map(|r| (*r).clone())
        .ok_or_else(|| anyhow::anyhow!("no monitors loaded"))?;
    bob.store
        .update(
            target.stable_id(),
            Draft::new(Monitor {
                location: Some("FOH".into()),
                ..target.payload().clone()
            }),
            target.version(),
        )
        .await?;
    let mut edit = target.to_submission();
    edit.payload.location = Some("Stage left".into());
    let outcome = alice
        .store
        .update(target.stable_id(), Draft::new(edit.payload.clone()), target.version())
        .await?;
    if let UpdateOutcome::Conflicted(conflict) = outcome {
        tracing::info!(
            current = %conflict.current_version,
            client = %conflict.client_version,
            "alice hit a conflict; retrying on top of the server version"
        );
        alice
            .store
            .resolve_conflict(conflict, Resolution::Retry, edit)
            .await?;
    }

    // alice 把最后一台拖到最前
    let last = alice.store.snapshot().len().saturating_sub(1);
    let report = alice.store.reorder(last, 0).await?;
    tracing::info!(renamed = report.renamed, total = report.total, "reorder committed");
    settle().await;
    show(&alice);
    show(&bob);

    for client in [alice, bob] {
        client.handle.shutdown();
        client.handle.join().await;
    }
    Ok(())
}
