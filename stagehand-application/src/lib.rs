//! 对账引擎的异步编排层（stagehand-application）
//!
//! 把 `stagehand-domain` 的纯状态机接到远端协作者上：
//! - `EntityStore`：按“计划 → 请求 → 结算”驱动单个设备类型的缓存；
//! - `ReorderTransaction`：挂起对账、并发提交改名、最终整体重新拉取；
//! - `SyncEngine`：订阅制作的推送通道，按 `entityType` 路由到对应的 store；
//! - `InMemoryBackend`：内存参考服务端，供测试与示例使用。
//!
pub mod config;
pub mod context;
pub mod error;
pub mod inmemory_backend;
pub mod reorder;
pub mod store;
pub mod sync_engine;

pub use config::SyncConfig;
pub use context::SessionContext;
pub use error::AppError;
pub use inmemory_backend::InMemoryBackend;
pub use reorder::{ReorderReport, ReorderTransaction};
pub use store::EntityStore;
pub use sync_engine::{ChangeSink, EngineHandle, SyncEngine};
