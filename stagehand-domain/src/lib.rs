//! 现场制作设备台账的客户端对账引擎（stagehand-domain）
//!
//! 为每个制作（production）、每种设备类型维护一份本地缓存，并保证其在以下来源下保持一致：
//! - 初次批量拉取（bulk fetch）；
//! - 本地乐观变更（`mutation`），在服务端确认前先行应用，失败时回滚；
//! - REST 调用的异步确认/拒绝，版本冲突交由调用方显式决策（`conflict`）；
//! - 推送通道广播的他人变更（`reconcile`），按 `StableId` 幂等应用；
//! - 拖拽重排引发的批量改名（`reorder`），整体作为一次用户意图提交。
//!
//! 本 crate 只包含纯状态机与协议定义：缓存值 + 命令 → 新缓存值 + 待发请求。
//! 异步编排（发请求、等待、回写）位于 `stagehand-application`。
//!
pub mod cache;
pub mod conflict;
pub mod display_id;
pub mod entity;
pub mod equipment;
pub mod error;
pub mod event;
pub mod identity;
pub mod mutation;
pub mod payload;
pub mod reconcile;
#[cfg(feature = "remote")]
pub mod remote;
pub mod reorder;
pub mod value_object;

// 允许在本 crate 内部通过 ::stagehand_domain 进行自引用，
// 以便 `#[equipment]` 生成的路径在本 crate 内同样可解析。
extern crate self as stagehand_domain;
