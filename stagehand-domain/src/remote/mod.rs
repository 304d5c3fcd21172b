//! 远端协作者协议（remote）
//!
//! 引擎消费、但不拥有实现的外部接口：
//! - `EquipmentGateway`：按制作读写某一设备类型的 REST 网关（拉取/创建/更新/删除）；
//! - `EventChannel`：按制作作用域的推送通道，至少一次、尽力有序投递 `ChangeMessage`；
//! - `InMemoryEventChannel`：基于 `tokio::sync::broadcast` 的内存通道，用于测试与示例。
//!
pub mod channel;
pub mod channel_inmemory;
pub mod gateway;

pub use channel::EventChannel;
pub use channel_inmemory::InMemoryEventChannel;
pub use gateway::EquipmentGateway;
