//! 同步配置
//!
//! 可由代码（builder）或 JSON 构造；未知字段会被拒绝。
//!
use crate::error::AppError;
use bon::Builder;
use serde::{Deserialize, Serialize};
use stagehand_domain::display_id::DisplayTemplate;
use stagehand_domain::mutation::WritePolicy;
use stagehand_domain::payload::Payload;
use std::collections::HashMap;

#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// 创建的默认写入策略
    #[builder(default)]
    pub create_policy: WritePolicy,
    /// 更新的默认写入策略
    #[builder(default)]
    pub update_policy: WritePolicy,
    /// 批量重排时同时在途的 PUT 上限
    #[builder(default = 8)]
    pub reorder_concurrency: usize,
    /// 内存推送通道的广播缓冲容量
    #[builder(default = 1024)]
    pub channel_capacity: usize,
    /// 按设备类型覆盖规范标签前缀，如 `{"monitor": "MON-"}`
    #[builder(default)]
    pub display_prefixes: HashMap<String, String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SyncConfig {
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.reorder_concurrency == 0 {
            return Err(AppError::Config("reorder_concurrency must be positive".into()));
        }
        if self.channel_capacity == 0 {
            return Err(AppError::Config("channel_capacity must be positive".into()));
        }
        Ok(())
    }

    /// 某一设备类型的规范标签模板（有覆盖时用覆盖前缀）
    pub fn template_for<P: Payload>(&self) -> DisplayTemplate {
        match self.display_prefixes.get(P::TYPE) {
            Some(prefix) => DisplayTemplate::new(prefix.clone()),
            None => DisplayTemplate::for_payload::<P>(),
        }
    }
}
