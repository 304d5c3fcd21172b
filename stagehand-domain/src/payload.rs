//! 设备载荷（Payload）抽象
//!
//! 载荷字段对对账引擎不透明，引擎只关心：线上实体类型、规范标签前缀与必填字段。
//! 通常通过 `#[equipment(type = "...", prefix = "...")]` 宏实现。
//!
use crate::error::{DomainError, DomainResult};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt;

/// 某一设备类型的载荷
pub trait Payload:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// 线上实体类型（事件路由键），如 `"camera"`
    const TYPE: &'static str;

    /// 规范标签前缀，如 `"CAM "`；重排与自动编号按 `前缀 + 序号` 生成标签
    const DISPLAY_PREFIX: &'static str;

    /// 缺失的必填字段（线上字段名）
    fn missing_fields(&self) -> Vec<&'static str>;

    /// 发送任何请求之前的必填校验
    fn validate(&self) -> DomainResult<()> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation { missing })
        }
    }
}
