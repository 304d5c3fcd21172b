//! 标识模型
//!
//! - `StableId`：服务端分配、不可变、制作内唯一，是去重与查表的唯一安全键；
//! - `DisplayId`：面向用户的标签（如 "CCU 3"），可变且不保证唯一，绝不作为键；
//! - `ProductionId` / `UserId`：作用域与事件来源。
//!
use crate::error::DomainError;
use crate::payload::Payload;
use crate::value_object::ValueObject;
use stagehand_macros::identifier;
use std::fmt;
use uuid::Uuid;

const PROVISIONAL_PREFIX: &str = "tmp-";

/// 服务端分配的稳定标识
#[identifier]
pub struct StableId(String);

impl StableId {
    /// 为乐观创建生成本地临时标识，不会发送给服务端
    pub fn provisional() -> Self {
        Self(format!("{PROVISIONAL_PREFIX}{}", Uuid::new_v4()))
    }
}

/// 面向用户的显示标签
#[identifier]
pub struct DisplayId(String);

impl DisplayId {
    /// 标签末尾的整数（"CCU 12" → 12），无数字后缀时为 `None`
    pub fn numeric_suffix(&self) -> Option<u64> {
        let digits = self.0.len() - self.0.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 {
            return None;
        }
        self.0[self.0.len() - digits..].parse().ok()
    }
}

impl ValueObject for DisplayId {
    type Error = DomainError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.0.trim().is_empty() {
            return Err(DomainError::InvalidValue {
                reason: "display id must not be blank".into(),
            });
        }
        Ok(())
    }
}

/// 制作（production）标识
#[identifier]
pub struct ProductionId(String);

/// 用户标识（事件来源）
#[identifier]
pub struct UserId(String);

/// 缓存作用域：一个制作下的一种设备类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    production_id: ProductionId,
    entity_type: &'static str,
}

impl Scope {
    pub fn of<P: Payload>(production_id: ProductionId) -> Self {
        Self {
            production_id,
            entity_type: P::TYPE,
        }
    }

    pub fn production_id(&self) -> &ProductionId {
        &self.production_id
    }

    pub fn entity_type(&self) -> &'static str {
        self.entity_type
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.production_id, self.entity_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_suffix_reads_trailing_digits() {
        assert_eq!(DisplayId::from("CCU 12").numeric_suffix(), Some(12));
        assert_eq!(DisplayId::from("MON1").numeric_suffix(), Some(1));
        assert_eq!(DisplayId::from("Wide shot").numeric_suffix(), None);
        assert_eq!(DisplayId::from("").numeric_suffix(), None);
        // 超出 u64 范围视为无后缀
        assert_eq!(
            DisplayId::from("CAM 99999999999999999999999").numeric_suffix(),
            None
        );
    }

    #[test]
    fn provisional_ids_are_unique() {
        let a = StableId::provisional();
        let b = StableId::provisional();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("tmp-"));
    }

    #[test]
    fn blank_display_id_is_invalid() {
        assert!(DisplayId::from("  ").validate().is_err());
        assert!(DisplayId::from("CAM 1").validate().is_ok());
    }

    #[test]
    fn identifiers_serialize_as_strings() {
        let id = StableId::from("u1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"u1\"");
    }
}
