//! 实体（Entity）与记录
//!
//! `Record<P>` 是缓存中的权威副本：稳定标识 + 显示标签 + 版本 + 不透明载荷。
//! 所有变更都是整体替换（copy-and-replace），从不就地修改字段。
//!
use crate::identity::{DisplayId, StableId};
use crate::payload::Payload;
use crate::value_object::Version;
use serde::{Deserialize, Serialize};

/// 具备稳定标识、显示标签与版本的实体抽象
pub trait Entity: Send + Sync {
    /// 服务端分配的稳定标识（唯一安全的去重键）
    fn stable_id(&self) -> &StableId;

    /// 面向用户的标签
    fn display_id(&self) -> &DisplayId;

    /// 当前版本（乐观并发控制）
    fn version(&self) -> Version;
}

/// 一条设备记录；线上为扁平 JSON：`stableId`、`displayId`、`version` 与载荷字段并列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record<P> {
    stable_id: StableId,
    display_id: DisplayId,
    version: Version,
    #[serde(flatten)]
    payload: P,
}

impl<P: Payload> Record<P> {
    pub fn new(stable_id: StableId, display_id: DisplayId, version: Version, payload: P) -> Self {
        Self {
            stable_id,
            display_id,
            version,
            payload,
        }
    }

    /// 乐观创建时的临时记录：本地标识 + `Version::PROVISIONAL`
    pub fn provisional(submission: Submission<P>) -> Self {
        Self::new(
            StableId::provisional(),
            submission.display_id,
            Version::PROVISIONAL,
            submission.payload,
        )
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// 尚未被服务端确认
    pub fn is_provisional(&self) -> bool {
        self.version.is_provisional()
    }

    /// 以新标签生成一份副本（版本不变，版本只由服务端推进）
    pub fn with_display_id(&self, display_id: DisplayId) -> Self {
        Self {
            display_id,
            ..self.clone()
        }
    }

    /// 以提交内容生成一份副本（乐观更新使用）
    pub fn with_submission(&self, submission: Submission<P>) -> Self {
        Self {
            stable_id: self.stable_id.clone(),
            display_id: submission.display_id,
            version: self.version,
            payload: submission.payload,
        }
    }

    /// 当前内容作为一次提交（标签 + 载荷）
    pub fn to_submission(&self) -> Submission<P> {
        Submission {
            display_id: self.display_id.clone(),
            payload: self.payload.clone(),
        }
    }
}

impl<P: Payload> Entity for Record<P> {
    fn stable_id(&self) -> &StableId {
        &self.stable_id
    }

    fn display_id(&self) -> &DisplayId {
        &self.display_id
    }

    fn version(&self) -> Version {
        self.version
    }
}

/// 用户输入：载荷 + 可选标签（缺省时由引擎分配/保留）
#[derive(Debug, Clone, PartialEq)]
pub struct Draft<P> {
    pub display_id: Option<DisplayId>,
    pub payload: P,
}

impl<P: Payload> Draft<P> {
    pub fn new(payload: P) -> Self {
        Self {
            display_id: None,
            payload,
        }
    }

    pub fn with_display_id(mut self, display_id: impl Into<DisplayId>) -> Self {
        self.display_id = Some(display_id.into());
        self
    }

    /// 复制一条记录的载荷，去掉稳定标识、版本与标签（复制操作使用）
    pub fn duplicate_of(record: &Record<P>) -> Self {
        Self::new(record.payload.clone())
    }
}

/// 发往服务端的内容：确定的标签 + 载荷（创建与更新共用）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission<P> {
    pub display_id: DisplayId,
    #[serde(flatten)]
    pub payload: P,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equipment::Monitor;

    fn monitor(model: &str) -> Monitor {
        Monitor {
            model: model.into(),
            ..Default::default()
        }
    }

    #[test]
    fn record_wire_format_is_flat() {
        let record = Record::new(
            StableId::from("u1"),
            DisplayId::from("MON 1"),
            Version::initial(),
            monitor("BVM-E171"),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["stableId"], "u1");
        assert_eq!(json["displayId"], "MON 1");
        assert_eq!(json["version"], 1);
        assert_eq!(json["model"], "BVM-E171");

        let back: Record<Monitor> = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn copies_never_touch_version_or_identity() {
        let record = Record::new(
            StableId::from("u1"),
            DisplayId::from("MON 1"),
            Version::from_value(4),
            monitor("A"),
        );
        let renamed = record.with_display_id(DisplayId::from("MON 2"));
        assert_eq!(renamed.stable_id(), record.stable_id());
        assert_eq!(renamed.version(), Version::from_value(4));
        assert_eq!(record.display_id().as_str(), "MON 1");

        let edited = record.with_submission(Submission {
            display_id: DisplayId::from("MON 9"),
            payload: monitor("B"),
        });
        assert_eq!(edited.version(), Version::from_value(4));
        assert_eq!(edited.payload().model, "B");
    }

    #[test]
    fn duplicate_strips_identity() {
        let record = Record::new(
            StableId::from("u1"),
            DisplayId::from("MON 1"),
            Version::from_value(3),
            monitor("A"),
        );
        let draft = Draft::duplicate_of(&record);
        assert_eq!(draft.display_id, None);
        assert_eq!(draft.payload, record.payload().clone());
    }

    #[test]
    fn provisional_records_are_flagged() {
        let record = Record::provisional(Submission {
            display_id: DisplayId::from("MON 5"),
            payload: monitor("A"),
        });
        assert!(record.is_provisional());
        assert!(record.stable_id().as_str().starts_with("tmp-"));
    }
}
