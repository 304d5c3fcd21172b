//! 显示标签规则
//!
//! - 规范模板：`前缀 + 序号`（如 `"MON " + 3`），重排后的连续编号依此生成；
//! - 新建编号：取当前类型所有标签数字后缀的最大值 + 1，仅为尽力而为，最终以服务端为准；
//! - 页面排序：按数字后缀升序，无后缀者排后，相同时按标签字典序。
//!
use crate::identity::DisplayId;
use crate::payload::Payload;
use std::cmp::Ordering;

/// 规范标签模板
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayTemplate {
    prefix: String,
}

impl DisplayTemplate {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// 使用设备类型声明的默认前缀
    pub fn for_payload<P: Payload>() -> Self {
        Self::new(P::DISPLAY_PREFIX)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 第 `position` 个位置（从 0 开始）的规范标签
    pub fn render(&self, position: usize) -> DisplayId {
        DisplayId::new(format!("{}{}", self.prefix, position + 1))
    }

    /// 下一个未使用的编号：已有数字后缀的最大值 + 1（没有任何编号时为 1）
    pub fn next_available<'a>(
        &self,
        existing: impl IntoIterator<Item = &'a DisplayId>,
    ) -> DisplayId {
        let max = existing
            .into_iter()
            .filter_map(DisplayId::numeric_suffix)
            .max()
            .unwrap_or(0);
        DisplayId::new(format!("{}{}", self.prefix, max.saturating_add(1)))
    }
}

/// 页面派生排序：数字后缀升序，无后缀排后，平局按字典序
pub fn display_order(a: &DisplayId, b: &DisplayId) -> Ordering {
    match (a.numeric_suffix(), b.numeric_suffix()) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
