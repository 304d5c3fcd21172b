//! stagehand 过程宏
//!
//! - `#[identifier]`：字符串标识新类型（StableId/DisplayId 等）
//! - `#[value_object]`：值对象的标准派生
//! - `#[equipment]`：设备载荷类型，生成 `Payload` 实现与必填字段校验
//!
use proc_macro::TokenStream;

mod equipment;
mod identifier;
mod utils;
mod value_object;

/// 字符串标识宏
///
/// 仅支持 `struct X(String);`，生成派生、`new/as_str`、Display、FromStr 与常用转换。
#[proc_macro_attribute]
pub fn identifier(attr: TokenStream, item: TokenStream) -> TokenStream {
    identifier::expand(attr, item)
}

/// 值对象宏
///
/// 统一派生 Debug/Default/Clone/Serialize/Deserialize/PartialEq/Eq，
/// 可选 `copy`、`ordered` 标志。
#[proc_macro_attribute]
pub fn value_object(attr: TokenStream, item: TokenStream) -> TokenStream {
    value_object::expand(attr, item)
}

/// 设备载荷宏
///
/// ```ignore
/// #[equipment(type = "monitor", prefix = "MON ")]
/// pub struct Monitor {
///     #[required]
///     model: String,
///     size_inches: Option<u16>,
/// }
/// ```
#[proc_macro_attribute]
pub fn equipment(attr: TokenStream, item: TokenStream) -> TokenStream {
    equipment::expand(attr, item)
}
