use quote::ToTokens;
use std::collections::HashSet;
use syn::punctuated::Punctuated;
use syn::{Attribute, Token};

/// 把宏要求的派生与用户已写的 `#[derive(...)]` 合并为一条，要求的在前，按末段名去重
///
/// `Serialize` 与 `serde::Serialize` 视为同一项。其余属性保持原有顺序。
pub(crate) fn apply_derives(attrs: &mut Vec<Attribute>, required: Vec<syn::Path>) {
    let mut declared: Vec<syn::Path> = Vec::new();
    attrs.retain(|attr| {
        if !attr.path().is_ident("derive") {
            return true;
        }
        if let Ok(list) = attr.parse_args_with(Punctuated::<syn::Path, Token![,]>::parse_terminated) {
            declared.extend(list);
        }
        false
    });

    let mut seen = HashSet::new();
    let merged: Vec<syn::Path> = required
        .into_iter()
        .chain(declared)
        .filter(|path| seen.insert(derive_name(path)))
        .collect();
    attrs.insert(0, syn::parse_quote!(#[derive(#(#merged),*)]));
}

fn derive_name(path: &syn::Path) -> String {
    path.segments
        .last()
        .map(|seg| seg.ident.to_string())
        .unwrap_or_else(|| path.to_token_stream().to_string())
}

/// 若尚未声明 `#[serde(rename_all = ...)]`，则追加 camelCase 约定（与线上 JSON 字段风格一致）
pub(crate) fn ensure_camel_case(attrs: &mut Vec<Attribute>) {
    let declared = attrs.iter().any(|attr| {
        attr.path().is_ident("serde") && attr.to_token_stream().to_string().contains("rename_all")
    });
    if !declared {
        attrs.push(syn::parse_quote!(#[serde(rename_all = "camelCase")]));
    }
}

/// 类型路径的最后一段标识（`Option<String>` → `Option`）
pub(crate) fn last_segment(ty: &syn::Type) -> Option<String> {
    match ty {
        syn::Type::Path(tp) => tp.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}
