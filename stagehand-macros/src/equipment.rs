use crate::utils::{apply_derives, ensure_camel_case, last_segment};
use proc_macro::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Item, LitStr, Result, Token, parse::Parse, parse::ParseStream, parse_macro_input};

/// #[equipment] 宏实现
/// - 合并/追加派生：Debug, Clone, Default, PartialEq, Serialize, Deserialize，并默认 camelCase 序列化
/// - 移除字段上的 `#[required]` 标记，并据此生成 `missing_fields()`：
///   `String` 为空白视为缺失，`Option<_>` 为 `None` 视为缺失，其余类型恒视为已填写
/// - 自动实现 `::stagehand_domain::payload::Payload`（`TYPE` / `DISPLAY_PREFIX` / `missing_fields`）
/// - 参数：`#[equipment(type = "camera", prefix = "CAM ")]`，两者均必填
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as EquipmentAttrConfig);
    let input = parse_macro_input!(item as Item);

    let mut st = match input {
        Item::Struct(s) => s,
        other => {
            return syn::Error::new(other.span(), "#[equipment] only on struct")
                .to_compile_error()
                .into();
        }
    };

    let fields_named = match &mut st.fields {
        syn::Fields::Named(f) => f,
        _ => {
            return syn::Error::new(st.span(), "only supports named-field struct")
                .to_compile_error()
                .into();
        }
    };

    let mut checks = Vec::new();
    for field in fields_named.named.iter_mut() {
        let before = field.attrs.len();
        field.attrs.retain(|a| !a.path().is_ident("required"));
        if field.attrs.len() == before {
            continue;
        }

        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let wire_name = camel_case(&ident.unraw().to_string());
        let check = match last_segment(&field.ty).as_deref() {
            Some("String") => quote! { self.#ident.trim().is_empty() },
            Some("Option") => quote! { self.#ident.is_none() },
            _ => continue,
        };
        checks.push(quote! {
            if #check {
                missing.push(#wire_name);
            }
        });
    }

    apply_derives(
        &mut st.attrs,
        vec![
            syn::parse_quote!(Debug),
            syn::parse_quote!(Clone),
            syn::parse_quote!(Default),
            syn::parse_quote!(PartialEq),
            syn::parse_quote!(serde::Serialize),
            syn::parse_quote!(serde::Deserialize),
        ],
    );
    ensure_camel_case(&mut st.attrs);

    let ident = &st.ident;
    let (impl_generics, ty_generics, where_clause) = st.generics.split_for_impl();
    let entity_type = &cfg.entity_type;
    let prefix = &cfg.prefix;

    let expanded = quote! {
        #st

        impl #impl_generics ::stagehand_domain::payload::Payload for #ident #ty_generics #where_clause {
            const TYPE: &'static str = #entity_type;
            const DISPLAY_PREFIX: &'static str = #prefix;

            fn missing_fields(&self) -> ::std::vec::Vec<&'static str> {
                #[allow(unused_mut)]
                let mut missing = ::std::vec::Vec::new();
                #(#checks)*
                missing
            }
        }
    };

    TokenStream::from(expanded)
}

fn camel_case(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper = false;
    for ch in snake.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

// -------- parsing --------

struct EquipmentAttrConfig {
    entity_type: LitStr,
    prefix: LitStr,
}

impl Parse for EquipmentAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut entity_type: Option<LitStr> = None;
        let mut prefix: Option<LitStr> = None;

        let elems: Punctuated<EquipmentAttrElem, Token![,]> =
            Punctuated::<EquipmentAttrElem, Token![,]>::parse_terminated(input)?;

        for elem in elems {
            let (slot, value, key) = match elem {
                EquipmentAttrElem::Type(v) => (&mut entity_type, v, "type"),
                EquipmentAttrElem::Prefix(v) => (&mut prefix, v, "prefix"),
            };
            if slot.is_some() {
                return Err(syn::Error::new(
                    value.span(),
                    format!("duplicate key '{key}' in attribute"),
                ));
            }
            if value.value().trim().is_empty() {
                return Err(syn::Error::new(
                    value.span(),
                    format!("'{key}' must not be empty"),
                ));
            }
            *slot = Some(value);
        }

        match (entity_type, prefix) {
            (Some(entity_type), Some(prefix)) => Ok(Self {
                entity_type,
                prefix,
            }),
            _ => Err(syn::Error::new(
                proc_macro2::Span::call_site(),
                "#[equipment] requires both `type = \"...\"` and `prefix = \"...\"`",
            )),
        }
    }
}

enum EquipmentAttrElem {
    Type(LitStr),
    Prefix(LitStr),
}

impl Parse for EquipmentAttrElem {
    fn parse(input: ParseStream) -> Result<Self> {
        let key = syn::Ident::parse_any(input)?;
        let _eq: Token![=] = input.parse()?;
        let value: LitStr = input.parse()?;
        if key == "type" {
            Ok(Self::Type(value))
        } else if key == "prefix" {
            Ok(Self::Prefix(value))
        } else {
            Err(syn::Error::new(
                key.span(),
                "unknown key in attribute; expected 'type' or 'prefix'",
            ))
        }
    }
}
