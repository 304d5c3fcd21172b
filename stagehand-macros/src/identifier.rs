use crate::utils::{apply_derives, last_segment};
use proc_macro::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Item, parse_macro_input};

/// #[identifier] 宏实现
/// 仅支持 `struct X(String);` 形式的字符串标识，并为包装类型：
/// - 合并/追加派生：Default, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord
/// - 提供 `new(impl Into<String>)`、`as_str()`、Display、FromStr、AsRef<str>、Borrow<str> 与双向 From
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "#[identifier] takes no arguments",
        )
        .to_compile_error()
        .into();
    }
    let input = parse_macro_input!(item as Item);

    let mut st = match input {
        Item::Struct(s) => s,
        other => {
            return syn::Error::new(other.span(), "#[identifier] only on struct")
                .to_compile_error()
                .into();
        }
    };

    let inner_is_string = match &st.fields {
        syn::Fields::Unnamed(f) if f.unnamed.len() == 1 => f
            .unnamed
            .first()
            .and_then(|field| last_segment(&field.ty))
            .is_some_and(|name| name == "String"),
        _ => false,
    };
    if !inner_is_string {
        return syn::Error::new(
            st.span(),
            "#[identifier] supports only `struct X(String);`",
        )
        .to_compile_error()
        .into();
    }

    let required: Vec<syn::Path> = vec![
        syn::parse_quote!(Default),
        syn::parse_quote!(Clone),
        syn::parse_quote!(Debug),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
        syn::parse_quote!(PartialEq),
        syn::parse_quote!(Eq),
        syn::parse_quote!(Hash),
        syn::parse_quote!(PartialOrd),
        syn::parse_quote!(Ord),
    ];
    apply_derives(&mut st.attrs, required);
    // 线上以裸字符串出现
    st.attrs.push(syn::parse_quote!(#[serde(transparent)]));

    let ident = &st.ident;

    let out = quote! {
        #st

        impl #ident {
            pub fn new(value: impl ::core::convert::Into<::std::string::String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::std::str::FromStr for #ident {
            type Err = ::core::convert::Infallible;
            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                ::std::result::Result::Ok(Self(s.to_owned()))
            }
        }

        impl ::std::fmt::Display for #ident {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl ::core::convert::AsRef<str> for #ident {
            fn as_ref(&self) -> &str { &self.0 }
        }

        impl ::std::borrow::Borrow<str> for #ident {
            fn borrow(&self) -> &str { &self.0 }
        }

        impl ::core::convert::From<#ident> for ::std::string::String {
            fn from(value: #ident) -> Self { value.0 }
        }

        impl ::core::convert::From<::std::string::String> for #ident {
            fn from(value: ::std::string::String) -> Self { Self(value) }
        }

        impl ::core::convert::From<&str> for #ident {
            fn from(value: &str) -> Self { Self(value.to_owned()) }
        }
    };

    TokenStream::from(out)
}
