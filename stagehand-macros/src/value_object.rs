use crate::utils::apply_derives;
use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::parse::{Parse, ParseStream};
use syn::{Item, Result, Token, parse_macro_input, parse_quote};

/// 值对象：按值比较、可序列化的小型类型
///
/// 基础派生为 `Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq`，
/// `copy` 追加 `Copy`，`ordered` 追加 `PartialOrd, Ord, Hash`。
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let flags = parse_macro_input!(attr as ValueObjectFlags);
    let mut item = parse_macro_input!(item as Item);

    let attrs = match &mut item {
        Item::Struct(st) => &mut st.attrs,
        Item::Enum(en) => &mut en.attrs,
        other => {
            return syn::Error::new(other.span(), "#[value_object] expects a struct or an enum")
                .to_compile_error()
                .into();
        }
    };
    apply_derives(attrs, flags.derives());
    quote!(#item).into()
}

#[derive(Default)]
struct ValueObjectFlags {
    copy: bool,
    ordered: bool,
}

impl ValueObjectFlags {
    fn derives(&self) -> Vec<syn::Path> {
        let mut derives: Vec<syn::Path> = vec![
            parse_quote!(Debug),
            parse_quote!(Default),
            parse_quote!(Clone),
            parse_quote!(serde::Serialize),
            parse_quote!(serde::Deserialize),
            parse_quote!(PartialEq),
            parse_quote!(Eq),
        ];
        if self.copy {
            derives.push(parse_quote!(Copy));
        }
        if self.ordered {
            derives.extend([parse_quote!(PartialOrd), parse_quote!(Ord), parse_quote!(Hash)]);
        }
        derives
    }
}

impl Parse for ValueObjectFlags {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut flags = Self::default();
        let idents: Punctuated<syn::Ident, Token![,]> = Punctuated::parse_terminated(input)?;

        for ident in idents {
            let slot = match ident.to_string().as_str() {
                "copy" => &mut flags.copy,
                "ordered" => &mut flags.ordered,
                _ => {
                    return Err(syn::Error::new(
                        ident.span(),
                        "unknown flag; expected 'copy' or 'ordered'",
                    ));
                }
            };
            if *slot {
                return Err(syn::Error::new(ident.span(), "duplicate flag in attribute"));
            }
            *slot = true;
        }

        Ok(flags)
    }
}
