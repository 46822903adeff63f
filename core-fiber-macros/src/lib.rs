//! `#[core_fiber::test]` and `#[core_fiber::main]`.
//!
//! Both wrap a synchronous function body in `core_fiber::block_on`, so the
//! body runs as the root fiber of a fresh, default-configured event loop.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, ItemFn, ReturnType};

#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, MacroKind::Test)
}

#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, MacroKind::Main)
}

enum MacroKind {
    Test,
    Main,
}

impl MacroKind {
    fn name(&self) -> &'static str {
        match self {
            MacroKind::Test => "core_fiber::test",
            MacroKind::Main => "core_fiber::main",
        }
    }
}

fn expand(attr: TokenStream, item: TokenStream, kind: MacroKind) -> TokenStream {
    if !attr.is_empty() {
        let tokens = TokenStream2::from(attr);
        return syn::Error::new_spanned(tokens, "core_fiber attribute macros take no arguments")
            .to_compile_error()
            .into();
    }

    let input = parse_macro_input!(item as ItemFn);

    if let Some(asyncness) = input.sig.asyncness {
        return syn::Error::new_spanned(
            asyncness,
            "core_fiber attribute macros require a synchronous `fn`; fibers block instead of awaiting",
        )
        .to_compile_error()
        .into();
    }

    if !input.sig.inputs.is_empty() {
        return syn::Error::new_spanned(
            &input.sig.inputs,
            "core_fiber attribute macros require a function without parameters",
        )
        .to_compile_error()
        .into();
    }

    let attrs = input.attrs;
    let vis = input.vis;
    let sig = input.sig;
    let body = input.block;
    let test_attr = match kind {
        MacroKind::Test => quote!(#[test]),
        MacroKind::Main => TokenStream2::new(),
    };
    let failure = format!("{}: event loop failed", kind.name());

    // The body's own return value (e.g. a `Result` from a test) is passed through.
    let closure = match &sig.output {
        ReturnType::Default => quote!(move || #body),
        ReturnType::Type(_, ty) => quote!(move || -> #ty #body),
    };

    quote! {
        #(#attrs)*
        #test_attr
        #vis #sig {
            ::core_fiber::block_on(#closure).expect(#failure)
        }
    }
    .into()
}
