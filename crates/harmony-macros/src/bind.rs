//! `#[derive(Bind)]` expansion.

use proc_macro2::TokenStream;
use quote::quote;
use syn::DeriveInput;

use crate::parse::{BindField, BindInput, ParamSource};

pub fn expand_bind(input: DeriveInput) -> syn::Result<TokenStream> {
    let input = BindInput::parse(&input)?;
    let ident = &input.ident;
    let krate = &input.krate;

    let entries = input.fields.iter().map(|f| field_entry(&input, f));

    Ok(quote! {
        impl #krate::bind::Bind for #ident {
            fn descriptor() -> #krate::Result<&'static #krate::bind::Descriptor<Self>> {
                static DESCRIPTOR: ::std::sync::OnceLock<
                    ::std::result::Result<
                        #krate::bind::Descriptor<#ident>,
                        #krate::bind::DescriptorError,
                    >,
                > = ::std::sync::OnceLock::new();

                #krate::bind::cached(&DESCRIPTOR, || {
                    #krate::bind::Descriptor::<#ident>::builder()
                        #(#entries)*
                        .build()
                })
            }
        }
    })
}

fn field_entry(input: &BindInput, field: &BindField) -> TokenStream {
    let ident = &input.ident;
    let krate = &input.krate;
    let member = &field.ident;
    let name = &field.name;

    let param_setter = quote! {
        |dest: &mut #ident, raw: &str| {
            dest.#member = #krate::bind::parse(raw)?;
            ::std::result::Result::Ok(())
        }
    };
    let body_setter = quote! {
        |dest: &mut #ident, value: #krate::bind::JsonValue| {
            dest.#member = #krate::bind::from_json(value)?;
            ::std::result::Result::Ok(())
        }
    };

    if field.skip {
        return quote! { .skip(#name) };
    }

    match (&field.param, &field.body) {
        (Some(param), Some(body_key)) => {
            let (source, key) = match param {
                ParamSource::Path(key) => (quote!(#krate::bind::ParamSource::Path), key),
                ParamSource::Query(key) => (quote!(#krate::bind::ParamSource::Query), key),
            };
            quote! {
                .param_and_body(#name, #source, #key, #param_setter, #body_key, #body_setter)
            }
        }
        (Some(ParamSource::Path(key)), None) => quote! { .path(#name, #key, #param_setter) },
        (Some(ParamSource::Query(key)), None) => quote! { .query(#name, #key, #param_setter) },
        (None, Some(body_key)) => quote! { .body(#name, #body_key, #body_setter) },
        (None, None) => quote! { .skip(#name) },
    }
}
