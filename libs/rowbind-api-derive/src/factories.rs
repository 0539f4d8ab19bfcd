use proc_macro2::TokenStream;
use quote::quote;
use syn::{FnArg, ImplItem, ImplItemFn, ItemImpl, LitStr, Pat, ReturnType};

use crate::attrs::{is_result, is_row_attr, Param};

enum Role {
    /// `#[row(factory)]`
    Factory,
    /// `#[row(deserializer)]`
    Entry,
    /// `#[row(deserialize = "param")]`
    Deserialize(String),
}

fn fn_role(func: &ImplItemFn) -> syn::Result<Option<Role>> {
    let mut role = None;
    for attr in func.attrs.iter().filter(|a| is_row_attr(a)) {
        attr.parse_nested_meta(|meta| {
            let next = if meta.path.is_ident("factory") {
                Role::Factory
            } else if meta.path.is_ident("deserializer") {
                Role::Entry
            } else if meta.path.is_ident("deserialize") {
                let value: LitStr = meta.value()?.parse()?;
                Role::Deserialize(value.value())
            } else {
                return Err(meta.error("unknown row function attribute"));
            };
            if role.is_some() {
                return Err(meta.error(
                    "a function takes exactly one of factory, deserializer, deserialize",
                ));
            }
            role = Some(next);
            Ok(())
        })?;
    }
    Ok(role)
}

pub(crate) fn expand(item: &mut ItemImpl) -> syn::Result<TokenStream> {
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &item.generics,
            "row_factories does not support generic impl blocks",
        ));
    }
    if let Some((_, path, _)) = &item.trait_ {
        return Err(syn::Error::new_spanned(
            path,
            "row_factories expects an inherent impl block",
        ));
    }

    let self_ty = item.self_ty.clone();
    let mut registrations = Vec::new();

    for impl_item in &mut item.items {
        let ImplItem::Fn(func) = impl_item else {
            continue;
        };
        let role = fn_role(func)?;
        func.attrs.retain(|a| !is_row_attr(a));
        let Some(role) = role else {
            continue;
        };

        if let Some(receiver) = func.sig.receiver() {
            return Err(syn::Error::new_spanned(
                receiver,
                "row factories must be associated functions without a receiver",
            ));
        }

        let ident = func.sig.ident.clone();
        let fn_name = ident.to_string();
        let returns_result = match &func.sig.output {
            ReturnType::Type(_, ty) => is_result(ty),
            ReturnType::Default => {
                return Err(syn::Error::new_spanned(
                    &func.sig,
                    "row factories must return a value",
                ))
            }
        };

        let mut params = Vec::new();
        for input in &func.sig.inputs {
            let FnArg::Typed(pat_type) = input else {
                continue;
            };
            let Pat::Ident(pat_ident) = pat_type.pat.as_ref() else {
                return Err(syn::Error::new_spanned(
                    &pat_type.pat,
                    "row factory parameters must be plain identifiers",
                ));
            };
            params.push(Param::new(
                pat_ident.ident.to_string(),
                pat_type.ty.as_ref(),
                &pat_type.attrs,
            )?);
        }

        match role {
            Role::Deserialize(parameter) => {
                if params.len() != 1 {
                    return Err(syn::Error::new_spanned(
                        &func.sig,
                        "a row deserializer takes exactly one argument",
                    ));
                }
                let ctor = if returns_result {
                    quote! { from_fn }
                } else {
                    quote! { from_infallible }
                };
                registrations.push(quote! {
                    __set.deserializers.push(
                        __m::DeserializerMeta::#ctor(#fn_name, #parameter, <#self_ty>::#ident)
                    );
                });
            }
            role => {
                let entry = matches!(role, Role::Entry);
                let metas = params.iter().map(Param::meta_tokens);
                let takes = params
                    .iter()
                    .enumerate()
                    .map(|(index, param)| param.take_tokens(index));
                let args_binding = if params.is_empty() {
                    quote! { _args }
                } else {
                    quote! { mut __args }
                };
                let wrap = if returns_result {
                    quote! {
                        __value
                            .map(|v| ::std::boxed::Box::new(v) as __m::AnyValue)
                            .map_err(::core::convert::Into::into)
                    }
                } else {
                    quote! { Ok(::std::boxed::Box::new(__value) as __m::AnyValue) }
                };
                registrations.push(quote! {
                    __set.factories.push(__m::FactoryMeta {
                        name: #fn_name,
                        kind: __m::FactoryKind::StaticFactory,
                        deserializer_entry: #entry,
                        params: vec![#(#metas),*],
                        invoke: __m::Invocable::new(|#args_binding: __m::Args| {
                            let __value = <#self_ty>::#ident(#(#takes),*);
                            #wrap
                        }),
                    });
                });
                for param in &params {
                    if let Some(tokens) = param.deserializer_tokens(&fn_name) {
                        registrations.push(quote! { __set.deserializers.push(#tokens); });
                    }
                }
            }
        }

        for input in &mut func.sig.inputs {
            if let FnArg::Typed(pat_type) = input {
                pat_type.attrs.retain(|a| !is_row_attr(a));
            }
        }
    }

    Ok(quote! {
        #item

        impl ::rowbind_api::DeclaredFactories for #self_ty {
            fn declared_factories() -> ::rowbind_api::metadata::FactorySet {
                use ::rowbind_api::metadata as __m;

                #[allow(unused_mut)]
                let mut __set = __m::FactorySet::default();
                #(#registrations)*
                __set
            }
        }
    })
}
