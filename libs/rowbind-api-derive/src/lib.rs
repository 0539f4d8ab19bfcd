use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, ItemImpl};

mod attrs;
mod factories;

use attrs::{is_row_attr, Param};

/// Derive macro describing a struct's canonical constructor to the engine.
///
/// Generates `impl rowbind_api::RowMapped`, whose `type_metadata()` lists:
///
/// - the canonical constructor (a struct literal over all named fields),
/// - one parameter per field, with its declared type and nullability
///   (`Option<T>` fields are nullable),
/// - parameter-level deserializers (`parse`, `deserialize_with`),
/// - with `#[row(factories)]`, the factories declared by `#[row_factories]`.
///
/// # Example
///
/// ```ignore
/// #[derive(RowMapped)]
/// pub struct Foo {
///     pub foo_id: i32,
///     #[row(rename = "FOO_NAME")]
///     pub name: String,
///     #[row(parse)]
///     pub status: FooStatus,
///     pub description: Option<String>,
///     #[row(flatten, joiner = "snake")]
///     pub audit: Audit,
///     #[row(default)]
///     pub cached: Vec<u64>,
/// }
/// ```
///
/// Struct attributes:
/// - `#[row(deserializer)]`: the constructor is the type's deserializer
///   entry point, so other types can read it from a single column with
///   `#[row(nested)]`.
/// - `#[row(factories)]`: merge `<Self as DeclaredFactories>::declared_factories()`.
#[proc_macro_derive(RowMapped, attributes(row))]
pub fn derive_row_mapped(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match derive_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

/// Attribute macro declaring static factories and deserializers of a type.
///
/// Only functions carrying `#[row(...)]` are described:
///
/// - `#[row(factory)]`: a named factory, selectable with
///   `RowMapper::using_factory`.
/// - `#[row(deserializer)]`: the type's deserializer entry point. It takes
///   precedence over the canonical constructor.
/// - `#[row(deserialize = "param")]`: a single-argument function turning
///   one raw column into the value of constructor parameter `param`.
///
/// Functions may return the type itself or a `Result`. Parameters accept the
/// same `#[row(...)]` attributes as struct fields.
///
/// A parameter-level `parse` or `deserialize_with` only applies when its own
/// factory is invoked, so a field and a factory parameter may both be named
/// `status` and both be parsed. A `deserialize = "param"` function applies
/// to every factory with a parameter of that name, and conflicts with any
/// parameter-level declaration for it.
#[proc_macro_attribute]
pub fn row_factories(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "row_factories takes no arguments",
        )
        .to_compile_error()
        .into();
    }
    let mut item = parse_macro_input!(item as ItemImpl);
    match factories::expand(&mut item) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

#[derive(Default)]
struct StructAttrs {
    deserializer: bool,
    factories: bool,
}

fn struct_attrs(input: &DeriveInput) -> syn::Result<StructAttrs> {
    let mut out = StructAttrs::default();
    for attr in input.attrs.iter().filter(|a| is_row_attr(a)) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("deserializer") {
                out.deserializer = true;
            } else if meta.path.is_ident("factories") {
                out.factories = true;
            } else {
                return Err(meta.error("unknown row struct attribute"));
            }
            Ok(())
        })?;
    }
    Ok(out)
}

fn derive_impl(input: &DeriveInput) -> Result<proc_macro2::TokenStream, syn::Error> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "RowMapped does not support generic types",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "RowMapped only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "RowMapped only supports structs",
            ))
        }
    };

    let options = struct_attrs(input)?;

    let mut param_tokens = Vec::new();
    let mut init_tokens = Vec::new();
    let mut deserializer_tokens = Vec::new();
    let name_str = name.to_string();

    for (index, field) in fields.iter().enumerate() {
        let field_name = field.ident.as_ref().ok_or_else(|| {
            syn::Error::new_spanned(field, "expected named field")
        })?;
        let param = Param::new(field_name.to_string(), &field.ty, &field.attrs)?;

        param_tokens.push(param.meta_tokens());
        let take = param.take_tokens(index);
        init_tokens.push(quote! { #field_name: #take });
        if let Some(tokens) = param.deserializer_tokens(&name_str) {
            deserializer_tokens.push(tokens);
        }
    }

    let entry = options.deserializer;
    let args_binding = if fields.is_empty() {
        quote! { _args }
    } else {
        quote! { mut __args }
    };
    let merge = if options.factories {
        quote! {
            __meta.extend(<Self as ::rowbind_api::DeclaredFactories>::declared_factories());
        }
    } else {
        quote! {}
    };

    let expanded = quote! {
        impl ::rowbind_api::RowMapped for #name {
            fn type_metadata() -> ::rowbind_api::metadata::TypeMetadata {
                use ::rowbind_api::metadata as __m;

                let mut __meta = __m::TypeMetadata::new(__m::TypeKey::of::<Self>());
                __meta.add_factory(__m::FactoryMeta {
                    name: #name_str,
                    kind: __m::FactoryKind::Constructor { primary: true },
                    deserializer_entry: #entry,
                    params: vec![#(#param_tokens),*],
                    invoke: __m::Invocable::new(|#args_binding: __m::Args| {
                        Ok(::std::boxed::Box::new(Self { #(#init_tokens),* }) as __m::AnyValue)
                    }),
                });
                #(__meta.add_deserializer(#deserializer_tokens);)*
                #merge
                __meta
            }
        }
    };

    Ok(expanded)
}
