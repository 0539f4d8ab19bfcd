use proc_macro2::TokenStream;
use quote::quote;
use syn::{Attribute, Expr, GenericArgument, LitStr, Path, PathArguments, Type};

pub(crate) fn is_row_attr(attr: &Attribute) -> bool {
    attr.path().is_ident("row")
}

pub(crate) enum DefaultValue {
    /// `#[row(default)]`: `Default::default()`.
    Trait,
    /// `#[row(default = "path")]`: `path()`.
    Path(Path),
}

/// `#[row(...)]` on a struct field or a factory parameter.
#[derive(Default)]
pub(crate) struct ParamAttrs {
    pub rename: Option<String>,
    pub default: Option<DefaultValue>,
    pub nested: bool,
    pub flatten: bool,
    pub joiner: Option<String>,
    pub parse: bool,
    pub deserialize_with: Option<Expr>,
}

impl ParamAttrs {
    pub fn from_attrs(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut out = ParamAttrs::default();
        for attr in attrs.iter().filter(|a| is_row_attr(a)) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let value: LitStr = meta.value()?.parse()?;
                    out.rename = Some(value.value());
                } else if meta.path.is_ident("default") {
                    if meta.input.peek(syn::Token![=]) {
                        let value: LitStr = meta.value()?.parse()?;
                        out.default = Some(DefaultValue::Path(value.parse()?));
                    } else {
                        out.default = Some(DefaultValue::Trait);
                    }
                } else if meta.path.is_ident("nested") {
                    out.nested = true;
                } else if meta.path.is_ident("flatten") {
                    out.flatten = true;
                } else if meta.path.is_ident("joiner") {
                    let value: LitStr = meta.value()?.parse()?;
                    match value.value().as_str() {
                        "snake" | "camel" | "kebab" => out.joiner = Some(value.value()),
                        other => {
                            return Err(meta.error(format!(
                                "unknown joiner '{other}' (expected 'snake', 'camel' or 'kebab')"
                            )));
                        }
                    }
                } else if meta.path.is_ident("parse") {
                    out.parse = true;
                } else if meta.path.is_ident("deserialize_with") {
                    let value: LitStr = meta.value()?.parse()?;
                    out.deserialize_with = Some(value.parse()?);
                } else {
                    return Err(meta.error("unknown row parameter attribute"));
                }
                Ok(())
            })?;
        }
        Ok(out)
    }

    fn check(&self, span: &impl quote::ToTokens) -> syn::Result<()> {
        let shapes = [
            self.default.is_some(),
            self.nested,
            self.flatten,
            self.parse,
            self.deserialize_with.is_some(),
        ];
        if shapes.iter().filter(|s| **s).count() > 1 {
            return Err(syn::Error::new_spanned(
                span,
                "at most one of default, nested, flatten, parse, deserialize_with may be set",
            ));
        }
        if self.joiner.is_some() && !self.flatten {
            return Err(syn::Error::new_spanned(span, "joiner requires flatten"));
        }
        Ok(())
    }
}

/// A constructor or factory parameter about to be described.
pub(crate) struct Param<'a> {
    pub name: String,
    pub ty: &'a Type,
    pub attrs: ParamAttrs,
}

impl<'a> Param<'a> {
    pub fn new(name: String, ty: &'a Type, attrs: &[Attribute]) -> syn::Result<Self> {
        let attrs = ParamAttrs::from_attrs(attrs)?;
        attrs.check(ty)?;
        Ok(Self { name, ty, attrs })
    }

    /// `Option<T>` parameters are nullable, except defaulted ones whose
    /// whole type is produced by the default.
    fn nullable_inner(&self) -> Option<&'a Type> {
        if self.attrs.default.is_some() {
            None
        } else {
            option_inner(self.ty)
        }
    }

    fn declared(&self) -> &'a Type {
        self.nullable_inner().unwrap_or(self.ty)
    }

    /// `__m::ParamMeta { .. }` expression.
    pub fn meta_tokens(&self) -> TokenStream {
        let name = &self.name;
        let declared = self.declared();
        let nullable = self.nullable_inner().is_some();
        let alias = match &self.attrs.rename {
            Some(alias) => quote! { Some(#alias) },
            None => quote! { None },
        };
        let shape = if let Some(default) = &self.attrs.default {
            let ty = self.ty;
            let value = match default {
                DefaultValue::Trait => quote! { <#ty as ::core::default::Default>::default() },
                DefaultValue::Path(path) => quote! { #path() },
            };
            quote! { __m::ParamShape::Default(|| ::std::boxed::Box::new(#value) as __m::AnyValue) }
        } else if self.attrs.nested {
            quote! { __m::ParamShape::Nested(<#declared as ::rowbind_api::RowMapped>::type_metadata) }
        } else if self.attrs.flatten {
            let joiner = match self.attrs.joiner.as_deref() {
                Some("snake") => quote! { Some(__m::NameJoiner::Snake) },
                Some("camel") => quote! { Some(__m::NameJoiner::Camel) },
                Some("kebab") => quote! { Some(__m::NameJoiner::Kebab) },
                _ => quote! { None },
            };
            quote! {
                __m::ParamShape::Flatten {
                    metadata: <#declared as ::rowbind_api::RowMapped>::type_metadata,
                    joiner: #joiner,
                }
            }
        } else {
            quote! { __m::ParamShape::Column }
        };

        quote! {
            __m::ParamMeta {
                name: #name,
                alias: #alias,
                declared: __m::TypeKey::of::<#declared>(),
                nullable: #nullable,
                shape: #shape,
            }
        }
    }

    /// Expression pulling argument `index` out of `__args`.
    pub fn take_tokens(&self, index: usize) -> TokenStream {
        match self.nullable_inner() {
            Some(inner) => quote! { __args.take_nullable::<#inner>(#index)? },
            None => {
                let ty = self.ty;
                quote! { __args.take::<#ty>(#index)? }
            }
        }
    }

    /// `__m::DeserializerMeta` expression for `parse` / `deserialize_with`,
    /// scoped to the factory declaring this parameter.
    pub fn deserializer_tokens(&self, factory: &str) -> Option<TokenStream> {
        let name = &self.name;
        let declared = self.declared();
        if self.attrs.parse {
            return Some(quote! {
                __m::DeserializerMeta::parse::<#declared>(#name).scoped(#factory)
            });
        }
        self.attrs.deserialize_with.as_ref().map(|expr| {
            let label = quote!(#expr).to_string();
            quote! {
                __m::DeserializerMeta::from_deserializer(#label, #name, #expr).scoped(#factory)
            }
        })
    }
}

/// `Option<T>` → `T`.
pub(crate) fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first() {
        Some(GenericArgument::Type(inner)) if args.args.len() == 1 => Some(inner),
        _ => None,
    }
}

/// Does the type's last path segment read `Result`?
pub(crate) fn is_result(ty: &Type) -> bool {
    match ty {
        Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .is_some_and(|seg| seg.ident == "Result"),
        _ => false,
    }
}
