//! Parsing of `#[bind(...)]` attributes.

use syn::{spanned::Spanned, Attribute, Data, DeriveInput, Fields, Ident, LitStr, Path};

/// Where a field's value comes from.
#[derive(Debug)]
pub enum ParamSource {
    /// `#[bind(path = "...")]`
    Path(LitStr),
    /// `#[bind(query = "...")]`
    Query(LitStr),
}

/// One field of the destination struct.
#[derive(Debug)]
pub struct BindField {
    /// Field identifier.
    pub ident: Ident,
    /// Field name as reported in errors, without any `r#` prefix.
    pub name: String,
    /// Path or query source.
    pub param: Option<ParamSource>,
    /// Body key. Defaults to the field name for untagged fields.
    pub body: Option<LitStr>,
    /// `#[bind(skip)]`
    pub skip: bool,
}

/// The parsed destination struct.
#[derive(Debug)]
pub struct BindInput {
    /// Struct identifier.
    pub ident: Ident,
    /// Path of the core crate, `::harmony_core` unless overridden.
    pub krate: Path,
    /// Fields in declaration order.
    pub fields: Vec<BindField>,
}

impl BindInput {
    pub fn parse(input: &DeriveInput) -> syn::Result<Self> {
        if !input.generics.params.is_empty() {
            return Err(syn::Error::new(
                input.generics.span(),
                "Bind cannot be derived for generic types",
            ));
        }

        let named = match &input.data {
            Data::Struct(data) => match &data.fields {
                Fields::Named(named) => named,
                _ => {
                    return Err(syn::Error::new(
                        input.ident.span(),
                        "Bind can only be derived for structs with named fields",
                    ))
                }
            },
            _ => {
                return Err(syn::Error::new(
                    input.ident.span(),
                    "Bind can only be derived for structs",
                ))
            }
        };

        let krate = parse_container_attrs(&input.attrs)?
            .unwrap_or_else(|| syn::parse_quote!(::harmony_core));

        let mut fields = Vec::with_capacity(named.named.len());
        for field in &named.named {
            let Some(ident) = field.ident.clone() else {
                continue;
            };
            let name = ident.to_string().trim_start_matches("r#").to_string();
            fields.push(parse_field(&field.attrs, ident, name)?);
        }

        Ok(Self {
            ident: input.ident.clone(),
            krate,
            fields,
        })
    }
}

fn parse_container_attrs(attrs: &[Attribute]) -> syn::Result<Option<Path>> {
    let mut krate = None;
    for attr in attrs.iter().filter(|a| a.path().is_ident("bind")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                let lit: LitStr = meta.value()?.parse()?;
                krate = Some(lit.parse::<Path>()?);
                Ok(())
            } else {
                Err(meta.error("unsupported container attribute, expected `crate`"))
            }
        })?;
    }
    Ok(krate)
}

fn parse_field(attrs: &[Attribute], ident: Ident, name: String) -> syn::Result<BindField> {
    let mut param: Option<ParamSource> = None;
    let mut body: Option<LitStr> = None;
    let mut skip = false;
    let mut tagged = false;

    for attr in attrs.iter().filter(|a| a.path().is_ident("bind")) {
        tagged = true;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("path") || meta.path.is_ident("query") {
                if param.is_some() {
                    return Err(meta.error("a field takes at most one of `path` and `query`"));
                }
                let key: LitStr = meta.value()?.parse()?;
                param = Some(if meta.path.is_ident("path") {
                    ParamSource::Path(key)
                } else {
                    ParamSource::Query(key)
                });
                Ok(())
            } else if meta.path.is_ident("body") {
                if body.is_some() {
                    return Err(meta.error("duplicate `body` attribute"));
                }
                body = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("skip") {
                skip = true;
                Ok(())
            } else {
                Err(meta.error("unsupported bind attribute, expected `path`, `query`, `body` or `skip`"))
            }
        })?;
    }

    if skip && (param.is_some() || body.is_some()) {
        return Err(syn::Error::new(
            ident.span(),
            "`skip` cannot be combined with a value source",
        ));
    }
    if !tagged {
        body = Some(LitStr::new(&name, ident.span()));
    }

    Ok(BindField {
        ident,
        name,
        param,
        body,
        skip,
    })
}
