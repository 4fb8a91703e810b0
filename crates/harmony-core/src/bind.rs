//! Tag-driven request binding.
//!
//! Each bindable type owns a [`Descriptor`]: an ordered table of its fields,
//! where each entry names the value source (path variable, query parameter
//! or body key) and a plain function that stores a decoded value into the
//! field. The table is built once per type, usually by
//! `#[derive(Bind)]`, and reused for every request.
//!
//! Binding runs in two phases:
//!
//! 1. every path- or query-sourced field, in declaration order, is parsed
//!    from its string with [`FromParam`]. An empty string counts as absent.
//!    The first parse failure aborts binding; fields before it keep their
//!    new values.
//! 2. unless the method is a read method (`GET`, `HEAD`), the body is
//!    decoded as a JSON object and body-sourced fields are filled by key.

use std::fmt;
use std::sync::OnceLock;

use http::Method;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::request::Request;

/// Stores a path or query value into a field.
pub type ParamSetter<T> = fn(&mut T, &str) -> std::result::Result<(), ParamError>;

/// Stores a decoded JSON value into a field.
pub type BodySetter<T> = fn(&mut T, Value) -> std::result::Result<(), serde_json::Error>;

/// Parse failure reported by a [`ParamSetter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamError {
    /// Expected kind, e.g. `i64`.
    pub kind: &'static str,
    /// Parser message.
    pub reason: String,
}

/// Types that can be parsed from a path variable or query value.
pub trait FromParam: Sized {
    /// Name used in error messages.
    const KIND: &'static str;

    /// Parses `raw`. `raw` is never empty when called by the binder.
    fn from_param(raw: &str) -> std::result::Result<Self, ParamError>;
}

/// Parses `raw` as `T`. Used by generated setters.
pub fn parse<T: FromParam>(raw: &str) -> std::result::Result<T, ParamError> {
    T::from_param(raw)
}

/// JSON value handed to body setters.
pub use serde_json::Value as JsonValue;

/// Decodes a body value into a field. Used by generated setters.
pub fn from_json<T: DeserializeOwned>(value: Value) -> std::result::Result<T, serde_json::Error> {
    serde_json::from_value(value)
}

impl FromParam for String {
    const KIND: &'static str = "string";

    fn from_param(raw: &str) -> std::result::Result<Self, ParamError> {
        Ok(raw.to_string())
    }
}

macro_rules! from_param_via_from_str {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromParam for $ty {
                const KIND: &'static str = stringify!($ty);

                fn from_param(raw: &str) -> std::result::Result<Self, ParamError> {
                    raw.parse::<$ty>().map_err(|err| ParamError {
                        kind: Self::KIND,
                        reason: err.to_string(),
                    })
                }
            }
        )*
    };
}

from_param_via_from_str!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl FromParam for bool {
    const KIND: &'static str = "bool";

    fn from_param(raw: &str) -> std::result::Result<Self, ParamError> {
        match raw {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
            _ => Err(ParamError {
                kind: Self::KIND,
                reason: "invalid boolean".to_string(),
            }),
        }
    }
}

impl<T: FromParam> FromParam for Option<T> {
    const KIND: &'static str = T::KIND;

    fn from_param(raw: &str) -> std::result::Result<Self, ParamError> {
        T::from_param(raw).map(Some)
    }
}

/// Where a path or query field reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSource {
    /// A route variable.
    Path,
    /// A query parameter.
    Query,
}

struct ParamBinding<T> {
    source: ParamSource,
    key: &'static str,
    set: ParamSetter<T>,
}

struct BodyBinding<T> {
    key: &'static str,
    set: BodySetter<T>,
}

struct Field<T> {
    name: &'static str,
    param: Option<ParamBinding<T>>,
    body: Option<BodyBinding<T>>,
}

/// Per-type binding table.
pub struct Descriptor<T> {
    type_name: &'static str,
    fields: Vec<Field<T>>,
}

impl<T> fmt::Debug for Descriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for field in &self.fields {
            let source = match (&field.param, &field.body) {
                (Some(p), _) => format!("{:?}({})", p.source, p.key),
                (None, Some(b)) => format!("Body({})", b.key),
                (None, None) => "Skip".to_string(),
            };
            list.entry(&format_args!("{} <- {}", field.name, source));
        }
        list.finish()
    }
}

/// Descriptor validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorError {
    /// Rust type name of the destination.
    pub type_name: &'static str,
    /// What is wrong with it.
    pub reason: String,
}

impl From<DescriptorError> for Error {
    fn from(err: DescriptorError) -> Self {
        Self::InvalidDestination {
            type_name: err.type_name,
            reason: err.reason,
        }
    }
}

impl<T> Descriptor<T> {
    /// Starts a descriptor for `T`.
    pub fn builder() -> DescriptorBuilder<T> {
        DescriptorBuilder {
            type_name: std::any::type_name::<T>(),
            fields: Vec::new(),
            problems: Vec::new(),
        }
    }

    /// Name of the described type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Number of fields in the table, skipped fields included.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the table has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Builder for [`Descriptor`]. Fields are bound in the order they are added.
pub struct DescriptorBuilder<T> {
    type_name: &'static str,
    fields: Vec<Field<T>>,
    problems: Vec<String>,
}

impl<T> DescriptorBuilder<T> {
    fn push(&mut self, field: Field<T>) {
        if self.fields.iter().any(|f| f.name == field.name) {
            self.problems
                .push(format!("field '{}' is declared twice", field.name));
        }
        if matches!(&field.param, Some(p) if p.key.is_empty()) {
            self.problems
                .push(format!("field '{}' has an empty source key", field.name));
        }
        if matches!(&field.body, Some(b) if b.key.is_empty()) {
            self.problems
                .push(format!("field '{}' has an empty body key", field.name));
        }
        self.fields.push(field);
    }

    /// Binds `field` from the route variable `key`.
    #[must_use]
    pub fn path(mut self, field: &'static str, key: &'static str, set: ParamSetter<T>) -> Self {
        self.push(Field {
            name: field,
            param: Some(ParamBinding {
                source: ParamSource::Path,
                key,
                set,
            }),
            body: None,
        });
        self
    }

    /// Binds `field` from the query parameter `key`.
    #[must_use]
    pub fn query(mut self, field: &'static str, key: &'static str, set: ParamSetter<T>) -> Self {
        self.push(Field {
            name: field,
            param: Some(ParamBinding {
                source: ParamSource::Query,
                key,
                set,
            }),
            body: None,
        });
        self
    }

    /// Binds `field` from the body key `key`.
    #[must_use]
    pub fn body(mut self, field: &'static str, key: &'static str, set: BodySetter<T>) -> Self {
        self.push(Field {
            name: field,
            param: None,
            body: Some(BodyBinding { key, set }),
        });
        self
    }

    /// Binds `field` from a path or query value and also from the body key
    /// `body_key`, which overrides it when present.
    #[must_use]
    pub fn param_and_body(
        mut self,
        field: &'static str,
        source: ParamSource,
        key: &'static str,
        set: ParamSetter<T>,
        body_key: &'static str,
        body_set: BodySetter<T>,
    ) -> Self {
        self.push(Field {
            name: field,
            param: Some(ParamBinding { source, key, set }),
            body: Some(BodyBinding {
                key: body_key,
                set: body_set,
            }),
        });
        self
    }

    /// Records a field the binder never touches.
    #[must_use]
    pub fn skip(mut self, field: &'static str) -> Self {
        self.push(Field {
            name: field,
            param: None,
            body: None,
        });
        self
    }

    /// Validates and finishes the table.
    pub fn build(self) -> std::result::Result<Descriptor<T>, DescriptorError> {
        let mut seen: Vec<&'static str> = Vec::new();
        let mut problems = self.problems;
        for body in self.fields.iter().filter_map(|f| f.body.as_ref()) {
            if seen.contains(&body.key) {
                problems.push(format!("body key '{}' is used by two fields", body.key));
            }
            seen.push(body.key);
        }

        if problems.is_empty() {
            Ok(Descriptor {
                type_name: self.type_name,
                fields: self.fields,
            })
        } else {
            Err(DescriptorError {
                type_name: self.type_name,
                reason: problems.join("; "),
            })
        }
    }
}

/// A type with a binding descriptor.
///
/// Usually derived:
///
/// ```
/// use harmony_core::Bind;
///
/// #[derive(Default, Bind)]
/// struct ShowUser {
///     #[bind(path = "username")]
///     name: String,
///     #[bind(query = "is_active")]
///     active: Option<bool>,
///     title: String,
/// }
///
/// let descriptor = ShowUser::descriptor().unwrap();
/// assert_eq!(descriptor.len(), 3);
/// ```
pub trait Bind: Sized + 'static {
    /// Returns the cached descriptor for this type.
    fn descriptor() -> Result<&'static Descriptor<Self>>;
}

/// Initialises `cell` once with `init` and returns the cached descriptor.
///
/// A failed build is cached too, so every bind of a malformed type reports
/// the same [`Error::InvalidDestination`].
pub fn cached<T: 'static>(
    cell: &'static OnceLock<std::result::Result<Descriptor<T>, DescriptorError>>,
    init: impl FnOnce() -> std::result::Result<Descriptor<T>, DescriptorError>,
) -> Result<&'static Descriptor<T>> {
    match cell.get_or_init(init) {
        Ok(descriptor) => Ok(descriptor),
        Err(err) => Err(err.clone().into()),
    }
}

const DEFAULT_READ_METHODS: [Method; 2] = [Method::GET, Method::HEAD];

/// Binds requests into [`Bind`] types.
///
/// A binder holds no per-request state, so one instance is shared by every
/// context.
#[derive(Debug, Clone)]
pub struct Binder {
    read_methods: Vec<Method>,
}

impl Default for Binder {
    fn default() -> Self {
        Self {
            read_methods: DEFAULT_READ_METHODS.to_vec(),
        }
    }
}

impl Binder {
    /// Creates a binder that skips the body for `GET` and `HEAD`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the set of methods whose body is never decoded.
    #[must_use]
    pub fn with_read_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.read_methods = methods.into_iter().collect();
        self
    }

    /// Returns true if `method` skips body decoding.
    pub fn is_read_method(&self, method: &Method) -> bool {
        self.read_methods.contains(method)
    }

    /// Binds `request` into `dest`.
    ///
    /// For write methods a non-empty body is always decoded, even when `T`
    /// has no body fields, so a malformed body is reported.
    pub fn bind<T: Bind>(&self, request: &Request, dest: &mut T) -> Result<()> {
        let descriptor = T::descriptor()?;
        self.bind_params(descriptor, request, dest)?;

        if self.is_read_method(request.method()) {
            return Ok(());
        }
        bind_body(descriptor, request.body(), dest)
    }

    /// Decodes the whole body as JSON into a new `T`.
    pub fn bind_json<T: DeserializeOwned>(&self, request: &Request) -> Result<T> {
        serde_json::from_slice(request.body()).map_err(Error::BodyDecode)
    }

    fn bind_params<T>(
        &self,
        descriptor: &Descriptor<T>,
        request: &Request,
        dest: &mut T,
    ) -> Result<()> {
        for field in &descriptor.fields {
            let Some(param) = &field.param else {
                continue;
            };
            let raw = match param.source {
                ParamSource::Path => request.params().get(param.key),
                ParamSource::Query => request.query(param.key),
            };
            let Some(raw) = raw.filter(|v| !v.is_empty()) else {
                continue;
            };
            (param.set)(dest, raw).map_err(|err| Error::TypeCoercion {
                field: field.name,
                value: raw.to_string(),
                kind: err.kind,
                reason: err.reason,
            })?;
        }
        Ok(())
    }
}

fn bind_body<T>(descriptor: &Descriptor<T>, body: &[u8], dest: &mut T) -> Result<()> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }

    let mut object = match serde_json::from_slice::<Value>(body).map_err(Error::BodyDecode)? {
        Value::Object(map) => map,
        Value::Null => return Ok(()),
        other => {
            return Err(Error::BodyDecode(serde::de::Error::custom(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))))
        }
    };

    for field in &descriptor.fields {
        let Some(body) = &field.body else {
            continue;
        };
        if let Some(value) = take_key(&mut object, body.key) {
            (body.set)(dest, value).map_err(Error::BodyDecode)?;
        }
    }
    Ok(())
}

/// Removes `key` from `object`, preferring an exact match and falling back
/// to a case-insensitive one.
fn take_key(object: &mut Map<String, Value>, key: &str) -> Option<Value> {
    if let Some(value) = object.remove(key) {
        return Some(value);
    }
    let found = object.keys().find(|k| k.eq_ignore_ascii_case(key))?.clone();
    object.remove(&found)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
