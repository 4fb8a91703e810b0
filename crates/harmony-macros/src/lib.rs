//! Procedural macros for Harmony.
//!
//! `#[derive(Bind)]` generates the binding descriptor that
//! `harmony_core::Binder` uses to fill a struct from a request.
//!
//! # Field attributes
//!
//! - `#[bind(path = "name")]` - route variable `name`
//! - `#[bind(query = "name")]` - query parameter `name`
//! - `#[bind(body = "name")]` - key `name` of the JSON body
//! - `#[bind(skip)]` - never touched by the binder
//!
//! `path` or `query` may be combined with `body`. A field without any
//! `#[bind]` attribute is read from the body key equal to its name.
//!
//! # Container attributes
//!
//! - `#[bind(crate = "harmony::core")]` - path to the core crate when it is
//!   only reachable through a re-export
//!
//! # Example
//!
//! ```rust,ignore
//! use harmony_core::Bind;
//!
//! #[derive(Default, Bind)]
//! struct ShowUser {
//!     #[bind(path = "username")]
//!     name: String,
//!     #[bind(query = "is_active")]
//!     active: String,
//!     title: String,
//! }
//! ```

mod bind;
mod parse;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

/// Derives `harmony_core::bind::Bind`.
///
/// Path and query fields must implement `FromParam`; body fields must
/// implement `serde::Deserialize`. Generic structs, tuple structs and enums
/// are rejected.
#[proc_macro_derive(Bind, attributes(bind))]
pub fn derive_bind(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    bind::expand_bind(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
