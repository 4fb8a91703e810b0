//! Radix tree node.
//!
//! Paths are split on `/` and each segment becomes one level of the tree.
//! A node owns its static children (kept sorted for binary search), at most
//! one parameter child and at most one wildcard child.

use std::borrow::Cow;

use http::Method;
use percent_encoding::percent_decode_str;

use crate::error::RouteError;
use crate::method_router::MethodRouter;
use crate::params::Params;

fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Percent-decodes a captured value, keeping the raw text if the result is
/// not UTF-8.
fn decode(raw: &str) -> String {
    percent_decode_str(raw)
        .decode_utf8()
        .map_or_else(|_| raw.to_string(), Cow::into_owned)
}

/// Kind of a path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    /// Literal segment such as `users`.
    Static,
    /// Single-segment variable, written `{id}` or `:id`.
    Param(String),
    /// Catch-all variable, written `*path`. Must be the final segment.
    Wildcard(String),
}

impl SegmentKind {
    fn parse(segment: &str) -> Self {
        if let Some(name) = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
        {
            Self::Param(name.to_string())
        } else if let Some(name) = segment.strip_prefix(':') {
            Self::Param(name.to_string())
        } else if let Some(name) = segment.strip_prefix('*') {
            Self::Wildcard(name.to_string())
        } else {
            Self::Static
        }
    }
}

/// A node of the routing tree, generic over the value stored per method.
#[derive(Debug, Clone)]
pub struct Node<T> {
    segment: String,
    kind: SegmentKind,
    methods: Option<MethodRouter<T>>,
    static_children: Vec<Node<T>>,
    param_child: Option<Box<Node<T>>>,
    wildcard_child: Option<Box<Node<T>>>,
}

impl<T> Node<T> {
    fn new(segment: &str, kind: SegmentKind) -> Self {
        Self {
            segment: segment.to_string(),
            kind,
            methods: None,
            static_children: Vec::new(),
            param_child: None,
            wildcard_child: None,
        }
    }

    /// Creates the root of an empty tree.
    #[must_use]
    pub fn root() -> Self {
        Self::new("", SegmentKind::Static)
    }

    /// Returns the method table stored at `path`, creating every missing
    /// node along the way.
    pub fn entry(&mut self, path: &str) -> Result<&mut MethodRouter<T>, RouteError> {
        let segments = split(path);
        self.entry_segments(path, &segments)
    }

    fn entry_segments(
        &mut self,
        path: &str,
        segments: &[&str],
    ) -> Result<&mut MethodRouter<T>, RouteError> {
        let Some((segment, remaining)) = segments.split_first() else {
            return Ok(self.methods.get_or_insert_with(MethodRouter::new));
        };

        match SegmentKind::parse(segment) {
            SegmentKind::Static => {
                let index = match self
                    .static_children
                    .binary_search_by(|c| c.segment.as_str().cmp(segment))
                {
                    Ok(i) => i,
                    Err(i) => {
                        self.static_children
                            .insert(i, Node::new(segment, SegmentKind::Static));
                        i
                    }
                };
                self.static_children[index].entry_segments(path, remaining)
            }
            SegmentKind::Param(name) => {
                if name.is_empty() {
                    return Err(RouteError::EmptyParamName {
                        path: path.to_string(),
                    });
                }
                let child = self.param_child.get_or_insert_with(|| {
                    Box::new(Node::new(segment, SegmentKind::Param(name.clone())))
                });
                if child.kind != SegmentKind::Param(name.clone()) {
                    return Err(RouteError::ParamConflict {
                        path: path.to_string(),
                        existing: child.segment.clone(),
                    });
                }
                child.entry_segments(path, remaining)
            }
            SegmentKind::Wildcard(name) => {
                if !remaining.is_empty() {
                    return Err(RouteError::WildcardNotLast {
                        path: path.to_string(),
                    });
                }
                let child = self.wildcard_child.get_or_insert_with(|| {
                    Box::new(Node::new(segment, SegmentKind::Wildcard(name.clone())))
                });
                if child.kind != SegmentKind::Wildcard(name) {
                    return Err(RouteError::ParamConflict {
                        path: path.to_string(),
                        existing: child.segment.clone(),
                    });
                }
                Ok(child.methods.get_or_insert_with(MethodRouter::new))
            }
        }
    }

    /// Matches a request path, returning the method table and the captured
    /// variables.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<(&MethodRouter<T>, Params)> {
        let segments = split(path);
        let mut params = Params::new();
        let methods = self.walk(&segments, &mut params, &mut |methods| Some(methods))?;
        Some((methods, params))
    }

    /// Matches a request method and path.
    ///
    /// Branches whose path matches but lack `method` are skipped; their
    /// methods are appended to `allowed` so the caller can answer `405`.
    pub fn match_route(
        &self,
        method: &Method,
        path: &str,
        allowed: &mut Vec<Method>,
    ) -> Option<(&T, Params)> {
        let segments = split(path);
        let mut params = Params::new();
        let value = self.walk(&segments, &mut params, &mut |methods| {
            let value = methods.get(method);
            if value.is_none() {
                for candidate in methods.allowed_methods() {
                    if !allowed.contains(&candidate) {
                        allowed.push(candidate);
                    }
                }
            }
            value
        })?;
        Some((value, params))
    }

    fn walk<'a, R>(
        &'a self,
        segments: &[&str],
        params: &mut Params,
        accept: &mut impl FnMut(&'a MethodRouter<T>) -> Option<R>,
    ) -> Option<R> {
        let Some((segment, remaining)) = segments.split_first() else {
            return self.methods.as_ref().and_then(|methods| accept(methods));
        };

        if let Ok(i) = self
            .static_children
            .binary_search_by(|c| c.segment.as_str().cmp(segment))
        {
            if let Some(found) = self.static_children[i].walk(remaining, params, accept) {
                return Some(found);
            }
        }

        if let Some(child) = &self.param_child {
            if let SegmentKind::Param(name) = &child.kind {
                let mark = params.len();
                params.push(name.as_str(), decode(segment));
                if let Some(found) = child.walk(remaining, params, accept) {
                    return Some(found);
                }
                params.truncate(mark);
            }
        }

        if let Some(child) = &self.wildcard_child {
            if let SegmentKind::Wildcard(name) = &child.kind {
                let found = child.methods.as_ref().and_then(|methods| accept(methods))?;
                params.push(name.as_str(), decode(&segments.join("/")));
                return Some(found);
            }
        }

        None
    }

    /// Rebuilds the tree with every stored value passed through `f`.
    pub fn map<U>(self, f: &mut impl FnMut(&Method, T) -> U) -> Node<U> {
        Node {
            segment: self.segment,
            kind: self.kind,
            methods: self.methods.map(|m| m.map(&mut *f)),
            static_children: self.static_children.into_iter().map(|c| c.map(f)).collect(),
            param_child: self.param_child.map(|c| Box::new((*c).map(f))),
            wildcard_child: self.wildcard_child.map(|c| Box::new((*c).map(f))),
        }
    }
}
