// Fae: deterministic smart-contract execution substrate with linear escrows
//
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except
// in compliance with the License. You may obtain a copy of the License at
//
//        http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License
// is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express
// or implied. See the License for the specific language governing permissions and limitations under
// the License.

//! Structural traversal over [`Value`] shapes visiting every escrow reference
//! together with its field path. The traversal backs the escrow transfer
//! discipline at call boundaries and the resolution of symbolic locators.

use core::fmt::{self, Display, Formatter};
use core::str::FromStr;

use strict_encoding::FieldName;

use crate::escrow::{EscrowError, EscrowId, EscrowSource};
use crate::value::Value;

/// A structural path of record field names, printed dotted (`a.b.c`).
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct Path(Vec<FieldName>);

impl Path {
    pub fn new() -> Self { Self::default() }

    pub fn with(segments: impl IntoIterator<Item = FieldName>) -> Self {
        Self(segments.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn iter(&self) -> impl Iterator<Item = &FieldName> { self.0.iter() }

    pub(crate) fn push(&mut self, segment: FieldName) { self.0.push(segment); }
    pub(crate) fn pop(&mut self) { self.0.pop(); }
}

impl Display for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (no, segment) in self.0.iter().enumerate() {
            if no > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = ParsePathError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ParsePathError::Empty);
        }
        let mut segments = Vec::new();
        for segment in s.split('.') {
            let segment = segment.trim();
            if !valid_segment(segment) {
                return Err(ParsePathError::Segment(segment.to_owned()));
            }
            segments.push(FieldName::from_str(segment).map_err(|_| ParsePathError::Segment(segment.to_owned()))?);
        }
        Ok(Self(segments))
    }
}

fn valid_segment(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum ParsePathError {
    /// empty locator path
    Empty,

    /// path segment '{0}' is not a valid identifier
    Segment(String),
}

/// Visits every escrow reference in `value` together with its structural
/// path. For a deferred call the captured argument is traversed before the
/// reference itself is presented.
pub fn traverse_escrows(value: &Value, f: &mut impl FnMut(&Path, &EscrowId)) {
    let mut path = Path::new();
    walk(value, &mut path, f);
}

fn walk(value: &Value, path: &mut Path, f: &mut impl FnMut(&Path, &EscrowId)) {
    match value {
        Value::List(items) | Value::Tuple(items) => {
            for item in items {
                walk(item, path, f);
            }
        }
        Value::Struct(_, fields) => {
            for (name, field) in fields {
                path.push(name.clone());
                walk(field, path, f);
                path.pop();
            }
        }
        Value::Escrow(id) => {
            if let EscrowSource::TxIn(_, arg) = &id.source {
                walk(arg, path, f);
            }
            f(path, id);
        }
        _ => {}
    }
}

/// Rebuilds `value` with every escrow reference rewritten through `f`.
/// Rewriting with the identity function reconstructs an equal value.
pub fn map_escrows<E>(
    value: Value,
    f: &mut impl FnMut(&Path, EscrowId) -> Result<EscrowId, E>,
) -> Result<Value, E> {
    let mut path = Path::new();
    rebuild(value, &mut path, f)
}

fn rebuild<E>(
    value: Value,
    path: &mut Path,
    f: &mut impl FnMut(&Path, EscrowId) -> Result<EscrowId, E>,
) -> Result<Value, E> {
    Ok(match value {
        Value::List(items) => Value::List(rebuild_items(items, path, f)?),
        Value::Tuple(items) => Value::Tuple(rebuild_items(items, path, f)?),
        Value::Struct(name, fields) => {
            let mut rebuilt = Vec::with_capacity(fields.len());
            for (field, inner) in fields {
                path.push(field.clone());
                let inner = rebuild(inner, path, f)?;
                path.pop();
                rebuilt.push((field, inner));
            }
            Value::Struct(name, rebuilt)
        }
        Value::Escrow(mut id) => {
            if let EscrowSource::TxIn(entry, arg) = id.source {
                let arg = rebuild(*arg, path, f)?;
                id.source = EscrowSource::TxIn(entry, Box::new(arg));
            }
            Value::Escrow(f(path, id)?)
        }
        other => other,
    })
}

fn rebuild_items<E>(
    items: Vec<Value>,
    path: &mut Path,
    f: &mut impl FnMut(&Path, EscrowId) -> Result<EscrowId, E>,
) -> Result<Vec<Value>, E> {
    let mut rebuilt = Vec::with_capacity(items.len());
    for item in items {
        rebuilt.push(rebuild(item, path, f)?);
    }
    Ok(rebuilt)
}

/// Resolves a symbolic locator path against a container value.
///
/// Exactly one non-locator escrow reference must sit at the path; zero or
/// several matches leave the locator unresolved.
pub fn resolve_locator(container: &Value, want: &Path) -> Result<EscrowId, EscrowError> {
    let mut found = Vec::new();
    traverse_escrows(container, &mut |path, id| {
        if path == want && !matches!(id.source, EscrowSource::Locator(_)) {
            found.push(id.clone());
        }
    });
    if found.len() == 1 {
        Ok(found.remove(0))
    } else {
        Err(EscrowError::UnresolvedEscrowLocator(want.clone()))
    }
}
