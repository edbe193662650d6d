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

use core::fmt::{self, Display, Formatter};

use strict_encoding::{FieldName, TypeName};

use crate::escrow::{EscrowId, EscrowTy};

/// The dynamic value carrier in which all contract arguments, results and
/// transaction results travel.
///
/// Struct fields keep declaration order; no shape of the model iterates in
/// hash order, so rendering and traversal are deterministic.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "camelCase"))]
pub enum Value {
    Unit,
    Bool(bool),
    U64(u64),
    Bytes(Vec<u8>),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Struct(TypeName, Vec<(FieldName, Value)>),
    Escrow(EscrowId),
}

impl Value {
    pub fn structure(
        name: impl Into<TypeName>,
        fields: impl IntoIterator<Item = (FieldName, Value)>,
    ) -> Self {
        Value::Struct(name.into(), fields.into_iter().collect())
    }

    /// Best-effort runtime type of the value, used as the "actual" side of
    /// argument-mismatch diagnostics.
    pub fn ty(&self) -> ValueTy {
        match self {
            Value::Unit => ValueTy::Unit,
            Value::Bool(_) => ValueTy::Bool,
            Value::U64(_) => ValueTy::U64,
            Value::Bytes(_) => ValueTy::Bytes,
            Value::Str(_) => ValueTy::Str,
            Value::List(items) => {
                let elem = items.first().map(Value::ty).unwrap_or(ValueTy::Unit);
                ValueTy::List(Box::new(elem))
            }
            Value::Tuple(items) => ValueTy::Tuple(items.iter().map(Value::ty).collect()),
            Value::Struct(name, _) => ValueTy::Struct(name.clone()),
            Value::Escrow(id) => ValueTy::Escrow(Box::new(id.ty.clone())),
        }
    }

    /// Checks the value against a declared static type.
    pub fn conforms(&self, ty: &ValueTy) -> bool {
        match (self, ty) {
            (Value::Unit, ValueTy::Unit)
            | (Value::Bool(_), ValueTy::Bool)
            | (Value::U64(_), ValueTy::U64)
            | (Value::Bytes(_), ValueTy::Bytes)
            | (Value::Str(_), ValueTy::Str) => true,
            (Value::List(items), ValueTy::List(elem)) => items.iter().all(|v| v.conforms(elem)),
            (Value::Tuple(items), ValueTy::Tuple(tys)) => {
                items.len() == tys.len() && items.iter().zip(tys).all(|(v, t)| v.conforms(t))
            }
            (Value::Struct(name, _), ValueTy::Struct(expected)) => name == expected,
            (Value::Escrow(id), ValueTy::Escrow(expected)) => id.ty == **expected,
            _ => false,
        }
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self { Value::U64(value) }
}
impl From<bool> for Value {
    fn from(value: bool) -> Self { Value::Bool(value) }
}
impl From<&str> for Value {
    fn from(value: &str) -> Self { Value::Str(value.to_owned()) }
}
impl From<String> for Value {
    fn from(value: String) -> Self { Value::Str(value) }
}
impl From<EscrowId> for Value {
    fn from(id: EscrowId) -> Self { Value::Escrow(id) }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::U64(n) => write!(f, "{n}"),
            Value::Bytes(bytes) => {
                f.write_str("0x")?;
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                f.write_str("[")?;
                display_joined(f, items)?;
                f.write_str("]")
            }
            Value::Tuple(items) => {
                f.write_str("(")?;
                display_joined(f, items)?;
                f.write_str(")")
            }
            Value::Struct(name, fields) => {
                write!(f, "{name}(")?;
                for (no, (field, value)) in fields.iter().enumerate() {
                    if no > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{field}={value}")?;
                }
                f.write_str(")")
            }
            Value::Escrow(id) => write!(f, "{id}"),
        }
    }
}

fn display_joined(f: &mut Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (no, item) in items.iter().enumerate() {
        if no > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Static type descriptor against which dynamic values are checked at frame
/// boundaries.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "camelCase"))]
pub enum ValueTy {
    Unit,
    Bool,
    U64,
    Bytes,
    Str,
    List(Box<ValueTy>),
    Tuple(Vec<ValueTy>),
    Struct(TypeName),
    Escrow(Box<EscrowTy>),
}

impl Display for ValueTy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ValueTy::Unit => f.write_str("()"),
            ValueTy::Bool => f.write_str("Bool"),
            ValueTy::U64 => f.write_str("U64"),
            ValueTy::Bytes => f.write_str("Bytes"),
            ValueTy::Str => f.write_str("Str"),
            ValueTy::List(elem) => write!(f, "[{elem}]"),
            ValueTy::Tuple(items) => {
                f.write_str("(")?;
                for (no, item) in items.iter().enumerate() {
                    if no > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            ValueTy::Struct(name) => write!(f, "{name}"),
            ValueTy::Escrow(ty) => write!(f, "Escrow({ty})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conformance_accepts_matching_shapes() {
        assert!(Value::Unit.conforms(&ValueTy::Unit));
        assert!(Value::U64(7).conforms(&ValueTy::U64));
        let list = Value::List(vec![1u64.into(), 2u64.into()]);
        assert!(list.conforms(&ValueTy::List(Box::new(ValueTy::U64))));
        let tuple = Value::Tuple(vec![Value::Unit, true.into()]);
        assert!(tuple.conforms(&ValueTy::Tuple(vec![ValueTy::Unit, ValueTy::Bool])));
    }

    #[test]
    fn conformance_rejects_mismatches() {
        assert!(!Value::U64(7).conforms(&ValueTy::Bool));
        let list = Value::List(vec![1u64.into(), Value::Unit]);
        assert!(!list.conforms(&ValueTy::List(Box::new(ValueTy::U64))));
        let tuple = Value::Tuple(vec![Value::Unit]);
        assert!(!tuple.conforms(&ValueTy::Tuple(vec![ValueTy::Unit, ValueTy::Unit])));
        assert!(!Value::structure("Token", []).conforms(&ValueTy::Struct(TypeName::from("Coin"))));
    }

    #[test]
    fn rendering_is_structural() {
        let value = Value::structure("Wallet", [
            (FieldName::from("owner"), "alice".into()),
            (FieldName::from("balance"), 42u64.into()),
        ]);
        assert_eq!(value.to_string(), r#"Wallet(owner="alice", balance=42)"#);
        assert_eq!(Value::Bytes(vec![0xde, 0xad]).to_string(), "0xdead");
    }
}
