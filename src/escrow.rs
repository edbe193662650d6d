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

use strict_encoding::TypeName;

use crate::ident::EntryId;
use crate::traverse::Path;
use crate::value::{Value, ValueTy};

/// Declared argument and result types of an escrow.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "camelCase"))]
pub struct EscrowTy {
    pub arg: ValueTy,
    pub val: ValueTy,
}

impl EscrowTy {
    pub fn new(arg: ValueTy, val: ValueTy) -> Self { EscrowTy { arg, val } }

    /// The type of the one-shot reward escrow minted for reward transactions.
    pub fn reward() -> Self {
        EscrowTy { arg: ValueTy::Unit, val: ValueTy::Struct(TypeName::from("Reward")) }
    }
}

impl Display for EscrowTy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.arg, self.val)
    }
}

/// How an escrow reference designates its backing entry.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "camelCase"))]
pub enum EscrowSource {
    /// A resolved reference to a live entry.
    Direct(EntryId),
    /// A deferred call with the argument captured in the caller context;
    /// executed when the containing value is normalized in its destination
    /// frame.
    TxIn(EntryId, Box<Value>),
    /// A completed deferred call carrying the returned value.
    TxOut(EntryId, Box<Value>),
    /// A symbolic path into the containing value; must be resolved before
    /// any operational use.
    Locator(Path),
}

/// A typed handle to an escrow.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "camelCase"))]
pub struct EscrowId {
    pub source: EscrowSource,
    pub ty: EscrowTy,
}

impl EscrowId {
    pub fn direct(entry: EntryId, ty: EscrowTy) -> Self {
        EscrowId { source: EscrowSource::Direct(entry), ty }
    }

    pub fn deferred(entry: EntryId, arg: Value, ty: EscrowTy) -> Self {
        EscrowId { source: EscrowSource::TxIn(entry, Box::new(arg)), ty }
    }

    pub fn locator(path: Path, ty: EscrowTy) -> Self {
        EscrowId { source: EscrowSource::Locator(path), ty }
    }

    /// The backing entry; symbolic locators have none.
    pub fn entry(&self) -> Result<EntryId, EscrowError> {
        match &self.source {
            EscrowSource::Direct(entry)
            | EscrowSource::TxIn(entry, _)
            | EscrowSource::TxOut(entry, _) => Ok(*entry),
            EscrowSource::Locator(path) => Err(EscrowError::UnresolvedEscrowLocator(path.clone())),
        }
    }

    /// The value returned by a completed deferred call.
    pub fn output(&self) -> Result<&Value, EscrowError> {
        match &self.source {
            EscrowSource::TxOut(_, val) => Ok(val),
            EscrowSource::Direct(entry) | EscrowSource::TxIn(entry, _) => {
                Err(EscrowError::NotEscrowOut(*entry))
            }
            EscrowSource::Locator(path) => Err(EscrowError::UnresolvedEscrowLocator(path.clone())),
        }
    }
}

impl Display for EscrowId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.source {
            EscrowSource::Direct(entry)
            | EscrowSource::TxIn(entry, _)
            | EscrowSource::TxOut(entry, _) => write!(f, "{entry} :: {}", self.ty),
            EscrowSource::Locator(path) => write!(f, "EscrowLocator {path} :: {}", self.ty),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum EscrowError {
    /// escrow {0} is not present in the current frame
    BadEscrowId(EntryId),

    /// {0} escrow(s) remain open at the end of the frame
    OpenEscrows(usize),

    /// escrow {0} referenced by a transferred value has no backing entry
    MissingEscrow(EntryId),

    /// escrow {0} is referenced more than once by a transferred value
    DuplicateEscrow(EntryId),

    /// escrow locator '{0}' does not resolve to a unique escrow
    UnresolvedEscrowLocator(Path),

    /// escrow {0} has not completed a deferred call, so it carries no output
    NotEscrowOut(EntryId),
}

#[cfg(test)]
mod tests {
    use core::str::FromStr;

    use super::*;
    use crate::crypto::Digest;

    fn entry(seed: &[u8]) -> EntryId { EntryId::from(Digest::hash(seed)) }

    #[test]
    fn display_formats() {
        let ty = EscrowTy::new(ValueTy::Unit, ValueTy::U64);
        let id = EscrowId::direct(entry(b"e"), ty.clone());
        assert_eq!(id.to_string(), format!("{} :: () -> U64", entry(b"e")));

        let locator = EscrowId::locator(Path::from_str("a.b.c").unwrap(), ty);
        assert_eq!(locator.to_string(), "EscrowLocator a.b.c :: () -> U64");
    }

    #[test]
    fn locators_never_expose_an_entry() {
        let path = Path::from_str("a.b").unwrap();
        let id = EscrowId::locator(path.clone(), EscrowTy::reward());
        assert_eq!(id.entry(), Err(EscrowError::UnresolvedEscrowLocator(path)));
    }

    #[test]
    fn only_completed_calls_carry_an_output() {
        let ty = EscrowTy::new(ValueTy::U64, ValueTy::U64);
        let done = EscrowId {
            source: EscrowSource::TxOut(entry(b"e"), Box::new(Value::U64(9))),
            ty: ty.clone(),
        };
        assert_eq!(done.output(), Ok(&Value::U64(9)));

        let pending = EscrowId::deferred(entry(b"e"), Value::U64(1), ty.clone());
        assert_eq!(pending.output(), Err(EscrowError::NotEscrowOut(entry(b"e"))));
        let direct = EscrowId::direct(entry(b"e"), ty);
        assert_eq!(direct.output(), Err(EscrowError::NotEscrowOut(entry(b"e"))));
    }
}
