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

use core::str::FromStr;

use amplify::hex::{self, FromHex};
use amplify::Bytes32;
use indexmap::map;
use indexmap::IndexMap;
use strict_encoding::FieldName;

use crate::LIB_NAME_FAE;

/// An opaque public key identifying a transaction signer.
///
/// Key generation and signature verification belong to the host; the engine
/// only carries keys into the transaction record and exposes the primary one
/// through `sender()`.
#[derive(Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, From, Display, Default)]
#[wrapper(Deref, AsSlice, BorrowSlice, Hex)]
#[display(LowerHex)]
#[derive(StrictType, StrictEncode, StrictDecode)]
#[strict_type(lib = LIB_NAME_FAE)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct PublicKey(Bytes32);

impl PublicKey {
    pub fn with(key: [u8; 32]) -> Self { Self(Bytes32::from(key)) }
}

impl FromStr for PublicKey {
    type Err = hex::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Self::from_hex(s) }
}

/// Named signers of a transaction, in declaration order.
///
/// The first signer is the primary one reported by `sender()` inside
/// contract and transaction code.
#[derive(Wrapper, WrapperMut, Clone, PartialEq, Eq, Debug, Default, From)]
#[wrapper(Deref)]
#[wrapper_mut(DerefMut)]
pub struct Signers(IndexMap<FieldName, PublicKey>);

impl Signers {
    pub fn new() -> Self { Self::default() }

    pub fn with(name: impl Into<FieldName>, key: PublicKey) -> Self {
        let mut signers = Self::new();
        signers.add(name, key);
        signers
    }

    pub fn add(&mut self, name: impl Into<FieldName>, key: PublicKey) {
        self.0.insert(name.into(), key);
    }

    /// The first declared signer's key, if any.
    pub fn primary(&self) -> Option<PublicKey> { self.0.values().next().copied() }
}

impl IntoIterator for Signers {
    type Item = (FieldName, PublicKey);
    type IntoIter = map::IntoIter<FieldName, PublicKey>;

    fn into_iter(self) -> Self::IntoIter { self.0.into_iter() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_is_first_declared() {
        let mut signers = Signers::with("alice", PublicKey::with([0x11; 32]));
        signers.add("bob", PublicKey::with([0x22; 32]));
        assert_eq!(signers.primary(), Some(PublicKey::with([0x11; 32])));
        assert_eq!(signers.len(), 2);
    }

    #[test]
    fn key_hex_roundtrip() {
        let key = PublicKey::with([0xA7; 32]);
        assert_eq!(PublicKey::from_str(&key.to_string()).unwrap(), key);
    }
}
