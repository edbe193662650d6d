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
use sha3::{Digest as _, Sha3_256};
use strict_encoding::StrictSerialize;

use crate::LIB_NAME_FAE;

/// A 32-byte SHA3-256 digest, the basis of every content-addressed identifier.
#[derive(Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, From, Display)]
#[wrapper(Deref, AsSlice, BorrowSlice, Hex)]
#[display(LowerHex)]
#[derive(StrictType, StrictDumb, StrictEncode, StrictDecode)]
#[strict_type(lib = LIB_NAME_FAE)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct Digest(Bytes32);

impl Digest {
    pub const LEN: usize = 32;

    /// Hashes raw bytes.
    pub fn hash(data: impl AsRef<[u8]>) -> Self {
        let mut engine = Sha3_256::new();
        engine.update(data.as_ref());
        Self::from_engine(engine)
    }

    /// Hashes the strict-encoded form of a value, producing its
    /// content-addressed identifier.
    pub fn commit(data: &impl StrictSerialize) -> Self {
        let bytes = data
            .to_strict_serialized::<{ usize::MAX }>()
            .expect("identifier serialization is confined only by usize::MAX");
        Self::hash(bytes.as_slice())
    }

    /// Derives the `index`-th child digest. Children of distinct parents or
    /// distinct indices never collide short of a SHA3 break.
    pub fn derive(&self, index: u32) -> Self {
        let mut engine = Sha3_256::new();
        engine.update(self.0.to_byte_array());
        engine.update(index.to_le_bytes());
        Self::from_engine(engine)
    }

    pub fn to_byte_array(&self) -> [u8; 32] { self.0.to_byte_array() }

    fn from_engine(engine: Sha3_256) -> Self {
        let hash: [u8; 32] = engine.finalize().into();
        Self(Bytes32::from_byte_array(hash))
    }
}

impl FromStr for Digest {
    type Err = hex::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Self::from_hex(s) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let digest = Digest::hash(b"fae");
        let printed = digest.to_string();
        assert_eq!(printed.len(), 64);
        assert_eq!(Digest::from_str(&printed).unwrap(), digest);
    }

    #[test]
    fn hashing_is_stable() {
        assert_eq!(Digest::hash(b"fae"), Digest::hash(b"fae"));
        assert_ne!(Digest::hash(b"fae"), Digest::hash(b"fea"));
    }

    #[test]
    fn derivation_separates_indexes() {
        let parent = Digest::hash(b"parent");
        assert_ne!(parent.derive(0), parent.derive(1));
        assert_ne!(parent.derive(0), parent);
        assert_eq!(parent.derive(7), parent.derive(7));
    }
}
