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
use core::str::FromStr;

use amplify::hex;
use strict_encoding::{StrictDumb, StrictSerialize};

use crate::crypto::Digest;
use crate::LIB_NAME_FAE;

/// Identifier of a transaction; assigned by the host that submits it.
#[derive(Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, From, Display)]
#[wrapper(Deref)]
#[display(inner)]
#[derive(StrictType, StrictDumb, StrictEncode, StrictDecode)]
#[strict_type(lib = LIB_NAME_FAE)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct TxId(Digest);

/// Identifier of a live escrow entry inside some escrow map.
#[derive(Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, From, Display)]
#[wrapper(Deref)]
#[display(inner)]
#[derive(StrictType, StrictDumb, StrictEncode, StrictDecode)]
#[strict_type(lib = LIB_NAME_FAE)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct EntryId(Digest);

/// Identifier of a value version recorded for audit.
#[derive(Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, From, Display)]
#[wrapper(Deref)]
#[display(inner)]
#[derive(StrictType, StrictDumb, StrictEncode, StrictDecode)]
#[strict_type(lib = LIB_NAME_FAE)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct VersionId(Digest);

/// Digest of a strict-encoded [`ContractId`]; the compact key under which
/// input records and trust sets name a contract.
#[derive(Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, From, Display)]
#[wrapper(Deref)]
#[display(inner)]
#[derive(StrictType, StrictDumb, StrictEncode, StrictDecode)]
#[strict_type(lib = LIB_NAME_FAE)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct ShortContractId(Digest);

/// Address of a contract in storage.
///
/// `JustTransaction` names a transaction itself and is never dispatchable;
/// the other two variants descend to a nonce-carrying output slot.
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
#[derive(StrictType, StrictDumb, StrictEncode, StrictDecode)]
#[strict_type(lib = LIB_NAME_FAE, tags = order, dumb = Self::JustTransaction(TxId::strict_dumb()))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "camelCase"))]
pub enum ContractId {
    /// The transaction itself.
    JustTransaction(TxId),
    /// The `i`-th top-level output of a transaction.
    TransactionOutput(TxId, u16),
    /// The `i`-th output published by the input referenced as the short id
    /// during a transaction.
    InputOutput(TxId, ShortContractId, u16),
}

impl StrictSerialize for ContractId {}

impl ContractId {
    /// The transaction whose entry this id descends into.
    pub fn txid(&self) -> TxId {
        match self {
            ContractId::JustTransaction(tx)
            | ContractId::TransactionOutput(tx, _)
            | ContractId::InputOutput(tx, _, _) => *tx,
        }
    }

    /// Content-addressed shortening: the digest of the strict-encoded id.
    pub fn shorten(&self) -> ShortContractId { ShortContractId(Digest::commit(self)) }
}

impl Display for ContractId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ContractId::JustTransaction(tx) => write!(f, "{tx}"),
            ContractId::TransactionOutput(tx, i) => write!(f, "{tx}/{i}"),
            ContractId::InputOutput(tx, short, i) => write!(f, "{tx}/{short}/{i}"),
        }
    }
}

impl FromStr for ContractId {
    type Err = ParseIdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = s.split('/');
        let tx = TxId::from(Digest::from_str(segments.next().unwrap_or_default())?);
        let id = match (segments.next(), segments.next(), segments.next()) {
            (None, ..) => ContractId::JustTransaction(tx),
            (Some(i), None, _) => ContractId::TransactionOutput(tx, parse_index(i)?),
            (Some(short), Some(i), None) => {
                let short = ShortContractId::from(Digest::from_str(short)?);
                ContractId::InputOutput(tx, short, parse_index(i)?)
            }
            _ => return Err(ParseIdError::Malformed(s.to_owned())),
        };
        Ok(id)
    }
}

fn parse_index(s: &str) -> Result<u16, ParseIdError> {
    s.parse().map_err(|_| ParseIdError::Index(s.to_owned()))
}

/// A contract id together with an optional asserted nonce (`:#` suffix).
///
/// When the nonce is present, dispatch verifies it against the slot's current
/// call count and aborts with `BadNonce` on mismatch.
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "camelCase"))]
pub struct ContractRef {
    pub id: ContractId,
    pub nonce: Option<u64>,
}

impl From<ContractId> for ContractRef {
    fn from(id: ContractId) -> Self { ContractRef { id, nonce: None } }
}

impl ContractRef {
    pub fn pinned(id: ContractId, nonce: u64) -> Self { ContractRef { id, nonce: Some(nonce) } }
}

impl Display for ContractRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.nonce {
            None => write!(f, "{}", self.id),
            Some(nonce) => write!(f, "{}:#{nonce}", self.id),
        }
    }
}

impl FromStr for ContractRef {
    type Err = ParseIdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(":#") {
            None => Ok(ContractRef::from(ContractId::from_str(s.trim())?)),
            Some((id, nonce)) => {
                let id = ContractId::from_str(id.trim())?;
                let nonce = nonce
                    .trim()
                    .parse()
                    .map_err(|_| ParseIdError::Nonce(nonce.trim().to_owned()))?;
                Ok(ContractRef::pinned(id, nonce))
            }
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum ParseIdError {
    /// invalid identifier hex: {0}
    #[from]
    Hex(hex::Error),

    /// malformed contract id '{0}'
    Malformed(String),

    /// '{0}' is not a valid output index
    Index(String),

    /// '{0}' is not a valid nonce
    Nonce(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txid(seed: &[u8]) -> TxId { TxId::from(Digest::hash(seed)) }

    #[test]
    fn contract_id_roundtrip() {
        let tx = txid(b"tx0");
        let short = ContractId::JustTransaction(txid(b"other")).shorten();
        for id in [
            ContractId::JustTransaction(tx),
            ContractId::TransactionOutput(tx, 3),
            ContractId::InputOutput(tx, short, 12),
        ] {
            assert_eq!(ContractId::from_str(&id.to_string()).unwrap(), id);
        }
    }

    #[test]
    fn contract_ref_roundtrip() {
        let id = ContractId::TransactionOutput(txid(b"tx0"), 0);
        let bare = ContractRef::from(id.clone());
        assert_eq!(ContractRef::from_str(&bare.to_string()).unwrap(), bare);
        let pinned = ContractRef::pinned(id.clone(), 2);
        assert_eq!(pinned.to_string(), format!("{id}:#2"));
        assert_eq!(ContractRef::from_str(&pinned.to_string()).unwrap(), pinned);
        // whitespace around the suffix is permitted
        assert_eq!(ContractRef::from_str(&format!("{id} :# 2")).unwrap(), pinned);
    }

    #[test]
    fn shortening_is_stable_and_variant_sensitive() {
        let tx = txid(b"tx0");
        let a = ContractId::TransactionOutput(tx, 0);
        let b = ContractId::TransactionOutput(tx, 1);
        assert_eq!(a.shorten(), a.shorten());
        assert_ne!(a.shorten(), b.shorten());
        assert_ne!(a.shorten(), ContractId::JustTransaction(tx).shorten());
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert!(ContractId::from_str("not-hex").is_err());
        let tx = txid(b"tx0");
        assert!(ContractId::from_str(&format!("{tx}/one")).is_err());
        assert!(ContractRef::from_str(&format!("{tx}/0:#x")).is_err());
    }
}
