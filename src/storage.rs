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

use std::collections::BTreeSet;
use std::fmt::{self, Debug, Formatter};

use indexmap::IndexMap;

use crate::engine::FaeError;
use crate::ident::{ContractId, ShortContractId, TxId, VersionId};
use crate::runtime::{ContractCode, ContractDef, EscrowMap};
use crate::sigs::Signers;
use crate::value::{Value, ValueTy};

/// A contract resident in an output slot.
pub(crate) struct StoredContract {
    pub(crate) arg_ty: ValueTy,
    pub(crate) code: Box<dyn ContractCode>,
    pub(crate) escrows: EscrowMap,
}

impl Debug for StoredContract {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredContract")
            .field("arg_ty", &self.arg_ty)
            .finish_non_exhaustive()
    }
}

/// A nonce-carrying output slot.
///
/// The nonce counts completed calls since creation. Spending clears the
/// contract but the slot keeps both its index and its nonce, so sibling
/// indices never shift.
#[derive(Debug)]
pub struct OutputCell {
    pub(crate) contract: Option<StoredContract>,
    pub trusts: BTreeSet<ShortContractId>,
    pub nonce: u64,
}

impl OutputCell {
    pub(crate) fn install(def: ContractDef) -> Self {
        OutputCell {
            contract: Some(StoredContract {
                arg_ty: def.arg_ty,
                code: def.code,
                escrows: def.escrows,
            }),
            trusts: def.trusts,
            nonce: 0,
        }
    }

    pub fn is_spent(&self) -> bool { self.contract.is_none() }
}

/// Record of one dispatched input within a transaction entry.
#[derive(Debug)]
pub struct InputRecord {
    /// The full contract id the short key stands for.
    pub real_id: ContractId,
    /// Outputs published during this input's dispatch, in creation order.
    pub outputs: Vec<OutputCell>,
    /// Value versions recorded for audit; populated by the external version
    /// control, empty when the engine alone writes the entry.
    pub versions: IndexMap<VersionId, ValueTy>,
}

/// A committed transaction entry. Written once at commit, read-only after.
#[derive(Debug)]
pub struct TxEntry {
    pub input_outputs: IndexMap<ShortContractId, InputRecord>,
    pub input_order: Vec<ShortContractId>,
    pub outputs: Vec<OutputCell>,
    pub signers: Signers,
    pub result: Value,
}

/// A transaction record in storage: either a committed entry or a poisoned
/// one whose semantic fields re-raise the failure captured during the run.
#[derive(Debug)]
pub enum TxRecord {
    Committed(TxEntry),
    Poisoned { err: FaeError, signers: Signers },
}

impl TxRecord {
    pub fn is_poisoned(&self) -> bool { matches!(self, TxRecord::Poisoned { .. }) }

    pub fn entry(&self) -> Result<&TxEntry, FaeError> {
        match self {
            TxRecord::Committed(entry) => Ok(entry),
            TxRecord::Poisoned { err, .. } => Err(err.clone()),
        }
    }

    fn entry_mut(&mut self) -> Result<&mut TxEntry, FaeError> {
        match self {
            TxRecord::Committed(entry) => Ok(entry),
            TxRecord::Poisoned { err, .. } => Err(err.clone()),
        }
    }

    pub fn result(&self) -> Result<&Value, FaeError> { self.entry().map(|e| &e.result) }

    pub fn outputs(&self) -> Result<&[OutputCell], FaeError> {
        self.entry().map(|e| e.outputs.as_slice())
    }

    pub fn input_outputs(&self) -> Result<&IndexMap<ShortContractId, InputRecord>, FaeError> {
        self.entry().map(|e| &e.input_outputs)
    }

    pub fn input_order(&self) -> Result<&[ShortContractId], FaeError> {
        self.entry().map(|e| e.input_order.as_slice())
    }

    /// Signers are known before execution starts, so they survive poisoning.
    pub fn signers(&self) -> &Signers {
        match self {
            TxRecord::Committed(entry) => &entry.signers,
            TxRecord::Poisoned { signers, .. } => signers,
        }
    }
}

/// The transaction map: every committed or poisoned transaction keyed by its
/// id, in arrival order.
#[derive(Debug, Default)]
pub struct Storage {
    txs: IndexMap<TxId, TxRecord>,
}

impl Storage {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.txs.len() }
    pub fn is_empty(&self) -> bool { self.txs.is_empty() }
    pub fn contains(&self, txid: TxId) -> bool { self.txs.contains_key(&txid) }

    pub fn record(&self, txid: TxId) -> Option<&TxRecord> { self.txs.get(&txid) }

    pub fn transactions(&self) -> impl Iterator<Item = (TxId, &TxRecord)> {
        self.txs.iter().map(|(txid, record)| (*txid, record))
    }

    /// Seeds storage with a committed entry carrying the given top-level
    /// outputs; the way genesis contracts enter the system without running a
    /// transaction.
    pub fn issue(
        &mut self,
        txid: TxId,
        outputs: Vec<ContractDef>,
        signers: Signers,
    ) -> Result<(), StorageError> {
        if self.txs.contains_key(&txid) {
            return Err(StorageError::RepeatedTransaction(txid));
        }
        let entry = TxEntry {
            input_outputs: IndexMap::new(),
            input_order: Vec::new(),
            outputs: outputs.into_iter().map(OutputCell::install).collect(),
            signers,
            result: Value::Unit,
        };
        self.txs.insert(txid, TxRecord::Committed(entry));
        Ok(())
    }

    /// Descends to the output slot a contract id addresses.
    ///
    /// Each level raises its own error; descending through a poisoned entry
    /// re-raises the captured failure.
    pub fn cell(&self, id: &ContractId) -> Result<&OutputCell, FaeError> {
        match id {
            ContractId::JustTransaction(_) => {
                Err(StorageError::InvalidContractId(id.clone()).into())
            }
            ContractId::TransactionOutput(tx, i) => {
                let record = self
                    .txs
                    .get(tx)
                    .ok_or(StorageError::BadTransactionId(*tx))?;
                record
                    .entry()?
                    .outputs
                    .get(*i as usize)
                    .ok_or_else(|| StorageError::BadContractId(id.clone()).into())
            }
            ContractId::InputOutput(tx, short, i) => {
                let record = self
                    .txs
                    .get(tx)
                    .ok_or(StorageError::BadTransactionId(*tx))?;
                record
                    .entry()?
                    .input_outputs
                    .get(short)
                    .ok_or(StorageError::BadInputId(*tx, *short))?
                    .outputs
                    .get(*i as usize)
                    .ok_or_else(|| StorageError::BadContractId(id.clone()).into())
            }
        }
    }

    pub(crate) fn cell_mut(&mut self, id: &ContractId) -> Result<&mut OutputCell, FaeError> {
        match id {
            ContractId::JustTransaction(_) => {
                Err(StorageError::InvalidContractId(id.clone()).into())
            }
            ContractId::TransactionOutput(tx, i) => {
                let record = self
                    .txs
                    .get_mut(tx)
                    .ok_or(StorageError::BadTransactionId(*tx))?;
                record
                    .entry_mut()?
                    .outputs
                    .get_mut(*i as usize)
                    .ok_or_else(|| StorageError::BadContractId(id.clone()).into())
            }
            ContractId::InputOutput(tx, short, i) => {
                let record = self
                    .txs
                    .get_mut(tx)
                    .ok_or(StorageError::BadTransactionId(*tx))?;
                record
                    .entry_mut()?
                    .input_outputs
                    .get_mut(short)
                    .ok_or(StorageError::BadInputId(*tx, *short))?
                    .outputs
                    .get_mut(*i as usize)
                    .ok_or_else(|| StorageError::BadContractId(id.clone()).into())
            }
        }
    }

    /// Current nonce of the slot a contract id addresses.
    pub fn nonce_at(&self, id: &ContractId) -> Result<u64, FaeError> {
        self.cell(id).map(|cell| cell.nonce).map_err(|err| match err {
            FaeError::Storage(StorageError::BadContractId(id)) => {
                StorageError::InvalidNonceAt(id).into()
            }
            other => other,
        })
    }

    /// Takes the contract out of its slot for dispatch, leaving the slot
    /// assigned. The caller either writes an update back through
    /// [`Self::apply_update`] or restores it via [`Self::restore`].
    pub(crate) fn take_contract(
        &mut self,
        id: &ContractId,
    ) -> Result<Option<StoredContract>, FaeError> {
        self.cell_mut(id).map(|cell| cell.contract.take())
    }

    /// Records a completed call: the nonce advances; a released continuation
    /// reoccupies the slot, a spent one leaves it empty.
    pub(crate) fn apply_update(
        &mut self,
        id: &ContractId,
        contract: Option<StoredContract>,
    ) -> Result<(), FaeError> {
        let cell = self.cell_mut(id)?;
        cell.nonce += 1;
        cell.contract = contract;
        Ok(())
    }

    /// Puts a contract taken for a failed transaction back, nonce untouched.
    pub(crate) fn restore(&mut self, id: &ContractId, contract: StoredContract) {
        if let Ok(cell) = self.cell_mut(id) {
            cell.contract = Some(contract);
        }
    }

    pub(crate) fn commit(&mut self, txid: TxId, entry: TxEntry) {
        self.txs.insert(txid, TxRecord::Committed(entry));
    }

    pub(crate) fn poison(&mut self, txid: TxId, err: FaeError, signers: Signers) {
        self.txs.insert(txid, TxRecord::Poisoned { err, signers });
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum StorageError {
    /// unknown transaction {0}
    BadTransactionId(TxId),

    /// no contract output at {0}
    BadContractId(ContractId),

    /// transaction {0} has no input record {1}
    BadInputId(TxId, ShortContractId),

    /// contract {0} has nonce {1} but the reference asserts nonce {2}
    BadNonce(ContractId, u64, u64),

    /// no contract output at {0} to read a nonce from
    InvalidNonceAt(ContractId),

    /// contract id {0} does not address a dispatchable output
    InvalidContractId(ContractId),

    /// transaction {0} is already recorded
    RepeatedTransaction(TxId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Digest;
    use crate::runtime::Outcome;
    use crate::sigs::PublicKey;
    use crate::value::ValueTy;

    fn txid(seed: &[u8]) -> TxId { TxId::from(Digest::hash(seed)) }

    fn echo() -> ContractDef {
        ContractDef::new(ValueTy::U64, BTreeSet::new(), |_, arg| Ok(Outcome::Release(arg)))
    }

    fn seeded() -> (Storage, TxId) {
        let mut storage = Storage::new();
        let tx0 = txid(b"tx0");
        storage
            .issue(tx0, vec![echo(), echo()], Signers::with("alice", PublicKey::with([1; 32])))
            .unwrap();
        (storage, tx0)
    }

    #[test]
    fn descent_errors_are_targeted() {
        let (storage, tx0) = seeded();
        let missing_tx = txid(b"gone");
        assert_eq!(
            storage.cell(&ContractId::TransactionOutput(missing_tx, 0)).err(),
            Some(StorageError::BadTransactionId(missing_tx).into())
        );
        let bad_index = ContractId::TransactionOutput(tx0, 9);
        assert_eq!(
            storage.cell(&bad_index).err(),
            Some(StorageError::BadContractId(bad_index.clone()).into())
        );
        assert_eq!(
            storage.cell(&ContractId::JustTransaction(tx0)).err(),
            Some(StorageError::InvalidContractId(ContractId::JustTransaction(tx0)).into())
        );
        let short = ContractId::TransactionOutput(tx0, 0).shorten();
        assert_eq!(
            storage.cell(&ContractId::InputOutput(tx0, short, 0)).err(),
            Some(StorageError::BadInputId(tx0, short).into())
        );
    }

    #[test]
    fn nonce_discipline() {
        let (mut storage, tx0) = seeded();
        let id = ContractId::TransactionOutput(tx0, 0);
        assert_eq!(storage.nonce_at(&id), Ok(0));

        let contract = storage.take_contract(&id).unwrap().unwrap();
        storage.apply_update(&id, Some(contract)).unwrap();
        assert_eq!(storage.nonce_at(&id), Ok(1));

        storage.take_contract(&id).unwrap().unwrap();
        storage.apply_update(&id, None).unwrap();
        assert_eq!(storage.nonce_at(&id), Ok(2));
        assert!(storage.cell(&id).unwrap().is_spent());

        let bad = ContractId::TransactionOutput(tx0, 9);
        assert_eq!(storage.nonce_at(&bad), Err(StorageError::InvalidNonceAt(bad).into()));
    }

    #[test]
    fn spending_does_not_shift_sibling_indices() {
        let (mut storage, tx0) = seeded();
        let first = ContractId::TransactionOutput(tx0, 0);
        let second = ContractId::TransactionOutput(tx0, 1);

        storage.take_contract(&first).unwrap().unwrap();
        storage.apply_update(&first, None).unwrap();

        assert!(storage.cell(&first).unwrap().is_spent());
        assert!(!storage.cell(&second).unwrap().is_spent());
        assert_eq!(storage.nonce_at(&second), Ok(0));
    }

    #[test]
    fn repeated_issue_is_rejected() {
        let (mut storage, tx0) = seeded();
        assert_eq!(
            storage.issue(tx0, vec![], Signers::new()),
            Err(StorageError::RepeatedTransaction(tx0))
        );
    }
}
