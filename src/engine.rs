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

//! The transaction engine: dispatches input contracts in order, threads their
//! results into the body under the trust discipline, tracks escrow closure,
//! and commits the entry exception-safely (a failed run installs a poisoned
//! entry instead).

use std::mem;

use indexmap::IndexMap;
use strict_encoding::FieldName;
use tracing::{debug, trace};

use crate::escrow::{EscrowError, EscrowId, EscrowTy};
use crate::ident::{ContractId, ContractRef, ShortContractId, TxId};
use crate::runtime::{CallCtx, EntryAllocator, Escrow, EscrowMap, Outcome};
use crate::sigs::{PublicKey, Signers};
use crate::storage::{InputRecord, OutputCell, Storage, StorageError, StoredContract, TxEntry};
use crate::value::{Value, ValueTy};

/// Argument of one transaction input.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum InputArg {
    /// A literal value supplied by the submitter.
    Literal(Value),
    /// The result of the `i`-th earlier input, passed through only when the
    /// receiving contract's trust set names the source.
    Trusted(usize),
}

/// Parameters of a transaction run: its id, named signers (the first is the
/// primary sender), the reward flag, and the ordered input list.
#[derive(Debug)]
pub struct TxParams {
    pub txid: TxId,
    pub signers: Signers,
    pub reward: bool,
    pub inputs: Vec<(ContractRef, InputArg)>,
}

impl TxParams {
    pub fn new(txid: TxId, signer: impl Into<FieldName>, key: PublicKey) -> Self {
        TxParams { txid, signers: Signers::with(signer, key), reward: false, inputs: Vec::new() }
    }

    pub fn signer(mut self, name: impl Into<FieldName>, key: PublicKey) -> Self {
        self.signers.add(name, key);
        self
    }

    pub fn reward(mut self) -> Self {
        self.reward = true;
        self
    }

    pub fn input(mut self, cref: impl Into<ContractRef>, arg: InputArg) -> Self {
        self.inputs.push((cref.into(), arg));
        self
    }
}

/// A contract taken out of its slot for the duration of a run, together with
/// what should happen to the slot on commit.
struct StagedInput {
    id: ContractId,
    contract: StoredContract,
    spent: bool,
}

impl Storage {
    /// Runs a transaction against this storage.
    ///
    /// Dispatches the inputs in order, injects the reward escrow when asked
    /// to, deserializes the collected results into the body's declared
    /// argument types, executes the body, verifies that no escrow remains
    /// open, and commits the entry under the transaction id.
    ///
    /// On failure the same id receives a poisoned entry whose semantic
    /// fields re-raise the failure, contracts touched by the run are put
    /// back untouched, and the failure propagates to the caller. Storage
    /// never holds a partial commit.
    pub fn run_transaction<B>(
        &mut self,
        params: TxParams,
        body_tys: &[ValueTy],
        body: B,
    ) -> Result<Value, FaeError>
    where
        B: FnOnce(&mut CallCtx<'_>, Vec<Value>) -> Result<Value, FaeError>,
    {
        let txid = params.txid;
        if self.contains(txid) {
            return Err(StorageError::RepeatedTransaction(txid).into());
        }
        let signers = params.signers.clone();
        debug!(%txid, inputs = params.inputs.len(), reward = params.reward, "executing transaction");

        let mut staged = Vec::new();
        match self.execute(params, body_tys, body, &mut staged) {
            Ok((entry, result)) => {
                for input in staged {
                    let update = (!input.spent).then_some(input.contract);
                    self.apply_update(&input.id, update)
                        .expect("slot resolved during dispatch stays addressable");
                }
                self.commit(txid, entry);
                debug!(%txid, "transaction committed");
                Ok(result)
            }
            Err(err) => {
                for input in staged {
                    self.restore(&input.id, input.contract);
                }
                self.poison(txid, err.clone(), signers);
                debug!(%txid, %err, "transaction poisoned");
                Err(err)
            }
        }
    }

    fn execute<B>(
        &mut self,
        params: TxParams,
        body_tys: &[ValueTy],
        body: B,
        staged: &mut Vec<StagedInput>,
    ) -> Result<(TxEntry, Value), FaeError>
    where
        B: FnOnce(&mut CallCtx<'_>, Vec<Value>) -> Result<Value, FaeError>,
    {
        let txid = params.txid;
        let sender = params.signers.primary().unwrap_or_default();
        let mut alloc = EntryAllocator::new(txid);
        let mut frame = EscrowMap::new();
        let mut results: Vec<(ContractId, Value)> = Vec::new();
        let mut input_outputs: IndexMap<ShortContractId, InputRecord> = IndexMap::new();
        let mut input_order = Vec::new();

        for (cref, arg) in params.inputs {
            let cid = cref.id;
            let short = cid.shorten();
            if input_outputs.contains_key(&short) {
                return Err(InputError::BadInput(cid).into());
            }

            let cell = self.cell(&cid)?;
            if let Some(asserted) = cref.nonce {
                if cell.nonce != asserted {
                    return Err(StorageError::BadNonce(cid, cell.nonce, asserted).into());
                }
            }
            let trusts = cell.trusts.clone();

            let arg_value = match arg {
                InputArg::Literal(value) => value,
                InputArg::Trusted(i) => {
                    let Some((source, value)) = results.get(i) else {
                        return Err(InputError::BadChainedInput(cid, i).into());
                    };
                    if !trusts.contains(&source.shorten()) {
                        return Err(InputError::UntrustedInput(cid, source.clone()).into());
                    }
                    value.clone()
                }
            };

            trace!(input = %cid, "dispatching input contract");
            let mut published = Vec::new();
            let arg_value = {
                let mut ctx = CallCtx {
                    escrows: &mut frame,
                    outputs: &mut published,
                    sender,
                    alloc: &mut alloc,
                };
                ctx.normalize(arg_value)?
            };

            let Some(contract) = self.take_contract(&cid)? else {
                return Err(InputError::BadInput(cid).into());
            };
            staged.push(StagedInput { id: cid.clone(), contract, spent: false });
            let input = staged.last_mut().expect("an input was just staged");

            if !arg_value.conforms(&input.contract.arg_ty) {
                return Err(
                    InputError::BadArgType(input.contract.arg_ty.clone(), arg_value.ty()).into()
                );
            }

            // The contract's escrow map becomes the frame of its call. Any
            // failure from here on reattaches the frame before bubbling up,
            // so a restored contract keeps its escrows.
            let mut input_frame = mem::take(&mut input.contract.escrows);
            let outcome = {
                let call = (|| -> Result<Outcome, FaeError> {
                    input_frame.transfer_from(&arg_value, &mut frame)?;
                    let mut ctx = CallCtx {
                        escrows: &mut input_frame,
                        outputs: &mut published,
                        sender,
                        alloc: &mut alloc,
                    };
                    input.contract.code.call(&mut ctx, arg_value)
                })();
                match call {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        input.contract.escrows = input_frame;
                        return Err(err);
                    }
                }
            };

            let value = match outcome {
                Outcome::Release(value) => {
                    if let Err(err) = frame.transfer_from(&value, &mut input_frame) {
                        input.contract.escrows = input_frame;
                        return Err(err.into());
                    }
                    input.contract.escrows = input_frame;
                    value
                }
                Outcome::Spend(value) => {
                    if let Err(err) = frame.transfer_from(&value, &mut input_frame) {
                        input.contract.escrows = input_frame;
                        return Err(err.into());
                    }
                    if !input_frame.is_empty() {
                        let open = input_frame.len();
                        input.contract.escrows = input_frame;
                        return Err(EscrowError::OpenEscrows(open).into());
                    }
                    input.spent = true;
                    value
                }
            };

            // The value now lives in the transaction frame: resolve its
            // locators and run its deferred calls there, still attributing
            // any publications to this input.
            let value = {
                let mut ctx = CallCtx {
                    escrows: &mut frame,
                    outputs: &mut published,
                    sender,
                    alloc: &mut alloc,
                };
                ctx.normalize(value)?
            };

            input_outputs.insert(short, InputRecord {
                real_id: cid.clone(),
                outputs: published.into_iter().map(OutputCell::install).collect(),
                versions: IndexMap::new(),
            });
            input_order.push(short);
            results.push((cid, value));
        }

        if params.reward {
            let entry = alloc.next();
            frame.insert(entry, Escrow::reward());
            results.push((
                ContractId::JustTransaction(txid),
                Value::Escrow(EscrowId::direct(entry, EscrowTy::reward())),
            ));
        }

        let args = deserialize_inputs(results.into_iter().map(|(_, v)| v).collect(), body_tys)?;

        let mut tx_outputs = Vec::new();
        let result = {
            let mut ctx = CallCtx {
                escrows: &mut frame,
                outputs: &mut tx_outputs,
                sender,
                alloc: &mut alloc,
            };
            body(&mut ctx, args)?
        };

        if !frame.is_empty() {
            return Err(EscrowError::OpenEscrows(frame.len()).into());
        }

        let entry = TxEntry {
            input_outputs,
            input_order,
            outputs: tx_outputs.into_iter().map(OutputCell::install).collect(),
            signers: params.signers,
            result: result.clone(),
        };
        Ok((entry, result))
    }
}

/// Consumes the ordered input results into the body's declared argument
/// shape: one value per field, each conforming to its declared type. Pure;
/// escrow transfers already happened during dispatch.
fn deserialize_inputs(results: Vec<Value>, tys: &[ValueTy]) -> Result<Vec<Value>, InputError> {
    if results.len() > tys.len() {
        return Err(InputError::TooManyInputs(results.len(), tys.len()));
    }
    if results.len() < tys.len() {
        return Err(InputError::NotEnoughInputs(results.len(), tys.len()));
    }
    for (value, ty) in results.iter().zip(tys) {
        if !value.conforms(ty) {
            return Err(InputError::BadArgType(ty.clone(), value.ty()));
        }
    }
    Ok(results)
}

#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum InputError {
    /// input contract {0} is absent from storage
    BadInput(ContractId),

    /// input {0} chains from input #{1}, which is not an earlier input
    BadChainedInput(ContractId, usize),

    /// input {0} does not trust chained results from {1}
    UntrustedInput(ContractId, ContractId),

    /// expected a value of type {0}, got {1}
    BadArgType(ValueTy, ValueTy),

    /// transaction collected {0} input results but the body takes only {1}
    TooManyInputs(usize, usize),

    /// transaction collected only {0} input results but the body takes {1}
    NotEnoughInputs(usize, usize),
}

/// Any failure a transaction run can end with. A poisoned transaction entry
/// captures one of these and re-raises it whenever a semantic field is read.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(inner)]
pub enum FaeError {
    #[from]
    Input(InputError),

    #[from]
    Escrow(EscrowError),

    #[from]
    Storage(StorageError),

    #[display("release and spend are not available in a transaction body")]
    InvalidTransactionOp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialization_checks_arity() {
        assert_eq!(
            deserialize_inputs(vec![Value::Unit, Value::Unit], &[ValueTy::Unit]),
            Err(InputError::TooManyInputs(2, 1))
        );
        assert_eq!(
            deserialize_inputs(vec![Value::Unit], &[ValueTy::Unit, ValueTy::U64]),
            Err(InputError::NotEnoughInputs(1, 2))
        );
        assert_eq!(deserialize_inputs(vec![], &[]), Ok(vec![]));
    }

    #[test]
    fn deserialization_checks_each_position() {
        assert_eq!(
            deserialize_inputs(vec![Value::U64(7), Value::Unit], &[ValueTy::U64, ValueTy::Bool]),
            Err(InputError::BadArgType(ValueTy::Bool, ValueTy::Unit))
        );
        assert_eq!(
            deserialize_inputs(vec![Value::U64(7)], &[ValueTy::U64]),
            Ok(vec![Value::U64(7)])
        );
    }

    #[test]
    fn params_builder_keeps_input_order() {
        let txid = TxId::from(crate::crypto::Digest::hash(b"tx"));
        let target = TxId::from(crate::crypto::Digest::hash(b"tx0"));
        let a = ContractId::TransactionOutput(target, 0);
        let b = ContractId::TransactionOutput(target, 1);
        let params = TxParams::new(txid, "alice", PublicKey::with([1; 32]))
            .input(a.clone(), InputArg::Literal(Value::Unit))
            .input(b.clone(), InputArg::Trusted(0));
        assert_eq!(params.inputs[0].0.id, a);
        assert_eq!(params.inputs[1].0.id, b);
        assert!(!params.reward);
    }
}
