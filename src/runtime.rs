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

//! The resumable contract runtime.
//!
//! A contract is a coroutine over its argument type: each call either
//! releases an intermediate value (suspending until the next call) or spends
//! itself (closing for good). Escrows ride along with every value crossing a
//! call boundary and are moved between the frames' escrow maps, never copied.

use std::collections::BTreeSet;
use std::fmt::{self, Debug, Formatter};
use std::mem;

use indexmap::IndexMap;
use tracing::trace;

use crate::crypto::Digest;
use crate::engine::{FaeError, InputError};
use crate::escrow::{EscrowError, EscrowId, EscrowSource, EscrowTy};
use crate::ident::{EntryId, ShortContractId, TxId};
use crate::sigs::PublicKey;
use crate::traverse::{map_escrows, resolve_locator, traverse_escrows};
use crate::value::{Value, ValueTy};

/// Result of a single contract or escrow call.
#[derive(Debug)]
pub enum Outcome {
    /// Suspend, yielding a value; the contract awaits its next call.
    Release(Value),
    /// Terminate, yielding a value; the contract's slot is cleared.
    Spend(Value),
}

/// Callable body of a contract or escrow.
///
/// Plain closures implement this; the trait exists so hosts can hand in
/// interpreter-backed callables as well.
pub trait ContractCode {
    fn call(&mut self, ctx: &mut CallCtx<'_>, arg: Value) -> Result<Outcome, FaeError>;
}

impl<F> ContractCode for F
where F: for<'r> FnMut(&mut CallCtx<'r>, Value) -> Result<Outcome, FaeError>
{
    fn call(&mut self, ctx: &mut CallCtx<'_>, arg: Value) -> Result<Outcome, FaeError> {
        self(ctx, arg)
    }
}

/// A live escrow: a callable closed over its own escrow map.
pub struct Escrow {
    pub(crate) ty: EscrowTy,
    pub(crate) code: Box<dyn ContractCode>,
    pub(crate) escrows: EscrowMap,
}

impl Escrow {
    pub fn with(
        ty: EscrowTy,
        code: impl for<'r> FnMut(&mut CallCtx<'r>, Value) -> Result<Outcome, FaeError> + 'static,
    ) -> Self {
        Escrow { ty, code: Box::new(code), escrows: EscrowMap::new() }
    }

    /// The one-shot escrow minted for reward transactions: accepts unit and
    /// spends to the reward token.
    pub(crate) fn reward() -> Self {
        Escrow::with(EscrowTy::reward(), |_, _| Ok(Outcome::Spend(reward_token())))
    }

    pub fn ty(&self) -> &EscrowTy { &self.ty }
}

impl Debug for Escrow {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Escrow")
            .field("ty", &self.ty)
            .field("escrows", &self.escrows)
            .finish_non_exhaustive()
    }
}

/// The token produced by spending a reward escrow. Only the engine mints the
/// escrow backing it, so the token cannot be forged by user code.
pub fn reward_token() -> Value { Value::structure("Reward", []) }

/// A contract publication: callable, declared argument type, trust set, and
/// the escrows backing it.
pub struct ContractDef {
    pub arg_ty: ValueTy,
    pub trusts: BTreeSet<ShortContractId>,
    pub(crate) code: Box<dyn ContractCode>,
    pub(crate) escrows: EscrowMap,
}

impl ContractDef {
    pub fn new(
        arg_ty: ValueTy,
        trusts: BTreeSet<ShortContractId>,
        code: impl for<'r> FnMut(&mut CallCtx<'r>, Value) -> Result<Outcome, FaeError> + 'static,
    ) -> Self {
        ContractDef { arg_ty, trusts, code: Box::new(code), escrows: EscrowMap::new() }
    }
}

impl Debug for ContractDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractDef")
            .field("arg_ty", &self.arg_ty)
            .field("trusts", &self.trusts)
            .field("escrows", &self.escrows)
            .finish_non_exhaustive()
    }
}

/// The escrow map of an executing frame: entry id to live escrow, in
/// insertion order. Escrows move between maps with the values that reference
/// them and are never duplicated.
#[derive(Debug, Default)]
pub struct EscrowMap(IndexMap<EntryId, Escrow>);

impl EscrowMap {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn contains(&self, entry: EntryId) -> bool { self.0.contains_key(&entry) }

    pub(crate) fn insert(&mut self, entry: EntryId, escrow: Escrow) { self.0.insert(entry, escrow); }

    pub(crate) fn remove(&mut self, entry: EntryId) -> Option<Escrow> {
        self.0.shift_remove(&entry)
    }

    /// Moves every escrow referenced by `value` from `source` into this map,
    /// in traversal order.
    ///
    /// References must be backed exactly once: a repeated reference is a
    /// duplication attempt, an unbacked one (other than a completed deferred
    /// call, whose entry may have been legitimately spent) is a dangling
    /// reference.
    pub(crate) fn transfer_from(
        &mut self,
        value: &Value,
        source: &mut EscrowMap,
    ) -> Result<(), EscrowError> {
        let mut refs = Vec::new();
        traverse_escrows(value, &mut |_, id| {
            let required = !matches!(id.source, EscrowSource::TxOut(..));
            if let Ok(entry) = id.entry() {
                refs.push((entry, required));
            }
        });
        let mut moved = BTreeSet::new();
        for (entry, required) in refs {
            match source.remove(entry) {
                Some(escrow) => {
                    if !moved.insert(entry) || self.0.contains_key(&entry) {
                        return Err(EscrowError::DuplicateEscrow(entry));
                    }
                    self.0.insert(entry, escrow);
                }
                None if moved.contains(&entry) => return Err(EscrowError::DuplicateEscrow(entry)),
                None if required => return Err(EscrowError::MissingEscrow(entry)),
                None => {}
            }
        }
        Ok(())
    }
}

/// Deterministic allocator of fresh escrow entry ids within a transaction.
pub(crate) struct EntryAllocator {
    base: Digest,
    counter: u32,
}

impl EntryAllocator {
    pub(crate) fn new(txid: TxId) -> Self { EntryAllocator { base: *txid, counter: 0 } }

    pub(crate) fn next(&mut self) -> EntryId {
        let entry = EntryId::from(self.base.derive(self.counter));
        self.counter += 1;
        entry
    }
}

/// The ambient frame handed to contract, escrow and transaction code.
///
/// It grants access to the frame's escrow map, the outputs writer of the
/// current scope, and the identity of the transaction sender. Release and
/// spend are not reachable through it: contract code expresses them by
/// returning an [`Outcome`], and transaction bodies return a plain value, so
/// the operations the transaction surface forbids are unrepresentable there.
pub struct CallCtx<'r> {
    pub(crate) escrows: &'r mut EscrowMap,
    pub(crate) outputs: &'r mut Vec<ContractDef>,
    pub(crate) sender: PublicKey,
    pub(crate) alloc: &'r mut EntryAllocator,
}

impl CallCtx<'_> {
    /// Public key of the transaction's primary signer.
    pub fn sender(&self) -> PublicKey { self.sender }

    /// Invokes the escrow behind `id` with `arg`.
    ///
    /// The argument's escrows move into the escrow's own frame; the returned
    /// value's escrows move back out. A released escrow stays in the map
    /// under the same entry; a spent one leaves it for good.
    pub fn use_escrow(&mut self, id: &EscrowId, arg: Value) -> Result<Value, FaeError> {
        let entry = id.entry()?;
        self.call_entry(entry, arg)
    }

    pub(crate) fn call_entry(&mut self, entry: EntryId, arg: Value) -> Result<Value, FaeError> {
        let mut escrow = self
            .escrows
            .remove(entry)
            .ok_or(EscrowError::BadEscrowId(entry))?;
        if !arg.conforms(&escrow.ty.arg) {
            return Err(InputError::BadArgType(escrow.ty.arg.clone(), arg.ty()).into());
        }
        trace!(%entry, "calling escrow");

        let mut inner = mem::take(&mut escrow.escrows);
        inner.transfer_from(&arg, self.escrows)?;
        let outcome = {
            let mut ctx = CallCtx {
                escrows: &mut inner,
                outputs: &mut *self.outputs,
                sender: self.sender,
                alloc: &mut *self.alloc,
            };
            escrow.code.call(&mut ctx, arg)?
        };

        match outcome {
            Outcome::Release(val) => {
                if !val.conforms(&escrow.ty.val) {
                    return Err(InputError::BadArgType(escrow.ty.val.clone(), val.ty()).into());
                }
                self.escrows.transfer_from(&val, &mut inner)?;
                escrow.escrows = inner;
                self.escrows.insert(entry, escrow);
                Ok(val)
            }
            Outcome::Spend(val) => {
                if !val.conforms(&escrow.ty.val) {
                    return Err(InputError::BadArgType(escrow.ty.val.clone(), val.ty()).into());
                }
                self.escrows.transfer_from(&val, &mut inner)?;
                if !inner.is_empty() {
                    return Err(EscrowError::OpenEscrows(inner.len()).into());
                }
                trace!(%entry, "escrow spent");
                Ok(val)
            }
        }
    }

    /// Creates a fresh escrow in the current frame. Escrows referenced by the
    /// backing values move into the new escrow's own map.
    pub fn new_escrow(
        &mut self,
        backing: Vec<Value>,
        ty: EscrowTy,
        code: impl for<'s> FnMut(&mut CallCtx<'s>, Value) -> Result<Outcome, FaeError> + 'static,
    ) -> Result<EscrowId, FaeError> {
        let entry = self.alloc.next();
        let mut escrows = EscrowMap::new();
        for value in &backing {
            escrows.transfer_from(value, self.escrows)?;
        }
        trace!(%entry, "new escrow");
        self.escrows
            .insert(entry, Escrow { ty: ty.clone(), code: Box::new(code), escrows });
        Ok(EscrowId::direct(entry, ty))
    }

    /// Publishes a new top-level contract into the current scope's outputs.
    /// Escrows referenced by the backing values move into the publication.
    pub fn new_contract(
        &mut self,
        backing: Vec<Value>,
        trusts: BTreeSet<ShortContractId>,
        arg_ty: ValueTy,
        code: impl for<'s> FnMut(&mut CallCtx<'s>, Value) -> Result<Outcome, FaeError> + 'static,
    ) -> Result<(), FaeError> {
        let mut escrows = EscrowMap::new();
        for value in &backing {
            escrows.transfer_from(value, self.escrows)?;
        }
        self.outputs
            .push(ContractDef { arg_ty, trusts, code: Box::new(code), escrows });
        Ok(())
    }

    /// Normalizes a value that has just crossed into this frame: resolves
    /// every symbolic locator against the value itself, then executes every
    /// deferred call, replacing it with its completed form.
    pub(crate) fn normalize(&mut self, value: Value) -> Result<Value, FaeError> {
        let snapshot = value.clone();
        let value = map_escrows(value, &mut |_, id| {
            if let EscrowSource::Locator(path) = &id.source {
                resolve_locator(&snapshot, path).map_err(FaeError::from)
            } else {
                Ok(id)
            }
        })?;
        map_escrows(value, &mut |_, id| {
            if let EscrowSource::TxIn(entry, arg) = id.source {
                let val = self.call_entry(entry, *arg)?;
                Ok(EscrowId { source: EscrowSource::TxOut(entry, Box::new(val)), ty: id.ty })
            } else {
                Ok(id)
            }
        })
    }
}
