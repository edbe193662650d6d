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
use std::str::FromStr;

use fae::{
    ContractDef, ContractId, Digest, EscrowId, EscrowTy, FieldName, InputArg, Outcome, Path,
    PublicKey, Signers, Storage, TxId, TxParams, Value, ValueTy,
};

fn txid(seed: &[u8]) -> TxId { TxId::from(Digest::hash(seed)) }

fn key(byte: u8) -> PublicKey { PublicKey::with([byte; 32]) }

fn alice() -> Signers { Signers::with("alice", key(1)) }

fn coin_ty() -> EscrowTy { EscrowTy::new(ValueTy::Unit, ValueTy::U64) }

#[test]
fn escrows_transfer_with_returned_values() {
    let mut storage = Storage::new();
    let tx0 = txid(b"tx0");
    let minter = ContractDef::new(ValueTy::Unit, BTreeSet::new(), |ctx, _| {
        let id = ctx.new_escrow(vec![], coin_ty(), |_, _| Ok(Outcome::Spend(Value::U64(100))))?;
        Ok(Outcome::Release(Value::Escrow(id)))
    });
    storage.issue(tx0, vec![minter], alice()).unwrap();
    let c = ContractId::TransactionOutput(tx0, 0);

    let tx1 = txid(b"tx1");
    let params = TxParams::new(tx1, "alice", key(1)).input(c, InputArg::Literal(Value::Unit));
    let coin = ValueTy::Escrow(Box::new(coin_ty()));
    let result = storage
        .run_transaction(params, &[coin], |ctx, mut args| {
            let Value::Escrow(id) = args.remove(0) else { unreachable!() };
            ctx.use_escrow(&id, Value::Unit)
        })
        .unwrap();

    // created inside the input contract, spent by the body: conservation holds
    assert_eq!(result, Value::U64(100));
    assert!(!storage.record(tx1).unwrap().is_poisoned());
}

#[test]
fn contract_keeps_unreturned_escrows_across_calls() {
    let mut storage = Storage::new();
    let tx0 = txid(b"tx0");
    let vault = ContractDef::new(ValueTy::Unit, BTreeSet::new(), {
        let mut stash: Option<EscrowId> = None;
        move |ctx, _| match stash.take() {
            None => {
                let id =
                    ctx.new_escrow(vec![], coin_ty(), |_, _| Ok(Outcome::Spend(Value::U64(9))))?;
                stash = Some(id);
                Ok(Outcome::Release(Value::U64(0)))
            }
            Some(id) => {
                let value = ctx.use_escrow(&id, Value::Unit)?;
                Ok(Outcome::Spend(value))
            }
        }
    });
    storage.issue(tx0, vec![vault], alice()).unwrap();
    let c = ContractId::TransactionOutput(tx0, 0);

    // first call mints a coin and keeps it inside the contract
    let tx1 = txid(b"tx1");
    let params = TxParams::new(tx1, "alice", key(1)).input(c.clone(), InputArg::Literal(Value::Unit));
    let result = storage
        .run_transaction(params, &[ValueTy::U64], |_, mut args| Ok(args.remove(0)))
        .unwrap();
    assert_eq!(result, Value::U64(0));
    assert_eq!(storage.nonce_at(&c).unwrap(), 1);
    assert!(!storage.cell(&c).unwrap().is_spent());

    // second call spends the kept coin and closes the contract
    let tx2 = txid(b"tx2");
    let params = TxParams::new(tx2, "alice", key(1)).input(c.clone(), InputArg::Literal(Value::Unit));
    let result = storage
        .run_transaction(params, &[ValueTy::U64], |_, mut args| Ok(args.remove(0)))
        .unwrap();
    assert_eq!(result, Value::U64(9));
    assert_eq!(storage.nonce_at(&c).unwrap(), 2);
    assert!(storage.cell(&c).unwrap().is_spent());
}

#[test]
fn body_publications_become_dispatchable_outputs() {
    let mut storage = Storage::new();
    let tx1 = txid(b"tx1");
    let params = TxParams::new(tx1, "alice", key(1));
    storage
        .run_transaction(params, &[], |ctx, _| {
            ctx.new_contract(vec![], BTreeSet::new(), ValueTy::U64, |_, arg| {
                Ok(Outcome::Release(arg))
            })?;
            Ok(Value::Unit)
        })
        .unwrap();
    assert_eq!(storage.record(tx1).unwrap().entry().unwrap().outputs.len(), 1);

    let c = ContractId::TransactionOutput(tx1, 0);
    let tx2 = txid(b"tx2");
    let params = TxParams::new(tx2, "alice", key(1)).input(c, InputArg::Literal(11u64.into()));
    let result = storage
        .run_transaction(params, &[ValueTy::U64], |_, mut args| Ok(args.remove(0)))
        .unwrap();
    assert_eq!(result, Value::U64(11));
}

#[test]
fn input_publications_are_scoped_to_their_input() {
    let mut storage = Storage::new();
    let tx0 = txid(b"tx0");
    let publisher = ContractDef::new(ValueTy::Unit, BTreeSet::new(), |ctx, _| {
        ctx.new_contract(vec![], BTreeSet::new(), ValueTy::U64, |_, arg| {
            Ok(Outcome::Release(arg))
        })?;
        Ok(Outcome::Release(Value::Unit))
    });
    storage.issue(tx0, vec![publisher], alice()).unwrap();
    let c = ContractId::TransactionOutput(tx0, 0);

    let tx1 = txid(b"tx1");
    let params = TxParams::new(tx1, "alice", key(1)).input(c.clone(), InputArg::Literal(Value::Unit));
    storage
        .run_transaction(params, &[ValueTy::Unit], |_, mut args| Ok(args.remove(0)))
        .unwrap();

    // attributed to the input, not to the transaction
    let entry = storage.record(tx1).unwrap().entry().unwrap();
    assert!(entry.outputs.is_empty());
    assert_eq!(entry.input_outputs[&c.shorten()].outputs.len(), 1);

    // and addressable through the input-output path after commit
    let published = ContractId::InputOutput(tx1, c.shorten(), 0);
    let tx2 = txid(b"tx2");
    let params = TxParams::new(tx2, "alice", key(1)).input(published, InputArg::Literal(5u64.into()));
    let result = storage
        .run_transaction(params, &[ValueTy::U64], |_, mut args| Ok(args.remove(0)))
        .unwrap();
    assert_eq!(result, Value::U64(5));
}

#[test]
fn deferred_calls_complete_during_normalization() {
    let mut storage = Storage::new();
    let tx0 = txid(b"tx0");
    let doubler_ty = EscrowTy::new(ValueTy::U64, ValueTy::U64);
    let deferring = {
        let doubler_ty = doubler_ty.clone();
        ContractDef::new(ValueTy::Unit, BTreeSet::new(), move |ctx, _| {
            let id = ctx.new_escrow(vec![], doubler_ty.clone(), |_, arg| {
                let Value::U64(n) = arg else { unreachable!() };
                Ok(Outcome::Spend(Value::U64(n * 2)))
            })?;
            let deferred = EscrowId::deferred(id.entry()?, Value::U64(21), id.ty.clone());
            Ok(Outcome::Release(Value::Escrow(deferred)))
        })
    };
    storage.issue(tx0, vec![deferring], alice()).unwrap();
    let c = ContractId::TransactionOutput(tx0, 0);

    let tx1 = txid(b"tx1");
    let params = TxParams::new(tx1, "alice", key(1)).input(c, InputArg::Literal(Value::Unit));
    let escrow_ty = ValueTy::Escrow(Box::new(doubler_ty));
    let result = storage
        .run_transaction(params, &[escrow_ty], |_, mut args| {
            let Value::Escrow(id) = args.remove(0) else { unreachable!() };
            // the deferred call completed before the body ever saw the value
            assert_eq!(id.output().unwrap(), &Value::U64(42));
            Ok(id.output()?.clone())
        })
        .unwrap();
    assert_eq!(result, Value::U64(42));
}

#[test]
fn locators_resolve_against_the_returned_value() {
    let mut storage = Storage::new();
    let tx0 = txid(b"tx0");
    let wallet = ContractDef::new(ValueTy::Unit, BTreeSet::new(), |ctx, _| {
        let pay = ctx.new_escrow(vec![], coin_ty(), |_, _| Ok(Outcome::Spend(Value::U64(1))))?;
        let alias = EscrowId::locator(Path::from_str("pay").unwrap(), coin_ty());
        Ok(Outcome::Release(Value::structure("Wallet", [
            (FieldName::from("pay"), Value::Escrow(pay)),
            (FieldName::from("alias"), Value::Escrow(alias)),
        ])))
    });
    storage.issue(tx0, vec![wallet], alice()).unwrap();
    let c = ContractId::TransactionOutput(tx0, 0);

    let tx1 = txid(b"tx1");
    let params = TxParams::new(tx1, "alice", key(1)).input(c, InputArg::Literal(Value::Unit));
    let result = storage
        .run_transaction(params, &[ValueTy::Struct("Wallet".into())], |ctx, mut args| {
            let Value::Struct(_, fields) = args.remove(0) else { unreachable!() };
            let Value::Escrow(pay) = &fields[0].1 else { unreachable!() };
            let Value::Escrow(alias) = &fields[1].1 else { unreachable!() };
            // the symbolic alias was rewritten to the escrow it pointed at
            assert_eq!(alias.entry().unwrap(), pay.entry().unwrap());
            ctx.use_escrow(alias, Value::Unit)
        })
        .unwrap();
    assert_eq!(result, Value::U64(1));
}

#[test]
fn backing_moves_into_published_contracts() {
    let mut storage = Storage::new();
    let tx1 = txid(b"tx1");
    let params = TxParams::new(tx1, "alice", key(1));
    storage
        .run_transaction(params, &[], |ctx, _| {
            let coin =
                ctx.new_escrow(vec![], coin_ty(), |_, _| Ok(Outcome::Spend(Value::U64(3))))?;
            let backing = Value::Escrow(coin.clone());
            ctx.new_contract(vec![backing], BTreeSet::new(), ValueTy::Unit, {
                move |ctx, _| {
                    let value = ctx.use_escrow(&coin, Value::Unit)?;
                    Ok(Outcome::Spend(value))
                }
            })?;
            // the coin lives inside the publication now; the frame is clean
            Ok(Value::Unit)
        })
        .unwrap();

    let c = ContractId::TransactionOutput(tx1, 0);
    let tx2 = txid(b"tx2");
    let params = TxParams::new(tx2, "alice", key(1)).input(c.clone(), InputArg::Literal(Value::Unit));
    let result = storage
        .run_transaction(params, &[ValueTy::U64], |_, mut args| Ok(args.remove(0)))
        .unwrap();
    assert_eq!(result, Value::U64(3));
    assert!(storage.cell(&c).unwrap().is_spent());
}
