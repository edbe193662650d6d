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

use std::fmt::Write;

use crate::ident::TxId;
use crate::storage::{OutputCell, Storage, StorageError};

/// Renders the audit record of a transaction.
///
/// Every field read is caught individually: a poisoned entry renders its
/// semantic fields as `<exception>` markers instead of aborting the whole
/// rendering. Input blocks appear in dispatch order; each block's nonce is
/// read live through the storage accessors, so it reflects calls made by
/// later transactions as well.
pub fn show_transaction(storage: &Storage, txid: TxId) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Transaction {txid}");
    let Some(record) = storage.record(txid) else {
        let _ = writeln!(out, "  <exception> {}", StorageError::BadTransactionId(txid));
        return out;
    };

    match record.result() {
        Ok(result) => { let _ = writeln!(out, "  result: {result}"); }
        Err(err) => { let _ = writeln!(out, "  result: <exception> {err}"); }
    }
    match record.outputs() {
        Ok(outputs) => { let _ = writeln!(out, "  outputs: {}", index_list(outputs)); }
        Err(err) => { let _ = writeln!(out, "  outputs: <exception> {err}"); }
    }

    let _ = writeln!(out, "  signers:");
    for (name, key) in record.signers().iter() {
        let _ = writeln!(out, "    {name}: {key}");
    }

    match record.input_order() {
        Err(err) => { let _ = writeln!(out, "  inputs: <exception> {err}"); }
        Ok(order) => {
            for short in order {
                let _ = writeln!(out, "  input {short}");
                let input = record
                    .input_outputs()
                    .ok()
                    .and_then(|inputs| inputs.get(short));
                let Some(input) = input else {
                    let _ = writeln!(out, "    <exception> missing input record");
                    continue;
                };
                match storage.nonce_at(&input.real_id) {
                    Ok(nonce) => { let _ = writeln!(out, "    nonce: {nonce}"); }
                    Err(err) => { let _ = writeln!(out, "    nonce: <exception> {err}"); }
                }
                let _ = writeln!(out, "    outputs: {}", index_list(&input.outputs));
                if !input.versions.is_empty() {
                    let _ = writeln!(out, "    versions:");
                    for (version, ty) in &input.versions {
                        let _ = writeln!(out, "      {version}: {ty}");
                    }
                }
            }
        }
    }
    out
}

fn index_list(cells: &[OutputCell]) -> String {
    let indexes = (0..cells.len()).map(|i| i.to_string()).collect::<Vec<_>>();
    format!("[{}]", indexes.join(", "))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::crypto::Digest;
    use crate::runtime::{ContractDef, Outcome};
    use crate::sigs::{PublicKey, Signers};
    use crate::value::ValueTy;

    #[test]
    fn renders_an_issued_entry() {
        let mut storage = Storage::new();
        let tx0 = TxId::from(Digest::hash(b"tx0"));
        let contract =
            ContractDef::new(ValueTy::U64, BTreeSet::new(), |_, arg| Ok(Outcome::Release(arg)));
        let key = PublicKey::with([0x11; 32]);
        storage
            .issue(tx0, vec![contract], Signers::with("alice", key))
            .unwrap();

        let rendered = show_transaction(&storage, tx0);
        assert!(rendered.starts_with(&format!("Transaction {tx0}\n")));
        assert!(rendered.contains("  result: ()\n"));
        assert!(rendered.contains("  outputs: [0]\n"));
        assert!(rendered.contains(&format!("    alice: {key}\n")));
    }

    #[test]
    fn unknown_transactions_render_an_exception_marker() {
        let storage = Storage::new();
        let txid = TxId::from(Digest::hash(b"gone"));
        let rendered = show_transaction(&storage, txid);
        assert!(rendered.contains("<exception>"));
        assert!(rendered.contains("unknown transaction"));
    }
}
