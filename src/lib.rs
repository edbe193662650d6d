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

//! Fae is a deterministic smart-contract execution substrate. Value-bearing
//! objects (escrows) are held linearly inside contracts, transferred only by
//! being returned, and can neither be forged nor duplicated. A transaction
//! dispatches a list of previously-published contracts as inputs, composes
//! their returned values, and runs user code over them; its own return value
//! is informational only and cannot bear value.
//!
//! The crate implements the transaction execution engine: input-contract
//! dispatch, trust-disciplined result chaining, escrow lifecycle tracking,
//! nonce-versioned storage commitment, and an auditable per-transaction
//! record. Transactions execute strictly serially; given identical inputs and
//! storage, execution is byte-for-byte deterministic.

#![deny(
    dead_code,
    unused_variables,
    unused_mut,
    unused_imports,
    non_upper_case_globals,
    non_camel_case_types,
    non_snake_case
)]

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate strict_encoding;

#[cfg(feature = "serde")]
#[macro_use]
extern crate serde;

mod crypto;
mod ident;
mod sigs;
mod value;
mod traverse;
mod escrow;
mod runtime;
mod storage;
mod engine;
mod audit;

pub use strict_encoding::{FieldName, TypeName};

pub use audit::show_transaction;
pub use crypto::Digest;
pub use engine::{FaeError, InputArg, InputError, TxParams};
pub use escrow::{EscrowError, EscrowId, EscrowSource, EscrowTy};
pub use ident::{ContractId, ContractRef, EntryId, ParseIdError, ShortContractId, TxId, VersionId};
pub use runtime::{reward_token, CallCtx, ContractCode, ContractDef, Escrow, EscrowMap, Outcome};
pub use sigs::{PublicKey, Signers};
pub use storage::{InputRecord, OutputCell, Storage, StorageError, TxEntry, TxRecord};
pub use traverse::{map_escrows, resolve_locator, traverse_escrows, ParsePathError, Path};
pub use value::{Value, ValueTy};

/// Strict-encoding library name for all Fae identifier types.
pub const LIB_NAME_FAE: &str = "Fae";
