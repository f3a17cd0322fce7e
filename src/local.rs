// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use crate::{
    snapshot::{Snapshot, Transactable},
    transaction::Transaction,
    tvar::TVar,
};

/// A transaction scoped view over a single [`TVar`], the handle user code
/// manipulates inside an atomic block.
///
/// Reads route through the transaction, so a read issued after a local
/// assignment observes the pending value. Assignments stage pending
/// writes. The handle owns nothing; the borrow of the transaction pins it
/// inside the atomic block, so it cannot smuggle the var out of the body.
pub struct TLocal<'tx, T>
where
    T: Transactable,
{
    tx: &'tx Transaction,
    var: TVar<T>,
}

impl<'tx, T> TLocal<'tx, T>
where
    T: Transactable,
{
    pub(crate) fn new(tx: &'tx Transaction, var: TVar<T>) -> Self {
        Self { tx, var }
    }

    /// The current value as seen by the transaction.
    pub fn value(&self) -> T {
        self.tx.read(&self.var)
    }

    /// Stages `value` as the pending write for this var.
    pub fn assign(&self, value: T) {
        self.tx.write(&self.var, value);
    }

    /// Stages a detached snapshot as the pending write for this var.
    ///
    /// # Panics
    /// If the snapshot's dynamic type differs from the var's element type.
    pub fn assign_snapshot(&self, snapshot: Snapshot) {
        self.tx.write_snapshot(&self.var, snapshot);
    }
}
