// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use crate::{
    dispatch::{Dispatch, FutureSlot, Task},
    error::TxError,
    snapshot::{Snapshot, Transactable},
    tvar::{TVar, VarGuard, VarKey},
};
use log::*;
use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

/// A single attempt at an atomic block.
///
/// All reads and writes issued by the user body are buffered here; shared
/// memory is only touched in [`Transaction::commit`]. A transaction is
/// either committed, or cleared on conflict and reused for the next
/// attempt.
pub struct Transaction {
    pub(crate) id: usize,
    dispatcher: Arc<dyn Dispatch>,
    state: Mutex<TxState>,
}

#[derive(Default)]
struct TxState {
    /// Working set: the per var materialised view, ordered by var
    /// identity. Reflects all intra transaction reads and writes.
    vars: BTreeMap<VarKey, Snapshot>,

    /// Value of each var as first observed, one entry per first read.
    /// Never touched by later local writes.
    read_log: Vec<(VarKey, Snapshot)>,

    /// Identities of the vars assigned to within this attempt.
    write_set: HashSet<usize>,

    /// Deferred continuations, fired in order on the committing attempt.
    asyncs: Vec<(Option<FutureSlot>, Task)>,
}

impl TxState {
    fn clear(&mut self) {
        self.vars.clear();
        self.read_log.clear();
        self.write_set.clear();
        self.asyncs.clear();
    }
}

impl Transaction {
    pub fn new(dispatcher: Arc<dyn Dispatch>) -> Self {
        Self::with_id(dispatcher, 0)
    }

    pub(crate) fn with_id(dispatcher: Arc<dyn Dispatch>, id: usize) -> Self {
        Self {
            id,
            dispatcher,
            state: Mutex::new(TxState::default()),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Reads a var through the transaction.
    ///
    /// The first read clones the live value under the var lock and records
    /// it in the working set and the read log. Every later read is served
    /// from the working set without touching the var, so a read after a
    /// local write observes the pending write.
    pub fn read<T>(&self, var: &TVar<T>) -> T
    where
        T: Transactable,
    {
        let mut state = self.lock_state();
        let state = &mut *state;
        let key = var.key();

        if let Some(staged) = state.vars.get(&key) {
            return staged.expect_ref::<T>().clone();
        }

        let staged = key.ops.clone_value();
        let seen = staged.duplicate();
        let value = staged.expect_ref::<T>().clone();
        state.read_log.push((key.clone(), seen));
        state.vars.insert(key, staged);
        value
    }

    /// Stages a pending write. The var joins the working set and the write
    /// set; no read log entry is made, so a blind write validates against
    /// nothing.
    pub fn write<T>(&self, var: &TVar<T>, value: T)
    where
        T: Transactable,
    {
        self.write_snapshot(var, Snapshot::of(value));
    }

    /// Stages a pending write from an already detached snapshot.
    ///
    /// # Panics
    /// If the snapshot's dynamic type differs from the var's element type.
    pub fn write_snapshot<T>(&self, var: &TVar<T>, snapshot: Snapshot)
    where
        T: Transactable,
    {
        snapshot.expect_ref::<T>();

        let mut state = self.lock_state();
        let key = var.key();
        state.write_set.insert(key.id());
        state.vars.insert(key, snapshot);
    }

    /// Applies a function on `var` and stages the result as the pending
    /// write. The function itself must be synchronous.
    pub fn apply<T, F>(&self, var: &TVar<T>, operation: F)
    where
        T: Transactable,
        F: FnOnce(T) -> T,
    {
        let value = self.read(var);
        self.write(var, operation(value));
    }

    /// Enqueues a continuation that runs if and only if this attempt
    /// commits. Nothing executes now; a retried attempt leaves no trace.
    ///
    /// With `slot` present, the dispatcher's task handle is published into
    /// it on commit. With `None` the continuation is fire and forget.
    pub fn defer<F>(&self, slot: Option<&FutureSlot>, continuation: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.lock_state();
        state.asyncs.push((slot.cloned(), Box::new(continuation)));
    }

    /// Empties the working set, read log, write set and async queue.
    /// Invoked on conflict before the next attempt; safe to call
    /// repeatedly.
    pub fn clear(&self) {
        self.lock_state().clear();
    }

    /// Publishes this attempt.
    ///
    /// 1. Acquire each var lock, iterating the working set in ascending
    ///    identity order. Every committing transaction locks in the same
    ///    order, so none can deadlock on var locks.
    /// 2. Compare each read log entry against the live value. On any
    ///    mismatch release all locks, clear the transaction and return
    ///    [`TxError::Conflict`]; no write is applied, no continuation
    ///    fires.
    /// 3. Write each write set snapshot into its var.
    /// 4. Hand the deferred continuations to the dispatcher in enqueue
    ///    order, publishing task handles into bound slots.
    /// 5. Drop the locks and report success.
    pub fn commit(&self) -> Result<(), TxError> {
        let mut state = self.lock_state();
        let state = &mut *state;

        // Phase 1: lock acquisition in working set order.
        let mut guards: BTreeMap<usize, Box<dyn VarGuard + '_>> = BTreeMap::new();
        for key in state.vars.keys() {
            guards.insert(key.id(), key.ops.lock());
        }

        // Phase 2: read log validation against live values.
        let consistent = state.read_log.iter().all(|(key, seen)| {
            guards
                .get(&key.id())
                .expect("read log var missing from working set")
                .equals(seen)
        });
        if !consistent {
            info!("TX({}): VALIDATING READ LOG FAILED", self.id);
            drop(guards);
            state.clear();
            return Err(TxError::Conflict);
        }

        // Phase 3: write application. Order is unobservable, all locks are
        // held.
        for (key, staged) in state.vars.iter() {
            if state.write_set.contains(&key.id()) {
                guards
                    .get_mut(&key.id())
                    .expect("write set var missing from working set")
                    .write_from(staged);
            }
        }

        // Phase 4: async dispatch, locks still held. The dispatcher must
        // not run the continuation synchronously, see [`Dispatch`].
        for (slot, continuation) in state.asyncs.drain(..) {
            let handle = self.dispatcher.dispatch(continuation);
            if let Some(slot) = slot {
                slot.fill(handle);
            }
        }

        // Phase 5: guards drop, locks release.
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, TxState> {
        self.state.lock().expect("transaction state poisoned")
    }
}
