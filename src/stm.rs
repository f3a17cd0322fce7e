// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use crate::{
    dispatch::Dispatch, error::TxError, snapshot::Transactable, transaction::Transaction,
    tvar::TVar,
};
use log::*;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Result of a successfully committed atomic block.
#[derive(Debug)]
pub struct TxResult<U> {
    /// Id of the transaction that succeeded.
    pub tx_id: usize,
    /// Number of attempts that were run, including the committing one.
    pub attempts: usize,
    /// Return value of the user body on the committing attempt.
    pub res: U,
}

/// Entry point for running atomic blocks.
///
/// Hands out transaction ids and carries the dispatcher used for deferred
/// continuations. The engine itself keeps no state between transactions;
/// vars are owned by the application.
#[derive(Clone)]
pub struct Stm {
    dispatcher: Arc<dyn Dispatch>,
    transaction_ids: Arc<AtomicUsize>,
}

impl Stm {
    pub fn new<D>(dispatcher: D) -> Self
    where
        D: Dispatch + 'static,
    {
        Self {
            dispatcher: Arc::new(dispatcher),
            transaction_ids: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// This will create a new transactional variable [`TVar`].
    pub fn create<T>(&self, value: T) -> TVar<T>
    where
        T: Transactable,
    {
        TVar::new(value)
    }

    /// Runs `body` as an atomic block:
    ///
    /// 1. Construct an empty transaction
    /// 2. Run the user body against it; reads and writes are buffered,
    ///    deferred continuations are queued
    /// 3. Commit; on conflict the cleared transaction runs again
    ///
    /// The body must be free of side effects outside the transaction, it
    /// may run any number of times. An `Err` from the body aborts the
    /// block: the transaction is cleared and the error returned, without
    /// applying a write or firing a continuation.
    ///
    /// Livelock under pathological contention is possible and not
    /// prevented here.
    pub fn atomically<U, F>(&self, body: F) -> Result<TxResult<U>, TxError>
    where
        F: Fn(&Transaction) -> Result<U, TxError>,
    {
        let tx_id = self.increment_tx_ids();
        let tx = Transaction::with_id(self.dispatcher.clone(), tx_id);
        let mut attempts = 0;

        loop {
            attempts += 1;
            info!("TX({}): START, attempt {}", tx_id, attempts);

            match body(&tx) {
                Ok(res) => {
                    if tx.commit().is_err() {
                        info!("TX({}): CONFLICT, retrying", tx_id);
                        continue;
                    }
                    info!("TX({}): SUCCESS after {} attempt(s)", tx_id, attempts);
                    return Ok(TxResult {
                        tx_id,
                        attempts,
                        res,
                    });
                }
                Err(e) => {
                    info!("TX({}): ABORTED by user body", tx_id);
                    tx.clear();
                    return Err(e);
                }
            }
        }
    }

    fn increment_tx_ids(&self) -> usize {
        self.transaction_ids.fetch_add(1, Ordering::SeqCst)
    }
}
