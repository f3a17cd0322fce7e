// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! # Stronghold Asynchronous Software Transactional Memory
//!
//! An STM engine with deferred asynchronous side effects. Concurrent
//! actors mutate shared [`TVar`]s as if by an atomic block: reads and
//! writes are buffered in a per attempt [`Transaction`], validated against
//! the live values at commit time, and either applied wholesale or retried
//! from scratch. A transaction may additionally enqueue continuations,
//! typically I/O, that fire only once the enqueueing attempt commits,
//! optionally publishing a task handle into a caller supplied
//! [`FutureSlot`].
//!
//! ```
//! use stronghold_astm::{Stm, TokioDispatcher};
//!
//! #[tokio::main]
//! async fn main() {
//!     let stm = Stm::new(TokioDispatcher::current());
//!     let a = stm.create(4i32);
//!     let b = stm.create(1i32);
//!
//!     stm.atomically(|tx| {
//!         let local_a = a.local_in(tx);
//!         let local_b = b.local_in(tx);
//!         local_a.assign(local_a.value() * local_a.value() - local_b.value());
//!         Ok(())
//!     })
//!     .expect("transaction failed");
//!
//!     assert_eq!(a.read_atomic(), 15);
//! }
//! ```
//!
//! ## Discipline
//!
//! The atomic block body may run any number of times, so it must stay free
//! of side effects outside the transaction. Use [`Transaction::defer`] for
//! anything externally visible. Nested atomic blocks are not supported.

pub mod dispatch;
pub mod error;
pub mod local;
pub mod snapshot;
pub mod stm;
pub mod transaction;
pub mod tvar;

pub use dispatch::{Dispatch, FutureSlot, Task, TaskHandle, TokioDispatcher};
pub use error::TxError;
pub use local::TLocal;
pub use snapshot::{Snapshot, Transactable};
pub use stm::{Stm, TxResult};
pub use transaction::Transaction;
pub use tvar::TVar;
