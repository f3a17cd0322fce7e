// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error as DeriveError;

#[derive(Debug, DeriveError, PartialEq, Eq)]
pub enum TxError {
    /// A value in the read log changed before the transaction could
    /// commit. The attempt had no effect and can be retried.
    #[error("transaction conflict: a read value has changed")]
    Conflict,

    /// The user body gave up. The transaction is abandoned without
    /// applying writes or firing continuations.
    #[error("transaction aborted: {0}")]
    Aborted(String),
}

impl TxError {
    /// Abort the running atomic block with the given reason.
    pub fn aborted(reason: impl Into<String>) -> Self {
        TxError::Aborted(reason.into())
    }
}
