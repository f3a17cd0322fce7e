// Copyright 2020-2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use crate::{
    local::TLocal,
    snapshot::{Snapshot, Transactable},
    transaction::Transaction,
};
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, Mutex, MutexGuard},
};

/// Type erased capability surface of a [`TVar`]. The transaction layer
/// manages heterogeneously typed vars through this object.
pub(crate) trait VarOps: Send + Sync {
    /// Clones the current value under the var lock.
    fn clone_value(&self) -> Snapshot;

    /// Acquires the var lock. Validation and write back go through the
    /// returned guard; the lock is released when the guard drops.
    fn lock(&self) -> Box<dyn VarGuard + '_>;
}

/// Operations available while a var lock is held.
pub(crate) trait VarGuard {
    /// Compares the live value against a snapshot by value equality.
    fn equals(&self, snapshot: &Snapshot) -> bool;

    /// Overwrites the live value from a snapshot.
    fn write_from(&mut self, snapshot: &Snapshot);
}

struct TVarInner<T> {
    value: Mutex<T>,
}

impl<T> VarOps for TVarInner<T>
where
    T: Transactable,
{
    fn clone_value(&self) -> Snapshot {
        let guard = self.value.lock().expect("tvar mutex poisoned");
        Snapshot::of(guard.clone())
    }

    fn lock(&self) -> Box<dyn VarGuard + '_> {
        Box::new(InnerGuard {
            guard: self.value.lock().expect("tvar mutex poisoned"),
        })
    }
}

struct InnerGuard<'a, T> {
    guard: MutexGuard<'a, T>,
}

impl<T> VarGuard for InnerGuard<'_, T>
where
    T: Transactable,
{
    fn equals(&self, snapshot: &Snapshot) -> bool {
        *self.guard == *snapshot.expect_ref::<T>()
    }

    fn write_from(&mut self, snapshot: &Snapshot) {
        *self.guard = snapshot.expect_ref::<T>().clone();
    }
}

/// A transactional variable.
///
/// Under transaction discipline all reads and writes of a `TVar` appear
/// atomic. Cloning is cheap and yields a handle to the same location;
/// vars compare by identity, never by value.
pub struct TVar<T>
where
    T: Transactable,
{
    inner: Arc<TVarInner<T>>,
}

impl<T> TVar<T>
where
    T: Transactable,
{
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(TVarInner {
                value: Mutex::new(value),
            }),
        }
    }

    /// Reads the current value without a transaction. Intended for tests
    /// and diagnostics; the value may be stale the moment it is returned.
    pub fn read_atomic(&self) -> T {
        self.inner.value.lock().expect("tvar mutex poisoned").clone()
    }

    /// Overwrites the current value without a transaction, bypassing any
    /// running attempt. Useful to inject conflicts in tests.
    pub fn write_atomic(&self, value: T) {
        *self.inner.value.lock().expect("tvar mutex poisoned") = value;
    }

    /// Attaches a transaction scoped view onto this var. All access
    /// through the returned handle is buffered by `tx` until commit.
    pub fn local_in<'tx>(&self, tx: &'tx Transaction) -> TLocal<'tx, T> {
        TLocal::new(tx, self.clone())
    }

    /// Tries to consume the var. Fails and returns an identical var while
    /// other clones are still alive.
    pub fn take(self) -> Result<T, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => Ok(inner.value.into_inner().expect("tvar mutex poisoned")),
            Err(inner) => Err(Self { inner }),
        }
    }

    pub(crate) fn key(&self) -> VarKey {
        VarKey {
            ops: self.inner.clone(),
        }
    }
}

impl<T> Clone for TVar<T>
where
    T: Transactable,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Hash for TVar<T>
where
    T: Transactable,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        // The address of the shared allocation is the identity of the var.
        let addr = Arc::as_ptr(&self.inner) as usize;
        addr.hash(state);
    }
}

impl<T> PartialEq for TVar<T>
where
    T: Transactable,
{
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for TVar<T> where T: Transactable {}

impl<T> fmt::Debug for TVar<T>
where
    T: Transactable,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TVar")
            .field("addr", &(Arc::as_ptr(&self.inner) as usize))
            .finish()
    }
}

/// Type erased handle to a var, keyed by the address of the shared
/// allocation. The working set iterates these in ascending address order,
/// which fixes the lock acquisition order across all transactions.
#[derive(Clone)]
pub(crate) struct VarKey {
    pub(crate) ops: Arc<dyn VarOps>,
}

impl VarKey {
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.ops) as *const () as usize
    }
}

impl PartialEq for VarKey {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for VarKey {}

impl PartialOrd for VarKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VarKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id().cmp(&other.id())
    }
}

impl Hash for VarKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.id());
    }
}

impl fmt::Debug for VarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VarKey").field(&self.id()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::TVar;
    use std::{
        collections::hash_map::DefaultHasher,
        hash::{Hash, Hasher},
    };

    #[test]
    fn test_tvar_clone_equality() {
        fn calculate_hash<T: Hash>(t: &T) -> u64 {
            let mut s = DefaultHasher::new();
            t.hash(&mut s);
            s.finish()
        }

        let a = TVar::new(10usize);
        let b = a.clone();
        let ha = calculate_hash(&a);
        let hb = calculate_hash(&b);

        assert_eq!(a, b);
        assert_eq!(ha, hb);
    }

    #[test]
    fn test_tvar_identity_not_value() {
        let a = TVar::new(10usize);
        let b = TVar::new(10usize);

        assert_ne!(a, b);
    }

    #[test]
    fn test_tvar_take() {
        let a = TVar::new(10usize);
        let b = a.clone();

        let a = a.take().expect_err("clone is still alive");
        drop(b);

        assert_eq!(a.take().expect("last handle"), 10);
    }

    #[test]
    fn test_var_key_order_is_stable() {
        let a = TVar::new(1usize);
        let b = TVar::new(2usize);

        let first = a.key().cmp(&b.key());
        let second = a.key().cmp(&b.key());

        assert_eq!(first, second);
        assert_eq!(a.key(), a.clone().key());
    }
}
