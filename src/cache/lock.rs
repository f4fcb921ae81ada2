//! Poison-tolerant lock acquisition for guarded engine state.
//!
//! A panic while holding one of these locks must not take the whole service
//! down with it; the guarded structures stay internally consistent because
//! every mutation completes under the guard.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn_poisoned(target, op, "rwlock.read");
            poisoned.into_inner()
        }
    }
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn_poisoned(target, op, "rwlock.write");
            poisoned.into_inner()
        }
    }
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn_poisoned(target, op, "mutex.lock");
            poisoned.into_inner()
        }
    }
}

fn warn_poisoned(target: &'static str, op: &'static str, kind: &'static str) {
    warn!(
        op,
        target_module = target,
        lock_kind = kind,
        result = "poisoned_recovered",
        "continuing with guarded state after a panicked holder"
    );
}
