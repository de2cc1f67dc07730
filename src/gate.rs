//! Frame admission guard.
//!
//! One permit per session bounds evaluation concurrency. The frame path
//! polls with [`AdmissionGate::try_admit`] and discards its frame when the
//! permit is held elsewhere; control paths (reconfiguration, file
//! evaluation, teardown) suspend on [`AdmissionGate::admit`] until the
//! holder finishes, which is also what guarantees an in-flight evaluation
//! drains before its resources are swapped out.
//!
//! The gate wraps the state it admits callers into: the session's mutable
//! evaluation context is only reachable through a held [`Permit`], and
//! dropping the permit is the one and only release. There is no manual
//! release to forget or to call twice.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Single-slot admission gate over a guarded context `T`.
pub struct AdmissionGate<T> {
    slot: Arc<Mutex<T>>,
}

impl<T> AdmissionGate<T> {
    pub fn new(context: T) -> Self {
        Self {
            slot: Arc::new(Mutex::new(context)),
        }
    }

    /// Non-suspending poll for the permit. `None` means a holder is active;
    /// the caller is expected to drop its frame, not queue it.
    pub fn try_admit(&self) -> Option<Permit<T>> {
        Arc::clone(&self.slot).try_lock_owned().ok().map(Permit::new)
    }

    /// Cooperative acquisition. Suspends the task (never the thread) until
    /// the active holder drops its permit.
    pub async fn admit(&self) -> Permit<T> {
        Permit::new(Arc::clone(&self.slot).lock_owned().await)
    }
}

impl<T> Clone for AdmissionGate<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

/// A held admission slot. Dereferences to the guarded context; dropping it
/// releases the slot and wakes one suspended `admit` caller.
///
/// Permits are deliberately not `Clone` and have no public constructor:
/// the only way to hold one is to win admission.
#[must_use = "dropping the permit immediately releases the admission slot"]
pub struct Permit<T> {
    guard: OwnedMutexGuard<T>,
}

impl<T> Permit<T> {
    fn new(guard: OwnedMutexGuard<T>) -> Self {
        Self { guard }
    }
}

impl<T> Deref for Permit<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for Permit<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
