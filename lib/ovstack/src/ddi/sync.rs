// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Safe abstractions for synchronization primitives.
//!
//! The guards never report poisoning: a panic while holding one of
//! these locks does not make the protected data unreachable to the
//! rest of the namespace.
use alloc::sync::Arc;
use core::ops::Deref;
use core::ops::DerefMut;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::RwLock;

/// A mutual exclusion lock.
///
/// We name it `KMutex` on purpose. The API isn't quite the same as a
/// userland `Mutex` (there is no poisoning), and there's no reason that
/// we have to use that exact name.
pub struct KMutex<T> {
    inner: Mutex<T>,
}

pub struct KMutexGuard<'a, T: 'a> {
    guard: std::sync::MutexGuard<'a, T>,
}

impl<T> Deref for KMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.guard.deref()
    }
}

impl<T> DerefMut for KMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard.deref_mut()
    }
}

impl<T> KMutex<T> {
    pub fn new(val: T) -> Self {
        KMutex { inner: Mutex::new(val) }
    }

    pub fn lock(&self) -> KMutexGuard<'_, T> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        KMutexGuard { guard }
    }
}

impl<T: Default> Default for KMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// A reader/writer lock.
pub struct KRwLock<T> {
    inner: RwLock<T>,
}

pub struct KRwLockReadGuard<'a, T: 'a> {
    guard: std::sync::RwLockReadGuard<'a, T>,
}

pub struct KRwLockWriteGuard<'a, T: 'a> {
    guard: std::sync::RwLockWriteGuard<'a, T>,
}

impl<T> Deref for KRwLockReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.guard.deref()
    }
}

impl<T> Deref for KRwLockWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.guard.deref()
    }
}

impl<T> DerefMut for KRwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard.deref_mut()
    }
}

impl<T> KRwLock<T> {
    pub fn new(val: T) -> Self {
        KRwLock { inner: RwLock::new(val) }
    }

    pub fn read(&self) -> KRwLockReadGuard<'_, T> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        KRwLockReadGuard { guard }
    }

    pub fn write(&self) -> KRwLockWriteGuard<'_, T> {
        let guard =
            self.inner.write().unwrap_or_else(PoisonError::into_inner);
        KRwLockWriteGuard { guard }
    }
}

/// A read-copy-update cell holding a published snapshot of `T`.
///
/// Readers take a reference to the current snapshot with
/// [`KRcu::load()`]; the read lock is held only long enough to clone
/// the `Arc`, after which the reader traverses the snapshot with no
/// lock held at all. A writer never modifies a published snapshot.
/// It builds the successor from a copy, outside of the read lock, and
/// then swaps the pointer in one step.
///
/// Writers are serialized by `writer`. Memory held by an old snapshot
/// is reclaimed when the last reader drops its `Arc`, so a reader
/// mid-traversal can never observe freed memory or a half-applied
/// update.
pub struct KRcu<T> {
    current: KRwLock<Arc<T>>,
    writer: KMutex<()>,
}

impl<T> KRcu<T> {
    pub fn new(val: T) -> Self {
        Self { current: KRwLock::new(Arc::new(val)), writer: KMutex::new(()) }
    }

    /// Return the current snapshot.
    pub fn load(&self) -> Arc<T> {
        Arc::clone(&self.current.read())
    }

    /// Publish `val` as the new snapshot, returning the old one.
    ///
    /// The old snapshot is handed back with the lock released.
    pub fn replace(&self, val: T) -> Arc<T> {
        let _w = self.writer.lock();
        self.swap(Arc::new(val))
    }

    // The write guard is released on return, before the caller drops
    // what comes back.
    fn swap(&self, next: Arc<T>) -> Arc<T> {
        core::mem::replace(&mut *self.current.write(), next)
    }
}

impl<T: Clone> KRcu<T> {
    /// Apply `f` to a copy of the current snapshot and publish the
    /// result.
    ///
    /// If `f` fails, nothing is published and the error is returned;
    /// readers continue to see the snapshot as it was.
    pub fn update<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut T) -> Result<R, E>,
    {
        let _w = self.writer.lock();
        let mut next = T::clone(&self.current.read());
        let ret = f(&mut next)?;

        // The old snapshot is freed with the lock released.
        let old = self.swap(Arc::new(next));
        drop(old);
        Ok(ret)
    }
}
