//! Per-slot reader/writer admission
//!
//! A reader-preference lock assembled from two primitives: a read-count guard
//! (a mutex around the number of active readers) and an exclusive gate (a binary
//! semaphore). The first reader to arrive takes the gate on behalf of every
//! reader that follows, and the last reader to leave gives it back. A writer
//! takes the gate directly, so it excludes readers and other writers of the same
//! slot but never touches any other slot.
//!
//! The gate cannot be a plain `Mutex` because the thread that releases it (the
//! last reader out) is generally not the thread that acquired it (the first
//! reader in).

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Lock a std mutex, ignoring poisoning. None of the critical sections in this
/// module can leave the protected data half-updated.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Binary semaphore that may be released from any thread.
struct Gate {
    held: Mutex<bool>,
    released: Condvar,
}

impl Gate {
    fn new() -> Self {
        Self { held: Mutex::new(false), released: Condvar::new() }
    }

    fn acquire(&self) {
        let mut held = lock(&self.held);
        while *held {
            held = self.released.wait(held).unwrap_or_else(PoisonError::into_inner);
        }
        *held = true;
    }

    fn try_acquire(&self) -> bool {
        let mut held = lock(&self.held);
        if *held {
            return false;
        }
        *held = true;
        true
    }

    fn release(&self) {
        *lock(&self.held) = false;
        self.released.notify_one();
    }
}

/// Reader-preference lock guarding one cache slot
///
/// Any number of readers may hold the slot at once. A writer waits until the
/// reader count drops back to zero, and new readers wait while a writer holds
/// the gate. Under a steady stream of overlapping readers a writer can wait
/// indefinitely; that is the accepted cost of the reader-preference protocol.
///
/// Waiting parks the calling thread. Readers only ever wait out a single short
/// write, but a writer can wait on readers for much longer, so async callers
/// take write admission on the blocking pool.
pub struct SlotLock<T> {
    readers: Mutex<usize>,
    gate: Gate,
    value: UnsafeCell<T>,
}

// SAFETY: access to `value` is only handed out through the guards below, which
// uphold the usual aliasing rules: shared references only while the gate is held
// on behalf of readers, a unique reference only while a single writer holds it.
unsafe impl<T: Send> Send for SlotLock<T> {}
unsafe impl<T: Send + Sync> Sync for SlotLock<T> {}

impl<T> SlotLock<T> {
    pub fn new(value: T) -> Self {
        Self { readers: Mutex::new(0), gate: Gate::new(), value: UnsafeCell::new(value) }
    }

    /// Acquire read admission, blocking while a writer holds the slot
    pub fn read(&self) -> SlotReadGuard<'_, T> {
        let mut readers = lock(&self.readers);
        *readers += 1;
        if *readers == 1 {
            // The read-count guard stays held while waiting, so later readers
            // queue behind the first one instead of slipping past the writer.
            self.gate.acquire();
        }
        drop(readers);
        SlotReadGuard { lock: self }
    }

    /// Acquire exclusive admission, blocking while any reader or writer holds the slot
    pub fn write(&self) -> SlotWriteGuard<'_, T> {
        self.gate.acquire();
        SlotWriteGuard { lock: self }
    }

    /// Acquire exclusive admission only if the slot is idle right now
    pub fn try_write(&self) -> Option<SlotWriteGuard<'_, T>> {
        self.gate.try_acquire().then(|| SlotWriteGuard { lock: self })
    }

    /// Number of readers currently admitted
    pub fn reader_count(&self) -> usize {
        *lock(&self.readers)
    }

    fn release_reader(&self) {
        let mut readers = lock(&self.readers);
        *readers -= 1;
        if *readers == 0 {
            self.gate.release();
        }
    }
}

impl<T: Default> Default for SlotLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for SlotLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotLock").field("readers", &self.reader_count()).finish_non_exhaustive()
    }
}

/// Shared admission to a slot; released when dropped
pub struct SlotReadGuard<'a, T> {
    lock: &'a SlotLock<T>,
}

impl<T> Deref for SlotReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the gate is held for readers, so no writer can exist.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> Drop for SlotReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_reader();
    }
}

/// Exclusive admission to a slot; released when dropped
pub struct SlotWriteGuard<'a, T> {
    lock: &'a SlotLock<T>,
}

impl<T> Deref for SlotWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: this guard is the only holder of the gate.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SlotWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: this guard is the only holder of the gate.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SlotWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.gate.release();
    }
}
