use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A unit of work: runs once, takes nothing, returns nothing.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs `f`, swallowing a panic so that the loop driving it keeps going.
/// Returns `false` if `f` panicked.
pub(crate) fn run_caught(f: impl FnOnce()) -> bool {
    let result = catch_unwind(AssertUnwindSafe(f));
    #[cfg(feature = "log")]
    if let Err(payload) = &result {
        log::error!("task panicked: {}", panic_message(payload.as_ref()));
    }
    result.is_ok()
}

#[cfg(feature = "log")]
fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

// Work runs outside of every lock, so a poisoned lock
// never guards inconsistent state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
