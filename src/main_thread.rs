use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Answers whether the calling code runs on the designated main thread.
///
/// All urgent work and all observer callbacks run on that thread.
/// Installing and removing the hook is only allowed there as well.
pub trait MainThread: Send + Sync {
    /// Returns `true` if the current thread is the designated main thread.
    fn is_main_thread(&self) -> bool;
}

impl<T: MainThread + ?Sized> MainThread for Arc<T> {
    fn is_main_thread(&self) -> bool {
        (**self).is_main_thread()
    }
}

impl<T: MainThread + ?Sized> MainThread for &T {
    fn is_main_thread(&self) -> bool {
        (**self).is_main_thread()
    }
}

/// A [`MainThread`] that remembers a thread by its [`ThreadId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadIdentity(ThreadId);

impl ThreadIdentity {
    /// Designates the calling thread.
    pub fn current() -> Self {
        Self(thread::current().id())
    }

    /// Designates the thread with the given id.
    pub fn new(id: ThreadId) -> Self {
        Self(id)
    }

    pub fn id(self) -> ThreadId {
        self.0
    }
}

impl MainThread for ThreadIdentity {
    fn is_main_thread(&self) -> bool {
        thread::current().id() == self.0
    }
}

#[cfg(test)]
static_assertions::assert_impl_all!(ThreadIdentity: Send, Sync);
