use crate::Task;
use std::{error, fmt};

/// Errors reported when installing or removing the run loop hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum HookError {
    /// The operation must be called on the main thread.
    NotMainThread,
    /// A hook is already installed. Only one observer may exist at a time.
    AlreadyInstalled,
    /// There is no run loop to register with (e.g. it was dropped or
    /// the platform doesn't provide a main run loop).
    NoRunLoop,
    /// The run loop ran out of observer handles.
    Overflow,
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookError::NotMainThread => f.write_str("hook operations must run on the main thread"),
            HookError::AlreadyInstalled => f.write_str("the run loop hook is already installed"),
            HookError::NoRunLoop => f.write_str("no run loop is available to observe"),
            HookError::Overflow => f.write_str("failed to add observer: no more handles left"),
        }
    }
}

impl error::Error for HookError {}

impl From<OverflowError> for HookError {
    fn from(_: OverflowError) -> Self {
        HookError::Overflow
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct OverflowError;

impl fmt::Display for OverflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to add callback: no more handles left")
    }
}

impl error::Error for OverflowError {}

/// Urgent work that was submitted from another thread while no hook was installed.
///
/// The work is handed back untouched so that it can be
/// submitted through a normal task queue instead.
pub struct RejectedTask(Task);

impl RejectedTask {
    pub(crate) fn new(task: Task) -> Self {
        Self(task)
    }

    /// Returns the rejected work.
    pub fn into_task(self) -> Task {
        self.0
    }
}

impl fmt::Debug for RejectedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RejectedTask").finish_non_exhaustive()
    }
}

impl fmt::Display for RejectedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("urgent task rejected: no run loop hook is installed")
    }
}

impl error::Error for RejectedTask {}
