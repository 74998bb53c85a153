use crate::{Activity, HookError};
use std::sync::Arc;

/// A callback invoked by a run loop at the phases it was registered for.
///
/// Observer callbacks always run on the loop's own thread.
pub type ObserverFn = Box<dyn Fn(Activity) + Send + Sync + 'static>;

/// The event loop of the designated main thread, seen as
/// a facility to register phase-scoped observers with.
///
/// Implemented by [`LoopHandle`](crate::LoopHandle) for the portable
/// [`EventLoop`](crate::EventLoop) and, on macOS, by `MainRunLoop`
/// for the main `CFRunLoop`.
pub trait RunLoop: Send + Sync + 'static {
    /// Keeps an observer registered. Passing it back to
    /// [`RunLoop::remove_observer`] unregisters the observer.
    type Registration: Send + 'static;

    /// Registers `observer` to be called at every cycle
    /// for each phase contained in `activities`.
    fn add_observer(
        &self,
        activities: Activity,
        observer: ObserverFn,
    ) -> Result<Self::Registration, HookError>;

    /// Unregisters an observer. The observer is not called
    /// anymore once this returns.
    fn remove_observer(&self, registration: Self::Registration);

    /// Makes a waiting loop start a new cycle. Callable from any thread.
    fn wake_up(&self);

    /// Returns `true` once the loop is gone for good and its observers
    /// will never fire again. Callable from any thread.
    fn is_closed(&self) -> bool {
        false
    }
}

impl<T: RunLoop + ?Sized> RunLoop for Arc<T> {
    type Registration = T::Registration;

    fn add_observer(
        &self,
        activities: Activity,
        observer: ObserverFn,
    ) -> Result<Self::Registration, HookError> {
        (**self).add_observer(activities, observer)
    }

    fn remove_observer(&self, registration: Self::Registration) {
        (**self).remove_observer(registration);
    }

    fn wake_up(&self) {
        (**self).wake_up();
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}
