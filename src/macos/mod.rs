// For the safety review: https://github.com/madsmtm/objc2/tree/master/crates/header-translator#what-is-required-for-a-method-to-be-safe

use crate::{Activity, HookError, MainThread, ObserverFn, RunLoop};
use objc2_core_foundation::CFRunLoop;
pub use observer::ObserverRegistration;

mod main_thread;
mod observer;

/// The main thread's `CFRunLoop`, which also drives the main dispatch queue.
///
/// ```no_run
/// use cutline::{platform::macos::MainRunLoop, UrgentQueue};
///
/// // On the main thread, e.g. in `applicationDidFinishLaunching`:
/// let queue = UrgentQueue::new(MainRunLoop::new());
/// assert!(queue.add_hook());
///
/// // From anywhere:
/// queue.add_urgent_task(|| println!("running ahead of the main queue"));
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct MainRunLoop {
    _private: (),
}

impl MainRunLoop {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Enqueues `f` on the main dispatch queue, behind everything already queued there.
    pub fn dispatch(&self, f: impl FnOnce() + Send + 'static) {
        main_thread::run_on_main_async(f);
    }
}

impl MainThread for MainRunLoop {
    fn is_main_thread(&self) -> bool {
        main_thread::is_main_thread()
    }
}

impl RunLoop for MainRunLoop {
    type Registration = ObserverRegistration;

    fn add_observer(
        &self,
        activities: Activity,
        observer: ObserverFn,
    ) -> Result<ObserverRegistration, HookError> {
        observer::register(activities, observer)
    }

    fn remove_observer(&self, registration: ObserverRegistration) {
        drop(registration);
    }

    fn wake_up(&self) {
        if let Some(run_loop) = CFRunLoop::main() {
            // SAFETY: Waking up a run loop is allowed from any thread.
            unsafe { run_loop.wake_up() };
        }
    }

    fn is_closed(&self) -> bool {
        CFRunLoop::main().is_none()
    }
}
