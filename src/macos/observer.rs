//! Registers a [`CFRunLoopObserver`] with the main run loop.
//! The observer is added to the common modes so that it also
//! fires while the loop is tracking events (e.g. during scrolling).

use super::main_thread::{is_main_thread, run_on_main_async};
use crate::{Activity, HookError, ObserverFn};
use objc2_core_foundation::{
    kCFRunLoopCommonModes, CFRetained, CFRunLoop, CFRunLoopActivity, CFRunLoopObserver,
    CFRunLoopObserverContext,
};
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Keeps the observer registered. Dropping it invalidates the observer,
/// which removes it from every run loop it was added to.
pub struct ObserverRegistration {
    observer: SendObserver,
}

struct SendObserver(CFRetained<CFRunLoopObserver>);

// SAFETY: CoreFoundation run loop objects are thread safe,
// the observer is only used to invalidate it.
unsafe impl Send for SendObserver {}

impl SendObserver {
    fn invalidate(&self) {
        // SAFETY: The observer is a valid object that we own a reference to.
        unsafe { self.0.invalidate() };
    }
}

pub(crate) fn register(
    activities: Activity,
    callback: ObserverFn,
) -> Result<ObserverRegistration, HookError> {
    let run_loop = CFRunLoop::main().ok_or(HookError::NoRunLoop)?;

    let info = into_info(callback);
    let mut context = CFRunLoopObserverContext {
        version: 0,
        info,
        retain: None,
        release: Some(release_callback),
        copyDescription: None,
    };
    // SAFETY:
    // * The context is copied by CoreFoundation, `info` stays valid until `release` is called.
    // * `observer_callout` matches `CFRunLoopObserverCallBack`.
    let observer = unsafe {
        CFRunLoopObserver::new(
            None,
            activities.bits().into(),
            true,
            0,
            Some(observer_callout),
            &mut context,
        )
    };
    let Some(observer) = observer else {
        // SAFETY: CoreFoundation didn't take ownership of `info`.
        unsafe { release_callback(info) };
        return Err(HookError::NoRunLoop);
    };

    // SAFETY: Both the observer and the mode are valid CoreFoundation objects.
    unsafe { run_loop.add_observer(Some(&observer), kCFRunLoopCommonModes) };
    Ok(ObserverRegistration {
        observer: SendObserver(observer),
    })
}

impl Drop for ObserverRegistration {
    fn drop(&mut self) {
        if is_main_thread() {
            self.observer.invalidate();
        } else {
            // The callout reads `info` on the main thread without retaining it,
            // so invalidating from here could release it in between.
            // Note that this leaks if nothing drains the main queue.
            let observer = SendObserver(self.observer.0.clone());
            run_on_main_async(move || observer.invalidate());
        }
    }
}

// CoreFoundation releases `info` as soon as the observer is invalidated,
// which can happen while the callout is running (e.g. from urgent work
// removing the hook). The callout holds its own reference for the duration of the call.
fn into_info(callback: ObserverFn) -> *mut c_void {
    Arc::into_raw(Arc::new(callback)).cast::<c_void>().cast_mut()
}

unsafe extern "C-unwind" fn observer_callout(
    _observer: *mut CFRunLoopObserver,
    activity: CFRunLoopActivity,
    info: *mut c_void,
) {
    let info = info.cast_const().cast::<ObserverFn>();
    // SAFETY: `info` comes from `Arc::into_raw` in `register` and is only
    // released on the main thread, which is busy running this callout.
    let callback = unsafe {
        Arc::increment_strong_count(info);
        Arc::from_raw(info)
    };
    // CFRunLoopActivity values fit into a u8, see `Activity::bits`.
    let activity = Activity::from_bits_truncate(activity.0 as u8);
    _ = catch_unwind(AssertUnwindSafe(|| callback(activity)));
}

unsafe extern "C-unwind" fn release_callback(info: *const c_void) {
    // SAFETY: `info` was created by `Arc::into_raw` in `register`
    // and CoreFoundation releases it exactly once.
    drop(unsafe { Arc::from_raw(info.cast::<ObserverFn>()) });
}
